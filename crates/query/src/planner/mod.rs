//! Query planning.

mod physical;
mod query_planner;

pub use physical::{Residual, ScanPlan, ScanSource};
pub use query_planner::compile;
