//! Query AST.

mod predicate;
mod query;

pub(crate) use predicate::case_variants;
pub use predicate::Predicate;
pub use query::{Query, Selection};
