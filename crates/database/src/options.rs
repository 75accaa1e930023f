//! Database options.

use serde::Deserialize;

/// Options accepted by [`Database::with_options`](crate::Database::with_options).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseOptions {
    /// Open the database on first use instead of requiring an explicit
    /// `open`.
    pub auto_open: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self { auto_open: true }
    }
}
