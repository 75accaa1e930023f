//! Error types for Strata.
//!
//! Every public operation rejects with an [`Error`]. Errors are `Clone` so a
//! single failure can reject every operation still pending in a transaction.

use crate::value::Value;
use alloc::format;
use alloc::string::String;
use core::fmt;
use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The operation that produced an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Put,
    Add,
    Update,
    Delete,
    BulkGet,
    BulkPut,
    BulkAdd,
    BulkDelete,
    Scan,
    Count,
    Modify,
    Clear,
    Migrate,
}

impl Operation {
    /// Returns true if the operation mutates a table.
    pub fn is_write(self) -> bool {
        !matches!(
            self,
            Operation::Get | Operation::BulkGet | Operation::Scan | Operation::Count
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Put => "put",
            Operation::Add => "add",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::BulkGet => "bulkGet",
            Operation::BulkPut => "bulkPut",
            Operation::BulkAdd => "bulkAdd",
            Operation::BulkDelete => "bulkDelete",
            Operation::Scan => "scan",
            Operation::Count => "count",
            Operation::Modify => "modify",
            Operation::Clear => "clear",
            Operation::Migrate => "migrate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for Strata operations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    /// A schema version was declared out of order.
    #[error("schema version {version} declared after version {latest}; versions must be strictly increasing")]
    SchemaOrder { version: u32, latest: u32 },

    /// A version needed by a migration was never declared.
    #[error("cannot migrate from version {from} to version {to}: version {missing} was never declared")]
    SchemaGap { from: u32, to: u32, missing: u32 },

    /// The requested version is lower than the installed one.
    #[error("requested version {requested} is lower than the installed version {installed}")]
    Version { requested: u32, installed: u32 },

    /// Key uniqueness, unique index or key resolution failure.
    #[error("{operation} on table {table} failed: {message}{}", describe_location(.key, .position))]
    Constraint {
        table: String,
        operation: Operation,
        key: Option<Value>,
        position: Option<usize>,
        message: String,
    },

    /// Record not found.
    #[error("key {key} not found in table {table}")]
    NotFound { table: String, key: Value },

    /// Malformed predicate.
    #[error("invalid query on {table}.{column}: {message}")]
    Query {
        table: String,
        column: String,
        message: String,
    },

    /// Invalid schema definition.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// Table is not part of the schema.
    #[error("table {name} is not declared")]
    InvalidTable { name: String },

    /// Index is not part of the table schema.
    #[error("index {index} not found on table {table}")]
    IndexNotFound { table: String, index: String },

    /// Argument is not a valid key.
    #[error("invalid key for {operation} on table {table}: {message}")]
    InvalidKey {
        table: String,
        operation: Operation,
        message: String,
    },

    /// Write attempted in a read-only transaction.
    #[error("{operation} on table {table} requires a read-write transaction")]
    ReadOnly { table: String, operation: Operation },

    /// Transaction has already finished.
    #[error("transaction {id} is {state}")]
    TransactionInactive { id: u64, state: String },

    /// Transaction was aborted.
    #[error("transaction aborted: {reason}")]
    Abort { reason: String },

    /// Database is closed.
    #[error("database {name} is closed")]
    DatabaseClosed { name: String },

    /// Operation not allowed in the current state.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// A chained step was cancelled before it started.
    #[error("operation cancelled")]
    Cancelled,

    /// Substrate failure.
    #[error("storage failure: {message}")]
    Storage { message: String },
}

fn describe_location(key: &Option<Value>, position: &Option<usize>) -> String {
    match (key, position) {
        (Some(key), Some(position)) => format!(" (key {}, item {})", key, position),
        (Some(key), None) => format!(" (key {})", key),
        (None, Some(position)) => format!(" (item {})", position),
        (None, None) => String::new(),
    }
}

/// Caller-visible error kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SchemaOrder,
    SchemaGap,
    Version,
    Constraint,
    NotFound,
    Query,
    InvalidSchema,
    InvalidTable,
    IndexNotFound,
    InvalidKey,
    ReadOnly,
    TransactionInactive,
    Abort,
    DatabaseClosed,
    InvalidState,
    Cancelled,
    Storage,
}

impl ErrorKind {
    /// Returns the name callers match on.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::SchemaOrder => "SchemaOrderError",
            ErrorKind::SchemaGap => "SchemaGapError",
            ErrorKind::Version => "VersionError",
            ErrorKind::Constraint => "ConstraintError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Query => "QueryError",
            ErrorKind::InvalidSchema => "SchemaError",
            ErrorKind::InvalidTable => "InvalidTableError",
            ErrorKind::IndexNotFound => "IndexNotFoundError",
            ErrorKind::InvalidKey => "DataError",
            ErrorKind::ReadOnly => "ReadOnlyError",
            ErrorKind::TransactionInactive => "TransactionInactiveError",
            ErrorKind::Abort => "AbortError",
            ErrorKind::DatabaseClosed => "DatabaseClosedError",
            ErrorKind::InvalidState => "InvalidStateError",
            ErrorKind::Cancelled => "CancelledError",
            ErrorKind::Storage => "StorageError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SchemaOrder { .. } => ErrorKind::SchemaOrder,
            Error::SchemaGap { .. } => ErrorKind::SchemaGap,
            Error::Version { .. } => ErrorKind::Version,
            Error::Constraint { .. } => ErrorKind::Constraint,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Query { .. } => ErrorKind::Query,
            Error::InvalidSchema { .. } => ErrorKind::InvalidSchema,
            Error::InvalidTable { .. } => ErrorKind::InvalidTable,
            Error::IndexNotFound { .. } => ErrorKind::IndexNotFound,
            Error::InvalidKey { .. } => ErrorKind::InvalidKey,
            Error::ReadOnly { .. } => ErrorKind::ReadOnly,
            Error::TransactionInactive { .. } => ErrorKind::TransactionInactive,
            Error::Abort { .. } => ErrorKind::Abort,
            Error::DatabaseClosed { .. } => ErrorKind::DatabaseClosed,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Creates a constraint error.
    pub fn constraint(
        table: impl Into<String>,
        operation: Operation,
        key: Option<Value>,
        message: impl Into<String>,
    ) -> Self {
        Error::Constraint {
            table: table.into(),
            operation,
            key,
            position: None,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(table: impl Into<String>, key: Value) -> Self {
        Error::NotFound {
            table: table.into(),
            key,
        }
    }

    /// Creates a query error.
    pub fn query(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Query {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid table error.
    pub fn invalid_table(name: impl Into<String>) -> Self {
        Error::InvalidTable { name: name.into() }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(
        table: impl Into<String>,
        operation: Operation,
        message: impl Into<String>,
    ) -> Self {
        Error::InvalidKey {
            table: table.into(),
            operation,
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Attaches a bulk position to a constraint error.
    ///
    /// Other errors are returned unchanged.
    pub fn at_position(self, index: usize) -> Self {
        match self {
            Error::Constraint {
                table,
                operation,
                key,
                message,
                ..
            } => Error::Constraint {
                table,
                operation,
                key,
                position: Some(index),
                message,
            },
            other => other,
        }
    }

    /// Replaces the operation recorded on a constraint error.
    pub fn during(self, operation: Operation) -> Self {
        match self {
            Error::Constraint {
                table,
                key,
                position,
                message,
                ..
            } => Error::Constraint {
                table,
                operation,
                key,
                position,
                message,
            },
            other => other,
        }
    }

    /// Returns the bulk position of a constraint error, if any.
    pub fn position(&self) -> Option<usize> {
        match self {
            Error::Constraint { position, .. } => *position,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::constraint("users", Operation::Put, Some(Value::Int64(7)), "duplicate key");
        let msg = err.to_string();
        assert!(msg.contains("put on table users"));
        assert!(msg.contains("key 7"));

        let err = Error::invalid_table("users");
        assert!(err.to_string().contains("users"));

        let err = Error::SchemaGap {
            from: 1,
            to: 3,
            missing: 2,
        };
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn test_at_position() {
        let err = Error::constraint("users", Operation::BulkPut, None, "bad record").at_position(3);
        assert_eq!(err.position(), Some(3));
        assert!(err.to_string().contains("item 3"));

        let err = Error::Cancelled.at_position(3);
        assert_eq!(err, Error::Cancelled);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Error::Version { requested: 1, installed: 2 }.kind().name(), "VersionError");
        assert_eq!(
            Error::constraint("t", Operation::Add, None, "x").kind(),
            ErrorKind::Constraint
        );
        assert_eq!(Error::query("t", "c", "x").kind().to_string(), "QueryError");
    }

    #[test]
    fn test_operation_is_write() {
        assert!(Operation::Put.is_write());
        assert!(Operation::Modify.is_write());
        assert!(!Operation::Get.is_write());
        assert!(!Operation::Count.is_write());
    }
}
