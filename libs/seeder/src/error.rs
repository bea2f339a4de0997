use std::path::PathBuf;
use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, SeedError>;

/// Fatal errors that abort a load. Whatever was written inside the open
/// transaction rolls back when one of these surfaces.
#[derive(Debug, Error)]
pub enum SeedError {
    /// Opening a connection or beginning a transaction failed.
    #[error("database connection failed: {0}")]
    Connection(#[from] db::DbError),

    /// DDL for the target table failed.
    #[error("schema setup failed: {0}")]
    Schema(#[source] sqlx::Error),

    /// Reading the source file failed.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV stream broke at a structural level (I/O mid-file, bad header).
    #[error("CSV input unreadable: {0}")]
    Csv(#[from] csv::Error),

    /// A statement against the database failed.
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// The final commit failed; nothing was persisted.
    #[error("transaction commit failed: {0}")]
    Commit(#[source] db::DbError),
}

/// Problems with a single CSV row. These skip the row rather than abort
/// the load.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("age `{value}` is not a whole number")]
    InvalidAge { value: String },
}

impl RowError {
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    pub fn invalid_age(value: impl Into<String>) -> Self {
        Self::InvalidAge {
            value: value.into(),
        }
    }
}
