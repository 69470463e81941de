//! Storage errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("Query error: {0}")]
    Query(#[source] sqlx::Error),

    /// A stored JSON column failed to decode into its domain shape,
    /// e.g. a weights array of the wrong arity.
    #[error("Row decode error: {0}")]
    Decode(String),
}
