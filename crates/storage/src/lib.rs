//! Storage layer for the CodeTop practice backend.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod card_repository;
pub mod error;
pub mod idempotency_repository;
pub mod parameter_repository;
pub mod problem_repository;

pub use card_repository::{PgCardRepository, PgReviewLogRepository};
pub use error::StorageError;
pub use idempotency_repository::PgIdempotencyRepository;
pub use parameter_repository::PgParameterRepository;
pub use problem_repository::PgProblemRepository;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(StorageError::Connection)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(StorageError::Migration)
}

/// Check database connectivity.
pub async fn check_connection(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(StorageError::Query)?;
    Ok(())
}
