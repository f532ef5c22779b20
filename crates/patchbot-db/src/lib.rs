//! Submission store for patchbot.
//!
//! Provides repository traits, PostgreSQL implementations, and an in-memory
//! implementation with the same selection semantics.

pub mod error;
pub mod repo;

pub use error::{DbError, DbResult};
pub use repo::*;
pub use sqlx::PgPool;

use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
