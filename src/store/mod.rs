//! Transactional, Postgres-backed store for all persistent entities.
//! See `SPEC_FULL.md` §4.1. Repositories take a `&PgPool` directly;
//! sqlx's pool already hands out pooled connections per-query, so no
//! additional connection-scoping wrapper is needed.

mod api_keys;
mod master_token;
mod tasks;

pub use api_keys::ApiKeyRepository;
pub use master_token::MasterTokenRepository;
pub use tasks::{PaginatedTasks, TaskRepository};

use sqlx::PgPool;

/// Shared migrator, referenced both at startup (via [`migrate`]) and by
/// `#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]` in
/// integration tests so tests run against the same schema as the
/// running service.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Runs pending migrations against `pool`. Call once at startup before
/// serving traffic.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Startup recovery sweep (spec.md §7): any task still `processing`
/// after a crash is an interrupted artifact, not a live worker. Moves
/// it to `failed` with a stable reason and returns the number of rows
/// affected.
pub async fn recover_interrupted_tasks(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET status = 'failed', error_message = 'interrupted', completed_at = now() \
         WHERE status = 'processing'",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
