//! Master token repository. Grounded on
//! `examples/original_source/app/db/repositories` master-token handling
//! referenced from `api_auth.py`.

use sqlx::PgPool;
use thiserror::Error;

use crate::models::MasterToken;

#[derive(Debug, Error)]
pub enum MasterTokenStoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct MasterTokenRepository {
    pool: PgPool,
}

impl MasterTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recently issued master token, if any has ever been created.
    pub async fn latest(&self) -> Result<Option<MasterToken>, MasterTokenStoreError> {
        let row = sqlx::query_as::<_, MasterToken>(
            "SELECT token, created_at FROM master_tokens ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert(&self, token: &str) -> Result<MasterToken, MasterTokenStoreError> {
        let row = sqlx::query_as::<_, MasterToken>(
            "INSERT INTO master_tokens (token) VALUES ($1) RETURNING token, created_at",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// True if `token` matches any row ever issued. Rotation is additive
    /// (see [`crate::models::MasterToken`]), so old tokens keep working.
    pub async fn exists(&self, token: &str) -> Result<bool, MasterTokenStoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM master_tokens WHERE token = $1")
                .bind(token)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }
}
