//! API key repository. Grounded on
//! `examples/original_source/app/db/repositories/api_keys.py`.

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;

use crate::models::ApiKey;

#[derive(Debug, Error)]
pub enum ApiKeyStoreError {
    #[error("api key not found")]
    NotFound,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct ApiKeyRepository {
    pool: PgPool,
}

impl ApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        key: &str,
        client_name: &str,
        notes: Option<&str>,
    ) -> Result<ApiKey, ApiKeyStoreError> {
        let row = sqlx::query_as::<_, ApiKey>(
            "INSERT INTO api_keys (key, client_name, notes) VALUES ($1, $2, $3) \
             RETURNING key, client_name, created_at, active, last_used, total_requests, \
                       successful_requests, failed_requests, total_processing_time_seconds, notes",
        )
        .bind(key)
        .bind(client_name)
        .bind(notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, key: &str) -> Result<Option<ApiKey>, ApiKeyStoreError> {
        let row = sqlx::query_as::<_, ApiKey>(
            "SELECT key, client_name, created_at, active, last_used, total_requests, \
                    successful_requests, failed_requests, total_processing_time_seconds, notes \
             FROM api_keys WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_all(&self) -> Result<Vec<ApiKey>, ApiKeyStoreError> {
        let rows = sqlx::query_as::<_, ApiKey>(
            "SELECT key, client_name, created_at, active, last_used, total_requests, \
                    successful_requests, failed_requests, total_processing_time_seconds, notes \
             FROM api_keys ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn set_active(&self, key: &str, active: bool) -> Result<ApiKey, ApiKeyStoreError> {
        let result = sqlx::query("UPDATE api_keys SET active = $2 WHERE key = $1")
            .bind(key)
            .bind(active)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiKeyStoreError::NotFound);
        }
        self.get(key).await?.ok_or(ApiKeyStoreError::NotFound)
    }

    pub async fn update_notes(
        &self,
        key: &str,
        notes: Option<&str>,
    ) -> Result<ApiKey, ApiKeyStoreError> {
        let result = sqlx::query("UPDATE api_keys SET notes = $2 WHERE key = $1")
            .bind(key)
            .bind(notes)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiKeyStoreError::NotFound);
        }
        self.get(key).await?.ok_or(ApiKeyStoreError::NotFound)
    }

    pub async fn delete(&self, key: &str) -> Result<(), ApiKeyStoreError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiKeyStoreError::NotFound);
        }
        Ok(())
    }

    /// Atomic single-statement counter bump, avoiding a read-modify-write
    /// race between concurrent task completions for the same key.
    pub async fn log_usage(
        &self,
        key: &str,
        success: bool,
        processing_time_seconds: f64,
    ) -> Result<(), ApiKeyStoreError> {
        let (success_delta, failed_delta): (i64, i64) = if success { (1, 0) } else { (0, 1) };

        sqlx::query(
            "UPDATE api_keys SET \
                total_requests = total_requests + 1, \
                successful_requests = successful_requests + $2, \
                failed_requests = failed_requests + $3, \
                total_processing_time_seconds = total_processing_time_seconds + $4, \
                last_used = $5 \
             WHERE key = $1",
        )
        .bind(key)
        .bind(success_delta)
        .bind(failed_delta)
        .bind(processing_time_seconds)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_deltas_are_mutually_exclusive() {
        let (s, f) = if true { (1i64, 0i64) } else { (0, 1) };
        assert_eq!(s + f, 1);
    }
}
