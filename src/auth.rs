//! Credential management and axum extractors for API-key and
//! master-token authentication. Grounded on `examples/original_source/api_auth.py`
//! and `examples/original_source/middleware.py`; the extraction/verification
//! split mirrors the teacher's `AuthInterceptor::authenticate` in
//! `tasker-orchestration/src/grpc/interceptors/auth.rs`.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use subtle::ConstantTimeEq as _;

use crate::error::{auth_messages, CoreError};
use crate::models::ApiKey;
use crate::store::{ApiKeyRepository, MasterTokenRepository};

/// Issues and verifies API keys and the master token. All verification
/// is constant-time to avoid timing side-channels on secret comparison.
#[derive(Debug, Clone)]
pub struct KeyManager {
    api_keys: ApiKeyRepository,
    master_tokens: MasterTokenRepository,
}

impl KeyManager {
    pub fn new(pool: PgPool) -> Self {
        Self {
            api_keys: ApiKeyRepository::new(pool.clone()),
            master_tokens: MasterTokenRepository::new(pool),
        }
    }

    /// Generates a 256-bit, URL-safe-encoded secret. Used for both API
    /// keys and the master token.
    fn generate_secret() -> String {
        let mut bytes = [0u8; 32];
        for b in bytes.iter_mut() {
            *b = fastrand::u8(..);
        }
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Creates the master token on first startup if none exists yet.
    /// Rotation is additive: this never overwrites an existing token.
    pub async fn ensure_master_token(&self) -> Result<String, CoreError> {
        if let Some(existing) = self
            .master_tokens
            .latest()
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
        {
            return Ok(existing.token);
        }

        let token = Self::generate_secret();
        self.master_tokens
            .insert(&token)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        tracing::info!("generated new master token; save it, it will not be shown again");
        Ok(token)
    }

    pub async fn generate_api_key(&self, client_name: &str) -> Result<String, CoreError> {
        let key = Self::generate_secret();
        self.api_keys
            .create(&key, client_name, None)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(key)
    }

    pub async fn delete_api_key(&self, key: &str) -> Result<(), CoreError> {
        self.api_keys
            .delete(key)
            .await
            .map_err(|_| CoreError::NotFound(format!("api key {key}")))
    }

    pub async fn list_api_keys(&self) -> Result<Vec<ApiKey>, CoreError> {
        self.api_keys
            .list_all()
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    pub async fn key_details(&self, key: &str) -> Result<Option<ApiKey>, CoreError> {
        self.api_keys
            .get(key)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    pub async fn update_notes(&self, key: &str, notes: Option<&str>) -> Result<ApiKey, CoreError> {
        self.api_keys
            .update_notes(key, notes)
            .await
            .map_err(|_| CoreError::NotFound(format!("api key {key}")))
    }

    pub async fn toggle_active(&self, key: &str) -> Result<ApiKey, CoreError> {
        let current = self
            .api_keys
            .get(key)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
            .ok_or_else(|| CoreError::NotFound(format!("api key {key}")))?;
        self.api_keys
            .set_active(key, !current.active)
            .await
            .map_err(|_| CoreError::NotFound(format!("api key {key}")))
    }

    /// Constant-time verification that `key` is a known, active API key.
    async fn verify_api_key(&self, key: &str) -> Result<bool, CoreError> {
        let Some(row) = self
            .api_keys
            .get(key)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
        else {
            return Ok(false);
        };
        Ok(row.active && constant_time_eq(&row.key, key))
    }

    async fn verify_master_token(&self, token: &str) -> Result<bool, CoreError> {
        let Some(stored) = self
            .master_tokens
            .latest()
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
        else {
            return Ok(false);
        };
        Ok(constant_time_eq(&stored.token, token))
    }

    /// Best-effort usage logging; failures here must never fail the
    /// request they're attached to.
    pub async fn log_usage(&self, key: &str, success: bool, processing_time_seconds: f64) {
        if let Err(e) = self
            .api_keys
            .log_usage(key, success, processing_time_seconds)
            .await
        {
            tracing::warn!(error = %e, "failed to log api key usage");
        }
    }
}

/// Compares two secrets by their SHA-256 digests in constant time, so
/// neither the comparison time nor a length leak reveals how much of a
/// guessed secret matched.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let digest_a = Sha256::digest(a.as_bytes());
    let digest_b = Sha256::digest(b.as_bytes());
    bool::from(digest_a.ct_eq(&digest_b))
}

fn extract_bearer(parts: &Parts) -> Result<&str, CoreError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(CoreError::Auth(auth_messages::MISSING_TOKEN))?;
    let header = header
        .to_str()
        .map_err(|_| CoreError::Auth(auth_messages::INVALID_FORMAT))?;
    header
        .strip_prefix("Bearer ")
        .ok_or(CoreError::Auth(auth_messages::INVALID_FORMAT))
}

/// Extractor requiring a valid API key in `Authorization: Bearer`.
/// Resolves to the verified key string so handlers can attribute the
/// request without a second lookup.
pub struct RequireApiKey(pub String);

impl<S> FromRequestParts<S> for RequireApiKey
where
    KeyManager: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let key_manager = KeyManager::from_ref(state);
        let key = extract_bearer(parts)?.to_string();
        if !key_manager.verify_api_key(&key).await? {
            return Err(CoreError::Auth(auth_messages::INVALID_API_KEY));
        }
        Ok(RequireApiKey(key))
    }
}

/// Extractor requiring the master token in `Authorization: Bearer`, for
/// admin endpoints reachable from a trusted operator client.
pub struct RequireMasterToken;

impl<S> FromRequestParts<S> for RequireMasterToken
where
    KeyManager: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let key_manager = KeyManager::from_ref(state);
        let token = extract_bearer(parts)?;
        if !key_manager.verify_master_token(token).await? {
            return Err(CoreError::Auth(auth_messages::INVALID_MASTER_TOKEN));
        }
        Ok(RequireMasterToken)
    }
}

/// Extractor requiring the master token as a `?master_token=` query
/// parameter, for admin surfaces linked from a browser (where setting a
/// bearer header is awkward).
pub struct RequireMasterTokenQuery;

impl<S> FromRequestParts<S> for RequireMasterTokenQuery
where
    KeyManager: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let key_manager = KeyManager::from_ref(state);
        let query = parts.uri.query().unwrap_or("");
        let token = form_urlencoded_lookup(query, "master_token")
            .ok_or(CoreError::Auth(auth_messages::MISSING_MASTER_TOKEN_QUERY))?;
        if !key_manager.verify_master_token(&token).await? {
            return Err(CoreError::Auth(auth_messages::INVALID_MASTER_TOKEN));
        }
        Ok(RequireMasterTokenQuery)
    }
}

fn form_urlencoded_lookup(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == name {
            Some(v.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("abc123", "abc123"));
    }

    #[test]
    fn constant_time_eq_rejects_different_strings() {
        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("abc123", "abc12"));
    }

    #[test]
    fn query_lookup_finds_value_among_other_params() {
        assert_eq!(
            form_urlencoded_lookup("foo=1&master_token=xyz&bar=2", "master_token"),
            Some("xyz".to_string())
        );
        assert_eq!(form_urlencoded_lookup("foo=1", "master_token"), None);
    }
}
