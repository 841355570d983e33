use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Per-tenant credential with usage statistics.
///
/// Invariant: `total_requests == successful_requests + failed_requests`
/// for the lifetime of the key; all counters are monotonically
/// non-decreasing and mutated only through [`crate::store::ApiKeyRepository::log_usage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ApiKey {
    pub key: String,
    pub client_name: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub last_used: Option<DateTime<Utc>>,
    pub total_requests: i64,
    pub successful_requests: i64,
    pub failed_requests: i64,
    pub total_processing_time_seconds: f64,
    pub notes: Option<String>,
}

impl ApiKey {
    pub fn average_processing_time_seconds(&self) -> f64 {
        if self.total_requests > 0 {
            self.total_processing_time_seconds / self.total_requests as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ApiKey {
        ApiKey {
            key: "k".into(),
            client_name: "acme".into(),
            created_at: Utc::now(),
            active: true,
            last_used: None,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            total_processing_time_seconds: 0.0,
            notes: None,
        }
    }

    #[test]
    fn average_is_zero_with_no_requests() {
        assert_eq!(sample().average_processing_time_seconds(), 0.0);
    }

    #[test]
    fn average_divides_by_total_requests() {
        let mut key = sample();
        key.total_requests = 4;
        key.total_processing_time_seconds = 10.0;
        assert_eq!(key.average_processing_time_seconds(), 2.5);
    }
}
