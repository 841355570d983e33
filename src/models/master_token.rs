use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An operator-only secret guarding administrative endpoints. Rotation
/// is additive: issuing a new token does not invalidate older rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MasterToken {
    pub token: String,
    pub created_at: DateTime<Utc>,
}
