//! Password-reset token entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A one-time password-reset token.
///
/// Only the hash of the emailed token is stored. Consumed and expired rows
/// are purged by the retention sweeper.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PasswordResetToken {
    /// Unique token identifier.
    pub id: Uuid,
    /// The credential this token resets.
    pub user_id: Uuid,
    /// SHA-256 hash of the raw token.
    pub token_hash: String,
    /// When the token was issued.
    pub created_at: DateTime<Utc>,
    /// When the token stops being acceptable.
    pub expires_at: DateTime<Utc>,
    /// When the token was consumed, if it has been.
    pub consumed_at: Option<DateTime<Utc>>,
}

impl PasswordResetToken {
    /// Check whether this token can still be consumed.
    pub fn is_usable(&self) -> bool {
        self.consumed_at.is_none() && self.expires_at > Utc::now()
    }
}
