//! Credential entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered user identity.
///
/// Credentials are never hard-deleted; accounts are soft-disabled so that
/// sessions, audit entries, and reset tokens keep a valid owner.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Credential {
    /// Unique credential identifier.
    pub id: Uuid,
    /// Unique email address (login name).
    pub email: String,
    /// Argon2id password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Opaque role claim carried into issued tokens.
    pub role: String,
    /// Whether the account has been soft-disabled.
    pub disabled: bool,
    /// When the credential was created.
    pub created_at: DateTime<Utc>,
    /// When the credential was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Check whether this credential can currently authenticate.
    pub fn can_login(&self) -> bool {
        !self.disabled
    }
}

/// Data required to create a new credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCredential {
    /// Email address.
    pub email: String,
    /// Pre-hashed password.
    pub password_hash: String,
    /// Assigned role.
    pub role: String,
}
