//! Session entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::{RevokeReason, SessionStatus};

/// A session in the durable ledger.
///
/// Created at login; mutated on every refresh-token rotation and on status
/// change; physically deleted only by the retention sweeper once terminal
/// for longer than the retention window.
///
/// Invariant: while `status` is `Active`, `refresh_token_hash` holds exactly
/// one non-null hash of the session's current one-time refresh identifier.
/// The raw identifier is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    /// Unique, unguessable session identifier.
    pub id: Uuid,
    /// The credential this session belongs to.
    pub user_id: Uuid,
    /// SHA-256 hash of the current refresh token identifier (jti).
    pub refresh_token_hash: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Why the session was revoked, when `status` is `Revoked`.
    pub revoke_reason: Option<RevokeReason>,
    /// IP address from which the session was created.
    pub ip_address: Option<String>,
    /// User-Agent header value at login.
    pub user_agent: Option<String>,
    /// When the session was created (login time).
    pub created_at: DateTime<Utc>,
    /// Last time this session authenticated a request or rotated.
    pub last_seen_at: DateTime<Utc>,
    /// When the refresh token was last rotated.
    pub rotated_at: Option<DateTime<Utc>>,
    /// When the session was revoked.
    pub revoked_at: Option<DateTime<Utc>>,
    /// When the session expires (absolute lifetime).
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check whether the session can still authenticate.
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active && self.expires_at > Utc::now()
    }
}

/// Data required to create a new session.
///
/// The ID is generated by the caller before token issuance so the `sid`
/// claim inside the tokens and the ledger row always agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    /// Pre-generated session identifier.
    pub id: Uuid,
    /// The credential this session belongs to.
    pub user_id: Uuid,
    /// SHA-256 hash of the initial refresh token identifier.
    pub refresh_token_hash: String,
    /// IP address of the client.
    pub ip_address: Option<String>,
    /// User-Agent header.
    pub user_agent: Option<String>,
    /// When the session expires.
    pub expires_at: DateTime<Utc>,
}
