//! Audit log entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Security-relevant action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A login completed successfully.
    LoginSucceeded,
    /// A login failed (bad password, disabled account).
    LoginFailed,
    /// A lockout threshold was crossed.
    LockoutTriggered,
    /// A refresh token was rotated.
    TokenRefreshed,
    /// A rotated-away refresh token was replayed; theft response ran.
    TokenReuseDetected,
    /// A single session was revoked.
    SessionRevoked,
    /// All of a subject's sessions were revoked in bulk.
    SessionsBulkRevoked,
    /// A user logged out.
    Logout,
    /// A password was changed by its owner.
    PasswordChanged,
    /// A password reset was requested.
    PasswordResetStarted,
    /// A password reset completed.
    PasswordResetCompleted,
    /// An access-token verification failed.
    VerificationFailed,
}

impl AuditAction {
    /// Return the action as a snake_case string (the stored form).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSucceeded => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::LockoutTriggered => "lockout_triggered",
            Self::TokenRefreshed => "token_refreshed",
            Self::TokenReuseDetected => "token_reuse_detected",
            Self::SessionRevoked => "session_revoked",
            Self::SessionsBulkRevoked => "sessions_bulk_revoked",
            Self::Logout => "logout",
            Self::PasswordChanged => "password_changed",
            Self::PasswordResetStarted => "password_reset_started",
            Self::PasswordResetCompleted => "password_reset_completed",
            Self::VerificationFailed => "verification_failed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An audit log row. Append-only; mutated by nothing, deleted only by the
/// retention sweeper.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEntry {
    /// Unique entry identifier.
    pub id: Uuid,
    /// The recorded action (stored as text).
    pub action: String,
    /// Subject credential, when known.
    pub user_id: Option<Uuid>,
    /// Subject email, when known (e.g. failed logins for unknown users).
    pub email: Option<String>,
    /// Origin IP address.
    pub ip_address: Option<String>,
    /// Origin User-Agent.
    pub user_agent: Option<String>,
    /// Free-form structured detail.
    pub detail: Option<serde_json::Value>,
    /// When the entry was recorded.
    pub created_at: DateTime<Utc>,
}

/// Data for appending a new audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEntry {
    /// The action to record.
    pub action: AuditAction,
    /// Subject credential, when known.
    pub user_id: Option<Uuid>,
    /// Subject email, when known.
    pub email: Option<String>,
    /// Origin IP address.
    pub ip_address: Option<String>,
    /// Origin User-Agent.
    pub user_agent: Option<String>,
    /// Free-form structured detail.
    pub detail: Option<serde_json::Value>,
}

impl NewAuditEntry {
    /// Convenience constructor for an action with no subject context.
    pub fn action(action: AuditAction) -> Self {
        Self {
            action,
            user_id: None,
            email: None,
            ip_address: None,
            user_agent: None,
            detail: None,
        }
    }
}
