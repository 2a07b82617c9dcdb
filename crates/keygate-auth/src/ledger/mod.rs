//! The durable session ledger seam.
//!
//! The lifecycle manager talks to persistence through [`SessionLedger`]
//! so that tests can substitute an in-memory implementation with the same
//! conditional-rotation semantics. Each trait method is one logical
//! request's worth of durable work: the Postgres implementation runs every
//! method inside exactly one unit of work.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use keygate_core::result::AppResult;
use keygate_entity::credential::Credential;
use keygate_entity::session::{NewSession, RevokeReason, Session};

pub use postgres::PgSessionLedger;

/// Durable state operations needed by the session lifecycle.
#[async_trait]
pub trait SessionLedger: Send + Sync + std::fmt::Debug {
    /// Look up a credential by email.
    async fn find_credential_by_email(&self, email: &str) -> AppResult<Option<Credential>>;

    /// Look up a credential by ID.
    async fn find_credential_by_id(&self, id: Uuid) -> AppResult<Option<Credential>>;

    /// Persist a new active session.
    async fn create_session(&self, data: NewSession) -> AppResult<Session>;

    /// Look up a session by ID.
    async fn find_session(&self, id: Uuid) -> AppResult<Option<Session>>;

    /// Conditionally replace the current refresh hash (rotation). Returns
    /// `None` when no row matched (stale hash, wrong owner, terminal status,
    /// or missing session); the caller classifies via [`Self::find_session`].
    async fn rotate_refresh(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> AppResult<Option<Session>>;

    /// Record request activity on a session.
    async fn touch_last_seen(&self, session_id: Uuid) -> AppResult<()>;

    /// Transition a session to revoked. Returns `false` when it was already
    /// terminal.
    async fn revoke_session(&self, session_id: Uuid, reason: RevokeReason) -> AppResult<bool>;

    /// Revoke every active session of a user, optionally sparing one.
    /// Returns the revoked session IDs.
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevokeReason,
        except: Option<Uuid>,
    ) -> AppResult<Vec<Uuid>>;

    /// Replace a credential's password hash.
    async fn update_password(&self, user_id: Uuid, new_hash: &str) -> AppResult<bool>;

    /// Store a hashed password-reset token.
    async fn create_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Atomically consume a reset token, set the new password hash, and
    /// revoke the user's sessions. Returns the affected user and the revoked
    /// session IDs, or `None` when the token is unknown, consumed, or
    /// expired. Must not leave a half-applied state on failure.
    async fn consume_reset_token_and_set_password(
        &self,
        token_hash: &str,
        new_password_hash: &str,
    ) -> AppResult<Option<(Uuid, Vec<Uuid>)>>;
}

/// Hash an opaque single-use token (e.g. a password-reset token) for
/// storage. Only the hash ever reaches the ledger.
pub fn hash_opaque_token(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
