//! Session lifecycle manager — login, rotation, reuse detection, revocation.
//!
//! State machine per session: **active** → **revoked** | **expired**, both
//! terminal. All durable transitions are expressed as conditional updates in
//! the ledger, so they stay correct under concurrent requests; this module
//! sequences them and owns the theft response.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use keygate_core::config::session::SessionConfig;
use keygate_core::error::{AppError, ErrorKind};
use keygate_core::result::AppResult;
use keygate_entity::audit::{AuditAction, NewAuditEntry};
use keygate_entity::session::{NewSession, RevokeReason, Session, SessionStatus};
use keygate_token::{TokenIssuer, TokenKind, TokenSet, TokenVerifier, hash_jti};

use crate::audit::AuditSink;
use crate::ledger::{SessionLedger, hash_opaque_token};
use crate::lockout::{LockoutGuard, LockoutStatus};
use crate::password::{PasswordHasher, PasswordPolicy};
use crate::validation::{SessionContext, ValidationCache};

/// Transport-level request context supplied by the routing layer.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    /// Client IP address, when known.
    pub ip: Option<String>,
    /// Client User-Agent, when known.
    pub user_agent: Option<String>,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The created session.
    pub session: Session,
    /// The issued access/refresh/identity triple.
    pub tokens: TokenSet,
}

/// Manages the complete session lifecycle.
pub struct SessionLifecycle {
    /// Durable session ledger.
    ledger: Arc<dyn SessionLedger>,
    /// Token signing.
    issuer: Arc<TokenIssuer>,
    /// Token verification.
    verifier: Arc<TokenVerifier>,
    /// Password hashing.
    hasher: Arc<PasswordHasher>,
    /// Password strength predicate.
    policy: Arc<dyn PasswordPolicy>,
    /// Brute-force throttle.
    lockout: Arc<LockoutGuard>,
    /// Verification result cache.
    validation: Arc<ValidationCache>,
    /// Security event sink.
    audit: Arc<dyn AuditSink>,
    /// Session configuration.
    config: SessionConfig,
}

impl std::fmt::Debug for SessionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycle")
            .field("config", &self.config)
            .finish()
    }
}

impl SessionLifecycle {
    /// Creates a new lifecycle manager with all required collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn SessionLedger>,
        issuer: Arc<TokenIssuer>,
        verifier: Arc<TokenVerifier>,
        hasher: Arc<PasswordHasher>,
        policy: Arc<dyn PasswordPolicy>,
        lockout: Arc<LockoutGuard>,
        validation: Arc<ValidationCache>,
        audit: Arc<dyn AuditSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            ledger,
            issuer,
            verifier,
            hasher,
            policy,
            lockout,
            validation,
            audit,
            config,
        }
    }

    /// Performs the complete login flow:
    ///
    /// 1. Reject if either lockout scope is locked
    /// 2. Fetch the credential; unknown and disabled accounts burn an
    ///    attempt exactly like a wrong password
    /// 3. Verify the password
    /// 4. Clear the email lockout scope (never the IP scope)
    /// 5. Create the session with the hashed refresh identifier
    /// 6. Issue the access/refresh/identity triple
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        origin: &RequestOrigin,
    ) -> AppResult<LoginOutcome> {
        if let LockoutStatus::Locked {
            scope,
            retry_after_seconds,
        } = self.lockout.check(email, origin.ip.as_deref()).await
        {
            info!(scope = %scope, "Login rejected by lockout");
            return Err(AppError::account_locked(format!(
                "Too many failed attempts; retry in {retry_after_seconds}s"
            )));
        }

        let credential = match self.ledger.find_credential_by_email(email).await? {
            Some(credential) if credential.can_login() => credential,
            Some(credential) => {
                self.note_login_failure(email, Some(credential.id), "disabled", origin)
                    .await;
                return Err(AppError::invalid_credentials());
            }
            None => {
                self.note_login_failure(email, None, "unknown_email", origin)
                    .await;
                return Err(AppError::invalid_credentials());
            }
        };

        if !self
            .hasher
            .verify_password(password, &credential.password_hash)?
        {
            self.note_login_failure(email, Some(credential.id), "wrong_password", origin)
                .await;
            return Err(AppError::invalid_credentials());
        }

        self.lockout.clear_on_success(email).await;

        // The session ID is fixed before issuance so the sid claim and the
        // ledger row always agree.
        let session_id = Uuid::new_v4();
        let tokens = self
            .issuer
            .issue_login_set(credential.id, session_id, &credential.role)?;

        let session = self
            .ledger
            .create_session(NewSession {
                id: session_id,
                user_id: credential.id,
                refresh_token_hash: hash_jti(&tokens.refresh_jti),
                ip_address: origin.ip.clone(),
                user_agent: origin.user_agent.clone(),
                expires_at: Utc::now() + Duration::days(self.config.absolute_ttl_days as i64),
            })
            .await?;

        info!(user_id = %credential.id, session_id = %session_id, "Login successful");
        self.audit
            .record(NewAuditEntry {
                action: AuditAction::LoginSucceeded,
                user_id: Some(credential.id),
                email: Some(credential.email.clone()),
                ip_address: origin.ip.clone(),
                user_agent: origin.user_agent.clone(),
                detail: Some(json!({ "session_id": session_id })),
            })
            .await;

        Ok(LoginOutcome { session, tokens })
    }

    /// Rotates a refresh token, detecting replay of rotated-away tokens.
    ///
    /// Exactly one of two concurrent rotations with the same token wins at
    /// the ledger; the loser re-reads the session and classifies the
    /// failure. A replayed identifier against a live session is the theft
    /// signal and revokes every session the subject owns.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        origin: &RequestOrigin,
    ) -> AppResult<TokenSet> {
        let claims = self.verifier.verify(refresh_token, TokenKind::Refresh)?;
        let jti = claims.jti.ok_or_else(|| {
            AppError::new(ErrorKind::TokenMalformed, "Refresh token lacks a rotation id")
        })?;
        let presented_hash = hash_jti(&jti);

        // Re-read the credential: the role may have changed, and a disabled
        // account must not keep rotating.
        let credential = self
            .ledger
            .find_credential_by_id(claims.sub)
            .await?
            .filter(|credential| credential.can_login())
            .ok_or_else(|| AppError::session_not_found("Session is no longer active"))?;

        let tokens = self
            .issuer
            .issue_rotation_set(claims.sub, claims.sid, &credential.role)?;
        let new_hash = hash_jti(&tokens.refresh_jti);

        let rotated = self
            .ledger
            .rotate_refresh(claims.sid, claims.sub, &presented_hash, &new_hash)
            .await?;

        match rotated {
            Some(_) => {
                // A cached verification may carry the stale role snapshot.
                self.validation.invalidate(claims.sid).await;
                self.audit
                    .record(NewAuditEntry {
                        action: AuditAction::TokenRefreshed,
                        user_id: Some(claims.sub),
                        email: Some(credential.email),
                        ip_address: origin.ip.clone(),
                        user_agent: origin.user_agent.clone(),
                        detail: Some(json!({ "session_id": claims.sid })),
                    })
                    .await;
                Ok(tokens)
            }
            None => {
                self.classify_failed_rotation(claims.sub, claims.sid, &presented_hash, origin)
                    .await
            }
        }
    }

    /// Classify a rotation that matched no ledger row.
    ///
    /// "Session never existed" and "session exists with a different current
    /// identifier" must be distinguished here: only the latter is theft.
    async fn classify_failed_rotation(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        presented_hash: &str,
        origin: &RequestOrigin,
    ) -> AppResult<TokenSet> {
        let Some(session) = self.ledger.find_session(session_id).await? else {
            return Err(AppError::session_not_found("Unknown session"));
        };

        if session.user_id != user_id {
            return Err(AppError::session_user_mismatch("Session owner mismatch"));
        }

        match session.status {
            SessionStatus::Active if session.refresh_token_hash != presented_hash => {
                // A rotated-away identifier replayed against a live session:
                // assume theft and revoke everything the subject owns.
                warn!(
                    user_id = %user_id,
                    session_id = %session_id,
                    "Refresh token reuse detected, revoking all sessions"
                );
                let revoked = self
                    .ledger
                    .revoke_all_for_user(user_id, RevokeReason::TokenReuse, None)
                    .await?;
                self.validation.invalidate_sessions(&revoked).await;
                self.audit
                    .record(NewAuditEntry {
                        action: AuditAction::TokenReuseDetected,
                        user_id: Some(user_id),
                        email: None,
                        ip_address: origin.ip.clone(),
                        user_agent: origin.user_agent.clone(),
                        detail: Some(json!({
                            "session_id": session_id,
                            "sessions_revoked": revoked.len(),
                        })),
                    })
                    .await;
                Err(AppError::token_reuse("Refresh token reuse detected"))
            }
            // The identifier is still current yet the update matched
            // nothing; surface it rather than silently retrying.
            SessionStatus::Active => Err(AppError::internal("Refresh rotation failed unexpectedly")),
            // Terminal session: the theft response (if any) already ran.
            _ => Err(AppError::session_not_found("Session is no longer active")),
        }
    }

    /// Authenticates a resource request from its bearer access token.
    ///
    /// Fast path through the validation cache; ledger fallback on miss or
    /// cache outage. Failures are audited, successes are not.
    pub async fn authenticate(
        &self,
        access_token: &str,
        origin: &RequestOrigin,
    ) -> AppResult<SessionContext> {
        let claims = match self.verifier.verify(access_token, TokenKind::Access) {
            Ok(claims) => claims,
            Err(err) => {
                self.note_verification_failure(None, &err, origin).await;
                return Err(err);
            }
        };

        let ledger = Arc::clone(&self.ledger);
        let user_id = claims.sub;
        let session_id = claims.sid;
        let result = self
            .validation
            .get_or_verify(session_id, move || async move {
                let session = ledger
                    .find_session(session_id)
                    .await?
                    .ok_or_else(|| AppError::session_not_found("Unknown session"))?;
                if session.user_id != user_id {
                    return Err(AppError::session_user_mismatch("Session owner mismatch"));
                }
                if !session.is_active() {
                    return Err(AppError::session_not_found("Session is no longer active"));
                }
                let credential = ledger
                    .find_credential_by_id(user_id)
                    .await?
                    .filter(|credential| credential.can_login())
                    .ok_or_else(|| AppError::session_not_found("Session is no longer active"))?;
                ledger.touch_last_seen(session_id).await?;
                Ok(SessionContext {
                    user_id,
                    session_id,
                    email: credential.email,
                    role: credential.role,
                })
            })
            .await;

        if let Err(err) = &result {
            self.note_verification_failure(Some(user_id), err, origin).await;
        }
        result
    }

    /// Transitions a session to revoked with reason `logout`. Idempotent:
    /// a second logout of the same session succeeds without a transition.
    pub async fn logout(&self, session_id: Uuid, origin: &RequestOrigin) -> AppResult<()> {
        let newly_revoked = self
            .ledger
            .revoke_session(session_id, RevokeReason::Logout)
            .await?;
        self.validation.invalidate(session_id).await;

        if newly_revoked {
            self.audit
                .record(NewAuditEntry {
                    action: AuditAction::Logout,
                    user_id: None,
                    email: None,
                    ip_address: origin.ip.clone(),
                    user_agent: origin.user_agent.clone(),
                    detail: Some(json!({ "session_id": session_id })),
                })
                .await;
        }
        Ok(())
    }

    /// Revokes every active session a subject owns, optionally sparing one.
    /// Returns the number of sessions revoked.
    pub async fn revoke_all(
        &self,
        user_id: Uuid,
        reason: RevokeReason,
        except: Option<Uuid>,
        origin: &RequestOrigin,
    ) -> AppResult<u64> {
        let revoked = self
            .ledger
            .revoke_all_for_user(user_id, reason, except)
            .await?;
        self.validation.invalidate_sessions(&revoked).await;

        self.audit
            .record(NewAuditEntry {
                action: AuditAction::SessionsBulkRevoked,
                user_id: Some(user_id),
                email: None,
                ip_address: origin.ip.clone(),
                user_agent: origin.user_agent.clone(),
                detail: Some(json!({
                    "reason": reason.as_str(),
                    "sessions_revoked": revoked.len(),
                })),
            })
            .await;

        Ok(revoked.len() as u64)
    }

    /// Changes a password after re-verifying the current one, revoking every
    /// other session of the subject.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        keep_session: Option<Uuid>,
        origin: &RequestOrigin,
    ) -> AppResult<()> {
        let credential = self
            .ledger
            .find_credential_by_id(user_id)
            .await?
            .filter(|credential| credential.can_login())
            .ok_or_else(AppError::invalid_credentials)?;

        if !self
            .hasher
            .verify_password(current_password, &credential.password_hash)?
        {
            return Err(AppError::invalid_credentials());
        }

        if !self.policy.is_strong_enough(new_password) {
            return Err(AppError::validation(
                "Password does not meet strength requirements",
            ));
        }

        let new_hash = self.hasher.hash_password(new_password)?;
        self.ledger.update_password(user_id, &new_hash).await?;

        let revoked = self
            .ledger
            .revoke_all_for_user(user_id, RevokeReason::PasswordChange, keep_session)
            .await?;
        self.validation.invalidate_sessions(&revoked).await;

        self.audit
            .record(NewAuditEntry {
                action: AuditAction::PasswordChanged,
                user_id: Some(user_id),
                email: Some(credential.email),
                ip_address: origin.ip.clone(),
                user_agent: origin.user_agent.clone(),
                detail: Some(json!({ "sessions_revoked": revoked.len() })),
            })
            .await;

        Ok(())
    }

    /// Starts a password reset, returning the raw one-time token for
    /// delivery. Returns `Ok(None)` for unknown or disabled accounts so the
    /// caller's response cannot be used for account probing.
    pub async fn start_password_reset(
        &self,
        email: &str,
        origin: &RequestOrigin,
    ) -> AppResult<Option<String>> {
        let Some(credential) = self.ledger.find_credential_by_email(email).await? else {
            return Ok(None);
        };
        if !credential.can_login() {
            return Ok(None);
        }

        let raw_token = generate_reset_token()?;
        let expires_at =
            Utc::now() + Duration::minutes(self.config.password_reset_ttl_minutes as i64);
        self.ledger
            .create_reset_token(credential.id, &hash_opaque_token(&raw_token), expires_at)
            .await?;

        self.audit
            .record(NewAuditEntry {
                action: AuditAction::PasswordResetStarted,
                user_id: Some(credential.id),
                email: Some(credential.email),
                ip_address: origin.ip.clone(),
                user_agent: origin.user_agent.clone(),
                detail: None,
            })
            .await;

        Ok(Some(raw_token))
    }

    /// Completes a password reset from its one-time token. The consume,
    /// password update, and session revocation land atomically.
    pub async fn complete_password_reset(
        &self,
        raw_token: &str,
        new_password: &str,
        origin: &RequestOrigin,
    ) -> AppResult<()> {
        if !self.policy.is_strong_enough(new_password) {
            return Err(AppError::validation(
                "Password does not meet strength requirements",
            ));
        }
        let new_hash = self.hasher.hash_password(new_password)?;

        let outcome = self
            .ledger
            .consume_reset_token_and_set_password(&hash_opaque_token(raw_token), &new_hash)
            .await?;

        match outcome {
            Some((user_id, revoked)) => {
                self.validation.invalidate_sessions(&revoked).await;
                self.audit
                    .record(NewAuditEntry {
                        action: AuditAction::PasswordResetCompleted,
                        user_id: Some(user_id),
                        email: None,
                        ip_address: origin.ip.clone(),
                        user_agent: origin.user_agent.clone(),
                        detail: Some(json!({ "sessions_revoked": revoked.len() })),
                    })
                    .await;
                Ok(())
            }
            None => Err(AppError::validation(
                "Reset token is invalid, expired, or already used",
            )),
        }
    }

    /// Record a failed login in the lockout guard and the audit log.
    async fn note_login_failure(
        &self,
        email: &str,
        user_id: Option<Uuid>,
        reason: &str,
        origin: &RequestOrigin,
    ) {
        let status = self
            .lockout
            .record_failure(email, origin.ip.as_deref())
            .await;

        if let LockoutStatus::Locked {
            scope,
            retry_after_seconds,
        } = status
        {
            warn!(email = %email, scope = %scope, "Lockout triggered");
            self.audit
                .record(NewAuditEntry {
                    action: AuditAction::LockoutTriggered,
                    user_id,
                    email: Some(email.to_string()),
                    ip_address: origin.ip.clone(),
                    user_agent: origin.user_agent.clone(),
                    detail: Some(json!({
                        "scope": scope.to_string(),
                        "retry_after_seconds": retry_after_seconds,
                    })),
                })
                .await;
        }

        self.audit
            .record(NewAuditEntry {
                action: AuditAction::LoginFailed,
                user_id,
                email: Some(email.to_string()),
                ip_address: origin.ip.clone(),
                user_agent: origin.user_agent.clone(),
                detail: Some(json!({ "reason": reason })),
            })
            .await;
    }

    /// Audit a failed access-token verification. Successes are not recorded.
    async fn note_verification_failure(
        &self,
        user_id: Option<Uuid>,
        err: &AppError,
        origin: &RequestOrigin,
    ) {
        if !err.kind.is_auth_failure() {
            return;
        }
        self.audit
            .record(NewAuditEntry {
                action: AuditAction::VerificationFailed,
                user_id,
                email: None,
                ip_address: origin.ip.clone(),
                user_agent: origin.user_agent.clone(),
                detail: Some(json!({ "reason": err.kind.to_string() })),
            })
            .await;
    }
}

/// Generate a raw password-reset token (32 random bytes, hex-encoded).
fn generate_reset_token() -> AppResult<String> {
    use rand::TryRngCore;

    let mut bytes = [0u8; 32];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AppError::internal(format!("Failed to generate reset token: {e}")))?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}
