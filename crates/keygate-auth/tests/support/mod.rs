//! Shared fakes for lifecycle tests: an in-memory session ledger with the
//! same conditional-rotation semantics as the Postgres one, a recording
//! audit sink, and an always-failing cache provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use keygate_auth::audit::AuditSink;
use keygate_auth::ledger::SessionLedger;
use keygate_core::result::AppResult;
use keygate_core::traits::cache::CacheProvider;
use keygate_entity::audit::{AuditAction, NewAuditEntry};
use keygate_entity::credential::Credential;
use keygate_entity::reset::PasswordResetToken;
use keygate_entity::session::{NewSession, RevokeReason, Session, SessionStatus};

pub const TEST_PRIVATE_KEY_PEM: &str = include_str!("test_signing_key.pem");

/// In-memory session ledger. The session map's mutex is held across each
/// compare-and-set, which serializes rotations exactly like the conditional
/// UPDATE does at the database.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    credentials: Mutex<HashMap<Uuid, Credential>>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    reset_tokens: Mutex<HashMap<String, PasswordResetToken>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_credential(&self, email: &str, password_hash: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.credentials.lock().unwrap().insert(
            id,
            Credential {
                id,
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role: "member".to_string(),
                disabled: false,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn session(&self, id: Uuid) -> Option<Session> {
        self.sessions.lock().unwrap().get(&id).cloned()
    }

    pub fn sessions_for_user(&self, user_id: Uuid) -> Vec<Session> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn password_hash(&self, user_id: Uuid) -> String {
        self.credentials.lock().unwrap()[&user_id].password_hash.clone()
    }
}

#[async_trait]
impl SessionLedger for InMemoryLedger {
    async fn find_credential_by_email(&self, email: &str) -> AppResult<Option<Credential>> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .values()
            .find(|c| c.email == email)
            .cloned())
    }

    async fn find_credential_by_id(&self, id: Uuid) -> AppResult<Option<Credential>> {
        Ok(self.credentials.lock().unwrap().get(&id).cloned())
    }

    async fn create_session(&self, data: NewSession) -> AppResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: data.id,
            user_id: data.user_id,
            refresh_token_hash: data.refresh_token_hash,
            status: SessionStatus::Active,
            revoke_reason: None,
            ip_address: data.ip_address,
            user_agent: data.user_agent,
            created_at: now,
            last_seen_at: now,
            rotated_at: None,
            revoked_at: None,
            expires_at: data.expires_at,
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: Uuid) -> AppResult<Option<Session>> {
        Ok(self.sessions.lock().unwrap().get(&id).cloned())
    }

    async fn rotate_refresh(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> AppResult<Option<Session>> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(&session_id) {
            Some(session)
                if session.user_id == user_id
                    && session.refresh_token_hash == current_hash
                    && session.status == SessionStatus::Active =>
            {
                session.refresh_token_hash = new_hash.to_string();
                session.rotated_at = Some(Utc::now());
                session.last_seen_at = Utc::now();
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn touch_last_seen(&self, session_id: Uuid) -> AppResult<()> {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(&session_id) {
            session.last_seen_at = Utc::now();
        }
        Ok(())
    }

    async fn revoke_session(&self, session_id: Uuid, reason: RevokeReason) -> AppResult<bool> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(&session_id) {
            Some(session) if session.status == SessionStatus::Active => {
                session.status = SessionStatus::Revoked;
                session.revoke_reason = Some(reason);
                session.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevokeReason,
        except: Option<Uuid>,
    ) -> AppResult<Vec<Uuid>> {
        let mut sessions = self.sessions.lock().unwrap();
        let mut revoked = Vec::new();
        for session in sessions.values_mut() {
            if session.user_id == user_id
                && session.status == SessionStatus::Active
                && Some(session.id) != except
            {
                session.status = SessionStatus::Revoked;
                session.revoke_reason = Some(reason);
                session.revoked_at = Some(Utc::now());
                revoked.push(session.id);
            }
        }
        Ok(revoked)
    }

    async fn update_password(&self, user_id: Uuid, new_hash: &str) -> AppResult<bool> {
        match self.credentials.lock().unwrap().get_mut(&user_id) {
            Some(credential) => {
                credential.password_hash = new_hash.to_string();
                credential.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.reset_tokens.lock().unwrap().insert(
            token_hash.to_string(),
            PasswordResetToken {
                id: Uuid::new_v4(),
                user_id,
                token_hash: token_hash.to_string(),
                created_at: Utc::now(),
                expires_at,
                consumed_at: None,
            },
        );
        Ok(())
    }

    async fn consume_reset_token_and_set_password(
        &self,
        token_hash: &str,
        new_password_hash: &str,
    ) -> AppResult<Option<(Uuid, Vec<Uuid>)>> {
        let user_id = {
            let mut tokens = self.reset_tokens.lock().unwrap();
            match tokens.get_mut(token_hash) {
                Some(token) if token.is_usable() => {
                    token.consumed_at = Some(Utc::now());
                    token.user_id
                }
                _ => return Ok(None),
            }
        };
        self.update_password(user_id, new_password_hash).await?;
        let revoked = self
            .revoke_all_for_user(user_id, RevokeReason::PasswordChange, None)
            .await?;
        Ok(Some((user_id, revoked)))
    }
}

/// Audit sink that records entries for assertions.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<NewAuditEntry>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.entries.lock().unwrap().iter().map(|e| e.action).collect()
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.actions().iter().filter(|a| **a == action).count()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, entry: NewAuditEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

/// A cache provider in which every operation fails, modeling a full outage.
#[derive(Debug)]
pub struct DownCacheProvider;

#[async_trait]
impl CacheProvider for DownCacheProvider {
    async fn get(&self, _: &str) -> AppResult<Option<String>> {
        Err(keygate_core::AppError::cache("cache down"))
    }
    async fn set(&self, _: &str, _: &str, _: Duration) -> AppResult<()> {
        Err(keygate_core::AppError::cache("cache down"))
    }
    async fn delete(&self, _: &str) -> AppResult<()> {
        Err(keygate_core::AppError::cache("cache down"))
    }
    async fn exists(&self, _: &str) -> AppResult<bool> {
        Err(keygate_core::AppError::cache("cache down"))
    }
    async fn incr(&self, _: &str) -> AppResult<i64> {
        Err(keygate_core::AppError::cache("cache down"))
    }
    async fn expire(&self, _: &str, _: Duration) -> AppResult<bool> {
        Err(keygate_core::AppError::cache("cache down"))
    }
    async fn ttl(&self, _: &str) -> AppResult<Option<u64>> {
        Err(keygate_core::AppError::cache("cache down"))
    }
    async fn health_check(&self) -> AppResult<bool> {
        Ok(false)
    }
}

/// Everything a lifecycle test needs, wired over the fakes.
pub struct TestHarness {
    pub lifecycle: Arc<keygate_auth::SessionLifecycle>,
    pub ledger: Arc<InMemoryLedger>,
    pub audit: Arc<RecordingAuditSink>,
}

pub fn build_harness(cache_provider: Arc<dyn CacheProvider>) -> TestHarness {
    let lockout_config = small_lockout_config();
    use keygate_auth::{LockoutGuard, PasswordHasher, SessionLifecycle, ValidationCache, ZxcvbnPolicy};
    use keygate_cache::CacheManager;
    use keygate_core::config::session::SessionConfig;
    use keygate_core::config::token::TokenConfig;
    use keygate_token::{KeyMaterial, TokenIssuer, TokenVerifier};

    let token_config = TokenConfig::default();
    let keys = Arc::new(KeyMaterial::from_pems(TEST_PRIVATE_KEY_PEM, &[]).unwrap());
    let issuer = Arc::new(TokenIssuer::new(Arc::clone(&keys), &token_config));
    let verifier = Arc::new(TokenVerifier::new(Arc::clone(&keys), &token_config));

    let cache = CacheManager::from_provider(cache_provider);
    let ledger = Arc::new(InMemoryLedger::new());
    let audit = Arc::new(RecordingAuditSink::new());
    let session_config = SessionConfig::default();

    let lifecycle = Arc::new(SessionLifecycle::new(
        Arc::clone(&ledger) as Arc<dyn SessionLedger>,
        issuer,
        verifier,
        Arc::new(PasswordHasher::new()),
        Arc::new(ZxcvbnPolicy::default()),
        Arc::new(LockoutGuard::new(cache.clone(), lockout_config)),
        Arc::new(ValidationCache::new(
            cache,
            session_config.validation_cache_ttl_seconds,
        )),
        Arc::clone(&audit) as Arc<dyn AuditSink>,
        session_config,
    ));

    TestHarness {
        lifecycle,
        ledger,
        audit,
    }
}

fn small_lockout_config() -> keygate_core::config::lockout::LockoutConfig {
    keygate_core::config::lockout::LockoutConfig {
        email_max_attempts: 3,
        email_window_seconds: 900,
        email_lock_seconds: 900,
        ip_max_attempts: 6,
        ip_window_seconds: 3600,
        ip_lock_seconds: 3600,
    }
}

pub fn memory_cache_provider() -> Arc<dyn CacheProvider> {
    Arc::new(keygate_cache::memory::MemoryCacheProvider::new(
        &keygate_core::config::cache::MemoryCacheConfig {
            max_capacity: 1000,
            time_to_live_seconds: 3600,
        },
    ))
}
