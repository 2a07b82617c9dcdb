//! PostgreSQL session ledger.
//!
//! Every method runs inside exactly one [`UnitOfWork`]; nothing here writes
//! through a bare pool connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use sqlx::PgPool;
use uuid::Uuid;

use keygate_core::result::AppResult;
use keygate_database::UnitOfWork;
use keygate_database::repositories::{
    CredentialRepository, ResetTokenRepository, SessionRepository,
};
use keygate_entity::credential::Credential;
use keygate_entity::session::{NewSession, RevokeReason, Session};

use super::SessionLedger;

/// The production session ledger over PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgSessionLedger {
    /// Process-wide connection pool, owned by the process root.
    pool: PgPool,
    /// Credential table access.
    credentials: CredentialRepository,
    /// Session table access.
    sessions: SessionRepository,
    /// Reset token table access.
    reset_tokens: ResetTokenRepository,
}

impl PgSessionLedger {
    /// Create a new ledger over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            credentials: CredentialRepository::new(),
            sessions: SessionRepository::new(),
            reset_tokens: ResetTokenRepository::new(),
        }
    }
}

#[async_trait]
impl SessionLedger for PgSessionLedger {
    async fn find_credential_by_email(&self, email: &str) -> AppResult<Option<Credential>> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let found = self.credentials.find_by_email(uow.executor(), email).await?;
        uow.commit().await?;
        Ok(found)
    }

    async fn find_credential_by_id(&self, id: Uuid) -> AppResult<Option<Credential>> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let found = self.credentials.find_by_id(uow.executor(), id).await?;
        uow.commit().await?;
        Ok(found)
    }

    async fn create_session(&self, data: NewSession) -> AppResult<Session> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let session = self.sessions.create(uow.executor(), &data).await?;
        uow.commit().await?;
        Ok(session)
    }

    async fn find_session(&self, id: Uuid) -> AppResult<Option<Session>> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let found = self.sessions.find_by_id(uow.executor(), id).await?;
        uow.commit().await?;
        Ok(found)
    }

    async fn rotate_refresh(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> AppResult<Option<Session>> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let rotated = self
            .sessions
            .rotate_refresh(uow.executor(), session_id, user_id, current_hash, new_hash)
            .await?;
        uow.commit().await?;
        Ok(rotated)
    }

    async fn touch_last_seen(&self, session_id: Uuid) -> AppResult<()> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        self.sessions.touch_last_seen(uow.executor(), session_id).await?;
        uow.commit().await
    }

    async fn revoke_session(&self, session_id: Uuid, reason: RevokeReason) -> AppResult<bool> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let revoked = self.sessions.revoke(uow.executor(), session_id, reason).await?;
        uow.commit().await?;
        Ok(revoked)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: RevokeReason,
        except: Option<Uuid>,
    ) -> AppResult<Vec<Uuid>> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let revoked = self
            .sessions
            .revoke_all_for_user(uow.executor(), user_id, reason, except)
            .await?;
        uow.commit().await?;
        Ok(revoked)
    }

    async fn update_password(&self, user_id: Uuid, new_hash: &str) -> AppResult<bool> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let updated = self
            .credentials
            .update_password_hash(uow.executor(), user_id, new_hash)
            .await?;
        uow.commit().await?;
        Ok(updated)
    }

    async fn create_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        self.reset_tokens
            .insert(uow.executor(), user_id, token_hash, expires_at)
            .await?;
        uow.commit().await
    }

    async fn consume_reset_token_and_set_password(
        &self,
        token_hash: &str,
        new_password_hash: &str,
    ) -> AppResult<Option<(Uuid, Vec<Uuid>)>> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        // The consume + password update + revocation triple must land
        // together or not at all; the savepoint guarantees partial work is
        // rolled back while the outer unit stays usable.
        let reset_tokens = self.reset_tokens.clone();
        let credentials = self.credentials.clone();
        let sessions = self.sessions.clone();
        let token_hash = token_hash.to_string();
        let new_password_hash = new_password_hash.to_string();
        let outcome = uow
            .savepoint(move |conn| {
                async move {
                    let Some(token) = reset_tokens.consume(conn, &token_hash).await? else {
                        return Ok(None);
                    };
                    credentials
                        .update_password_hash(conn, token.user_id, &new_password_hash)
                        .await?;
                    let revoked = sessions
                        .revoke_all_for_user(
                            conn,
                            token.user_id,
                            RevokeReason::PasswordChange,
                            None,
                        )
                        .await?;
                    Ok(Some((token.user_id, revoked)))
                }
                .boxed()
            })
            .await?;

        uow.commit().await?;
        Ok(outcome)
    }
}
