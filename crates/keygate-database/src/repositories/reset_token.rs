//! Password-reset token repository implementation.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use keygate_core::error::{AppError, ErrorKind};
use keygate_core::result::AppResult;
use keygate_entity::reset::PasswordResetToken;

/// Repository for one-time password-reset tokens.
#[derive(Debug, Clone, Default)]
pub struct ResetTokenRepository;

impl ResetTokenRepository {
    /// Create a new reset-token repository.
    pub fn new() -> Self {
        Self
    }

    /// Insert a new reset token. Only the hash is stored.
    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<PasswordResetToken> {
        sqlx::query_as::<_, PasswordResetToken>(
            "INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to insert reset token", e))
    }

    /// Consume a token if it is still valid. The conditional update makes the
    /// token one-time even under concurrent completion attempts.
    pub async fn consume(
        &self,
        conn: &mut PgConnection,
        token_hash: &str,
    ) -> AppResult<Option<PasswordResetToken>> {
        sqlx::query_as::<_, PasswordResetToken>(
            "UPDATE password_reset_tokens SET consumed_at = NOW() \
             WHERE token_hash = $1 AND consumed_at IS NULL AND expires_at > NOW() \
             RETURNING *",
        )
        .bind(token_hash)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to consume reset token", e))
    }

    /// Delete tokens that are consumed, or whose expiry passed before `cutoff`.
    pub async fn purge_spent_before(
        &self,
        conn: &mut PgConnection,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM password_reset_tokens \
             WHERE (consumed_at IS NOT NULL AND consumed_at < $1) OR expires_at < $1",
        )
        .bind(cutoff)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to purge reset tokens", e)
        })?;

        Ok(result.rows_affected())
    }
}
