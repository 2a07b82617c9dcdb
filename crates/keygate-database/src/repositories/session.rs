//! Session repository implementation.
//!
//! The ledger of record for session state. Status transitions are expressed
//! as conditional updates guarded on `status = 'active'`, so a terminal row
//! can never transition again regardless of interleaving.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use keygate_core::error::{AppError, ErrorKind};
use keygate_core::result::AppResult;
use keygate_entity::session::{NewSession, RevokeReason, Session};

/// Repository for session rows.
#[derive(Debug, Clone, Default)]
pub struct SessionRepository;

impl SessionRepository {
    /// Create a new session repository.
    pub fn new() -> Self {
        Self
    }

    /// Create a new active session.
    pub async fn create(&self, conn: &mut PgConnection, data: &NewSession) -> AppResult<Session> {
        sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id, refresh_token_hash, ip_address, user_agent, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(data.id)
        .bind(data.user_id)
        .bind(&data.refresh_token_hash)
        .bind(&data.ip_address)
        .bind(&data.user_agent)
        .bind(data.expires_at)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create session", e))
    }

    /// Find a session by ID.
    pub async fn find_by_id(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> AppResult<Option<Session>> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find session", e))
    }

    /// List all active sessions for a user.
    pub async fn find_active_by_user(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> AppResult<Vec<Session>> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE user_id = $1 AND status = 'active' \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find active sessions", e)
        })
    }

    /// Count active sessions for a user.
    pub async fn count_active_by_user(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .fetch_one(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to count active sessions", e)
        })
    }

    /// Replace the current refresh-token hash, if and only if `current_hash`
    /// is still the session's current identifier, the session is active, and
    /// `user_id` owns it.
    ///
    /// Of two concurrent rotations against the same stale hash, at most one
    /// row matches; the loser gets `None` and must run the secondary lookup
    /// to classify the failure.
    pub async fn rotate_refresh(
        &self,
        conn: &mut PgConnection,
        session_id: Uuid,
        user_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> AppResult<Option<Session>> {
        sqlx::query_as::<_, Session>(
            "UPDATE sessions \
             SET refresh_token_hash = $4, rotated_at = NOW(), last_seen_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND refresh_token_hash = $3 AND status = 'active' \
             RETURNING *",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(current_hash)
        .bind(new_hash)
        .fetch_optional(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to rotate refresh token", e)
        })
    }

    /// Record request activity without extending the session lifetime.
    pub async fn touch_last_seen(&self, conn: &mut PgConnection, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE sessions SET last_seen_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to update last seen", e)
            })?;
        Ok(())
    }

    /// Transition an active session to revoked. Returns `false` when the
    /// session was already terminal (idempotent for callers like logout).
    pub async fn revoke(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        reason: RevokeReason,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'revoked', revoke_reason = $2, revoked_at = NOW() \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .bind(reason)
        .execute(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to revoke session", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke every active session for a user, optionally sparing one.
    /// Returns the IDs of the sessions that were revoked.
    pub async fn revoke_all_for_user(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        reason: RevokeReason,
        except: Option<Uuid>,
    ) -> AppResult<Vec<Uuid>> {
        let rows = sqlx::query_scalar::<_, Uuid>(
            "UPDATE sessions SET status = 'revoked', revoke_reason = $2, revoked_at = NOW() \
             WHERE user_id = $1 AND status = 'active' AND ($3::uuid IS NULL OR id <> $3) \
             RETURNING id",
        )
        .bind(user_id)
        .bind(reason)
        .bind(except)
        .fetch_all(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to revoke user sessions", e)
        })?;

        Ok(rows)
    }

    /// Transition active sessions past their expiry timestamp to expired.
    pub async fn expire_stale(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'expired' WHERE status = 'active' AND expires_at <= $1",
        )
        .bind(now)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to expire stale sessions", e)
        })?;

        Ok(result.rows_affected())
    }

    /// Delete terminal sessions that left the active state before `cutoff`.
    pub async fn purge_terminal_before(
        &self,
        conn: &mut PgConnection,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM sessions WHERE status <> 'active' \
             AND COALESCE(revoked_at, expires_at) < $1",
        )
        .bind(cutoff)
        .execute(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to purge sessions", e))?;

        Ok(result.rows_affected())
    }
}
