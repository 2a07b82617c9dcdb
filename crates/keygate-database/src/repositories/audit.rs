//! Audit log repository implementation.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use keygate_core::error::{AppError, ErrorKind};
use keygate_core::result::AppResult;
use keygate_entity::audit::{AuditEntry, NewAuditEntry};

/// Repository for the append-only audit log.
#[derive(Debug, Clone, Default)]
pub struct AuditRepository;

impl AuditRepository {
    /// Create a new audit repository.
    pub fn new() -> Self {
        Self
    }

    /// Append an audit entry.
    pub async fn append(
        &self,
        conn: &mut PgConnection,
        data: &NewAuditEntry,
    ) -> AppResult<AuditEntry> {
        sqlx::query_as::<_, AuditEntry>(
            "INSERT INTO audit_log (action, user_id, email, ip_address, user_agent, detail) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(data.action.as_str())
        .bind(data.user_id)
        .bind(&data.email)
        .bind(&data.ip_address)
        .bind(&data.user_agent)
        .bind(&data.detail)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to append audit entry", e))
    }

    /// Delete audit entries older than `cutoff`.
    pub async fn purge_before(
        &self,
        conn: &mut PgConnection,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        crate::unit_of_work::purge_older_than(conn, "audit_log", "created_at", cutoff).await
    }
}
