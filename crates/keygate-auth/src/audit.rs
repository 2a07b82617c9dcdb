//! Best-effort security event recording.
//!
//! Audit writes must never abort the primary operation: failures are logged
//! locally and swallowed. The Postgres recorder uses its own short-lived
//! unit of work so a failed insert cannot poison a request's transaction.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use keygate_core::result::AppResult;
use keygate_database::UnitOfWork;
use keygate_database::repositories::AuditRepository;
use keygate_entity::audit::NewAuditEntry;

/// Sink for security events. The lifecycle only ever calls [`record`],
/// which cannot fail.
///
/// [`record`]: AuditSink::record
#[async_trait]
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    /// Record an event, swallowing any write failure.
    async fn record(&self, entry: NewAuditEntry);
}

/// Durable audit recorder over PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgAuditRecorder {
    /// Process-wide connection pool.
    pool: PgPool,
    /// Audit table access.
    repo: AuditRepository,
}

impl PgAuditRecorder {
    /// Create a new audit recorder.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            repo: AuditRepository::new(),
        }
    }

    async fn try_record(&self, entry: &NewAuditEntry) -> AppResult<()> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        self.repo.append(uow.executor(), entry).await?;
        uow.commit().await
    }
}

#[async_trait]
impl AuditSink for PgAuditRecorder {
    async fn record(&self, entry: NewAuditEntry) {
        if let Err(err) = self.try_record(&entry).await {
            warn!(
                action = %entry.action,
                error = %err,
                "Failed to write audit entry"
            );
        }
    }
}
