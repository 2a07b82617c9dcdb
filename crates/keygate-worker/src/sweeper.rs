//! Retention sweeps over expired and terminal records.
//!
//! Sweeps run on a schedule, never from request paths. Every step is a
//! conditional UPDATE or DELETE, so a sweep is idempotent: running it twice,
//! concurrently, or skipping a cycle changes nothing but timing.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use keygate_core::config::retention::RetentionConfig;
use keygate_core::result::AppResult;
use keygate_database::UnitOfWork;
use keygate_database::repositories::{AuditRepository, ResetTokenRepository, SessionRepository};

/// Counts of what one sweep cycle touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Active sessions transitioned to expired.
    pub sessions_expired: u64,
    /// Terminal sessions deleted.
    pub sessions_purged: u64,
    /// Audit entries deleted.
    pub audit_entries_purged: u64,
    /// Consumed or expired reset tokens deleted.
    pub reset_tokens_purged: u64,
}

/// Periodic retention sweeper.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    /// Process-wide connection pool.
    pool: PgPool,
    /// Retention windows.
    config: RetentionConfig,
    /// Session table access.
    sessions: SessionRepository,
    /// Audit table access.
    audit: AuditRepository,
    /// Reset token table access.
    reset_tokens: ResetTokenRepository,
}

impl RetentionSweeper {
    /// Create a new sweeper.
    pub fn new(pool: PgPool, config: RetentionConfig) -> Self {
        Self {
            pool,
            config,
            sessions: SessionRepository::new(),
            audit: AuditRepository::new(),
            reset_tokens: ResetTokenRepository::new(),
        }
    }

    /// Run one sweep cycle.
    pub async fn run_sweep(&self) -> AppResult<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        let mut uow = UnitOfWork::begin(&self.pool).await?;

        report.sessions_expired = self.sessions.expire_stale(uow.executor(), now).await?;

        let session_cutoff = now - Duration::days(self.config.session_retention_days as i64);
        report.sessions_purged = self
            .sessions
            .purge_terminal_before(uow.executor(), session_cutoff)
            .await?;

        let audit_cutoff = now - Duration::days(self.config.audit_retention_days as i64);
        report.audit_entries_purged =
            self.audit.purge_before(uow.executor(), audit_cutoff).await?;

        let reset_cutoff = now - Duration::days(self.config.reset_token_retention_days as i64);
        report.reset_tokens_purged = self
            .reset_tokens
            .purge_spent_before(uow.executor(), reset_cutoff)
            .await?;

        uow.commit().await?;

        if report == SweepReport::default() {
            info!("Retention sweep completed, nothing to do");
        } else {
            info!(
                sessions_expired = report.sessions_expired,
                sessions_purged = report.sessions_purged,
                audit_entries_purged = report.audit_entries_purged,
                reset_tokens_purged = report.reset_tokens_purged,
                "Retention sweep completed"
            );
        }

        Ok(report)
    }

    /// Run a sweep, logging instead of propagating failure. A missed cycle
    /// is made up for by the next one.
    pub async fn run_sweep_logged(&self) {
        if let Err(err) = self.run_sweep().await {
            warn!(error = %err, "Retention sweep failed, will retry next cycle");
        }
    }
}
