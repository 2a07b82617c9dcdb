//! Retention sweep configuration.

use serde::{Deserialize, Serialize};

/// Retention windows and sweep schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Days a terminal (revoked/expired) session is kept before deletion.
    #[serde(default = "default_session_retention")]
    pub session_retention_days: u64,
    /// Days an audit entry is kept before deletion.
    #[serde(default = "default_audit_retention")]
    pub audit_retention_days: u64,
    /// Days a consumed or expired password-reset token is kept.
    #[serde(default = "default_reset_token_retention")]
    pub reset_token_retention_days: u64,
    /// Cron expression for the sweep schedule (seconds-resolution, 6 fields).
    #[serde(default = "default_sweep_schedule")]
    pub sweep_schedule: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            session_retention_days: default_session_retention(),
            audit_retention_days: default_audit_retention(),
            reset_token_retention_days: default_reset_token_retention(),
            sweep_schedule: default_sweep_schedule(),
        }
    }
}

fn default_session_retention() -> u64 {
    30
}

fn default_audit_retention() -> u64 {
    90
}

fn default_reset_token_retention() -> u64 {
    7
}

fn default_sweep_schedule() -> String {
    // Every 15 minutes.
    "0 */15 * * * *".to_string()
}
