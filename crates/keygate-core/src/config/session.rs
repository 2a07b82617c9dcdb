//! Session lifecycle configuration.

use serde::{Deserialize, Serialize};

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Absolute session lifetime in days (matches the refresh token TTL by
    /// default; sessions past this are expired by the sweeper).
    #[serde(default = "default_absolute_ttl")]
    pub absolute_ttl_days: u64,
    /// TTL for cached verification results in seconds. Must be strictly
    /// shorter than the refresh token lifetime.
    #[serde(default = "default_validation_cache_ttl")]
    pub validation_cache_ttl_seconds: u64,
    /// Lifetime of an emailed password-reset token in minutes.
    #[serde(default = "default_reset_token_ttl")]
    pub password_reset_ttl_minutes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            absolute_ttl_days: default_absolute_ttl(),
            validation_cache_ttl_seconds: default_validation_cache_ttl(),
            password_reset_ttl_minutes: default_reset_token_ttl(),
        }
    }
}

fn default_absolute_ttl() -> u64 {
    14
}

fn default_validation_cache_ttl() -> u64 {
    60
}

fn default_reset_token_ttl() -> u64 {
    30
}
