//! Brute-force lockout configuration.

use serde::{Deserialize, Serialize};

/// Lockout guard configuration.
///
/// Two independent scopes: per-email and per-origin-IP. The IP scope carries
/// a higher threshold and a longer window and lock, and is never cleared by
/// a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutConfig {
    /// Failed attempts per email before the email lock engages.
    #[serde(default = "default_email_max_attempts")]
    pub email_max_attempts: u32,
    /// Sliding window for the email counter in seconds.
    #[serde(default = "default_email_window")]
    pub email_window_seconds: u64,
    /// Email lock duration in seconds.
    #[serde(default = "default_email_lock")]
    pub email_lock_seconds: u64,
    /// Failed attempts per origin IP before the IP lock engages.
    #[serde(default = "default_ip_max_attempts")]
    pub ip_max_attempts: u32,
    /// Sliding window for the IP counter in seconds.
    #[serde(default = "default_ip_window")]
    pub ip_window_seconds: u64,
    /// IP lock duration in seconds.
    #[serde(default = "default_ip_lock")]
    pub ip_lock_seconds: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            email_max_attempts: default_email_max_attempts(),
            email_window_seconds: default_email_window(),
            email_lock_seconds: default_email_lock(),
            ip_max_attempts: default_ip_max_attempts(),
            ip_window_seconds: default_ip_window(),
            ip_lock_seconds: default_ip_lock(),
        }
    }
}

fn default_email_max_attempts() -> u32 {
    5
}

fn default_email_window() -> u64 {
    900
}

fn default_email_lock() -> u64 {
    900
}

fn default_ip_max_attempts() -> u32 {
    25
}

fn default_ip_window() -> u64 {
    3600
}

fn default_ip_lock() -> u64 {
    3600
}
