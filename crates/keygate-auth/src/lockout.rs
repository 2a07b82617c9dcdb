//! Two-scope brute-force lockout guard.
//!
//! Failed logins are counted per email and per origin IP in the cache, each
//! scope with its own sliding window, threshold, and lock duration. The IP
//! scope is wider and longer-lived, and is deliberately never cleared by a
//! successful login: an attacker rotating through accounts from one origin
//! stays throttled after any single account recovers.
//!
//! The guard fails open: if the cache is unreachable, logins proceed
//! unthrottled. Availability of login wins over throttling during an
//! infrastructure outage.

use std::time::Duration;

use tracing::warn;

use keygate_cache::{CacheManager, keys};
use keygate_core::config::lockout::LockoutConfig;
use keygate_core::traits::cache::CacheProvider;

/// Which scope produced a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutScope {
    /// The per-email scope.
    Email,
    /// The per-origin-IP scope.
    Ip,
}

impl std::fmt::Display for LockoutScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Ip => write!(f, "ip"),
        }
    }
}

/// Result of a lockout check or failure recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutStatus {
    /// Not locked; carries how many email-scope attempts remain.
    Clear {
        /// Attempts left before the email lock engages.
        attempts_remaining: u32,
    },
    /// Locked; carries the scope and how long until the lock expires.
    Locked {
        /// Which scope is locked. When both are, the more restrictive
        /// (later-expiring) scope is reported.
        scope: LockoutScope,
        /// Seconds until the lock expires.
        retry_after_seconds: u64,
    },
}

impl LockoutStatus {
    /// Whether the subject is currently locked.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// Counter-based lockout guard over the shared cache.
#[derive(Debug)]
pub struct LockoutGuard {
    /// Backing cache.
    cache: CacheManager,
    /// Thresholds, windows, and lock durations.
    config: LockoutConfig,
}

impl LockoutGuard {
    /// Create a new lockout guard.
    pub fn new(cache: CacheManager, config: LockoutConfig) -> Self {
        Self { cache, config }
    }

    /// Read-only check of both scopes. Locked when *either* scope is locked;
    /// when both are, the later-expiring lock is reported.
    pub async fn check(&self, email: &str, ip: Option<&str>) -> LockoutStatus {
        let email_lock = self.lock_ttl(&keys::lockout_email_lock(email)).await;
        let ip_lock = match ip {
            Some(ip) => self.lock_ttl(&keys::lockout_ip_lock(ip)).await,
            None => None,
        };

        match most_restrictive(email_lock, ip_lock) {
            Some((scope, retry_after_seconds)) => LockoutStatus::Locked {
                scope,
                retry_after_seconds,
            },
            None => LockoutStatus::Clear {
                attempts_remaining: self.email_attempts_remaining(email).await,
            },
        }
    }

    /// Record a failed attempt in both scopes and return the resulting
    /// status. Crossing a threshold engages that scope's lock and clears its
    /// running counter.
    pub async fn record_failure(&self, email: &str, ip: Option<&str>) -> LockoutStatus {
        let email_lock = self
            .bump_scope(
                &keys::lockout_email_fails(email),
                &keys::lockout_email_lock(email),
                self.config.email_max_attempts,
                self.config.email_window_seconds,
                self.config.email_lock_seconds,
            )
            .await;

        let ip_lock = match ip {
            Some(ip) => {
                self.bump_scope(
                    &keys::lockout_ip_fails(ip),
                    &keys::lockout_ip_lock(ip),
                    self.config.ip_max_attempts,
                    self.config.ip_window_seconds,
                    self.config.ip_lock_seconds,
                )
                .await
            }
            None => None,
        };

        let email_lock = email_lock.map(|ttl| (LockoutScope::Email, ttl));
        let ip_lock = ip_lock.map(|ttl| (LockoutScope::Ip, ttl));
        match most_restrictive_pairs(email_lock, ip_lock) {
            Some((scope, retry_after_seconds)) => LockoutStatus::Locked {
                scope,
                retry_after_seconds,
            },
            None => LockoutStatus::Clear {
                attempts_remaining: self.email_attempts_remaining(email).await,
            },
        }
    }

    /// Clear the email-scoped counter and lock after a successful login.
    /// The IP scope is left untouched.
    pub async fn clear_on_success(&self, email: &str) {
        for key in [
            keys::lockout_email_fails(email),
            keys::lockout_email_lock(email),
        ] {
            if let Err(err) = self.cache.delete(&key).await {
                warn!(error = %err, "Failed to clear lockout state");
            }
        }
    }

    /// Increment one scope's counter, engaging its lock at the threshold.
    /// Returns the lock TTL when the scope is (now or already) locked.
    async fn bump_scope(
        &self,
        fails_key: &str,
        lock_key: &str,
        max_attempts: u32,
        window_seconds: u64,
        lock_seconds: u64,
    ) -> Option<u64> {
        if let Some(ttl) = self.lock_ttl(lock_key).await {
            return Some(ttl);
        }

        let count = match self.cache.incr(fails_key).await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "Lockout counter unavailable, failing open");
                return None;
            }
        };

        if count == 1 {
            // First failure in this window; start the window clock.
            if let Err(err) = self
                .cache
                .expire(fails_key, Duration::from_secs(window_seconds))
                .await
            {
                warn!(error = %err, "Failed to set lockout window");
            }
        }

        if count >= max_attempts as i64 {
            let lock_ttl = Duration::from_secs(lock_seconds);
            if let Err(err) = self.cache.set(lock_key, "1", lock_ttl).await {
                warn!(error = %err, "Failed to engage lockout, failing open");
                return None;
            }
            if let Err(err) = self.cache.delete(fails_key).await {
                warn!(error = %err, "Failed to clear lockout counter");
            }
            return Some(lock_seconds);
        }

        None
    }

    /// Remaining TTL of a lock key, or `None` when absent or unreadable.
    async fn lock_ttl(&self, lock_key: &str) -> Option<u64> {
        match self.cache.exists(lock_key).await {
            Ok(true) => match self.cache.ttl(lock_key).await {
                Ok(ttl) => Some(ttl.unwrap_or(0).max(1)),
                Err(err) => {
                    warn!(error = %err, "Lockout TTL unavailable, failing open");
                    None
                }
            },
            Ok(false) => None,
            Err(err) => {
                warn!(error = %err, "Lockout state unavailable, failing open");
                None
            }
        }
    }

    /// How many email-scope attempts remain before the lock engages.
    async fn email_attempts_remaining(&self, email: &str) -> u32 {
        let key = keys::lockout_email_fails(email);
        let used = match self.cache.get(&key).await {
            Ok(Some(raw)) => raw.parse::<i64>().unwrap_or(0),
            Ok(None) => 0,
            Err(_) => 0,
        };
        (self.config.email_max_attempts as i64 - used).max(0) as u32
    }
}

/// Pick the later-expiring of the two scope locks.
fn most_restrictive(
    email_ttl: Option<u64>,
    ip_ttl: Option<u64>,
) -> Option<(LockoutScope, u64)> {
    most_restrictive_pairs(
        email_ttl.map(|ttl| (LockoutScope::Email, ttl)),
        ip_ttl.map(|ttl| (LockoutScope::Ip, ttl)),
    )
}

fn most_restrictive_pairs(
    email: Option<(LockoutScope, u64)>,
    ip: Option<(LockoutScope, u64)>,
) -> Option<(LockoutScope, u64)> {
    match (email, ip) {
        (Some(e), Some(i)) => Some(if i.1 > e.1 { i } else { e }),
        (Some(e), None) => Some(e),
        (None, Some(i)) => Some(i),
        (None, None) => None,
    }
}
