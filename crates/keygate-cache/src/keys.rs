//! Cache key builders for all Keygate cache entries.
//!
//! Centralising key construction prevents typos and makes it easy
//! to find every key the application uses.

use uuid::Uuid;

/// Prefix applied to all Keygate cache keys.
const PREFIX: &str = "auth";

// ── Validation keys ────────────────────────────────────────

/// Cache key for a session's last-known-good verification result.
pub fn session_validation(session_id: Uuid) -> String {
    format!("{PREFIX}:session:{session_id}")
}

// ── Lockout keys ───────────────────────────────────────────

/// Cache key for the failed-attempt counter of an email.
pub fn lockout_email_fails(email: &str) -> String {
    format!("{PREFIX}:lockout:email:{}:fails", email.to_lowercase())
}

/// Cache key for the lock flag of an email.
pub fn lockout_email_lock(email: &str) -> String {
    format!("{PREFIX}:lockout:email:{}:lock", email.to_lowercase())
}

/// Cache key for the failed-attempt counter of an origin IP.
pub fn lockout_ip_fails(ip: &str) -> String {
    format!("{PREFIX}:lockout:ip:{ip}:fails")
}

/// Cache key for the lock flag of an origin IP.
pub fn lockout_ip_lock(ip: &str) -> String {
    format!("{PREFIX}:lockout:ip:{ip}:lock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_keys_are_case_insensitive() {
        assert_eq!(
            lockout_email_fails("User@Example.com"),
            lockout_email_fails("user@example.com")
        );
    }
}
