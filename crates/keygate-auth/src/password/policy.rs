//! Password strength policy predicate.
//!
//! The lifecycle consumes the policy as a pure predicate; complexity rules
//! live here, not in the credential paths.

/// Decides whether a candidate password is acceptable.
pub trait PasswordPolicy: Send + Sync + std::fmt::Debug {
    /// Pure predicate: `true` when the password may be hashed and stored.
    fn is_strong_enough(&self, password: &str) -> bool;
}

/// Default policy: a minimum length plus a zxcvbn entropy floor.
#[derive(Debug, Clone)]
pub struct ZxcvbnPolicy {
    /// Minimum password length.
    min_length: usize,
}

impl ZxcvbnPolicy {
    /// Creates a policy with the given minimum length.
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl Default for ZxcvbnPolicy {
    fn default() -> Self {
        Self::new(8)
    }
}

impl PasswordPolicy for ZxcvbnPolicy {
    fn is_strong_enough(&self, password: &str) -> bool {
        if password.len() < self.min_length {
            return false;
        }
        let estimate = zxcvbn::zxcvbn(password, &[]);
        estimate.score() >= zxcvbn::Score::Three
    }
}
