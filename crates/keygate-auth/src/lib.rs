//! # keygate-auth
//!
//! The credential and session lifecycle engine of Keygate.
//!
//! ## Modules
//!
//! - `lifecycle` — login, refresh rotation with reuse detection, logout,
//!   bulk revocation, and password operations
//! - `ledger` — the durable session ledger seam (Postgres implementation
//!   plus the trait that tests substitute)
//! - `validation` — read-through verification cache with in-flight
//!   request deduplication
//! - `lockout` — two-scope (email + origin IP) brute-force throttle
//! - `password` — Argon2id hashing and the strength-policy predicate
//! - `audit` — best-effort security event recording

pub mod audit;
pub mod ledger;
pub mod lifecycle;
pub mod lockout;
pub mod password;
pub mod validation;

pub use audit::{AuditSink, PgAuditRecorder};
pub use ledger::{PgSessionLedger, SessionLedger};
pub use lifecycle::{LoginOutcome, RequestOrigin, SessionLifecycle};
pub use lockout::{LockoutGuard, LockoutScope, LockoutStatus};
pub use password::{PasswordHasher, PasswordPolicy, ZxcvbnPolicy};
pub use validation::{SessionContext, ValidationCache};
