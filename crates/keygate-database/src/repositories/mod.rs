//! Repository implementations.
//!
//! Repository methods take an explicit `&mut PgConnection` so that every
//! statement runs inside the caller's unit of work; no repository opens its
//! own connection or transaction.

pub mod audit;
pub mod credential;
pub mod reset_token;
pub mod session;

pub use audit::AuditRepository;
pub use credential::CredentialRepository;
pub use reset_token::ResetTokenRepository;
pub use session::SessionRepository;
