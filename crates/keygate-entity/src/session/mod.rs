//! Session entity.

pub mod model;
pub mod status;

pub use model::{NewSession, Session};
pub use status::{RevokeReason, SessionStatus};
