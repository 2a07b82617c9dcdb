//! # keygate-token
//!
//! Stateless RS256 token issuance and verification for Keygate.
//!
//! Three token kinds share one signing path: short-lived access tokens,
//! medium-lived identity tokens, and long-lived one-time-rotating refresh
//! tokens. The kind discriminator is embedded in every token and checked
//! before any other claim is trusted. Public verification keys are exported
//! in JWKS form for verifiers outside this process.

pub mod claims;
pub mod issuer;
pub mod keys;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_keys;

pub use claims::{TokenClaims, TokenKind, hash_jti};
pub use issuer::{SignedToken, TokenIssuer, TokenSet};
pub use keys::{Jwk, Jwks, KeyMaterial};
pub use verifier::TokenVerifier;
