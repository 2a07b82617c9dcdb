//! Unified application error types for Keygate.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
///
/// Authentication failures are deliberately coarse towards callers: the kind
/// is returned, the message stays generic, and internal detail (key material,
/// token contents, SQL) lives only in the `source` chain for local logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The email/password pair did not match a usable credential.
    InvalidCredentials,
    /// The email or origin IP is currently locked out.
    AccountLocked,
    /// A token was syntactically valid but past its expiry.
    TokenExpired,
    /// A token could not be parsed or its signature did not verify.
    TokenMalformed,
    /// A token of one kind was presented where another kind was expected.
    TokenWrongKind,
    /// A token was signed under a key id this process does not know.
    TokenUnknownKey,
    /// The referenced session does not exist or is no longer active.
    SessionNotFound,
    /// The token subject does not own the referenced session.
    SessionUserMismatch,
    /// A rotated-away refresh token was replayed (theft response triggered).
    TokenReuse,
    /// A required backing service is unreachable and no fallback exists.
    ResourceUnavailable,
    /// Input validation failed.
    Validation,
    /// A database error occurred.
    Database,
    /// A cache error occurred.
    Cache,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "INVALID_CREDENTIALS"),
            Self::AccountLocked => write!(f, "ACCOUNT_LOCKED"),
            Self::TokenExpired => write!(f, "TOKEN_EXPIRED"),
            Self::TokenMalformed => write!(f, "TOKEN_MALFORMED"),
            Self::TokenWrongKind => write!(f, "TOKEN_WRONG_KIND"),
            Self::TokenUnknownKey => write!(f, "TOKEN_UNKNOWN_KEY"),
            Self::SessionNotFound => write!(f, "SESSION_NOT_FOUND"),
            Self::SessionUserMismatch => write!(f, "SESSION_USER_MISMATCH"),
            Self::TokenReuse => write!(f, "TOKEN_REUSE"),
            Self::ResourceUnavailable => write!(f, "RESOURCE_UNAVAILABLE"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Database => write!(f, "DATABASE"),
            Self::Cache => write!(f, "CACHE"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl ErrorKind {
    /// Whether this kind represents an authentication/authorization failure
    /// rather than an infrastructure or programming problem.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::AccountLocked
                | Self::TokenExpired
                | Self::TokenMalformed
                | Self::TokenWrongKind
                | Self::TokenUnknownKey
                | Self::SessionNotFound
                | Self::SessionUserMismatch
                | Self::TokenReuse
        )
    }
}

/// The unified application error used throughout Keygate.
///
/// All crate-specific errors are mapped into `AppError` using `From` impls
/// or explicit `.map_err()` calls. This provides a single error type for
/// the entire application boundary.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message, safe to return to callers.
    pub message: String,
    /// Optional underlying cause, for local logging only.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid-credentials error.
    pub fn invalid_credentials() -> Self {
        Self::new(ErrorKind::InvalidCredentials, "Invalid email or password")
    }

    /// Create an account-locked error.
    pub fn account_locked(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccountLocked, message)
    }

    /// Create a session-not-found error.
    pub fn session_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionNotFound, message)
    }

    /// Create a session-user-mismatch error.
    pub fn session_user_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionUserMismatch, message)
    }

    /// Create a token-reuse error.
    pub fn token_reuse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenReuse, message)
    }

    /// Create a resource-unavailable error.
    pub fn resource_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceUnavailable, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cache, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
