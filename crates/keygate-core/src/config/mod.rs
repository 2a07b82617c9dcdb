//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod cache;
pub mod database;
pub mod lockout;
pub mod logging;
pub mod retention;
pub mod session;
pub mod token;

use serde::{Deserialize, Serialize};

use self::cache::CacheConfig;
use self::database::DatabaseConfig;
use self::lockout::LockoutConfig;
use self::logging::LoggingConfig;
use self::retention::RetentionConfig;
use self::session::SessionConfig;
use self::token::TokenConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Cache provider settings.
    pub cache: CacheConfig,
    /// Token signing and verification settings.
    pub token: TokenConfig,
    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Brute-force lockout settings.
    #[serde(default)]
    pub lockout: LockoutConfig,
    /// Retention sweep settings.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `KEYGATE_`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("KEYGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Cross-section sanity checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        // The validation cache must go stale well before a refresh token does,
        // otherwise a revoked session could outlive its revocation in cache.
        let refresh_ttl_seconds = self.token.refresh_ttl_days * 24 * 3600;
        if self.session.validation_cache_ttl_seconds >= refresh_ttl_seconds {
            return Err(AppError::configuration(format!(
                "session.validation_cache_ttl_seconds ({}) must be shorter than the refresh token lifetime ({refresh_ttl_seconds}s)",
                self.session.validation_cache_ttl_seconds
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: "postgres://localhost:5432/keygate".to_string(),
                max_connections: 20,
                min_connections: 5,
                connect_timeout_seconds: 10,
                idle_timeout_seconds: 300,
            },
            cache: CacheConfig::default(),
            token: TokenConfig::default(),
            session: SessionConfig::default(),
            lockout: LockoutConfig::default(),
            retention: RetentionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn default_sections_validate() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn cache_ttl_must_undershoot_refresh_lifetime() {
        let mut config = base_config();
        config.session.validation_cache_ttl_seconds = config.token.refresh_ttl_days * 24 * 3600;
        assert!(config.validate().is_err());
    }
}
