//! Token signing and verification configuration.

use serde::{Deserialize, Serialize};

/// Token issuance configuration.
///
/// The signing key is an RSA private key in PEM form; verification keys are
/// derived from it plus any configured retired public keys, so tokens signed
/// under a rotated-out key keep verifying while its public half stays listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Path to the RSA private key PEM used for signing.
    #[serde(default = "default_private_key_path")]
    pub private_key_path: String,
    /// Paths to retired RSA public key PEMs that must keep verifying.
    #[serde(default)]
    pub retired_public_key_paths: Vec<String>,
    /// Issuer claim embedded in and required from every token.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Audience claim embedded in and required from every token.
    #[serde(default = "default_audience")]
    pub audience: String,
    /// Access token TTL in minutes.
    #[serde(default = "default_access_ttl")]
    pub access_ttl_minutes: u64,
    /// Identity token TTL in minutes.
    #[serde(default = "default_identity_ttl")]
    pub identity_ttl_minutes: u64,
    /// Refresh token TTL in days.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_days: u64,
    /// Clock-skew leeway in seconds applied during verification.
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            private_key_path: default_private_key_path(),
            retired_public_key_paths: Vec::new(),
            issuer: default_issuer(),
            audience: default_audience(),
            access_ttl_minutes: default_access_ttl(),
            identity_ttl_minutes: default_identity_ttl(),
            refresh_ttl_days: default_refresh_ttl(),
            leeway_seconds: default_leeway(),
        }
    }
}

fn default_private_key_path() -> String {
    "config/keys/signing.pem".to_string()
}

fn default_issuer() -> String {
    "https://keygate.local".to_string()
}

fn default_audience() -> String {
    "keygate-api".to_string()
}

fn default_access_ttl() -> u64 {
    15
}

fn default_identity_ttl() -> u64 {
    60
}

fn default_refresh_ttl() -> u64 {
    14
}

fn default_leeway() -> u64 {
    5
}
