//! RSA key material and JWKS export.
//!
//! The private key signs; verification uses a keyring of decoding keys
//! indexed by key id, so tokens signed under a retired key keep verifying
//! for as long as the retired public key remains configured.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use keygate_core::config::token::TokenConfig;
use keygate_core::error::{AppError, ErrorKind};
use keygate_core::result::AppResult;

/// A published JSON Web Key Set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    /// All public verification keys, current first.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Serialize this JWKS to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> AppResult<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    /// Find a key by `kid` (Key ID).
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// A single RSA public key in JWK form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type, always `"RSA"`.
    pub kty: String,
    /// Intended use, always `"sig"`.
    #[serde(rename = "use")]
    pub key_use: String,
    /// Algorithm, always `"RS256"`.
    pub alg: String,
    /// Key identifier derived from the public key hash.
    pub kid: String,
    /// Modulus, base64url without padding.
    pub n: String,
    /// Public exponent, base64url without padding.
    pub e: String,
}

impl Jwk {
    /// Build a JWK from an `RsaPublicKey` and its derived key id.
    fn from_public_key(public_key: &RsaPublicKey, kid: &str) -> Self {
        Self {
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            alg: "RS256".to_string(),
            kid: kid.to_string(),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }
}

/// Loaded signing and verification key material.
///
/// Constructed once at startup and shared; never reloaded mid-process.
pub struct KeyMaterial {
    /// Key id of the current signing key.
    kid: String,
    /// Signing key.
    encoding_key: EncodingKey,
    /// Verification keys by kid (current + retired).
    decoding_keys: HashMap<String, DecodingKey>,
    /// Published key set.
    jwks: Jwks,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial").field("kid", &self.kid).finish()
    }
}

impl KeyMaterial {
    /// Load key material from the configured PEM files.
    pub fn load(config: &TokenConfig) -> AppResult<Self> {
        let private_pem = std::fs::read_to_string(&config.private_key_path).map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Failed to read private key '{}'", config.private_key_path),
                e,
            )
        })?;

        let mut retired = Vec::with_capacity(config.retired_public_key_paths.len());
        for path in &config.retired_public_key_paths {
            let pem = std::fs::read_to_string(path).map_err(|e| {
                AppError::with_source(
                    ErrorKind::Configuration,
                    format!("Failed to read retired public key '{path}'"),
                    e,
                )
            })?;
            retired.push(pem);
        }

        Self::from_pems(&private_pem, &retired)
    }

    /// Build key material from in-memory PEM strings.
    pub fn from_pems(private_pem: &str, retired_public_pems: &[String]) -> AppResult<Self> {
        let private_key = decode_private_key(private_pem)?;
        let public_key = RsaPublicKey::from(&private_key);
        let kid = derive_kid(&public_key)?;
        let public_pem = encode_public_pem(&public_key)?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Failed to load signing key", e)
        })?;

        let mut decoding_keys = HashMap::new();
        let mut jwk_list = vec![Jwk::from_public_key(&public_key, &kid)];
        decoding_keys.insert(kid.clone(), decoding_key_from_pem(&public_pem)?);

        for pem in retired_public_pems {
            let retired_public = RsaPublicKey::from_public_key_pem(pem).map_err(|e| {
                AppError::with_source(
                    ErrorKind::Configuration,
                    "Failed to parse retired public key",
                    e,
                )
            })?;
            let retired_kid = derive_kid(&retired_public)?;
            jwk_list.push(Jwk::from_public_key(&retired_public, &retired_kid));
            decoding_keys.insert(retired_kid, decoding_key_from_pem(pem)?);
        }

        Ok(Self {
            kid,
            encoding_key,
            decoding_keys,
            jwks: Jwks { keys: jwk_list },
        })
    }

    /// Key id of the current signing key.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The signing key.
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Look up a verification key by kid.
    pub fn decoding_key(&self, kid: &str) -> Option<&DecodingKey> {
        self.decoding_keys.get(kid)
    }

    /// The published key set.
    pub fn jwks(&self) -> &Jwks {
        &self.jwks
    }
}

/// Derive a key id from the SHA-256 of the public key's DER encoding.
fn derive_kid(public_key: &RsaPublicKey) -> AppResult<String> {
    let der = public_key.to_public_key_der().map_err(|e| {
        AppError::with_source(ErrorKind::Configuration, "Failed to encode public key", e)
    })?;
    let digest = Sha256::digest(der.as_bytes());
    let encoded = URL_SAFE_NO_PAD.encode(digest);
    Ok(encoded[..16].to_string())
}

fn encode_public_pem(public_key: &RsaPublicKey) -> AppResult<String> {
    public_key.to_public_key_pem(LineEnding::LF).map_err(|e| {
        AppError::with_source(ErrorKind::Configuration, "Failed to encode public key", e)
    })
}

fn decoding_key_from_pem(pem: &str) -> AppResult<DecodingKey> {
    DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
        AppError::with_source(
            ErrorKind::Configuration,
            "Failed to load verification key",
            e,
        )
    })
}

fn decode_private_key(pem: &str) -> AppResult<RsaPrivateKey> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
        return Ok(key);
    }
    Err(AppError::configuration(
        "Private key is not valid PKCS#8 or PKCS#1 PEM",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys::{RETIRED_PUBLIC_KEY_PEM, TEST_PRIVATE_KEY_PEM};

    #[test]
    fn loads_and_derives_kid() {
        let material = KeyMaterial::from_pems(TEST_PRIVATE_KEY_PEM, &[]).unwrap();
        assert_eq!(material.kid().len(), 16);
        assert!(material.decoding_key(material.kid()).is_some());
        assert!(material.decoding_key("unknown").is_none());
    }

    #[test]
    fn jwks_exports_current_and_retired_keys() {
        let material = KeyMaterial::from_pems(
            TEST_PRIVATE_KEY_PEM,
            &[RETIRED_PUBLIC_KEY_PEM.to_string()],
        )
        .unwrap();

        let jwks = material.jwks();
        assert_eq!(jwks.keys.len(), 2);
        for jwk in &jwks.keys {
            assert_eq!(jwk.kty, "RSA");
            assert_eq!(jwk.key_use, "sig");
            assert_eq!(jwk.alg, "RS256");
            assert!(!jwk.n.is_empty());
            assert!(!jwk.e.is_empty());
        }
        // The retired key's kid resolves to a verification key too.
        let retired_kid = &jwks.keys[1].kid;
        assert!(material.decoding_key(retired_kid).is_some());
    }

    #[test]
    fn jwks_json_shape() {
        let material = KeyMaterial::from_pems(TEST_PRIVATE_KEY_PEM, &[]).unwrap();
        let json = material.jwks().to_json_pretty().unwrap();
        assert!(json.contains("\"kty\""));
        assert!(json.contains("\"use\""));
        assert!(json.contains("\"n\""));
        assert!(json.contains("\"e\""));
    }

    #[test]
    fn rejects_garbage_private_key() {
        assert!(KeyMaterial::from_pems("not a key", &[]).is_err());
    }
}
