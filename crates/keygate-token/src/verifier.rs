//! Token validation with per-kid key selection and kind checking.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, Validation, decode, decode_header};

use keygate_core::config::token::TokenConfig;
use keygate_core::error::{AppError, ErrorKind};
use keygate_core::result::AppResult;

use super::claims::{TokenClaims, TokenKind};
use super::keys::KeyMaterial;

/// Validates token strings against the verification keyring.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    /// Verification key material.
    keys: Arc<KeyMaterial>,
    /// Required issuer claim.
    issuer: String,
    /// Required audience claim.
    audience: String,
    /// Clock-skew leeway in seconds.
    leeway_seconds: u64,
}

impl TokenVerifier {
    /// Creates a new verifier from token configuration.
    pub fn new(keys: Arc<KeyMaterial>, config: &TokenConfig) -> Self {
        Self {
            keys,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            leeway_seconds: config.leeway_seconds,
        }
    }

    /// Decode and validate a token, requiring the expected kind.
    ///
    /// Checks, in order: header shape and algorithm, key id against the
    /// keyring, signature, `exp`/`nbf`/`iss`/`aud`, and finally the kind
    /// discriminator. Kind confusion is a hard failure with its own error
    /// kind, never a fallthrough.
    pub fn verify(&self, token: &str, expected: TokenKind) -> AppResult<TokenClaims> {
        let header = decode_header(token).map_err(|e| {
            AppError::with_source(ErrorKind::TokenMalformed, "Malformed token header", e)
        })?;

        if header.alg != Algorithm::RS256 {
            return Err(AppError::new(
                ErrorKind::TokenMalformed,
                "Unsupported token algorithm",
            ));
        }

        let kid = header
            .kid
            .ok_or_else(|| AppError::new(ErrorKind::TokenUnknownKey, "Token has no key id"))?;

        let decoding_key = self
            .keys
            .decoding_key(&kid)
            .ok_or_else(|| AppError::new(ErrorKind::TokenUnknownKey, "Unknown token key id"))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_nbf = true;
        validation.leeway = self.leeway_seconds;

        let data = decode::<TokenClaims>(token, decoding_key, &validation)
            .map_err(map_decode_error)?;

        if data.claims.kind != expected {
            return Err(AppError::new(
                ErrorKind::TokenWrongKind,
                format!("Expected {expected} token"),
            ));
        }

        Ok(data.claims)
    }
}

/// Map jsonwebtoken failures onto the error taxonomy. Expired tokens are the
/// only decode failure with their own kind; everything else is malformed.
fn map_decode_error(err: jsonwebtoken::errors::Error) -> AppError {
    use jsonwebtoken::errors::ErrorKind as JwtKind;

    let (kind, message) = match err.kind() {
        JwtKind::ExpiredSignature => (ErrorKind::TokenExpired, "Token has expired"),
        JwtKind::ImmatureSignature => (ErrorKind::TokenMalformed, "Token is not yet valid"),
        JwtKind::InvalidIssuer => (ErrorKind::TokenMalformed, "Invalid token issuer"),
        JwtKind::InvalidAudience => (ErrorKind::TokenMalformed, "Invalid token audience"),
        _ => (ErrorKind::TokenMalformed, "Invalid token"),
    };
    AppError::with_source(kind, message, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::TokenIssuer;
    use crate::test_keys::TEST_PRIVATE_KEY_PEM;
    use chrono::Utc;
    use jsonwebtoken::{Header, encode};
    use uuid::Uuid;

    fn setup() -> (TokenIssuer, TokenVerifier, Arc<KeyMaterial>) {
        let config = TokenConfig::default();
        let keys = Arc::new(KeyMaterial::from_pems(TEST_PRIVATE_KEY_PEM, &[]).unwrap());
        (
            TokenIssuer::new(Arc::clone(&keys), &config),
            TokenVerifier::new(Arc::clone(&keys), &config),
            keys,
        )
    }

    #[test]
    fn round_trips_every_kind() {
        let (issuer, verifier, _) = setup();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        for kind in [TokenKind::Access, TokenKind::Refresh, TokenKind::Identity] {
            let signed = issuer.issue(kind, user_id, session_id, "member").unwrap();
            let claims = verifier.verify(&signed.token, kind).unwrap();
            assert_eq!(claims.user_id(), user_id);
            assert_eq!(claims.session_id(), session_id);
            assert_eq!(claims.kind, kind);
            assert_eq!(claims.jti.is_some(), kind == TokenKind::Refresh);
        }
    }

    #[test]
    fn kind_confusion_is_a_hard_failure() {
        let (issuer, verifier, _) = setup();
        let signed = issuer
            .issue(TokenKind::Refresh, Uuid::new_v4(), Uuid::new_v4(), "member")
            .unwrap();

        let err = verifier.verify(&signed.token, TokenKind::Access).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenWrongKind);
    }

    #[test]
    fn expired_token_is_distinct_from_malformed() {
        let (_, verifier, keys) = setup();
        let config = TokenConfig::default();

        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            sid: Uuid::new_v4(),
            role: "member".to_string(),
            iss: config.issuer.clone(),
            aud: config.audience.clone(),
            iat: now - 600,
            nbf: now - 600,
            exp: now - 300,
            jti: None,
            kind: TokenKind::Access,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(keys.kid().to_string());
        let token = encode(&header, &claims, keys.encoding_key()).unwrap();

        let err = verifier.verify(&token, TokenKind::Access).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenExpired);

        let err = verifier.verify("not.a.token", TokenKind::Access).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenMalformed);
    }

    #[test]
    fn unknown_kid_is_rejected() {
        let (_, verifier, keys) = setup();
        let config = TokenConfig::default();

        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            sid: Uuid::new_v4(),
            role: "member".to_string(),
            iss: config.issuer.clone(),
            aud: config.audience.clone(),
            iat: now,
            nbf: now,
            exp: now + 300,
            jti: None,
            kind: TokenKind::Access,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("retired-elsewhere".to_string());
        let token = encode(&header, &claims, keys.encoding_key()).unwrap();

        let err = verifier.verify(&token, TokenKind::Access).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenUnknownKey);
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let (issuer, _, keys) = setup();
        let mut other_config = TokenConfig::default();
        other_config.audience = "another-service".to_string();
        let strict = TokenVerifier::new(keys, &other_config);

        let signed = issuer
            .issue(TokenKind::Access, Uuid::new_v4(), Uuid::new_v4(), "member")
            .unwrap();
        let err = strict.verify(&signed.token, TokenKind::Access).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenMalformed);
    }
}
