//! Token creation with kind-specific TTLs.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, Header, encode};
use uuid::Uuid;

use keygate_core::config::token::TokenConfig;
use keygate_core::error::AppError;
use keygate_core::result::AppResult;

use super::claims::{TokenClaims, TokenKind};
use super::keys::KeyMaterial;

/// Creates signed tokens of all three kinds.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    /// Signing key material.
    keys: Arc<KeyMaterial>,
    /// Issuer claim.
    issuer: String,
    /// Audience claim.
    audience: String,
    /// Access token TTL in minutes.
    access_ttl_minutes: i64,
    /// Identity token TTL in minutes.
    identity_ttl_minutes: i64,
    /// Refresh token TTL in days.
    refresh_ttl_days: i64,
}

/// A signed token together with its metadata.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// The encoded token string.
    pub token: String,
    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
    /// One-time rotation identifier; present on refresh tokens only.
    pub jti: Option<Uuid>,
}

/// The access/refresh/identity triple issued at login, or the
/// access/refresh pair issued on rotation (identity token absent).
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Short-lived access token.
    pub access_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Identity token; only issued at login.
    pub identity_token: Option<String>,
    /// Access token expiration timestamp.
    pub access_expires_at: DateTime<Utc>,
    /// Refresh token expiration timestamp.
    pub refresh_expires_at: DateTime<Utc>,
    /// The new refresh token's one-time identifier.
    pub refresh_jti: Uuid,
}

impl TokenIssuer {
    /// Creates a new issuer from token configuration.
    pub fn new(keys: Arc<KeyMaterial>, config: &TokenConfig) -> Self {
        Self {
            keys,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl_minutes: config.access_ttl_minutes as i64,
            identity_ttl_minutes: config.identity_ttl_minutes as i64,
            refresh_ttl_days: config.refresh_ttl_days as i64,
        }
    }

    /// Issue a single token of the given kind.
    pub fn issue(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        session_id: Uuid,
        role: &str,
    ) -> AppResult<SignedToken> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => Duration::minutes(self.access_ttl_minutes),
            TokenKind::Identity => Duration::minutes(self.identity_ttl_minutes),
            TokenKind::Refresh => Duration::days(self.refresh_ttl_days),
        };
        let expires_at = now + ttl;
        let jti = matches!(kind, TokenKind::Refresh).then(Uuid::new_v4);

        let claims = TokenClaims {
            sub: user_id,
            sid: session_id,
            role: role.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti,
            kind,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.keys.kid().to_string());

        let token = encode(&header, &claims, self.keys.encoding_key())
            .map_err(|e| AppError::internal(format!("Failed to encode {kind} token: {e}")))?;

        Ok(SignedToken {
            token,
            expires_at,
            jti,
        })
    }

    /// Issue the full access/refresh/identity triple for a fresh login.
    pub fn issue_login_set(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        role: &str,
    ) -> AppResult<TokenSet> {
        let access = self.issue(TokenKind::Access, user_id, session_id, role)?;
        let refresh = self.issue(TokenKind::Refresh, user_id, session_id, role)?;
        let identity = self.issue(TokenKind::Identity, user_id, session_id, role)?;

        Ok(TokenSet {
            access_token: access.token,
            refresh_token: refresh.token,
            identity_token: Some(identity.token),
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
            refresh_jti: refresh
                .jti
                .ok_or_else(|| AppError::internal("Refresh token issued without jti"))?,
        })
    }

    /// Issue the access/refresh pair handed out on rotation.
    pub fn issue_rotation_set(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        role: &str,
    ) -> AppResult<TokenSet> {
        let access = self.issue(TokenKind::Access, user_id, session_id, role)?;
        let refresh = self.issue(TokenKind::Refresh, user_id, session_id, role)?;

        Ok(TokenSet {
            access_token: access.token,
            refresh_token: refresh.token,
            identity_token: None,
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
            refresh_jti: refresh
                .jti
                .ok_or_else(|| AppError::internal("Refresh token issued without jti"))?,
        })
    }
}
