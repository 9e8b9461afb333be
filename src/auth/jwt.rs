//! JWT token validation
//!
//! Tokens are minted by the external auth service with a shared HS256 secret.
//! Agora validates signature and expiry and extracts the caller identity.

use hyper::header::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AgoraError, Result, UserId};

/// JWT claims shared with the auth service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id
    pub sub: Uuid,
    /// Expiry (unix seconds)
    pub exp: usize,
    /// Whether the user holds the admin role
    #[serde(default)]
    pub admin: bool,
}

/// An authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub admin: bool,
}

/// Extract a bearer token from an Authorization header value
pub fn extract_token_from_header(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validates bearer tokens and produces caller identities
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    dev_mode: bool,
}

impl TokenValidator {
    pub fn new(secret: &str, dev_mode: bool) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            dev_mode,
        }
    }

    /// Validate a raw token string
    pub fn validate(&self, token: &str) -> Result<Identity> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AgoraError::Unauthenticated)?;
        Ok(Identity {
            user_id: UserId(data.claims.sub),
            admin: data.claims.admin,
        })
    }

    /// Identify the caller from request headers.
    ///
    /// Returns `None` for anonymous callers (no credentials at all); an
    /// invalid or expired credential is an error, not anonymity.
    pub fn identify(&self, headers: &HeaderMap) -> Result<Option<Identity>> {
        // Dev mode: X-Dev-User short-circuits token validation
        if self.dev_mode {
            if let Some(dev_user) = headers.get("x-dev-user").and_then(|h| h.to_str().ok()) {
                let user_id = Uuid::parse_str(dev_user)
                    .map(UserId)
                    .map_err(|_| AgoraError::BadRequest("Invalid X-Dev-User header".into()))?;
                let admin = headers
                    .get("x-dev-admin")
                    .and_then(|h| h.to_str().ok())
                    .map(|v| v == "true")
                    .unwrap_or(false);
                return Ok(Some(Identity { user_id, admin }));
            }
        }

        let Some(header) = headers.get("authorization").and_then(|h| h.to_str().ok()) else {
            return Ok(None);
        };
        let token =
            extract_token_from_header(header).ok_or(AgoraError::Unauthenticated)?;
        self.validate(token).map(Some)
    }

    /// Identify the caller, rejecting anonymous callers
    pub fn require(&self, headers: &HeaderMap) -> Result<Identity> {
        self.identify(headers)?.ok_or(AgoraError::Unauthenticated)
    }

    /// Identify the caller, rejecting anyone without the admin role
    pub fn require_admin(&self, headers: &HeaderMap) -> Result<Identity> {
        let identity = self.require(headers)?;
        if !identity.admin {
            return Err(AgoraError::Forbidden("admin role required".into()));
        }
        Ok(identity)
    }
}
