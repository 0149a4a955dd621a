//! # Security Module
//!
//! Credential verification for the middleware chain.
//!
//! ## Overview
//!
//! The [`Authenticator`] takes a route's [`AuthPolicy`] and a parsed request,
//! extracts the credential header, dispatches on the policy's closed
//! authentication-method union, and returns the verified
//! [`ResourceIdentity`](crate::identity::ResourceIdentity) or a typed
//! [`AuthError`].
//!
//! ## Error taxonomy
//!
//! - Missing or malformed credentials are authentication failures (401).
//! - Invalid credentials and failed logins are authorization failures (403).
//! - A policy that cannot be evaluated (e.g. Basic without a login function)
//!   is a configuration failure (500); these are bugs in the embedding
//!   application and are logged distinctly.
//! - Upstream trouble (JWKS fetch errors) is logged at error level with the
//!   real cause but surfaces to callers as a generic invalid-token rejection,
//!   so infrastructure state is not leaked.

pub mod basic;
pub mod hmac;
pub mod jwks;
pub mod jwt;

use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use crate::identity::ResourceIdentity;
use crate::policy::{AuthMethod, AuthPolicy};
use crate::request::Request;

pub use jwks::{JwksCache, JwksError};

/// Authentication failure, with the HTTP status it maps to.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No Authorization token provided.")]
    MissingToken,
    #[error("Invalid Authorization token format.")]
    InvalidFormat,
    #[error("Invalid Authorization token.")]
    InvalidToken,
    #[error("Invalid Authorization login.")]
    InvalidLogin,
    /// Server misconfiguration, not the caller's fault.
    #[error("{0}")]
    Misconfigured(String),
    /// Upstream infrastructure failure (e.g. JWKS fetch). Logged with its
    /// real cause; presented to callers as an invalid token.
    #[error("{0}")]
    Upstream(String),
}

impl AuthError {
    /// HTTP status for this failure.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            AuthError::MissingToken | AuthError::InvalidFormat => 401,
            AuthError::InvalidToken | AuthError::InvalidLogin | AuthError::Upstream(_) => 403,
            AuthError::Misconfigured(_) => 500,
        }
    }

    /// Message safe to return to the caller. Upstream causes are masked.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Upstream(_) => "Invalid Authorization token.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Verifies request credentials against a route's policy.
///
/// Owns nothing but a shared [`JwksCache`]; construct one per service and
/// reuse it across routes so JWKS fetches are shared.
pub struct Authenticator {
    jwks: Arc<JwksCache>,
}

impl Authenticator {
    #[must_use]
    pub fn new(jwks: Arc<JwksCache>) -> Self {
        Self { jwks }
    }

    /// The shared JWKS cache, for embedders that want to pre-warm or clear it.
    #[must_use]
    pub fn jwks(&self) -> &Arc<JwksCache> {
        &self.jwks
    }

    /// Run the full credential verification state machine for one request.
    pub fn verify(
        &self,
        policy: &AuthPolicy,
        req: &Request,
    ) -> Result<ResourceIdentity, AuthError> {
        let header = req
            .header(policy.header_name())
            .ok_or(AuthError::MissingToken)?;
        match &policy.method {
            AuthMethod::Basic {
                login,
                decode_resource,
            } => {
                let token = strip_prefix(header, policy.token_prefix())?;
                basic::verify_token(login.as_ref(), decode_resource.as_ref(), token, req)
            }
            AuthMethod::Jwt(source) => {
                let token = strip_prefix(header, policy.token_prefix())?;
                jwt::verify(source, token, &self.jwks)
            }
            AuthMethod::Hmac {
                secret_keys,
                replay_guard,
            } => hmac::verify_request(
                secret_keys,
                replay_guard.as_deref(),
                header,
                &req.method,
                &req.path,
                req.body.as_ref(),
            ),
        }
    }
}

/// Split the header into prefix and token on the first space; the prefix must
/// match the policy's configured or default prefix.
fn strip_prefix<'a>(header: &'a str, expected: &str) -> Result<&'a str, AuthError> {
    let (prefix, token) = header.split_once(' ').ok_or(AuthError::InvalidFormat)?;
    if prefix != expected {
        return Err(AuthError::InvalidFormat);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(AuthError::MissingToken.status(), 401);
        assert_eq!(AuthError::InvalidFormat.status(), 401);
        assert_eq!(AuthError::InvalidToken.status(), 403);
        assert_eq!(AuthError::InvalidLogin.status(), 403);
        assert_eq!(AuthError::Misconfigured("x".into()).status(), 500);
        assert_eq!(AuthError::Upstream("dns".into()).status(), 403);
    }

    #[test]
    fn upstream_cause_is_masked() {
        let err = AuthError::Upstream("connection refused to 10.0.0.5".into());
        assert_eq!(err.public_message(), "Invalid Authorization token.");
    }

    #[test]
    fn prefix_must_match_exactly() {
        assert_eq!(strip_prefix("Bearer abc", "Bearer").unwrap(), "abc");
        assert!(strip_prefix("bearer abc", "Bearer").is_err());
        assert!(strip_prefix("abc", "Bearer").is_err());
    }
}
