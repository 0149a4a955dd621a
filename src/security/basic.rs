//! Basic auth verification.
//!
//! When the policy supplies a custom `decode_resource`, it is delegated to
//! entirely and must return the resource identity. Otherwise the token is a
//! base64 `username:password` pair, the configured login predicate decides,
//! and `{sub: username}` is synthesized on success.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use tracing::error;

use crate::identity::ResourceIdentity;
use crate::policy::{DecodeResourceFn, LoginFn};
use crate::request::Request;
use crate::security::AuthError;

pub fn verify_token(
    login: Option<&Arc<LoginFn>>,
    decode_resource: Option<&Arc<DecodeResourceFn>>,
    token: &str,
    req: &Request,
) -> Result<ResourceIdentity, AuthError> {
    if let Some(decode) = decode_resource {
        return decode(token, req).map_err(|e| {
            error!(error = %e, "custom resource decoder failed");
            AuthError::InvalidToken
        });
    }
    let login = login.ok_or_else(|| {
        AuthError::Misconfigured("basic policy has no login function".to_string())
    })?;
    let decoded = general_purpose::STANDARD
        .decode(token)
        .map_err(|_| AuthError::InvalidFormat)?;
    let pair = String::from_utf8(decoded).map_err(|_| AuthError::InvalidFormat)?;
    let (username, password) = pair.split_once(':').ok_or(AuthError::InvalidFormat)?;
    let ok = login(username, password).map_err(|e| {
        error!(error = %e, "login predicate failed");
        AuthError::InvalidToken
    })?;
    if !ok {
        return Err(AuthError::InvalidLogin);
    }
    Ok(ResourceIdentity::from_subject(username))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    fn encode(pair: &str) -> String {
        general_purpose::STANDARD.encode(pair)
    }

    #[test]
    fn valid_login_synthesizes_subject() {
        let login: Arc<LoginFn> = Arc::new(|u, p| Ok(u == "alice" && p == "wonderland"));
        let req = Request::new(Method::GET, "/");
        let identity =
            verify_token(Some(&login), None, &encode("alice:wonderland"), &req).unwrap();
        assert_eq!(identity.subject(), Some("alice"));
    }

    #[test]
    fn failed_login_is_rejected() {
        let login: Arc<LoginFn> = Arc::new(|_, _| Ok(false));
        let req = Request::new(Method::GET, "/");
        let err = verify_token(Some(&login), None, &encode("alice:nope"), &req).unwrap_err();
        assert!(matches!(err, AuthError::InvalidLogin));
    }

    #[test]
    fn malformed_tokens_are_format_errors() {
        let login: Arc<LoginFn> = Arc::new(|_, _| Ok(true));
        let req = Request::new(Method::GET, "/");
        assert!(matches!(
            verify_token(Some(&login), None, "!!!", &req).unwrap_err(),
            AuthError::InvalidFormat
        ));
        assert!(matches!(
            verify_token(Some(&login), None, &encode("no-colon"), &req).unwrap_err(),
            AuthError::InvalidFormat
        ));
    }

    #[test]
    fn custom_decoder_takes_over() {
        let decode: Arc<DecodeResourceFn> =
            Arc::new(|token, _req| Ok(ResourceIdentity::new(json!({ "sub": token }))));
        let login: Arc<LoginFn> = Arc::new(|_, _| Ok(false));
        let req = Request::new(Method::GET, "/");
        let identity = verify_token(Some(&login), Some(&decode), "raw-token", &req).unwrap();
        assert_eq!(identity.subject(), Some("raw-token"));
    }
}
