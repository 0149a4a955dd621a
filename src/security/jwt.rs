//! JWT verification against the policy's declared key source.
//!
//! A token is verified against a fixed symmetric key, a single inline JWK, or
//! a JWKS endpoint. For JWKS, every key in the cached set is tried in turn and
//! the payload of the first key that validates wins; if none validate the
//! cache entry is invalidated so the next request refetches (accommodating key
//! rotation), and the token is rejected.

use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::identity::ResourceIdentity;
use crate::policy::JwtKeySource;
use crate::security::jwks::JwksCache;
use crate::security::AuthError;

/// Clock skew tolerated when validating time-based claims, in seconds.
const LEEWAY_SECS: u64 = 30;

/// Verify `token` against the given key source, returning the verified claims.
pub fn verify(
    source: &JwtKeySource,
    token: &str,
    jwks: &JwksCache,
) -> Result<ResourceIdentity, AuthError> {
    let header = jsonwebtoken::decode_header(token).map_err(|_| AuthError::InvalidToken)?;
    let alg = header.alg;
    match source {
        JwtKeySource::SignatureKey(secret) => {
            if !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
                return Err(AuthError::InvalidToken);
            }
            let key = DecodingKey::from_secret(secret.as_bytes());
            decode_claims(token, &key, alg)
        }
        JwtKeySource::PublicJwk(jwk) => {
            let key = decoding_key_for(jwk).ok_or(AuthError::InvalidToken)?;
            decode_claims(token, &key, alg)
        }
        JwtKeySource::JwksUrl(url) => {
            let keys = jwks
                .get_keys(url)
                .map_err(|e| AuthError::Upstream(e.to_string()))?;
            for jwk in &keys {
                // Every key is tried; kid is not used to pre-filter since
                // rotation can leave tokens whose kid is no longer advertised.
                let Some(key) = decoding_key_for(jwk) else {
                    continue;
                };
                if let Ok(identity) = decode_claims(token, &key, alg) {
                    return Ok(identity);
                }
            }
            debug!(url = %url, tried = keys.len(), "no JWKS key verified the token");
            jwks.invalidate(url);
            Err(AuthError::InvalidToken)
        }
    }
}

fn decode_claims(
    token: &str,
    key: &DecodingKey,
    alg: Algorithm,
) -> Result<ResourceIdentity, AuthError> {
    let mut validation = Validation::new(alg);
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp"]);
    validation.leeway = LEEWAY_SECS;
    let data = jsonwebtoken::decode::<Value>(token, key, &validation)
        .map_err(|_| AuthError::InvalidToken)?;
    Ok(ResourceIdentity::new(data.claims))
}

/// Build a decoding key from a JWK object. Supports symmetric (`oct`) keys and
/// RSA public keys; unsupported key types yield `None` and are skipped.
fn decoding_key_for(jwk: &Value) -> Option<DecodingKey> {
    let kty = jwk.get("kty").and_then(Value::as_str)?;
    if kty.eq_ignore_ascii_case("oct") {
        let k = jwk.get("k").and_then(Value::as_str)?;
        let secret = general_purpose::URL_SAFE_NO_PAD.decode(k).ok()?;
        return Some(DecodingKey::from_secret(&secret));
    }
    if kty.eq_ignore_ascii_case("RSA") {
        let n = jwk.get("n").and_then(Value::as_str)?;
        let e = jwk.get("e").and_then(Value::as_str)?;
        return DecodingKey::from_rsa_components(n, e).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn token_with(secret: &str, claims: Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn exp_in(secs: i64) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
            + secs
    }

    #[test]
    fn verifies_against_fixed_signature_key() {
        let token = token_with("topsecret", json!({ "sub": "alice", "exp": exp_in(600) }));
        let cache = JwksCache::with_default_ttl(std::time::Duration::from_secs(300));
        let identity = verify(
            &JwtKeySource::SignatureKey("topsecret".into()),
            &token,
            &cache,
        )
        .unwrap();
        assert_eq!(identity.subject(), Some("alice"));
    }

    #[test]
    fn rejects_wrong_key_and_expired_tokens() {
        let cache = JwksCache::with_default_ttl(std::time::Duration::from_secs(300));
        let wrong = token_with("other", json!({ "sub": "alice", "exp": exp_in(600) }));
        assert!(verify(&JwtKeySource::SignatureKey("topsecret".into()), &wrong, &cache).is_err());

        let expired = token_with("topsecret", json!({ "sub": "alice", "exp": exp_in(-600) }));
        assert!(
            verify(&JwtKeySource::SignatureKey("topsecret".into()), &expired, &cache).is_err()
        );
    }

    #[test]
    fn verifies_against_inline_oct_jwk() {
        let secret = b"inline-jwk-secret";
        let jwk = json!({
            "kty": "oct",
            "alg": "HS256",
            "k": general_purpose::URL_SAFE_NO_PAD.encode(secret),
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "bob", "exp": exp_in(600) }),
            &EncodingKey::from_secret(secret),
        )
        .unwrap();
        let cache = JwksCache::with_default_ttl(std::time::Duration::from_secs(300));
        let identity = verify(&JwtKeySource::PublicJwk(jwk), &token, &cache).unwrap();
        assert_eq!(identity.subject(), Some("bob"));
    }

    #[test]
    fn garbage_tokens_are_invalid() {
        let cache = JwksCache::with_default_ttl(std::time::Duration::from_secs(300));
        assert!(matches!(
            verify(
                &JwtKeySource::SignatureKey("topsecret".into()),
                "not.a.jwt",
                &cache
            ),
            Err(AuthError::InvalidToken)
        ));
    }
}
