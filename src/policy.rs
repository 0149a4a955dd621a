//! # Auth Policy Module
//!
//! Route-level authentication and authorization policy.
//!
//! ## Overview
//!
//! A route owner declares an [`PolicySpec`]: a loose, structurally-discriminated
//! shape naming exactly one authentication method (Basic, JWT, or HMAC) and at
//! most one access-check family (permissions, roles, or scopes). The spec shape
//! mirrors the JSON contract metadata the embedding application attaches to a
//! route.
//!
//! The loose shape is discriminated **once**, at construction, by
//! [`AuthPolicy::from_spec`], which produces a closed [`AuthMethod`] tagged
//! union. Per-request code pattern-matches the enum and can never observe a
//! policy that matches zero or multiple methods; those are rejected loudly here
//! with [`PolicyError::InvalidAuthMethod`] / [`PolicyError::AmbiguousAuthMethod`].
//!
//! ## Mapping functions
//!
//! Permission/role/scope sets are never computed by this crate. The embedding
//! application supplies mapping functions (`map_permissions`, `map_roles`,
//! `surface_scopes`) that translate a verified [`ResourceIdentity`] plus the
//! request into a set of strings. Declaring a check without its mapping
//! function is a configuration error that fails closed at request time with a
//! 500 verdict.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::identity::ResourceIdentity;
use crate::request::Request;
use crate::security::hmac::ReplayGuard;

/// Login predicate for Basic auth: `(username, password) -> authenticated?`.
pub type LoginFn = dyn Fn(&str, &str) -> anyhow::Result<bool> + Send + Sync;

/// Custom Basic-auth decoder: given the raw token and request, produce the
/// resource identity directly. When supplied it replaces the default
/// `username:password` + login flow entirely.
pub type DecodeResourceFn =
    dyn Fn(&str, &Request) -> anyhow::Result<ResourceIdentity> + Send + Sync;

/// Derives a subject's permission/role/scope set from verified identity and
/// request. May perform I/O (e.g. a database lookup).
pub type MapFn = dyn Fn(&ResourceIdentity, &Request) -> anyhow::Result<HashSet<String>> + Send + Sync;

/// Errors raised while constructing an [`AuthPolicy`] from its loose spec.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// No authentication method matched the declared shape.
    #[error("invalid auth method: policy declares no authentication method")]
    InvalidAuthMethod,
    /// More than one authentication method matched the declared shape.
    #[error("invalid auth method: policy declares multiple authentication methods")]
    AmbiguousAuthMethod,
    /// A `jwt` block was declared without any key source.
    #[error("jwt policy declares no signature key, JWKS key, or JWKS URL")]
    MissingJwtKeySource,
    /// An `hmac` block was declared without secret keys.
    #[error("hmac policy declares no secret keys")]
    MissingHmacSecrets,
    /// Permission and role (or scope) checks were declared together.
    #[error("policy declares more than one access-check family")]
    AmbiguousAccessCheck,
    /// A scope hierarchy was declared without a required scope, or vice versa.
    #[error("scope check requires both a hierarchy and a required scope")]
    IncompleteScopeCheck,
}

/// Basic auth declaration within a [`PolicySpec`].
#[derive(Clone, Default)]
pub struct BasicSpec {
    /// Login predicate; its presence is what classifies the policy as "basic".
    pub login: Option<Arc<LoginFn>>,
    /// Optional custom decoder that fully replaces the login flow.
    pub decode_resource: Option<Arc<DecodeResourceFn>>,
}

/// JWT auth declaration within a [`PolicySpec`].
#[derive(Clone, Default)]
pub struct JwtSpec {
    /// Fixed symmetric signing key.
    pub signature_key: Option<String>,
    /// A single inline JWK to verify against.
    pub jwks_public_key: Option<Value>,
    /// URL of a JWKS endpoint to fetch keys from.
    pub jwks_public_key_url: Option<String>,
}

/// HMAC auth declaration within a [`PolicySpec`].
#[derive(Clone, Default)]
pub struct HmacSpec {
    /// Known secrets by key id.
    pub secret_keys: Option<HashMap<String, String>>,
}

/// Loose, structurally-discriminated policy shape as declared by route owners.
///
/// Exactly one of `basic`/`jwt`/`hmac` must be populated; see
/// [`discriminate`]. List fields and mapping functions are optional.
#[derive(Clone, Default)]
pub struct PolicySpec {
    pub basic: Option<BasicSpec>,
    pub jwt: Option<JwtSpec>,
    pub hmac: Option<HmacSpec>,
    pub allowed_permissions: Option<HashSet<String>>,
    pub forbidden_permissions: Option<HashSet<String>>,
    pub allowed_roles: Option<HashSet<String>>,
    pub forbidden_roles: Option<HashSet<String>>,
    /// Closed list of scopes considered valid for this route.
    pub scope_hierarchy: Option<Vec<String>>,
    /// The scope the caller must hold.
    pub required_scope: Option<String>,
    pub map_permissions: Option<Arc<MapFn>>,
    pub map_roles: Option<Arc<MapFn>>,
    pub surface_scopes: Option<Arc<MapFn>>,
    /// Credential header name; defaults to `Authorization`.
    pub header_name: Option<String>,
    /// Credential prefix override; defaults to `Bearer ` / `Basic `.
    pub token_prefix: Option<String>,
}

impl fmt::Debug for PolicySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicySpec")
            .field("basic", &self.basic.is_some())
            .field("jwt", &self.jwt.is_some())
            .field("hmac", &self.hmac.is_some())
            .field("allowed_permissions", &self.allowed_permissions)
            .field("forbidden_permissions", &self.forbidden_permissions)
            .field("allowed_roles", &self.allowed_roles)
            .field("forbidden_roles", &self.forbidden_roles)
            .field("scope_hierarchy", &self.scope_hierarchy)
            .field("required_scope", &self.required_scope)
            .finish()
    }
}

/// Authentication method tag produced by [`discriminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Basic,
    Jwt,
    Hmac,
}

/// Classify a loose policy shape as exactly one authentication method.
///
/// Classification is structural: "basic" means a non-null `basic.login`,
/// "jwt" means a `jwt` block with any key source, "hmac" means a non-null
/// `hmac.secret_keys`. Zero or multiple matches fail loudly rather than
/// silently picking one.
pub fn discriminate(spec: &PolicySpec) -> Result<AuthKind, PolicyError> {
    let mut matches = Vec::new();
    if spec.basic.as_ref().is_some_and(|b| b.login.is_some()) {
        matches.push(AuthKind::Basic);
    }
    if spec.jwt.as_ref().is_some_and(|j| {
        j.signature_key.is_some() || j.jwks_public_key.is_some() || j.jwks_public_key_url.is_some()
    }) {
        matches.push(AuthKind::Jwt);
    }
    if spec.hmac.as_ref().is_some_and(|h| h.secret_keys.is_some()) {
        matches.push(AuthKind::Hmac);
    }
    match matches.as_slice() {
        [kind] => Ok(*kind),
        [] => Err(PolicyError::InvalidAuthMethod),
        _ => Err(PolicyError::AmbiguousAuthMethod),
    }
}

/// Source of key material for JWT verification, in resolution order.
#[derive(Clone)]
pub enum JwtKeySource {
    /// Verify against a fixed symmetric key.
    SignatureKey(String),
    /// Fetch keys from a JWKS endpoint and try each in turn.
    JwksUrl(String),
    /// Verify directly against a single inline JWK.
    PublicJwk(Value),
}

impl fmt::Debug for JwtKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Never print the symmetric key
            JwtKeySource::SignatureKey(_) => f.write_str("SignatureKey(..)"),
            JwtKeySource::JwksUrl(url) => write!(f, "JwksUrl({url})"),
            JwtKeySource::PublicJwk(_) => f.write_str("PublicJwk(..)"),
        }
    }
}

/// Closed authentication-method union, built once per policy.
#[derive(Clone)]
pub enum AuthMethod {
    Basic {
        login: Option<Arc<LoginFn>>,
        decode_resource: Option<Arc<DecodeResourceFn>>,
    },
    Jwt(JwtKeySource),
    Hmac {
        secret_keys: HashMap<String, String>,
        replay_guard: Option<Arc<ReplayGuard>>,
    },
}

impl AuthMethod {
    /// The discriminant this method was classified as.
    #[must_use]
    pub fn kind(&self) -> AuthKind {
        match self {
            AuthMethod::Basic { .. } => AuthKind::Basic,
            AuthMethod::Jwt(_) => AuthKind::Jwt,
            AuthMethod::Hmac { .. } => AuthKind::Hmac,
        }
    }
}

/// Authorization check attached to a policy: at most one family.
#[derive(Clone)]
pub enum AccessCheck {
    Permissions {
        allowed: Option<HashSet<String>>,
        forbidden: Option<HashSet<String>>,
        map: Option<Arc<MapFn>>,
    },
    Roles {
        allowed: Option<HashSet<String>>,
        forbidden: Option<HashSet<String>>,
        map: Option<Arc<MapFn>>,
    },
    Scopes {
        hierarchy: Vec<String>,
        required: String,
        surface: Option<Arc<MapFn>>,
    },
}

/// Immutable per-route policy: one authentication method, at most one access
/// check, plus header/prefix overrides.
#[derive(Clone)]
pub struct AuthPolicy {
    pub method: AuthMethod,
    pub access: Option<AccessCheck>,
    pub header_name: Option<String>,
    pub token_prefix: Option<String>,
}

impl fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPolicy")
            .field("method", &self.method.kind())
            .field("access", &self.access.is_some())
            .field("header_name", &self.header_name)
            .field("token_prefix", &self.token_prefix)
            .finish()
    }
}

impl AuthPolicy {
    /// Smart constructor: discriminate the loose spec and build the closed
    /// policy. All shape errors surface here, at load time, never per request.
    pub fn from_spec(spec: PolicySpec) -> Result<Self, PolicyError> {
        let kind = discriminate(&spec)?;
        let method = match kind {
            AuthKind::Basic => {
                // discriminate() guarantees the block is present
                let basic = spec.basic.clone().unwrap_or_default();
                AuthMethod::Basic {
                    login: basic.login,
                    decode_resource: basic.decode_resource,
                }
            }
            AuthKind::Jwt => {
                let jwt = spec.jwt.clone().unwrap_or_default();
                // Resolution order is fixed: signature key, then JWKS URL,
                // then inline JWK.
                let source = if let Some(key) = jwt.signature_key {
                    JwtKeySource::SignatureKey(key)
                } else if let Some(url) = jwt.jwks_public_key_url {
                    JwtKeySource::JwksUrl(url)
                } else if let Some(jwk) = jwt.jwks_public_key {
                    JwtKeySource::PublicJwk(jwk)
                } else {
                    return Err(PolicyError::MissingJwtKeySource);
                };
                AuthMethod::Jwt(source)
            }
            AuthKind::Hmac => {
                let hmac = spec.hmac.clone().unwrap_or_default();
                let secret_keys = hmac.secret_keys.ok_or(PolicyError::MissingHmacSecrets)?;
                AuthMethod::Hmac {
                    secret_keys,
                    replay_guard: None,
                }
            }
        };

        let access = Self::build_access(&spec)?;
        Ok(Self {
            method,
            access,
            header_name: spec.header_name,
            token_prefix: spec.token_prefix,
        })
    }

    fn build_access(spec: &PolicySpec) -> Result<Option<AccessCheck>, PolicyError> {
        let has_permissions =
            spec.allowed_permissions.is_some() || spec.forbidden_permissions.is_some();
        let has_roles = spec.allowed_roles.is_some() || spec.forbidden_roles.is_some();
        let has_scopes = spec.scope_hierarchy.is_some() || spec.required_scope.is_some();
        let families = [has_permissions, has_roles, has_scopes]
            .iter()
            .filter(|f| **f)
            .count();
        if families > 1 {
            return Err(PolicyError::AmbiguousAccessCheck);
        }
        if has_permissions {
            return Ok(Some(AccessCheck::Permissions {
                allowed: spec.allowed_permissions.clone(),
                forbidden: spec.forbidden_permissions.clone(),
                map: spec.map_permissions.clone(),
            }));
        }
        if has_roles {
            return Ok(Some(AccessCheck::Roles {
                allowed: spec.allowed_roles.clone(),
                forbidden: spec.forbidden_roles.clone(),
                map: spec.map_roles.clone(),
            }));
        }
        if has_scopes {
            let (Some(hierarchy), Some(required)) =
                (spec.scope_hierarchy.clone(), spec.required_scope.clone())
            else {
                return Err(PolicyError::IncompleteScopeCheck);
            };
            return Ok(Some(AccessCheck::Scopes {
                hierarchy,
                required,
                surface: spec.surface_scopes.clone(),
            }));
        }
        Ok(None)
    }

    /// Attach a replay guard to an HMAC policy. No-op for other methods.
    #[must_use]
    pub fn with_replay_guard(mut self, guard: Arc<ReplayGuard>) -> Self {
        if let AuthMethod::Hmac { replay_guard, .. } = &mut self.method {
            *replay_guard = Some(guard);
        }
        self
    }

    /// Credential header name for this policy, defaulting to `Authorization`.
    #[must_use]
    pub fn header_name(&self) -> &str {
        self.header_name.as_deref().unwrap_or("Authorization")
    }

    /// Credential prefix for this policy. HMAC parses its own parameter list
    /// and has no prefix beyond the scheme tag.
    #[must_use]
    pub fn token_prefix(&self) -> &str {
        if let Some(prefix) = self.token_prefix.as_deref() {
            return prefix;
        }
        match self.method {
            AuthMethod::Basic { .. } => "Basic",
            AuthMethod::Jwt(_) => "Bearer",
            AuthMethod::Hmac { .. } => "HMAC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn login_ok() -> Arc<LoginFn> {
        Arc::new(|_, _| Ok(true))
    }

    #[test]
    fn discriminates_basic() {
        let spec = PolicySpec {
            basic: Some(BasicSpec {
                login: Some(login_ok()),
                decode_resource: None,
            }),
            ..Default::default()
        };
        assert_eq!(discriminate(&spec).unwrap(), AuthKind::Basic);
    }

    #[test]
    fn discriminates_jwt_and_hmac() {
        let jwt = PolicySpec {
            jwt: Some(JwtSpec {
                signature_key: Some("secret".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(discriminate(&jwt).unwrap(), AuthKind::Jwt);

        let hmac = PolicySpec {
            hmac: Some(HmacSpec {
                secret_keys: Some(HashMap::from([("k1".to_string(), "s1".to_string())])),
            }),
            ..Default::default()
        };
        assert_eq!(discriminate(&hmac).unwrap(), AuthKind::Hmac);
    }

    #[test]
    fn empty_policy_is_rejected() {
        let err = discriminate(&PolicySpec::default()).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidAuthMethod));

        // Declared blocks whose classifying field is null do not match either.
        let spec = PolicySpec {
            basic: Some(BasicSpec::default()),
            jwt: Some(JwtSpec::default()),
            hmac: Some(HmacSpec::default()),
            ..Default::default()
        };
        assert!(matches!(
            discriminate(&spec).unwrap_err(),
            PolicyError::InvalidAuthMethod
        ));
    }

    #[test]
    fn multiple_methods_are_rejected() {
        let spec = PolicySpec {
            basic: Some(BasicSpec {
                login: Some(login_ok()),
                decode_resource: None,
            }),
            jwt: Some(JwtSpec {
                signature_key: Some("secret".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            discriminate(&spec).unwrap_err(),
            PolicyError::AmbiguousAuthMethod
        ));
        assert!(AuthPolicy::from_spec(spec).is_err());
    }

    #[test]
    fn jwt_key_resolution_order_is_fixed() {
        let spec = PolicySpec {
            jwt: Some(JwtSpec {
                signature_key: Some("secret".into()),
                jwks_public_key: Some(json!({ "kty": "oct" })),
                jwks_public_key_url: Some("https://example.com/jwks.json".into()),
            }),
            ..Default::default()
        };
        let policy = AuthPolicy::from_spec(spec).unwrap();
        assert!(matches!(
            policy.method,
            AuthMethod::Jwt(JwtKeySource::SignatureKey(_))
        ));
    }

    #[test]
    fn mixed_access_families_are_rejected() {
        let spec = PolicySpec {
            jwt: Some(JwtSpec {
                signature_key: Some("secret".into()),
                ..Default::default()
            }),
            allowed_permissions: Some(HashSet::from(["read".to_string()])),
            allowed_roles: Some(HashSet::from(["admin".to_string()])),
            ..Default::default()
        };
        assert!(matches!(
            AuthPolicy::from_spec(spec).unwrap_err(),
            PolicyError::AmbiguousAccessCheck
        ));
    }

    #[test]
    fn default_prefixes_follow_method() {
        let basic = AuthPolicy::from_spec(PolicySpec {
            basic: Some(BasicSpec {
                login: Some(login_ok()),
                decode_resource: None,
            }),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(basic.token_prefix(), "Basic");
        assert_eq!(basic.header_name(), "Authorization");

        let jwt = AuthPolicy::from_spec(PolicySpec {
            jwt: Some(JwtSpec {
                signature_key: Some("secret".into()),
                ..Default::default()
            }),
            token_prefix: Some("Token".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(jwt.token_prefix(), "Token");
    }
}
