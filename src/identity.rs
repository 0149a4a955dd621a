//! Verified caller identity.
//!
//! A [`ResourceIdentity`] is produced by credential verification and consumed by
//! the authorization engine and downstream handlers. It is created per request
//! and never persisted. The claims are carried as a JSON object so arbitrary
//! token payloads (JWT claims, synthesized Basic identities, HMAC key ids) fit
//! without a fixed schema; `sub` is the only conventional field.

use serde_json::{json, Value};

/// Verified claims about the caller, produced by successful authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceIdentity {
    claims: Value,
}

impl ResourceIdentity {
    /// Wrap an already-verified claims object.
    ///
    /// Callers must only pass payloads that came out of a successful
    /// verification step; this type performs no validation of its own.
    #[must_use]
    pub fn new(claims: Value) -> Self {
        Self { claims }
    }

    /// Synthesize a minimal identity carrying only a subject id.
    ///
    /// Used by Basic auth (`{sub: username}`) and HMAC auth (`{sub: keyId}`).
    #[must_use]
    pub fn from_subject(sub: impl Into<String>) -> Self {
        Self {
            claims: json!({ "sub": sub.into() }),
        }
    }

    /// The `sub` claim, if present.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }

    /// Look up an arbitrary claim by name.
    #[must_use]
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.claims.get(claim)
    }

    /// Borrow the full claims object.
    #[must_use]
    pub fn claims(&self) -> &Value {
        &self.claims
    }

    /// Consume the identity, yielding the claims for session threading.
    ///
    /// The auth middleware moves these claims into the request context on
    /// success so handlers read exactly what was verified, with no second
    /// decode of the credential.
    #[must_use]
    pub fn into_claims(self) -> Value {
        self.claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_subject_sets_sub() {
        let id = ResourceIdentity::from_subject("alice");
        assert_eq!(id.subject(), Some("alice"));
    }

    #[test]
    fn arbitrary_claims_are_preserved() {
        let id = ResourceIdentity::new(json!({ "sub": "bob", "email": "bob@example.com" }));
        assert_eq!(
            id.get("email").and_then(Value::as_str),
            Some("bob@example.com")
        );
        assert_eq!(id.into_claims()["sub"], "bob");
    }
}
