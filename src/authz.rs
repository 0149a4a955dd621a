//! # Authorization Decision Engine
//!
//! Evaluates a verified identity against the route policy's access check and
//! returns a [`Verdict`].
//!
//! ## List semantics
//!
//! - An allow-list passes when the subject's set intersects it: any one match
//!   is enough (deliberately any-of, not all-of).
//! - A forbid-list denies when the subject's set intersects it, evaluated
//!   independently: a forbidden item overrides an allow pass.
//!
//! ## Scope hierarchies are closed-world
//!
//! A declared scope hierarchy is the complete list of values considered valid
//! for the route. A subject holding the required scope **plus** any scope
//! outside the hierarchy is denied; no held value outside the declared set is
//! tolerated merely because the required one is also present.
//!
//! ## Configuration failures
//!
//! A check declared without its mapping function cannot be evaluated and
//! fails closed with a 500 verdict; that is a bug in the embedding
//! application, distinguished from 401/403 in both status and logs.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use crate::identity::ResourceIdentity;
use crate::policy::{AccessCheck, MapFn};
use crate::request::Request;

/// The pass/fail decision plus HTTP status and message, computed once per
/// request and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    pub status: u16,
    pub message: String,
}

impl Verdict {
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            status: 200,
            message: String::new(),
        }
    }

    #[must_use]
    pub fn forbid(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            status: 403,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            status: 500,
            message: message.into(),
        }
    }
}

/// Evaluate the policy's access check for a verified identity.
///
/// A policy with no check is authentication-only and always passes here.
pub fn decide(
    check: Option<&AccessCheck>,
    identity: &ResourceIdentity,
    req: &Request,
) -> Verdict {
    let Some(check) = check else {
        return Verdict::allow();
    };
    match check {
        AccessCheck::Permissions {
            allowed,
            forbidden,
            map,
        } => decide_lists(
            identity,
            req,
            allowed.as_ref(),
            forbidden.as_ref(),
            map.as_ref(),
            "permission",
            "Invalid Authorization permissions.",
        ),
        AccessCheck::Roles {
            allowed,
            forbidden,
            map,
        } => decide_lists(
            identity,
            req,
            allowed.as_ref(),
            forbidden.as_ref(),
            map.as_ref(),
            "role",
            "Invalid Authorization roles.",
        ),
        AccessCheck::Scopes {
            hierarchy,
            required,
            surface,
        } => decide_scopes(identity, req, hierarchy, required, surface.as_ref()),
    }
}

#[allow(clippy::too_many_arguments)]
fn decide_lists(
    identity: &ResourceIdentity,
    req: &Request,
    allowed: Option<&HashSet<String>>,
    forbidden: Option<&HashSet<String>>,
    map: Option<&Arc<MapFn>>,
    kind: &str,
    deny_message: &str,
) -> Verdict {
    let Some(map) = map else {
        return Verdict::misconfigured(format!("no {kind} mapping function provided"));
    };
    let subject_set = match map(identity, req) {
        Ok(set) => set,
        Err(e) => {
            error!(kind = kind, error = %e, "mapping function failed");
            return Verdict::forbid(deny_message);
        }
    };
    if let Some(allowed) = allowed {
        if !allowed.is_empty() && allowed.intersection(&subject_set).next().is_none() {
            return Verdict::forbid(deny_message);
        }
    }
    if let Some(forbidden) = forbidden {
        if !forbidden.is_empty() && forbidden.intersection(&subject_set).next().is_some() {
            return Verdict::forbid(deny_message);
        }
    }
    Verdict::allow()
}

fn decide_scopes(
    identity: &ResourceIdentity,
    req: &Request,
    hierarchy: &[String],
    required: &str,
    surface: Option<&Arc<MapFn>>,
) -> Verdict {
    let Some(surface) = surface else {
        return Verdict::misconfigured("no scope mapping function provided");
    };
    let scopes = match surface(identity, req) {
        Ok(set) => set,
        Err(e) => {
            error!(error = %e, "scope mapping function failed");
            return Verdict::forbid("Invalid scope");
        }
    };
    if !scopes.contains(required) {
        return Verdict::forbid("Invalid scope");
    }
    // Closed world: every held scope must sit inside the declared hierarchy.
    let in_hierarchy = |scope: &String| hierarchy.iter().position(|h| h == scope).is_some();
    if !scopes.iter().all(in_hierarchy) {
        return Verdict::forbid("Invalid scope");
    }
    Verdict::allow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AccessCheck;
    use http::Method;
    use serde_json::json;

    fn identity() -> ResourceIdentity {
        ResourceIdentity::new(json!({ "sub": "alice" }))
    }

    fn request() -> Request {
        Request::new(Method::GET, "/things")
    }

    fn fixed(set: &[&str]) -> Arc<MapFn> {
        let set: HashSet<String> = set.iter().map(ToString::to_string).collect();
        Arc::new(move |_, _| Ok(set.clone()))
    }

    fn strings(set: &[&str]) -> HashSet<String> {
        set.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn no_check_is_authentication_only() {
        assert!(decide(None, &identity(), &request()).allowed);
    }

    #[test]
    fn allow_list_needs_one_intersection() {
        let check = AccessCheck::Permissions {
            allowed: Some(strings(&["things:read", "things:write"])),
            forbidden: None,
            map: Some(fixed(&["things:read"])),
        };
        assert!(decide(Some(&check), &identity(), &request()).allowed);
    }

    #[test]
    fn empty_intersection_is_403_regardless_of_forbid_list() {
        let check = AccessCheck::Permissions {
            allowed: Some(strings(&["things:write"])),
            forbidden: Some(strings(&["banned"])),
            map: Some(fixed(&["things:read"])),
        };
        let verdict = decide(Some(&check), &identity(), &request());
        assert_eq!(verdict.status, 403);
        assert_eq!(verdict.message, "Invalid Authorization permissions.");
    }

    #[test]
    fn forbid_list_overrides_allow_pass() {
        let check = AccessCheck::Permissions {
            allowed: Some(strings(&["things:read"])),
            forbidden: Some(strings(&["suspended"])),
            map: Some(fixed(&["things:read", "suspended"])),
        };
        let verdict = decide(Some(&check), &identity(), &request());
        assert!(!verdict.allowed);
        assert_eq!(verdict.status, 403);
    }

    #[test]
    fn role_check_without_mapping_function_is_500() {
        let check = AccessCheck::Roles {
            allowed: Some(strings(&["admin"])),
            forbidden: None,
            map: None,
        };
        let verdict = decide(Some(&check), &identity(), &request());
        assert_eq!(verdict.status, 500);
        assert_eq!(verdict.message, "no role mapping function provided");
    }

    #[test]
    fn role_deny_uses_role_message() {
        let check = AccessCheck::Roles {
            allowed: Some(strings(&["admin"])),
            forbidden: None,
            map: Some(fixed(&["viewer"])),
        };
        assert_eq!(
            decide(Some(&check), &identity(), &request()).message,
            "Invalid Authorization roles."
        );
    }

    fn scope_check(hierarchy: &[&str], required: &str, held: &[&str]) -> Verdict {
        let check = AccessCheck::Scopes {
            hierarchy: hierarchy.iter().map(ToString::to_string).collect(),
            required: required.to_string(),
            surface: Some(fixed(held)),
        };
        decide(Some(&check), &identity(), &request())
    }

    #[test]
    fn exact_scope_within_hierarchy_passes() {
        assert!(scope_check(&["read", "write", "admin"], "read", &["read"]).allowed);
    }

    #[test]
    fn scope_outside_hierarchy_denies_even_with_required_held() {
        // Regression for the precedence defect: holding the required scope
        // does not excuse holding one outside the declared hierarchy.
        let verdict = scope_check(&["read", "write"], "read", &["read", "admin"]);
        assert_eq!(verdict.status, 403);
        assert_eq!(verdict.message, "Invalid scope");
    }

    #[test]
    fn empty_scope_set_is_denied() {
        let verdict = scope_check(&["read", "write"], "read", &[]);
        assert_eq!(verdict.status, 403);
    }

    #[test]
    fn missing_required_scope_is_denied() {
        assert!(!scope_check(&["read", "write"], "write", &["read"]).allowed);
    }

    #[test]
    fn failing_mapper_denies_closed() {
        let check = AccessCheck::Permissions {
            allowed: Some(strings(&["x"])),
            forbidden: None,
            map: Some(Arc::new(|_, _| anyhow::bail!("db down"))),
        };
        let verdict = decide(Some(&check), &identity(), &request());
        assert_eq!(verdict.status, 403);
    }
}
