//! # Policy Linter Module
//!
//! Startup-time linting for auth policy specifications. Run it over every
//! route policy before serving traffic so misconfiguration surfaces as a
//! readable report at boot instead of a 500 on the first request.
//!
//! ## Checks Performed
//!
//! 1. **Constructibility** - the spec must resolve to exactly one auth method
//!    and at most one access-check family
//! 2. **Scope hierarchy coverage** - a required scope must appear in the
//!    hierarchy that ranks it
//! 3. **Allow/forbid overlap** - a grant listed on both sides is always
//!    denied; almost certainly a typo
//! 4. **Empty allow lists** - an empty allowed set denies every caller
//! 5. **JWKS transport** - key sets should be fetched over https
//!
//! ## Usage
//!
//! ```rust,ignore
//! use turnpike::linter::{lint_policies, LintSeverity};
//!
//! let issues = lint_policies(&policies);
//! for issue in &issues {
//!     eprintln!("[{}] {}: {}", issue.severity, issue.location, issue.message);
//! }
//! ```

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::policy::{AuthPolicy, PolicySpec};

/// Severity level for lint issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LintSeverity {
    /// Error - the policy cannot be enforced as written
    Error,
    /// Warning - enforceable but almost certainly not what was intended
    Warning,
    /// Info - worth knowing, no action required
    Info,
}

impl fmt::Display for LintSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintSeverity::Error => write!(f, "ERROR"),
            LintSeverity::Warning => write!(f, "WARNING"),
            LintSeverity::Info => write!(f, "INFO"),
        }
    }
}

/// A lint issue found in a policy specification
#[derive(Debug, Clone, Serialize)]
pub struct LintIssue {
    /// Which policy the issue was found in (the caller-supplied name)
    pub location: String,
    /// Severity of the issue
    pub severity: LintSeverity,
    /// Type of lint issue (e.g., "scope_not_in_hierarchy")
    pub kind: String,
    /// Human-readable description of the problem
    pub message: String,
    /// Optional suggestion for how to fix it
    pub suggestion: Option<String>,
}

impl LintIssue {
    pub fn new(
        location: impl Into<String>,
        severity: LintSeverity,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        LintIssue {
            location: location.into(),
            severity,
            kind: kind.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Lint a set of named policy specifications.
///
/// Each entry is linted independently; issues carry the policy name as their
/// location. Specs are consumed because constructibility is checked by
/// actually building the policy.
pub fn lint_policies(policies: Vec<(String, PolicySpec)>) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    for (name, spec) in policies {
        lint_policy(&mut issues, &name, spec);
    }
    issues
}

/// True when any issue would make a policy unenforceable.
#[must_use]
pub fn has_errors(issues: &[LintIssue]) -> bool {
    issues.iter().any(|i| i.severity == LintSeverity::Error)
}

/// Print issues to stderr in a fixed, grep-friendly format.
pub fn print_issues(issues: &[LintIssue]) {
    for issue in issues {
        eprintln!(
            "[{}] {} ({}): {}",
            issue.severity, issue.location, issue.kind, issue.message
        );
        if let Some(suggestion) = &issue.suggestion {
            eprintln!("    suggestion: {suggestion}");
        }
    }
}

fn lint_policy(issues: &mut Vec<LintIssue>, name: &str, spec: PolicySpec) {
    if let Some(jwt) = &spec.jwt {
        if jwt.signature_key.is_some() && jwt.jwks_public_key_url.is_some() {
            issues.push(LintIssue::new(
                name,
                LintSeverity::Info,
                "redundant_key_source",
                "both a signature key and a JWKS URL are set; the signature key takes precedence",
            ));
        }
        if let Some(url) = &jwt.jwks_public_key_url {
            if !url.starts_with("https://") {
                issues.push(
                    LintIssue::new(
                        name,
                        LintSeverity::Warning,
                        "insecure_jwks_url",
                        format!("JWKS URL {url:?} is not https"),
                    )
                    .with_suggestion("serve the key set over https"),
                );
            }
        }
    }

    lint_overlap(
        issues,
        name,
        "permission",
        spec.allowed_permissions.as_ref(),
        spec.forbidden_permissions.as_ref(),
    );
    lint_overlap(
        issues,
        name,
        "role",
        spec.allowed_roles.as_ref(),
        spec.forbidden_roles.as_ref(),
    );

    if let (Some(required), Some(hierarchy)) = (&spec.required_scope, &spec.scope_hierarchy) {
        if !hierarchy.iter().any(|s| s == required) {
            issues.push(
                LintIssue::new(
                    name,
                    LintSeverity::Error,
                    "scope_not_in_hierarchy",
                    format!("required scope {required:?} does not appear in the scope hierarchy"),
                )
                .with_suggestion("add the scope to the hierarchy or require a ranked scope"),
            );
        }
    }

    // Constructibility last: build the policy exactly the way the runtime
    // would and report the same failure it would raise.
    if let Err(e) = AuthPolicy::from_spec(spec) {
        issues.push(LintIssue::new(
            name,
            LintSeverity::Error,
            "unconstructible_policy",
            e.to_string(),
        ));
    }
}

fn lint_overlap(
    issues: &mut Vec<LintIssue>,
    name: &str,
    grant_kind: &str,
    allowed: Option<&HashSet<String>>,
    forbidden: Option<&HashSet<String>>,
) {
    if let Some(allowed) = allowed {
        if allowed.is_empty() {
            issues.push(LintIssue::new(
                name,
                LintSeverity::Warning,
                format!("empty_allowed_{grant_kind}s"),
                format!("allowed {grant_kind} list is empty; every caller will be denied"),
            ));
        }
        if let Some(forbidden) = forbidden {
            let mut overlap: Vec<&String> = allowed.intersection(forbidden).collect();
            overlap.sort();
            for grant in overlap {
                issues.push(
                    LintIssue::new(
                        name,
                        LintSeverity::Warning,
                        format!("{grant_kind}_allowed_and_forbidden"),
                        format!("{grant_kind} {grant:?} is both allowed and forbidden; forbid wins"),
                    )
                    .with_suggestion("remove it from one of the two lists"),
                );
            }
        }
    }
}
