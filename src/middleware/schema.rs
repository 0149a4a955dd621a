//! Request/response schema parse middleware.
//!
//! Validates inbound requests against the route contract's versioned schemas
//! and tags the request with the first version that accepts it. Outbound
//! responses are validated against the matched version's response schemas.
//!
//! Failure handling follows the contract's [`FailurePolicy`]: `Error` halts
//! with a plain-text listing of every failure plus a correlation id line,
//! `Warning` logs and continues, `None` stays silent.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::contract::{Contract, FailurePolicy, ParseIssue};
use crate::ids::CorrelationId;
use crate::middleware::Middleware;
use crate::request::{Request, Response};

pub struct SchemaParseMiddleware {
    contract: Arc<Contract>,
}

impl SchemaParseMiddleware {
    #[must_use]
    pub fn new(contract: Arc<Contract>) -> Self {
        Self { contract }
    }

    fn failure_body(issues: &[ParseIssue]) -> String {
        let correlation = CorrelationId::new();
        let mut lines: Vec<String> = issues.iter().map(ToString::to_string).collect();
        lines.push(format!("correlation id: {correlation}"));
        lines.join("\n")
    }
}

impl Middleware for SchemaParseMiddleware {
    fn before(&self, req: &mut Request) -> Option<Response> {
        match self.contract.resolve_version(req) {
            Ok(version) => {
                req.version = Some(version.version.clone());
                None
            }
            Err(issues) => match self.contract.failure_policy {
                FailurePolicy::Error => {
                    Some(Response::text(400, Self::failure_body(&issues)))
                }
                FailurePolicy::Warning => {
                    warn!(
                        request_id = %req.request_id,
                        path = %req.path,
                        issues = issues.len(),
                        "request failed schema validation, continuing per policy"
                    );
                    None
                }
                FailurePolicy::None => None,
            },
        }
    }

    fn after(&self, req: &Request, res: &mut Response, _latency: Duration) {
        let Some(version) = req.version.as_deref().and_then(|v| self.contract.version(v))
        else {
            return;
        };
        let issues = version.validate_response(res);
        if issues.is_empty() {
            return;
        }
        match self.contract.failure_policy {
            FailurePolicy::Error => {
                *res = Response::text(500, Self::failure_body(&issues));
            }
            FailurePolicy::Warning => {
                warn!(
                    request_id = %req.request_id,
                    path = %req.path,
                    issues = issues.len(),
                    "response failed schema validation, sending anyway per policy"
                );
            }
            FailurePolicy::None => {}
        }
    }
}
