//! Authentication/authorization middleware.
//!
//! Orchestrates credential verification and the authorization decision engine
//! inside the request pipeline. Terminal states per request: proceed,
//! reject(401), reject(403), reject(500).
//!
//! On full success the verified claims are threaded directly into the request
//! context. There is deliberately no second decode of the credential: the
//! session data downstream handlers see is byte-for-byte what verification
//! produced.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::authz::decide;
use crate::middleware::Middleware;
use crate::policy::AuthPolicy;
use crate::request::{Request, Response};
use crate::security::{AuthError, Authenticator};

/// Enforces a route's auth policy. A route with no policy passes through.
pub struct AuthMiddleware {
    policy: Option<Arc<AuthPolicy>>,
    authenticator: Arc<Authenticator>,
}

impl AuthMiddleware {
    #[must_use]
    pub fn new(policy: Option<Arc<AuthPolicy>>, authenticator: Arc<Authenticator>) -> Self {
        Self {
            policy,
            authenticator,
        }
    }
}

impl Middleware for AuthMiddleware {
    fn before(&self, req: &mut Request) -> Option<Response> {
        let policy = self.policy.as_ref()?;
        let identity = match self.authenticator.verify(policy, req) {
            Ok(identity) => identity,
            Err(err) => {
                match &err {
                    AuthError::Misconfigured(cause) => {
                        error!(path = %req.path, cause = %cause, "auth policy misconfigured")
                    }
                    AuthError::Upstream(cause) => {
                        error!(path = %req.path, cause = %cause, "credential verification upstream failure")
                    }
                    other => debug!(path = %req.path, reason = %other, "authentication rejected"),
                }
                return Some(Response::text(err.status(), err.public_message()));
            }
        };
        let verdict = decide(policy.access.as_ref(), &identity, req);
        if !verdict.allowed {
            if verdict.status == 500 {
                error!(path = %req.path, message = %verdict.message, "authorization misconfigured");
            } else {
                warn!(
                    path = %req.path,
                    subject = identity.subject().unwrap_or("<none>"),
                    "authorization denied"
                );
            }
            return Some(Response::text(verdict.status, verdict.message));
        }
        req.claims = Some(identity.into_claims());
        None
    }

    fn after(&self, _req: &Request, _res: &mut Response, _latency: Duration) {}
}
