use std::time::Duration;

use crate::request::{Request, Response};

/// A pipeline stage. `before` may short-circuit the request with a response;
/// `after` observes and may rewrite the outbound response.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &mut Request) -> Option<Response> {
        None
    }
    fn after(&self, _req: &Request, _res: &mut Response, _latency: Duration) {}
}
