//! Middleware chain executor.
//!
//! Runs each middleware's `before` in registration order; the first to return
//! a response short-circuits the chain and the handler never runs. `after`
//! hooks run in reverse order, but only for the middlewares whose `before`
//! actually ran. Within one request, ordering is strict: auth completes
//! before schema parsing, which completes before the handler.

use std::sync::Arc;
use std::time::Instant;

use crate::middleware::Middleware;
use crate::request::{Request, Response};

/// Handler invoked once the whole chain passes.
pub type Handler = dyn Fn(&Request) -> Response + Send + Sync;

/// An ordered middleware chain plus terminal handler.
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Arc<Handler>,
}

impl Pipeline {
    #[must_use]
    pub fn new(handler: Arc<Handler>) -> Self {
        Self {
            middlewares: Vec::new(),
            handler,
        }
    }

    /// Append a middleware. Registration order is execution order.
    #[must_use]
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Run one request through the chain.
    pub fn handle(&self, req: &mut Request) -> Response {
        let start = Instant::now();
        let mut ran = self.middlewares.len();
        let mut short_circuit = None;
        for (i, middleware) in self.middlewares.iter().enumerate() {
            if let Some(response) = middleware.before(req) {
                short_circuit = Some(response);
                ran = i + 1;
                break;
            }
        }
        let mut response = match short_circuit {
            Some(response) => response,
            None => (self.handler)(req),
        };
        let latency = start.elapsed();
        for middleware in self.middlewares[..ran].iter().rev() {
            middleware.after(req, &mut response, latency);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Middleware;
    use http::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Reject;
    impl Middleware for Reject {
        fn before(&self, _req: &mut Request) -> Option<Response> {
            Some(Response::text(401, "nope"))
        }
    }

    struct Counter(Arc<AtomicUsize>, Arc<AtomicUsize>);
    impl Middleware for Counter {
        fn before(&self, _req: &mut Request) -> Option<Response> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
        fn after(&self, _req: &Request, _res: &mut Response, _latency: Duration) {
            self.1.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ok_handler() -> Arc<Handler> {
        Arc::new(|_req| Response::json(200, json!({ "ok": true })))
    }

    #[test]
    fn handler_runs_when_chain_passes() {
        let pipeline = Pipeline::new(ok_handler());
        let mut req = Request::new(Method::GET, "/");
        assert_eq!(pipeline.handle(&mut req).status, 200);
    }

    #[test]
    fn short_circuit_skips_handler_and_later_befores() {
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(ok_handler())
            .with(Arc::new(Reject))
            .with(Arc::new(Counter(before.clone(), after.clone())));
        let mut req = Request::new(Method::GET, "/");
        let res = pipeline.handle(&mut req);
        assert_eq!(res.status, 401);
        assert_eq!(before.load(Ordering::SeqCst), 0);
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn afters_run_for_middlewares_that_ran() {
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(ok_handler())
            .with(Arc::new(Counter(before.clone(), after.clone())))
            .with(Arc::new(Reject));
        let mut req = Request::new(Method::GET, "/");
        assert_eq!(pipeline.handle(&mut req).status, 401);
        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }
}
