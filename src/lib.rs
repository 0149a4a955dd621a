//! # Turnpike
//!
//! **Turnpike** is an embeddable authentication, authorization, and contract
//! validation pipeline for HTTP services, with a clustered TCP front end for
//! running the whole thing across a pool of workers.
//!
//! ## Overview
//!
//! Routes declare loose policy specifications (basic / JWT / HMAC credentials
//! plus optional permission, role, or scope checks). Turnpike discriminates
//! each spec into a closed, validated [`policy::AuthPolicy`] at startup,
//! enforces it per request in middleware, and threads the verified identity
//! claims through to the handler. A separate schema middleware negotiates a
//! contract version per request and validates bodies and parameters against
//! compiled JSON Schemas.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **[`policy`]** - Policy specs, structural discrimination, and the closed
//!   [`policy::AuthPolicy`] type
//! - **[`security`]** - Credential verification (basic, JWT with JWKS cache,
//!   HMAC request signing with optional replay guard)
//! - **[`authz`]** - Allow/forbid grant decisions and scope-hierarchy checks
//! - **[`middleware`]** - The auth and schema-parse middlewares plus the
//!   [`middleware::Middleware`] trait
//! - **[`pipeline`]** - Ordered middleware chain execution around a handler
//! - **[`contract`]** - Versioned request/response contracts and failure
//!   policies
//! - **[`cluster`]** - Primary accept loop, worker routing strategies, and
//!   supervision
//! - **[`linter`]** - Startup-time policy linting
//! - **[`telemetry`]** - `tracing` subscriber setup
//!
//! ## Request Flow
//!
//! 1. The cluster primary accepts a TCP connection and routes it to a worker
//!    by the configured [`cluster::RoutingStrategy`].
//! 2. The worker parses the request and runs it through a [`pipeline::Pipeline`]:
//!    authentication, then authorization, then contract validation, each able
//!    to short-circuit with its own status and message.
//! 3. On success the handler runs with `request.claims` populated from the
//!    verified credential; it never re-decodes tokens.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use turnpike::middleware::AuthMiddleware;
//! use turnpike::pipeline::Pipeline;
//! use turnpike::policy::{AuthPolicy, HmacSpec, PolicySpec};
//! use turnpike::request::{Request, Response};
//! use turnpike::security::{Authenticator, JwksCache};
//!
//! let policy = AuthPolicy::from_spec(PolicySpec {
//!     hmac: Some(HmacSpec {
//!         secret_keys: Some(HashMap::from([
//!             ("billing".to_string(), "s3cret".to_string()),
//!         ])),
//!     }),
//!     ..Default::default()
//! })?;
//!
//! let pipeline = Pipeline::new(Arc::new(|_req: &Request| {
//!     Response::json(200, serde_json::json!({ "ok": true }))
//! }))
//! .with(Arc::new(AuthMiddleware::new(
//!     Some(Arc::new(policy)),
//!     Arc::new(Authenticator::new(Arc::new(JwksCache::new()))),
//! )));
//! # Ok::<(), turnpike::policy::PolicyError>(())
//! ```
//!
//! ## Environment Variables
//!
//! - `TURNPIKE_JWKS_TTL_MS` - JWKS cache TTL fallback (default 300000)
//! - `TURNPIKE_WORKERS` - cluster worker count (default: available cores)
//! - `TURNPIKE_STRATEGY` - `round-robin`, `sticky`, or `random`
//! - `TURNPIKE_SHUTDOWN_GRACE_MS` - worker drain grace period (default 5000)
//! - `TURNPIKE_MEMORY_LIMIT_MB` - per-worker memory warning threshold
//!   (default 100)
//!
//! ## Error Surface
//!
//! Authentication failures are 401 when no usable credential was presented
//! and 403 when one was presented and rejected. Upstream faults during
//! verification (an unreachable JWKS endpoint, say) are logged with their
//! cause but surfaced to callers as a generic invalid-token 403. Policy
//! misconfiguration discovered at request time is a 500; run the
//! [`linter`] at startup to catch those before traffic does.

pub mod authz;
pub mod cluster;
pub mod contract;
pub mod identity;
pub mod ids;
pub mod linter;
pub mod middleware;
pub mod pipeline;
pub mod policy;
pub mod request;
pub mod runtime_config;
pub mod security;
pub mod telemetry;

pub use identity::ResourceIdentity;
pub use ids::{CorrelationId, RequestId};
pub use policy::{AuthKind, AuthPolicy, PolicySpec};
pub use request::{Request, Response};
pub use runtime_config::RuntimeConfig;
