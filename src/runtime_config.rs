//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for runtime behavior.
//!
//! ## Environment Variables
//!
//! - `TURNPIKE_JWKS_TTL_MS` - default TTL for cached JWKS documents when the
//!   endpoint sends no usable `cache-control: max-age` header. Milliseconds,
//!   default `300000` (5 minutes).
//!
//! Cluster-level variables (`TURNPIKE_WORKERS`, `TURNPIKE_STRATEGY`, and
//! friends) are read by [`ClusterConfig::from_env`](crate::cluster::ClusterConfig::from_env).

use std::env;
use std::time::Duration;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Default JWKS cache TTL (default: 300 000 ms)
    pub jwks_ttl: Duration,
}

impl RuntimeConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults on absent or unparsable values.
    #[must_use]
    pub fn from_env() -> Self {
        let jwks_ttl_ms = env::var("TURNPIKE_JWKS_TTL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300_000);
        RuntimeConfig {
            jwks_ttl: Duration::from_millis(jwks_ttl_ms),
        }
    }
}
