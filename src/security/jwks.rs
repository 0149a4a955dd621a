//! # JWKS Cache
//!
//! Fetches and caches remote JSON Web Key Sets with a TTL derived from the
//! response's `cache-control: max-age=N` header.
//!
//! ## Lifecycle
//!
//! The cache is an explicit object constructed once at startup and injected
//! into whatever composes the JWT verifier; there is no module-global state.
//! Entries are keyed by URL and populated lazily on the first verification
//! that needs them. Any call site that fails to verify a token against every
//! cached key must call [`JwksCache::invalidate`] so the next request
//! refetches, tolerating key rotation without waiting for TTL expiry.
//!
//! ## Concurrency
//!
//! The entry map is behind a mutex but refreshes are not coordinated:
//! concurrent requests racing an expired entry may both hit the network. The
//! fetched key set for a given URL is idempotent, so last write wins and the
//! race is benign.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::runtime_config::RuntimeConfig;

/// Default TTL when the response carries no usable cache-control header.
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// Timeout applied to every JWKS fetch so a hung endpoint cannot hold
/// requests open indefinitely.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from fetching or parsing a JWKS endpoint.
#[derive(Debug, Error)]
pub enum JwksError {
    #[error("jwks fetch failed: {0}")]
    Fetch(String),
    #[error("jwks response has no keys array")]
    MalformedBody,
}

struct CacheEntry {
    keys: Vec<Value>,
    last_updated: Instant,
    ttl: Duration,
}

/// TTL cache of JWKS documents, keyed by URL.
pub struct JwksCache {
    default_ttl: Duration,
    entries: std::sync::Mutex<HashMap<String, CacheEntry>>,
}

impl JwksCache {
    /// Create a cache whose default TTL honors `TURNPIKE_JWKS_TTL_MS`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_ttl(RuntimeConfig::from_env().jwks_ttl)
    }

    /// Create a cache with an explicit default TTL.
    #[must_use]
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Return the key set for `url`, fetching only when the cached entry is
    /// missing or expired.
    pub fn get_keys(&self, url: &str) -> Result<Vec<Value>, JwksError> {
        {
            let entries = self.entries.lock().expect("jwks cache lock poisoned");
            if let Some(entry) = entries.get(url) {
                if entry.last_updated.elapsed() < entry.ttl {
                    return Ok(entry.keys.clone());
                }
            }
        }
        let (keys, ttl) = self.fetch(url)?;
        debug!(url = %url, keys = keys.len(), ttl_ms = ttl.as_millis() as u64, "refreshed JWKS");
        let mut entries = self.entries.lock().expect("jwks cache lock poisoned");
        entries.insert(
            url.to_string(),
            CacheEntry {
                keys: keys.clone(),
                last_updated: Instant::now(),
                ttl,
            },
        );
        Ok(keys)
    }

    /// Drop the cached entry for `url`, forcing the next call to refetch.
    pub fn invalidate(&self, url: &str) {
        let mut entries = self.entries.lock().expect("jwks cache lock poisoned");
        if entries.remove(url).is_some() {
            debug!(url = %url, "invalidated JWKS cache entry");
        }
    }

    fn fetch(&self, url: &str) -> Result<(Vec<Value>, Duration), JwksError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| JwksError::Fetch(e.to_string()))?;
        let response = client.get(url).send().map_err(|e| {
            error!(url = %url, error = %e, "JWKS fetch failed");
            JwksError::Fetch(e.to_string())
        })?;
        if !response.status().is_success() {
            error!(url = %url, status = %response.status(), "JWKS fetch returned error status");
            return Err(JwksError::Fetch(format!("status {}", response.status())));
        }
        let ttl = response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .map(Duration::from_secs)
            .unwrap_or(self.default_ttl);
        let body: Value = response
            .json()
            .map_err(|e| JwksError::Fetch(e.to_string()))?;
        let keys = body
            .get("keys")
            .and_then(Value::as_array)
            .ok_or(JwksError::MalformedBody)?
            .clone();
        Ok((keys, ttl))
    }
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the numeric `max-age` from a cache-control header value.
fn parse_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        let directive = directive.trim();
        directive
            .strip_prefix("max-age=")
            .and_then(|n| n.parse().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_max_age_variants() {
        assert_eq!(parse_max_age("max-age=600"), Some(600));
        assert_eq!(parse_max_age("public, max-age=60"), Some(60));
        assert_eq!(parse_max_age("no-store"), None);
        assert_eq!(parse_max_age("max-age=abc"), None);
        assert_eq!(parse_max_age(""), None);
    }

    #[test]
    fn invalidate_on_empty_cache_is_a_no_op() {
        let cache = JwksCache::with_default_ttl(DEFAULT_TTL);
        cache.invalidate("https://example.com/jwks.json");
    }
}
