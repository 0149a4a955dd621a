//! # HMAC Token Codec
//!
//! Canonicalizes a request into a signable string and produces/verifies a
//! symmetric HMAC-SHA256 signature.
//!
//! ## Canonical message
//!
//! ```text
//! METHOD\nPATH\n[JSON(body)\n]TIMESTAMP\nNONCE
//! ```
//!
//! The body segment is present only when a body was supplied, and is
//! newline-terminated before the timestamp. The signature is the base64
//! encoding of the keyed hash over the canonical message.
//!
//! ## Wire format
//!
//! ```text
//! Authorization: HMAC keyId=<id> ts=<ISO8601> nonce=<uuid> signature=<base64>
//! ```
//!
//! Verification recomputes the signature from the request-supplied fields plus
//! the locally-known secret for the claimed key id and compares in constant
//! time. The nonce is part of the signed payload; reuse is only rejected when a
//! [`ReplayGuard`] is attached to the policy.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use crate::identity::ResourceIdentity;
use crate::security::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Build the canonical message for the given request fields.
#[must_use]
pub fn canonical_message(
    method: &Method,
    path: &str,
    body: Option<&Value>,
    timestamp: &str,
    nonce: &str,
) -> String {
    match body {
        Some(body) => format!("{method}\n{path}\n{body}\n{timestamp}\n{nonce}"),
        None => format!("{method}\n{path}\n{timestamp}\n{nonce}"),
    }
}

fn mac_for(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key of any size")
}

/// Sign the canonical message, returning the base64 signature.
#[must_use]
pub fn sign(
    method: &Method,
    path: &str,
    body: Option<&Value>,
    timestamp: &str,
    nonce: &str,
    secret: &str,
) -> String {
    let mut mac = mac_for(secret);
    mac.update(canonical_message(method, path, body, timestamp, nonce).as_bytes());
    general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Recompute the signature and compare against the claimed one.
///
/// Comparison happens in constant time on the raw MAC bytes; a claimed
/// signature that is not valid base64 fails outright.
#[must_use]
pub fn verify(
    method: &Method,
    path: &str,
    body: Option<&Value>,
    timestamp: &str,
    nonce: &str,
    secret: &str,
    signature: &str,
) -> bool {
    let Ok(claimed) = general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let mut mac = mac_for(secret);
    mac.update(canonical_message(method, path, body, timestamp, nonce).as_bytes());
    mac.verify_slice(&claimed).is_ok()
}

/// Parsed parameters from an `HMAC ...` Authorization header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmacParams {
    pub key_id: String,
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
}

/// Parse `HMAC keyId=<id> ts=<iso> nonce=<uuid> signature=<b64>`.
///
/// Returns `None` if the scheme tag is missing or any parameter is absent.
#[must_use]
pub fn parse_header(value: &str) -> Option<HmacParams> {
    let rest = value.strip_prefix("HMAC ")?;
    let mut key_id = None;
    let mut timestamp = None;
    let mut nonce = None;
    let mut signature = None;
    for part in rest.split_whitespace() {
        let (name, val) = part.split_once('=')?;
        match name {
            "keyId" => key_id = Some(val.to_string()),
            "ts" => timestamp = Some(val.to_string()),
            "nonce" => nonce = Some(val.to_string()),
            "signature" => signature = Some(val.to_string()),
            _ => return None,
        }
    }
    Some(HmacParams {
        key_id: key_id?,
        timestamp: timestamp?,
        nonce: nonce?,
        signature: signature?,
    })
}

/// Client-side helper: sign a request now and render the Authorization header.
#[must_use]
pub fn authorization_header(
    key_id: &str,
    method: &Method,
    path: &str,
    body: Option<&Value>,
    secret: &str,
) -> String {
    let timestamp = chrono::Utc::now().to_rfc3339();
    let nonce = uuid::Uuid::new_v4().to_string();
    let signature = sign(method, path, body, &timestamp, &nonce, secret);
    format!("HMAC keyId={key_id} ts={timestamp} nonce={nonce} signature={signature}")
}

/// Short-TTL seen-nonce store rejecting replayed signatures.
///
/// The reference behavior does not enforce replay protection; attaching a
/// guard to an HMAC policy is opt-in. Expired entries are pruned on insert so
/// the store stays bounded by the traffic within one window.
pub struct ReplayGuard {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl ReplayGuard {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record the nonce; returns `false` if it was already seen inside the
    /// window (a replay).
    pub fn check_and_record(&self, nonce: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().expect("replay guard lock poisoned");
        seen.retain(|_, at| now.duration_since(*at) < self.window);
        if seen.contains_key(nonce) {
            return false;
        }
        seen.insert(nonce.to_string(), now);
        true
    }
}

/// Verify a full HMAC-authenticated request against the policy's secrets.
///
/// On success the identity is `{sub: keyId}`. On signature mismatch a debug
/// log entry records the signable fields plus received/computed signatures;
/// the secret itself is never logged.
pub fn verify_request(
    secret_keys: &HashMap<String, String>,
    replay_guard: Option<&ReplayGuard>,
    header_value: &str,
    method: &Method,
    path: &str,
    body: Option<&Value>,
) -> Result<ResourceIdentity, AuthError> {
    let params = parse_header(header_value).ok_or(AuthError::InvalidFormat)?;
    let secret = secret_keys
        .get(&params.key_id)
        .ok_or(AuthError::InvalidToken)?;
    let computed = sign(method, path, body, &params.timestamp, &params.nonce, secret);
    if !verify(
        method,
        path,
        body,
        &params.timestamp,
        &params.nonce,
        secret,
        &params.signature,
    ) {
        debug!(
            method = %method,
            path = %path,
            ts = %params.timestamp,
            nonce = %params.nonce,
            received = %params.signature,
            computed = %computed,
            "HMAC signature mismatch"
        );
        return Err(AuthError::InvalidToken);
    }
    // Only an authenticated request may consume its nonce; a forged signature
    // must not burn the nonce for the legitimate sender.
    if let Some(guard) = replay_guard {
        if !guard.check_and_record(&params.nonce) {
            debug!(nonce = %params.nonce, "rejected replayed HMAC nonce");
            return Err(AuthError::InvalidToken);
        }
    }
    Ok(ResourceIdentity::from_subject(params.key_id))
}
