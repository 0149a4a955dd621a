//! Request and response types flowing through the middleware pipeline.
//!
//! These are the in-process representations handed to middleware and handlers
//! after HTTP parsing. Header and cookie names are stored lowercased so lookups
//! are case-insensitive, matching how credential extraction treats the
//! `Authorization` header.

use std::collections::HashMap;

use http::Method;
use serde_json::Value;

use crate::ids::RequestId;

/// A parsed inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique request ID for tracing and correlation
    pub request_id: RequestId,
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request path
    pub path: String,
    /// Path parameters extracted from the URL
    pub path_params: HashMap<String, String>,
    /// Query string parameters
    pub query_params: HashMap<String, String>,
    /// HTTP headers, keys lowercased
    pub headers: HashMap<String, String>,
    /// Cookies parsed from the Cookie header, keys lowercased
    pub cookies: HashMap<String, String>,
    /// Request body parsed as JSON (if present)
    pub body: Option<Value>,
    /// Verified identity claims, populated by the auth middleware on success.
    ///
    /// These are the exact claims that passed verification; handlers must not
    /// re-decode the credential themselves.
    pub claims: Option<Value>,
    /// Contract version matched by the schema parse middleware, if any.
    pub version: Option<String>,
}

impl Request {
    /// Create an empty request for the given method and path.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            path: path.into(),
            path_params: HashMap::new(),
            query_params: HashMap::new(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            body: None,
            claims: None,
            version: None,
        }
    }

    /// Look up a header by name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Insert a header, lowercasing the name.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }
}

/// Response produced by a handler or short-circuited by middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

impl Response {
    /// A JSON response with the given status.
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status,
            headers,
            body,
        }
    }

    /// A plain-text response, used for all auth and validation failures.
    #[must_use]
    pub fn text(status: u16, message: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        Self {
            status,
            headers,
            body: Value::String(message.into()),
        }
    }

    /// The body as text, if it is a string.
    #[must_use]
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut req = Request::new(Method::GET, "/pets");
        req.set_header("Authorization", "Bearer abc");
        assert_eq!(req.header("authorization"), Some("Bearer abc"));
        assert_eq!(req.header("AUTHORIZATION"), Some("Bearer abc"));
    }

    #[test]
    fn text_response_sets_content_type() {
        let res = Response::text(401, "No Authorization token provided.");
        assert_eq!(res.headers.get("content-type").map(String::as_str), Some("text/plain"));
        assert_eq!(res.body_text(), Some("No Authorization token provided."));
    }
}
