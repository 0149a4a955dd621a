//! # Contract Module
//!
//! Compiled request/response schemas for a route, with multi-version support.
//!
//! ## Overview
//!
//! A route's contract declares one or more versions, each carrying compiled
//! JSON Schemas for the request sections (path params, query, headers, body),
//! per-status response bodies, and outbound response headers. Schemas are
//! compiled once at registration
//! time; per-request code only runs the compiled validators.
//!
//! ## Version resolution
//!
//! Versions are tried in declared order. The first version whose request
//! schemas accept the request wins and tags the request for the remainder of
//! the pipeline. When no version matches, the parse issues from every
//! attempted version are concatenated into the failure.
//!
//! ## Coercion
//!
//! Path and query parameters arrive as strings. Before validation they are
//! coerced to the type their schema declares (integer, number, boolean), so a
//! contract can say `{"type": "integer"}` for `?limit=10`. Values that do not
//! parse stay strings and fail validation with the schema's own message.

use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

/// What to do when validation fails, configurable per contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Respond 400/500 with a plain-text error listing all failures plus a
    /// correlation id, and halt the pipeline.
    #[default]
    Error,
    /// Log and continue, potentially sending invalid data.
    Warning,
    /// Silently continue.
    None,
}

impl FailurePolicy {
    /// Parse a policy name, case-insensitively.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// A schema that failed to compile at contract registration time.
#[derive(Debug, Error)]
#[error("invalid schema for {location}: {message}")]
pub struct ContractError {
    pub location: String,
    pub message: String,
}

/// One structured validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    /// Which request/response section failed (e.g. `v1 body`).
    pub location: String,
    pub message: String,
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.location, self.message)
    }
}

/// A raw schema plus its compiled validator.
#[derive(Debug)]
pub struct SchemaSet {
    raw: Value,
    compiled: jsonschema::Validator,
}

impl SchemaSet {
    fn compile(location: &str, raw: Value) -> Result<Self, ContractError> {
        let compiled = jsonschema::validator_for(&raw).map_err(|e| ContractError {
            location: location.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { raw, compiled })
    }

    fn validate(&self, location: &str, instance: &Value) -> Vec<ParseIssue> {
        self.compiled
            .iter_errors(instance)
            .map(|e| ParseIssue {
                location: location.to_string(),
                message: e.to_string(),
            })
            .collect()
    }
}

/// Compiled request-section schemas for one contract version.
#[derive(Debug, Default)]
pub struct RequestSchemas {
    pub params: Option<SchemaSet>,
    pub query: Option<SchemaSet>,
    pub headers: Option<SchemaSet>,
    pub body: Option<SchemaSet>,
}

/// One version of a route contract.
#[derive(Debug)]
pub struct VersionedContract {
    pub version: String,
    request: RequestSchemas,
    responses: HashMap<u16, SchemaSet>,
    response_headers: Option<SchemaSet>,
}

impl VersionedContract {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            request: RequestSchemas::default(),
            responses: HashMap::new(),
            response_headers: None,
        }
    }

    pub fn params_schema(mut self, schema: Value) -> Result<Self, ContractError> {
        self.request.params = Some(SchemaSet::compile("params", schema)?);
        Ok(self)
    }

    pub fn query_schema(mut self, schema: Value) -> Result<Self, ContractError> {
        self.request.query = Some(SchemaSet::compile("query", schema)?);
        Ok(self)
    }

    pub fn headers_schema(mut self, schema: Value) -> Result<Self, ContractError> {
        self.request.headers = Some(SchemaSet::compile("headers", schema)?);
        Ok(self)
    }

    pub fn body_schema(mut self, schema: Value) -> Result<Self, ContractError> {
        self.request.body = Some(SchemaSet::compile("body", schema)?);
        Ok(self)
    }

    pub fn response_schema(mut self, status: u16, schema: Value) -> Result<Self, ContractError> {
        self.responses.insert(
            status,
            SchemaSet::compile(&format!("response {status}"), schema)?,
        );
        Ok(self)
    }

    /// Declare a schema for outbound response headers, applied to every
    /// status this version responds with.
    pub fn response_headers_schema(mut self, schema: Value) -> Result<Self, ContractError> {
        self.response_headers = Some(SchemaSet::compile("response headers", schema)?);
        Ok(self)
    }

    /// Validate every request section, returning all issues found.
    #[must_use]
    pub fn validate_request(&self, req: &crate::request::Request) -> Vec<ParseIssue> {
        let v = &self.version;
        let mut issues = Vec::new();
        if let Some(schema) = &self.request.params {
            let instance = coerce_params(&req.path_params, &schema.raw);
            issues.extend(schema.validate(&format!("{v} params"), &instance));
        }
        if let Some(schema) = &self.request.query {
            let instance = coerce_params(&req.query_params, &schema.raw);
            issues.extend(schema.validate(&format!("{v} query"), &instance));
        }
        if let Some(schema) = &self.request.headers {
            let instance = coerce_params(&req.headers, &schema.raw);
            issues.extend(schema.validate(&format!("{v} headers"), &instance));
        }
        if let Some(schema) = &self.request.body {
            match &req.body {
                Some(body) => issues.extend(schema.validate(&format!("{v} body"), body)),
                None => issues.push(ParseIssue {
                    location: format!("{v} body"),
                    message: "missing request body".to_string(),
                }),
            }
        }
        issues
    }

    /// Validate an outbound response: its headers against the version's
    /// response-headers schema and its body against the schema for its
    /// status, where declared.
    #[must_use]
    pub fn validate_response(&self, res: &crate::request::Response) -> Vec<ParseIssue> {
        let mut issues = Vec::new();
        if let Some(schema) = &self.response_headers {
            let instance = coerce_params(&res.headers, &schema.raw);
            issues.extend(schema.validate(&format!("{} response headers", self.version), &instance));
        }
        if let Some(schema) = self.responses.get(&res.status) {
            issues.extend(schema.validate(
                &format!("{} response {}", self.version, res.status),
                &res.body,
            ));
        }
        issues
    }
}

/// A route contract: its versions (in resolution order) and failure policy.
pub struct Contract {
    pub versions: Vec<VersionedContract>,
    pub failure_policy: FailurePolicy,
}

impl Contract {
    #[must_use]
    pub fn new(versions: Vec<VersionedContract>) -> Self {
        Self {
            versions,
            failure_policy: FailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Try each version in declared order; the first whose schemas accept the
    /// request wins. On total failure, every attempted version's issues are
    /// returned together.
    pub fn resolve_version(
        &self,
        req: &crate::request::Request,
    ) -> Result<&VersionedContract, Vec<ParseIssue>> {
        let mut all_issues = Vec::new();
        for version in &self.versions {
            let issues = version.validate_request(req);
            if issues.is_empty() {
                return Ok(version);
            }
            all_issues.extend(issues);
        }
        Err(all_issues)
    }

    /// Find a version by its tag, as stamped on the request by the parse
    /// middleware.
    #[must_use]
    pub fn version(&self, tag: &str) -> Option<&VersionedContract> {
        self.versions.iter().find(|v| v.version == tag)
    }
}

/// Build a JSON object from string parameters, coercing each value to the
/// type its schema property declares.
fn coerce_params(params: &HashMap<String, String>, schema: &Value) -> Value {
    let properties = schema.get("properties").and_then(Value::as_object);
    let mut object = Map::new();
    for (name, raw) in params {
        let declared = properties
            .and_then(|p| p.get(name))
            .and_then(|s| s.get("type"))
            .and_then(Value::as_str);
        let coerced = match declared {
            Some("integer") => raw.parse::<i64>().map(Value::from).ok(),
            Some("number") => raw.parse::<f64>().map(Value::from).ok(),
            Some("boolean") => raw.parse::<bool>().map(Value::from).ok(),
            _ => None,
        };
        object.insert(name.clone(), coerced.unwrap_or_else(|| Value::from(raw.as_str())));
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    use crate::request::Request;

    #[test]
    fn failure_policy_from_str() {
        assert_eq!(FailurePolicy::from_str("error"), Some(FailurePolicy::Error));
        assert_eq!(FailurePolicy::from_str("WARNING"), Some(FailurePolicy::Warning));
        assert_eq!(FailurePolicy::from_str("none"), Some(FailurePolicy::None));
        assert_eq!(FailurePolicy::from_str("loud"), None);
    }

    #[test]
    fn coerces_declared_types() {
        let schema = json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer" },
                "active": { "type": "boolean" },
                "name": { "type": "string" }
            }
        });
        let params = HashMap::from([
            ("limit".to_string(), "10".to_string()),
            ("active".to_string(), "true".to_string()),
            ("name".to_string(), "rex".to_string()),
        ]);
        let coerced = coerce_params(&params, &schema);
        assert_eq!(coerced["limit"], json!(10));
        assert_eq!(coerced["active"], json!(true));
        assert_eq!(coerced["name"], json!("rex"));
    }

    #[test]
    fn unparsable_values_stay_strings() {
        let schema = json!({
            "type": "object",
            "properties": { "limit": { "type": "integer" } }
        });
        let params = HashMap::from([("limit".to_string(), "lots".to_string())]);
        assert_eq!(coerce_params(&params, &schema)["limit"], json!("lots"));
    }

    fn body_contract(version: &str, required_field: &str) -> VersionedContract {
        VersionedContract::new(version)
            .body_schema(json!({
                "type": "object",
                "required": [required_field],
                "properties": { required_field: { "type": "string" } }
            }))
            .unwrap()
    }

    #[test]
    fn first_accepting_version_wins() {
        let contract = Contract::new(vec![body_contract("v1", "name"), body_contract("v2", "title")]);
        let mut req = Request::new(Method::POST, "/things");
        req.body = Some(json!({ "title": "a thing" }));
        let version = contract.resolve_version(&req).unwrap();
        assert_eq!(version.version, "v2");
    }

    #[test]
    fn no_match_concatenates_all_versions_issues() {
        let contract = Contract::new(vec![body_contract("v1", "name"), body_contract("v2", "title")]);
        let mut req = Request::new(Method::POST, "/things");
        req.body = Some(json!({ "other": 1 }));
        let issues = contract.resolve_version(&req).unwrap_err();
        assert!(issues.iter().any(|i| i.location.starts_with("v1")));
        assert!(issues.iter().any(|i| i.location.starts_with("v2")));
    }

    #[test]
    fn missing_body_is_reported() {
        let contract = Contract::new(vec![body_contract("v1", "name")]);
        let req = Request::new(Method::POST, "/things");
        let issues = contract.resolve_version(&req).unwrap_err();
        assert_eq!(issues[0].message, "missing request body");
    }

    #[test]
    fn response_validation_uses_status_schema() {
        let version = VersionedContract::new("v1")
            .response_schema(
                200,
                json!({
                    "type": "object",
                    "required": ["id"],
                    "properties": { "id": { "type": "integer" } }
                }),
            )
            .unwrap();
        let ok = crate::request::Response::json(200, json!({ "id": 7 }));
        assert!(version.validate_response(&ok).is_empty());
        let bad = crate::request::Response::json(200, json!({ "id": "seven" }));
        assert!(!version.validate_response(&bad).is_empty());
        let unlisted = crate::request::Response::json(204, json!(null));
        assert!(version.validate_response(&unlisted).is_empty());
    }

    #[test]
    fn response_headers_schema_applies_to_every_status() {
        let version = VersionedContract::new("v1")
            .response_headers_schema(json!({
                "type": "object",
                "required": ["x-request-id"],
                "properties": { "x-request-id": { "type": "string" } }
            }))
            .unwrap();
        // Response::json only sets content-type.
        let missing = crate::request::Response::json(200, json!({}));
        let issues = version.validate_response(&missing);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].location, "v1 response headers");

        let mut ok = crate::request::Response::json(204, json!(null));
        ok.headers
            .insert("x-request-id".to_string(), "req-1".to_string());
        assert!(version.validate_response(&ok).is_empty());
    }
}
