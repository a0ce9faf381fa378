//! Mock specification schema and validation.
//!
//! A spec document is a JSON object with optional `global` settings and an
//! ordered `rules` map from path patterns to per-method response
//! definitions. Loading is fail-fast: the first violation aborts the whole
//! load and nothing is installed.

use crate::error::SpecError;
use crate::reqresp::{ContentType, Method};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// The reserved header name settable only through `global.serverHeader`.
pub const SERVER_HEADER_NAME: &str = "Server";

/// A parsed and validated mock specification document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockSpec {
    /// Document-wide defaults applied to every rule.
    #[serde(default)]
    pub global: GlobalSpec,

    /// Pattern rules in declaration order. Order is significant: dispatch is
    /// first-match-wins.
    #[serde(default)]
    pub rules: IndexMap<String, RuleSpec>,
}

impl MockSpec {
    /// Load and validate a specification from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, SpecError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate a specification from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        let spec: Self = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Semantic checks beyond what the schema can express.
    pub fn validate(&self) -> Result<(), SpecError> {
        self.global.validate()?;
        for (pattern, rule) in &self.rules {
            regex::Regex::new(pattern).map_err(|source| SpecError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            for spec in rule.0.values().flat_map(|m| m.responses()) {
                spec.validate().map_err(|e| match e {
                    SpecError::Schema(msg) => {
                        SpecError::Schema(format!("rule {pattern:?}: {msg}"))
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }
}

/// Document-wide defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalSpec {
    /// Headers merged into every response (a rule can override or unset).
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Value of the `Server` header emitted by the listener.
    #[serde(default, rename = "serverHeader")]
    pub server_header: Option<String>,
}

impl GlobalSpec {
    fn validate(&self) -> Result<(), SpecError> {
        if self.headers.contains_key(SERVER_HEADER_NAME) {
            return Err(SpecError::ReservedHeader);
        }
        if let Some(header) = &self.server_header {
            if header.is_empty() {
                return Err(SpecError::Schema(
                    "global.serverHeader must be a non-empty string".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// One rule: the per-method response definitions for a single pattern.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleSpec(pub IndexMap<Method, MethodSpec>);

/// The response definition(s) declared for one (pattern, method) pair:
/// either a single definition or an explicit sequence with a selection
/// policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MethodSpec {
    Sequence(SequenceSpec),
    Single(ResponseSpec),
}

impl MethodSpec {
    /// The ordered response definitions, one or more.
    pub fn responses(&self) -> &[ResponseSpec] {
        match self {
            MethodSpec::Sequence(seq) => &seq.responses,
            MethodSpec::Single(spec) => std::slice::from_ref(spec),
        }
    }

    /// Whether the selector cycles (`loop: true`) or sticks on the last
    /// response after exhausting the sequence.
    pub fn looping(&self) -> bool {
        match self {
            MethodSpec::Sequence(seq) => seq.looping,
            MethodSpec::Single(_) => false,
        }
    }
}

/// An ordered sequence of responses served across successive matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceSpec {
    pub responses: Vec<ResponseSpec>,

    #[serde(default, rename = "loop")]
    pub looping: bool,
}

/// A single programmed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseSpec {
    #[serde(default = "default_status")]
    pub status: u16,

    /// Rule headers overlaid on the global headers. A null or empty value
    /// unsets the header even if present globally.
    #[serde(default)]
    pub headers: IndexMap<String, Option<String>>,

    /// Response content: a string for text, any JSON value for json.
    #[serde(default)]
    pub content: Option<Value>,

    #[serde(default, rename = "contentType")]
    pub content_type: Option<ContentType>,

    /// Whether the content is a template interpolated with the path
    /// captures of each matching request.
    #[serde(default)]
    pub interpolate: bool,
}

fn default_status() -> u16 {
    200
}

impl ResponseSpec {
    pub fn validate(&self) -> Result<(), SpecError> {
        if !(100..=599).contains(&self.status) {
            return Err(SpecError::Status(self.status));
        }
        if self.headers.contains_key(SERVER_HEADER_NAME) {
            return Err(SpecError::ReservedHeader);
        }
        self.resolved_content_type()?;
        Ok(())
    }

    /// The content present in this definition, with `null` treated as
    /// absent.
    pub fn present_content(&self) -> Option<&Value> {
        self.content.as_ref().filter(|v| !v.is_null())
    }

    /// The effective content type, inferring `text` for string content and
    /// `json` for objects and arrays when none is declared. Content that
    /// fits neither declared nor inferable type is a load-time error.
    pub fn resolved_content_type(&self) -> Result<ContentType, SpecError> {
        let content = self.present_content();
        match (self.content_type, content) {
            (Some(ContentType::Json), _) => Ok(ContentType::Json),
            (Some(ContentType::Text), None | Some(Value::String(_))) => Ok(ContentType::Text),
            (Some(ContentType::Text), Some(other)) => Err(SpecError::Schema(format!(
                "content {other} is not a string but contentType is text"
            ))),
            (None, None | Some(Value::String(_))) => Ok(ContentType::Text),
            (None, Some(Value::Object(_)) | Some(Value::Array(_))) => Ok(ContentType::Json),
            (None, Some(other)) => Err(SpecError::Schema(format!(
                "content {other} requires an explicit contentType"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TODO_SPEC: &str = r#"
{
    "global": {
        "headers": {"X-Powered-By": "mockd"},
        "serverHeader": "todo-backend/1.0"
    },
    "rules": {
        "^/users/(\\w+)/todo/(\\d+)$": {
            "GET": {
                "status": 200,
                "content": {"user": "{0}", "taskid": "{1}"},
                "contentType": "json",
                "interpolate": true
            },
            "DELETE": {
                "status": 410
            }
        },
        "^/users/\\w+/todo/?$": {
            "POST": {
                "responses": [
                    {"content": {"taskid": "123"}, "contentType": "json"},
                    {"status": 429}
                ],
                "loop": true
            }
        }
    }
}
"#;

    #[test]
    fn test_parse_valid_spec() {
        let spec = MockSpec::from_json(TODO_SPEC).unwrap();
        assert_eq!(spec.global.server_header.as_deref(), Some("todo-backend/1.0"));
        assert_eq!(spec.rules.len(), 2);

        // declaration order preserved
        let patterns: Vec<_> = spec.rules.keys().collect();
        assert_eq!(patterns[0], "^/users/(\\w+)/todo/(\\d+)$");

        let rule = &spec.rules[0];
        let get = rule.0.get(&Method::Get).unwrap();
        assert_eq!(get.responses().len(), 1);
        assert!(get.responses()[0].interpolate);
        assert!(!get.looping());

        let post = spec.rules[1].0.get(&Method::Post).unwrap();
        assert_eq!(post.responses().len(), 2);
        assert!(post.looping());
    }

    #[test]
    fn test_defaults() {
        let spec = MockSpec::from_json(r#"{"rules": {"^/$": {"GET": {}}}}"#).unwrap();
        let get = spec.rules[0].0.get(&Method::Get).unwrap();
        let resp = &get.responses()[0];
        assert_eq!(resp.status, 200);
        assert!(resp.headers.is_empty());
        assert!(resp.present_content().is_none());
        assert!(!resp.interpolate);
    }

    #[test]
    fn test_empty_document() {
        let spec = MockSpec::from_json("{}").unwrap();
        assert!(spec.rules.is_empty());
        assert!(spec.global.headers.is_empty());
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            MockSpec::from_json("this is not json"),
            Err(SpecError::Json(_))
        ));
    }

    #[test]
    fn test_unknown_property_rejected() {
        let err = MockSpec::from_json(r#"{"globals": {}}"#);
        assert!(matches!(err, Err(SpecError::Json(_))));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let err = MockSpec::from_json(r#"{"rules": {"^/$": {"BREW": {}}}}"#);
        assert!(matches!(err, Err(SpecError::Json(_))));
    }

    #[test]
    fn test_non_boolean_interpolate_rejected() {
        let err = MockSpec::from_json(r#"{"rules": {"^/$": {"GET": {"interpolate": "yes"}}}}"#);
        assert!(matches!(err, Err(SpecError::Json(_))));
    }

    #[test]
    fn test_out_of_range_status_rejected() {
        let err = MockSpec::from_json(r#"{"rules": {"^/$": {"GET": {"status": 777}}}}"#);
        assert!(matches!(err, Err(SpecError::Status(777))));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = MockSpec::from_json(r#"{"rules": {"^/users/(": {"GET": {}}}}"#);
        assert!(matches!(err, Err(SpecError::Pattern { .. })));
    }

    #[test]
    fn test_reserved_server_header_rejected() {
        let err = MockSpec::from_json(r#"{"global": {"headers": {"Server": "x"}}}"#);
        assert!(matches!(err, Err(SpecError::ReservedHeader)));

        let err =
            MockSpec::from_json(r#"{"rules": {"^/$": {"GET": {"headers": {"Server": "x"}}}}}"#);
        assert!(matches!(err, Err(SpecError::ReservedHeader)));
    }

    #[test]
    fn test_empty_server_header_rejected() {
        let err = MockSpec::from_json(r#"{"global": {"serverHeader": ""}}"#);
        assert!(matches!(err, Err(SpecError::Schema(_))));
    }

    #[test]
    fn test_non_string_header_value_rejected() {
        let err = MockSpec::from_json(r#"{"rules": {"^/$": {"GET": {"headers": {"a": 1}}}}}"#);
        assert!(matches!(err, Err(SpecError::Json(_))));
    }

    #[test]
    fn test_text_content_must_be_string() {
        let err = MockSpec::from_json(
            r#"{"rules": {"^/$": {"GET": {"content": {"x": 1}, "contentType": "text"}}}}"#,
        );
        assert!(matches!(err, Err(SpecError::Schema(_))));
    }

    #[test]
    fn test_scalar_content_requires_declared_type() {
        let err = MockSpec::from_json(r#"{"rules": {"^/$": {"GET": {"content": 42}}}}"#);
        assert!(matches!(err, Err(SpecError::Schema(_))));

        // legal with an explicit json type
        MockSpec::from_json(r#"{"rules": {"^/$": {"GET": {"content": 42, "contentType": "json"}}}}"#)
            .unwrap();
    }

    #[test]
    fn test_content_type_inference() {
        let spec = MockSpec::from_json(
            r#"{"rules": {"^/$": {"GET": {"content": {"x": 1}}, "POST": {"content": "hi"}}}}"#,
        )
        .unwrap();
        let rule = &spec.rules[0];
        let get = &rule.0.get(&Method::Get).unwrap().responses()[0];
        let post = &rule.0.get(&Method::Post).unwrap().responses()[0];
        assert_eq!(get.resolved_content_type().unwrap(), ContentType::Json);
        assert_eq!(post.resolved_content_type().unwrap(), ContentType::Text);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TODO_SPEC.as_bytes()).unwrap();
        let spec = MockSpec::from_file(file.path()).unwrap();
        assert_eq!(spec.rules.len(), 2);

        assert!(matches!(
            MockSpec::from_file(Path::new("/nonexistent/spec.json")),
            Err(SpecError::Io(_))
        ));
    }
}
