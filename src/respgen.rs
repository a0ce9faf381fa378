//! Response generation: makers, selectors, and the pattern rule table.
//!
//! The rule table is built once per spec load and is read-mostly afterwards.
//! The only mutable dispatch state is each selector's cursor, an atomic
//! index scoped to one (pattern, method) pair.

use crate::error::SpecError;
use crate::reqresp::{ContentType, Headers, Method, Request, Response};
use crate::spec::{MockSpec, ResponseSpec};
use crate::template;
use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Produces one response per dispatch for a request the serving loop has
/// decoded.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn respond(&self, request: &Request) -> Response;

    /// The `serverHeader` value declared by the loaded spec, if any.
    fn server_header(&self) -> Option<&str> {
        None
    }
}

/// Fallback generator answering 501 to everything. Useful as a safe default
/// and as a test double.
#[derive(Debug, Default)]
pub struct NotImplementedGenerator;

#[async_trait]
impl ResponseGenerator for NotImplementedGenerator {
    async fn respond(&self, _request: &Request) -> Response {
        Response::not_implemented()
    }
}

enum BodyKind {
    /// Body bytes precomputed at load time.
    Fixed(Bytes),
    /// Text template rendered per request.
    TextTemplate(String),
    /// JSON template rendered per request.
    JsonTemplate(Value),
}

/// One programmed response, resolved against the spec's global headers at
/// load time. Immutable; shared across all matching requests.
pub struct ResponseMaker {
    status: u16,
    headers: Headers,
    body: BodyKind,
}

impl ResponseMaker {
    pub fn new(spec: &ResponseSpec, global_headers: &Headers) -> Result<Self, SpecError> {
        // Global headers first, rule headers overlaid, then every empty or
        // null value dropped. A rule unsets a global default by declaring
        // the header with an empty value.
        let mut headers = global_headers.clone();
        for (name, value) in &spec.headers {
            headers.insert(name.clone(), value.clone().unwrap_or_default());
        }
        headers.retain(|_, value| !value.is_empty());

        let content_type = spec.resolved_content_type()?;
        let body = match spec.present_content() {
            // Empty content yields an empty body with interpolation off,
            // and injects no Content-Type.
            None | Some(Value::String(_)) if is_empty_content(spec) => {
                return Ok(Self {
                    status: spec.status,
                    headers,
                    body: BodyKind::Fixed(Bytes::new()),
                })
            }
            Some(Value::String(text)) if content_type == ContentType::Text => {
                if spec.interpolate {
                    BodyKind::TextTemplate(text.clone())
                } else {
                    BodyKind::Fixed(Bytes::from(text.clone()))
                }
            }
            Some(value) => {
                if spec.interpolate {
                    BodyKind::JsonTemplate(value.clone())
                } else {
                    let encoded = template::to_json_string(value)?;
                    BodyKind::Fixed(Bytes::from(encoded))
                }
            }
            // unreachable in practice: is_empty_content covers None
            None => BodyKind::Fixed(Bytes::new()),
        };

        if !headers.contains_key("Content-Type") {
            headers.insert(
                "Content-Type".to_string(),
                content_type.header_value().to_string(),
            );
        }

        Ok(Self {
            status: spec.status,
            headers,
            body,
        })
    }

    /// Synthesize the response for one dispatch. `groups` are the ordered
    /// capture groups of the path match, empty strings for unmatched
    /// optional groups. Template failures degrade to a 500 with a
    /// diagnostic body; the serving loop stays up.
    pub fn make_response(&self, groups: &[String]) -> Response {
        let body = match &self.body {
            BodyKind::Fixed(bytes) => bytes.clone(),
            BodyKind::TextTemplate(text) => match template::render_str(text, groups) {
                Ok(rendered) => Bytes::from(rendered),
                Err(e) => return Response::template_failure(&e),
            },
            BodyKind::JsonTemplate(value) => {
                let rendered = template::render_value(value, groups)
                    .and_then(|v| template::to_json_string(&v).map_err(Into::into));
                match rendered {
                    Ok(encoded) => Bytes::from(encoded),
                    Err(e) => return Response::template_failure(&e),
                }
            }
        };
        Response::new(self.status, self.headers.clone(), body)
    }
}

fn is_empty_content(spec: &ResponseSpec) -> bool {
    match spec.present_content() {
        None => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Chooses among the programmed responses for one (pattern, method) pair.
///
/// Sticky mode replays the last response once the sequence is exhausted;
/// looping mode wraps around. The cursor advances exactly once per call,
/// atomically, so concurrent dispatches observe distinct consecutive
/// positions.
pub struct ResponseSelector {
    makers: Vec<ResponseMaker>,
    looping: bool,
    cursor: AtomicUsize,
}

impl ResponseSelector {
    pub fn new(looping: bool) -> Self {
        Self {
            makers: Vec::new(),
            looping,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Appends a maker. Load-time only; not safe concurrently with dispatch.
    pub fn add(&mut self, maker: ResponseMaker) {
        self.makers.push(maker);
    }

    pub fn is_empty(&self) -> bool {
        self.makers.is_empty()
    }

    pub fn make_response(&self, groups: &[String]) -> Response {
        if self.makers.is_empty() {
            return Response::not_found();
        }
        let len = self.makers.len();
        let idx = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| {
                Some(if self.looping {
                    (i + 1) % len
                } else {
                    (i + 1).min(len - 1)
                })
            })
            .unwrap_or(0);
        self.makers[idx].make_response(groups)
    }
}

struct CompiledRule {
    /// Anchored to match the full path, never a substring.
    pattern: Regex,
    raw_pattern: String,
    selectors: HashMap<Method, ResponseSelector>,
}

/// The ordered rule table: first full match wins, declaration order is the
/// only ordering signal.
pub struct PatternResponseGenerator {
    rules: Vec<CompiledRule>,
    server_header: Option<String>,
}

impl PatternResponseGenerator {
    /// Build a generator from a validated spec. On error nothing is
    /// produced, so a previously installed generator stays in force.
    pub fn from_spec(spec: &MockSpec) -> Result<Self, SpecError> {
        let mut rules = Vec::with_capacity(spec.rules.len());
        for (raw_pattern, rule) in &spec.rules {
            let anchored = format!(r"\A(?:{raw_pattern})\z");
            let pattern = Regex::new(&anchored).map_err(|source| SpecError::Pattern {
                pattern: raw_pattern.clone(),
                source,
            })?;

            let mut selectors = HashMap::new();
            for (method, method_spec) in &rule.0 {
                let mut selector = ResponseSelector::new(method_spec.looping());
                for response_spec in method_spec.responses() {
                    selector.add(ResponseMaker::new(response_spec, &spec.global.headers)?);
                }
                selectors.insert(*method, selector);
            }

            rules.push(CompiledRule {
                pattern,
                raw_pattern: raw_pattern.clone(),
                selectors,
            });
        }

        debug!(rules = rules.len(), "compiled rule table");
        Ok(Self {
            rules,
            server_header: spec.global.server_header.clone(),
        })
    }

    /// Parse, validate, and compile a spec document in one step.
    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        Self::from_spec(&MockSpec::from_json(json)?)
    }

    pub fn dispatch(&self, request: &Request) -> Response {
        for rule in &self.rules {
            let Some(captures) = rule.pattern.captures(&request.path) else {
                continue;
            };
            if let Some(selector) = rule.selectors.get(&request.method) {
                let groups: Vec<String> = captures
                    .iter()
                    .skip(1)
                    .map(|m| m.map_or("", |m| m.as_str()).to_string())
                    .collect();
                debug!(
                    pattern = %rule.raw_pattern,
                    method = %request.method,
                    path = %request.path,
                    "rule matched"
                );
                return selector.make_response(&groups);
            }
            // A matched pattern with an undeclared method ends the scan.
            break;
        }
        warn!(method = %request.method, path = %request.path, "no rule matched");
        Response::not_found()
    }
}

#[async_trait]
impl ResponseGenerator for PatternResponseGenerator {
    async fn respond(&self, request: &Request) -> Response {
        self.dispatch(request)
    }

    fn server_header(&self) -> Option<&str> {
        self.server_header.as_deref()
    }
}
