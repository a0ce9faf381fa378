//! Request and response descriptors exchanged with the HTTP listener.

use crate::error::RequestError;
use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered header map. Insertion order is preserved for wire output; map
/// equality ignores it.
pub type Headers = IndexMap<String, String>;

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Trace,
    Patch,
    Connect,
}

impl Method {
    pub const ALL: [Method; 9] = [
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Options,
        Method::Trace,
        Method::Patch,
        Method::Connect,
    ];

    /// Parses a method token as it appears on the request line.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            "OPTIONS" => Some(Method::Options),
            "TRACE" => Some(Method::Trace),
            "PATCH" => Some(Method::Patch),
            "CONNECT" => Some(Method::Connect),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::Connect => "CONNECT",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content type of a programmed response body.
///
/// Governs serialization and the default `Content-Type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Json,
}

impl ContentType {
    pub fn header_value(&self) -> &'static str {
        match self {
            ContentType::Text => "text/plain",
            ContentType::Json => "application/json",
        }
    }
}

/// Buffered request body with decoding helpers.
///
/// The listener buffers the body before dispatch, so repeated reads are
/// idempotent. Decoding failures surface as [`RequestError`] to whoever
/// asked for the decode.
#[derive(Debug, Clone, Default)]
pub struct Body {
    bytes: Bytes,
}

impl Body {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn utf8(&self) -> Result<&str, RequestError> {
        Ok(std::str::from_utf8(&self.bytes)?)
    }

    pub fn json(&self) -> Result<serde_json::Value, RequestError> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }
}

/// A decoded inbound request, read-only to the engine.
#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    pub method: Method,
    pub headers: Headers,
    pub body: Body,
}

impl Request {
    pub fn new(path: impl Into<String>, method: Method, headers: Headers, body: Body) -> Self {
        Self {
            path: path.into(),
            method,
            headers,
            body,
        }
    }
}

/// A resolved response descriptor, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// 404 with empty headers and body: no rule matched, or the matched rule
    /// declares nothing for the request's method.
    pub fn not_found() -> Self {
        Self::new(404, Headers::new(), Bytes::new())
    }

    /// 501 returned by the fallback generator.
    pub fn not_implemented() -> Self {
        Self::new(501, Headers::new(), Bytes::new())
    }

    /// 500 carrying a template rendering error as a plain-text diagnostic.
    pub fn template_failure(error: &crate::error::TemplateError) -> Self {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "text/plain".to_string());
        Self::new(500, headers, error.to_string())
    }
}

/// Standard reason phrase for a status code, `"Unknown"` for codes without
/// a registered phrase.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a Teapot",
        422 => "Unprocessable Entity",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}
