//! mockd - Mock HTTP API Server
//!
//! Serves pre-programmed HTTP responses from a declarative JSON
//! specification: regex path patterns, per-method response definitions, and
//! positional interpolation of path captures into response bodies. Useful
//! for exercising HTTP clients against deterministic endpoints without a
//! real backend.
//!
//! # Features
//!
//! - **Pattern Rules**: regex path patterns matched full-string, first
//!   declaration wins
//! - **Response Sequences**: several responses per rule and method, served
//!   sticky or round-robin
//! - **Interpolation**: `{0}`, `{1}`, ... placeholders filled from path
//!   capture groups, recursively through JSON content
//! - **Global Headers**: document-wide defaults any rule can override or
//!   unset
//!
//! # Example Specification
//!
//! ```json
//! {
//!     "global": {
//!         "headers": {"X-Powered-By": "mockd"},
//!         "serverHeader": "todo-backend/1.0"
//!     },
//!     "rules": {
//!         "^/users/(\\w+)/todo/(\\d+)$": {
//!             "GET": {
//!                 "status": 200,
//!                 "content": {"user": "{0}", "taskid": "{1}"},
//!                 "contentType": "json",
//!                 "interpolate": true
//!             },
//!             "DELETE": {"status": 410}
//!         }
//!     }
//! }
//! ```

pub mod error;
pub mod reqresp;
pub mod respgen;
pub mod server;
pub mod spec;
pub mod template;

pub use error::{RequestError, SpecError, TemplateError};
pub use reqresp::{Body, ContentType, Headers, Method, Request, Response};
pub use respgen::{NotImplementedGenerator, PatternResponseGenerator, ResponseGenerator};
pub use server::MockServer;
pub use spec::MockSpec;
