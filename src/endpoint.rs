//! The (method, path, node) triple a single attempt is sent to.

use crate::node::Node;

/// HTTP methods the transport issues. A closed set rather than a free-form string, so the
/// pipeline's idempotency/retryable-status checks can match on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Idempotent methods are eligible for retry against a non-success response.
    pub fn is_idempotent(self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Put | HttpMethod::Delete)
    }

    /// `HEAD` requests always skip body deserialization.
    pub fn is_head(self) -> bool {
        matches!(self, HttpMethod::Head)
    }

    /// The wire representation, for building the outgoing request.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a single attempt is sent: method, path-and-query, and the node bound to this attempt.
/// The pipeline rebinds `node` on every retry iteration.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// HTTP method for this attempt.
    pub method: HttpMethod,
    /// Path and query string, e.g. `/_cluster/health?pretty`.
    pub path_and_query: String,
    /// The node this attempt targets.
    pub node: Node,
}

impl Endpoint {
    /// Builds an endpoint against `node`.
    pub fn new(method: HttpMethod, path_and_query: impl Into<String>, node: Node) -> Self {
        Self { method, path_and_query: path_and_query.into(), node }
    }

    /// The full URI this attempt is sent to (`node.uri()` + `path_and_query`).
    pub fn uri(&self) -> String {
        format!("{}{}", self.node.uri(), self.path_and_query)
    }
}
