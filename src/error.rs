//! The transport's error taxonomy.
//!
//! Most failures never reach a caller as an `Err`: transient I/O, timeouts, non-success
//! responses, and deserialization problems are folded into a returned
//! [`crate::response::TransportResponse`] whose [`crate::response::ApiCallDetails`] carries the
//! classification (see `ApiCallDetails::original_exception`). Only cancellation and
//! configuration errors escape as an `Err` by default; setting
//! `BoundConfiguration::throw_exceptions` promotes pool-exhausted and non-success terminals to
//! errors too.

use std::time::Duration;

use crate::audit::AuditTrail;

/// The seven-category error taxonomy a transport call can surface.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Transient I/O failure against a single node (network unreachable, TLS handshake, DNS,
    /// read/write error). Retried against the next node by the pipeline; never escapes to a
    /// caller on its own.
    #[error("transient I/O error against {node}: {source}")]
    Transient {
        /// The node the attempt was made against.
        node: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A single attempt exceeded `BoundConfiguration::request_timeout`. Treated as transient:
    /// retried if the per-call budget allows.
    #[error("request to {node} timed out after {elapsed:?} (limit {limit:?})")]
    Timeout {
        /// The node the attempt was made against.
        node: String,
        /// Time actually observed before the timeout fired.
        elapsed: Duration,
        /// The configured per-attempt timeout.
        limit: Duration,
    },

    /// The call's cancellation token fired. Terminal: no further attempts or sniffs occur.
    #[error("request was cancelled")]
    Cancelled,

    /// The response carried a non-success status code that either isn't in the retryable set
    /// or whose method isn't idempotent, and `throw_exceptions` is set.
    #[error("non-success response: status {status} for {method} {path}")]
    NonSuccess {
        /// HTTP status code received.
        status: u16,
        /// HTTP method of the request.
        method: String,
        /// Path the request was sent to.
        path: String,
    },

    /// The response body could not be deserialized into the requested type. Normally attached to
    /// `ApiCallDetails::original_exception` rather than surfaced directly.
    #[error("failed to deserialize response body: {0}")]
    Deserialization(String),

    /// Every node in the pool was tried (or the pool had no usable node) and none produced a
    /// success. Always constructed by `RequestPipeline::run`; whether this actually reaches a
    /// caller as an `Err` or is downgraded to a failure `TransportResponse` is decided by
    /// `Transport` based on `BoundConfiguration::throw_exceptions` (see `DESIGN.md`). The
    /// attached `audit` lets the façade carry the full trail into that synthesized response
    /// either way.
    #[error("node pool exhausted after {attempts} attempt(s): {last}")]
    PoolExhausted {
        /// Number of attempts made before giving up.
        attempts: usize,
        /// Human-readable summary of the last failure.
        last: String,
        /// The call's audit trail up to and including the terminal event.
        audit: AuditTrail,
    },

    /// Invalid configuration, raised synchronously before any I/O is attempted.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
}

impl TransportError {
    /// True for the categories the pipeline treats as retryable against another node.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Transient { .. } | TransportError::Timeout { .. })
    }

    /// True for the terminal, non-retryable categories.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportError::Cancelled | TransportError::Configuration(_))
    }
}

/// Errors raised by [`crate::config::TransportConfigurationBuilder::build`].
///
/// Configuration errors are category 7 of the taxonomy above: they are always raised
/// synchronously, before any I/O, and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A duration field was zero where a positive duration is required.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending field.
        field: &'static str,
    },
    /// The node pool was constructed with no seed nodes.
    #[error("node pool must have at least one seed node")]
    EmptyNodePool,
    /// A timeout value failed validation (wraps [`crate::timeout::TimeoutError`]).
    #[error("invalid timeout: {0}")]
    Timeout(#[from] crate::timeout::TimeoutError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_timeout_are_retryable() {
        let t = TransportError::Timeout {
            node: "n1".into(),
            elapsed: Duration::from_secs(1),
            limit: Duration::from_millis(500),
        };
        assert!(t.is_retryable());
        assert!(!t.is_terminal());
    }

    #[test]
    fn cancelled_and_configuration_are_terminal() {
        assert!(TransportError::Cancelled.is_terminal());
        assert!(!TransportError::Cancelled.is_retryable());

        let cfg = TransportError::Configuration(ConfigError::EmptyNodePool);
        assert!(cfg.is_terminal());
    }

    #[test]
    fn non_success_is_neither_retryable_nor_terminal_by_default() {
        let e = TransportError::NonSuccess { status: 404, method: "GET".into(), path: "/x".into() };
        assert!(!e.is_retryable());
        assert!(!e.is_terminal());
    }

    #[test]
    fn config_error_messages_are_human_readable() {
        let e = ConfigError::EmptyNodePool;
        assert!(e.to_string().contains("at least one seed node"));
    }
}
