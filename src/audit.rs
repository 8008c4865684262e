//! The per-call audit trail embedded in `ApiCallDetails`.
//!
//! An `AuditEvent` sequence is plain data accumulated by the pipeline as it runs, not a
//! `Service`-shaped hook — that's `diagnostics`'s job. A closed set of named events, `Display`
//! derived by hand rather than `strum`, narrowed to the kinds a transport call actually produces.

use std::time::Duration;

use crate::node::Node;

/// One notable occurrence during a logical call's lifetime, in the order it happened.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AuditEventKind {
    /// The pool's first-ever sniff, fired before any request on first use.
    SniffOnStartup,
    /// A sniff triggered by a connection failure.
    SniffOnFailure,
    /// A sniff triggered because `pool.age() > sniff_lifespan`.
    SniffOnStaleCluster,
    /// A sniff attempt reseeded the pool.
    SniffSuccess,
    /// A sniff attempt ran but discovered no usable nodes.
    SniffFailure,
    /// A `Resurrecting` node was selected and is about to be pinged.
    Resurrection,
    /// A revival ping failed; the node remains dead.
    PingFailure,
    /// A revival ping succeeded; the node was marked alive.
    PingSuccess,
    /// An attempt against a node failed (transient error or a retryable non-success status).
    BadResponse,
    /// An attempt succeeded.
    HealthyResponse,
    /// The pool had no live candidate; a forced attempt was made against the soonest-reviving
    /// dead node.
    AllNodesDead,
    /// The call was cancelled.
    CancellationRequested,
    /// The per-call deadline (`max_retry_timeout`) elapsed before a successful attempt.
    MaxTimeoutReached,
    /// The attempt budget (`max_retries + 1`) was exhausted before a successful attempt.
    MaxRetriesReached,
    /// Every node in the pool was tried without success; the call ends in a failure response.
    FailedOverAllNodes,
    /// No node was ever attempted (e.g. an empty traversal with no dead nodes to force against).
    NoNodesAttempted,
}

/// A single recorded occurrence, with timing and an optional attached error summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub node: Option<String>,
    pub timestamp_millis: u64,
    pub duration: Duration,
    pub exception: Option<String>,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind, node: Option<&Node>, timestamp_millis: u64, duration: Duration) -> Self {
        Self { kind, node: node.map(|n| n.uri().to_string()), timestamp_millis, duration, exception: None }
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }
}

/// Ordered audit trail for one logical call. The pipeline appends; `ResponseFactory` copies the
/// finished trail into `ApiCallDetails`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuditTrail(Vec<AuditEvent>);

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: AuditEvent) {
        self.0.push(event);
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
