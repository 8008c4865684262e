//! Deterministic test doubles, always compiled (not feature-gated) so both this crate's own
//! tests and downstream integration tests can depend on them without a dev-only cfg dance.
//!
//! Grounded on the teacher's `sleeper.rs` (`InstantSleeper`/`TrackingSleeper`) and
//! `circuit_breaker.rs`'s test-only manual clock: a controllable time source plus in-memory fakes
//! for every external collaborator trait, so pipeline tests never depend on wall-clock time or
//! real I/O.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::clock::Clock;
use crate::config::BoundConfiguration;
use crate::endpoint::Endpoint;
use crate::invoker::{InvokerError, InvokerOutcome, RequestInvoker};
use crate::post_data::PostData;
use crate::serializer::{Serializer, SerializerError};

/// A [`Clock`] whose `now_millis()` only moves when told to, via [`ManualClock::advance`].
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// A fresh clock starting at `t = 0`.
    pub fn new() -> Self {
        Self { millis: AtomicU64::new(0) }
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.millis.fetch_add(duration.as_millis() as u64, Ordering::AcqRel);
    }

    /// Reads the current time directly, without going through the [`Clock`] trait.
    pub fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::Acquire)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::Acquire)
    }
}

/// Builds a bare-bones [`InvokerOutcome`] for scripting [`ScriptedInvoker`] responses.
pub fn invoker_outcome(status: u16, body: &[u8], content_type: &str) -> InvokerOutcome {
    InvokerOutcome {
        status,
        headers: Vec::new(),
        content_type: Some(content_type.to_string()),
        content_length: body.len() as i64,
        body: Bytes::copy_from_slice(body),
        elapsed: Duration::from_millis(1),
    }
}

/// A [`RequestInvoker`] whose responses are scripted per node URI ahead of time, so pipeline
/// tests can drive "first node fails, second node succeeds" scenarios deterministically.
///
/// Grounded on the teacher's `sleeper.rs::TrackingSleeper` (records what was asked of it, with a
/// scripted/counted reply) shape, adapted from a single counter to one queue per node since
/// `RequestPipeline` addresses attempts by node rather than by call order alone.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Result<InvokerOutcome, InvokerError>>>>,
    calls: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `result` as the next response for requests against `node_uri`. Queued results for
    /// a node are consumed in order; once exhausted, further requests against that node get a
    /// bare `200 application/json {}` success.
    pub fn push(&self, node_uri: impl Into<String>, result: Result<InvokerOutcome, InvokerError>) {
        self.scripts.lock().unwrap().entry(node_uri.into()).or_default().push_back(result);
    }

    /// Total number of `request` calls observed so far, across every node.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RequestInvoker for ScriptedInvoker {
    async fn request(
        &self,
        endpoint: &Endpoint,
        _bound_config: &BoundConfiguration,
        _body: Option<&PostData>,
    ) -> Result<InvokerOutcome, InvokerError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.entry(endpoint.node.uri().to_string()).or_default().pop_front() {
            Some(result) => result,
            None => Ok(invoker_outcome(200, b"{}", "application/json")),
        }
    }
}

/// A [`Serializer`] over `serde_json`, kept here (rather than only in `transit-json`) so this
/// crate's own pipeline/response tests don't need an extra workspace dependency.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeSerializer;

impl Serializer for FakeSerializer {
    fn serialize<T>(&self, value: &T) -> Result<Bytes, SerializerError>
    where
        T: serde::Serialize,
    {
        serde_json::to_vec(value).map(Bytes::from).map_err(|e| SerializerError::Serialize(Box::new(e)))
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, SerializerError>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(|e| SerializerError::Deserialize(Box::new(e)))
    }
}
