//! A separate diagnostic source: paired begin/end events for external observers, emitted
//! best-effort and never able to alter control flow.
//!
//! `DiagnosticSink` is a `tower_service::Service` supertrait, with `NullSink`/`LogSink`/
//! `MemorySink` implementations. This crate keeps only `tower-service` (the trait definitions)
//! rather than the full `tower` crate, so `emit_best_effort` drives readiness by hand with
//! `std::future::poll_fn` instead of `tower::ServiceExt::ready_oneshot`.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tower_service::Service;

use crate::endpoint::HttpMethod;

/// A begin/end pair describing one stage of a logical call (sniff, ping, single attempt).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum DiagnosticEvent {
    AttemptStarted { node: String, method: HttpMethod },
    AttemptFinished { node: String, method: HttpMethod, status: Option<u16>, duration: Duration },
    SniffStarted,
    SniffFinished { discovered_nodes: usize, duration: Duration },
    PingStarted { node: String },
    PingFinished { node: String, success: bool, duration: Duration },
}

impl std::fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticEvent::AttemptStarted { node, method } => write!(f, "AttemptStarted({method} {node})"),
            DiagnosticEvent::AttemptFinished { node, method, status, duration } => {
                write!(f, "AttemptFinished({method} {node}, status={status:?}, {duration:?})")
            }
            DiagnosticEvent::SniffStarted => write!(f, "SniffStarted"),
            DiagnosticEvent::SniffFinished { discovered_nodes, duration } => {
                write!(f, "SniffFinished(nodes={discovered_nodes}, {duration:?})")
            }
            DiagnosticEvent::PingStarted { node } => write!(f, "PingStarted({node})"),
            DiagnosticEvent::PingFinished { node, success, duration } => {
                write!(f, "PingFinished({node}, success={success}, {duration:?})")
            }
        }
    }
}

/// A sink for [`DiagnosticEvent`]s. Implementations must never block or fail the caller;
/// `emit_best_effort` enforces that at the call site regardless.
pub trait DiagnosticSink:
    Service<DiagnosticEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    type SinkError: std::error::Error + Send + 'static;
}

/// Emits `event` on `sink`, swallowing both a not-ready sink and a call error.
pub async fn emit_best_effort<S>(mut sink: S, event: DiagnosticEvent)
where
    S: Service<DiagnosticEvent, Response = ()> + Send,
    S::Future: Send,
{
    if std::future::poll_fn(|cx| sink.poll_ready(cx)).await.is_ok() {
        let _ = sink.call(event).await;
    }
}

/// Discards every event.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<DiagnosticEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: DiagnosticEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl DiagnosticSink for NullSink {
    type SinkError = Infallible;
}

/// Logs every event via `tracing`.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<DiagnosticEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DiagnosticEvent) -> Self::Future {
        tracing::debug!(event = %event, "diagnostic_event");
        Box::pin(async { Ok(()) })
    }
}

impl DiagnosticSink for LogSink {
    type SinkError = Infallible;
}

/// Stores events in a bounded ring buffer, evicting the oldest when full.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<DiagnosticEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { events: Arc::new(Mutex::new(Vec::new())), capacity: capacity.max(1), evicted: Arc::new(AtomicU64::new(0)) }
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<DiagnosticEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DiagnosticEvent) -> Self::Future {
        let mut guard = self.events.lock().unwrap();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl DiagnosticSink for MemorySink {
    type SinkError = Infallible;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sink_accepts_everything() {
        emit_best_effort(NullSink, DiagnosticEvent::SniffStarted).await;
    }

    #[tokio::test]
    async fn memory_sink_evicts_oldest_past_capacity() {
        let sink = MemorySink::with_capacity(2);
        emit_best_effort(sink.clone(), DiagnosticEvent::SniffStarted).await;
        emit_best_effort(sink.clone(), DiagnosticEvent::PingStarted { node: "a".into() }).await;
        emit_best_effort(
            sink.clone(),
            DiagnosticEvent::SniffFinished { discovered_nodes: 3, duration: Duration::from_millis(1) },
        )
        .await;

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.evicted(), 1);
        assert!(matches!(sink.events()[0], DiagnosticEvent::PingStarted { .. }));
    }

    #[tokio::test]
    async fn memory_sink_can_be_cleared() {
        let sink = MemorySink::new();
        emit_best_effort(sink.clone(), DiagnosticEvent::SniffStarted).await;
        assert_eq!(sink.len(), 1);
        sink.clear();
        assert!(sink.is_empty());
    }
}
