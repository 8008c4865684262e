//! The first node in the traversal fails; the second answers and the call succeeds.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use transit::audit::AuditEventKind;
use transit::node::{Node, NodeState};
use transit::node_pool::{NodePool, PoolKind};
use transit::product::DefaultProductRegistration;
use transit::testing::{invoker_outcome, FakeSerializer, ManualClock, ScriptedInvoker};
use transit::{memory_stream::PooledMemoryStreamFactory, Transport, TransportConfiguration};

#[derive(Debug, Deserialize, PartialEq)]
struct Doc {
    ok: bool,
}

#[tokio::test]
async fn transient_failure_on_first_node_fails_over_to_the_second() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.push("http://a:9200", Err(transit::invoker::InvokerError::Transient(Box::new(std::io::Error::other("refused")))));
    invoker.push("http://b:9200", Ok(invoker_outcome(200, br#"{"ok":true}"#, "application/json")));

    let clock: Arc<dyn transit::clock::Clock> = Arc::new(ManualClock::new());
    let node_a = Node::new("http://a:9200", vec![]);
    let node_b = Node::new("http://b:9200", vec![]);
    let pool = Arc::new(NodePool::new(PoolKind::Static, vec![node_a.clone(), node_b.clone()], false, clock.clone()).unwrap());

    let transport = Transport::new(
        TransportConfiguration::builder().build().unwrap(),
        pool,
        invoker,
        Arc::new(DefaultProductRegistration),
        Arc::new(PooledMemoryStreamFactory::default()),
    );

    let response: transit::TransportResponse<Doc> =
        transport.get("/", &FakeSerializer, CancellationToken::new()).await.unwrap();

    assert_eq!(response.body, Some(Doc { ok: true }));
    assert!(matches!(node_a.state(&*clock), NodeState::Dead { .. }));
    assert!(matches!(node_b.state(&*clock), NodeState::Alive));

    let kinds: Vec<_> = response.details.audit_trail.events().iter().map(|e| e.kind.clone()).collect();
    assert_eq!(kinds, vec![AuditEventKind::BadResponse, AuditEventKind::HealthyResponse]);
}

#[tokio::test]
async fn retryable_status_on_first_node_fails_over_to_the_second() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.push("http://a:9200", Ok(invoker_outcome(503, b"{}", "application/json")));
    invoker.push("http://b:9200", Ok(invoker_outcome(200, br#"{"ok":true}"#, "application/json")));

    let clock: Arc<dyn transit::clock::Clock> = Arc::new(ManualClock::new());
    let pool = Arc::new(
        NodePool::new(PoolKind::Static, vec![Node::new("http://a:9200", vec![]), Node::new("http://b:9200", vec![])], false, clock)
            .unwrap(),
    );

    let transport = Transport::new(
        TransportConfiguration::builder().build().unwrap(),
        pool,
        invoker,
        Arc::new(DefaultProductRegistration),
        Arc::new(PooledMemoryStreamFactory::default()),
    );

    let response: transit::TransportResponse<Doc> =
        transport.get("/", &FakeSerializer, CancellationToken::new()).await.unwrap();
    assert_eq!(response.body, Some(Doc { ok: true }));
}
