//! A node that died comes back: once its dead-until timeout elapses it is pinged before being
//! trusted with a real request again.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use transit::audit::AuditEventKind;
use transit::node::Node;
use transit::node_pool::{NodePool, PoolKind};
use transit::product::ProductRegistration;
use transit::testing::{invoker_outcome, FakeSerializer, ManualClock, ScriptedInvoker};
use transit::{memory_stream::PooledMemoryStreamFactory, Transport, TransportConfiguration};

#[derive(Debug, Deserialize)]
struct Doc {
    #[allow(dead_code)]
    ok: bool,
}

/// A product that supports revival pings but not sniffing, so this test's scripted invoker
/// responses aren't consumed by an unrelated startup sniff.
#[derive(Debug, Clone, Copy, Default)]
struct PingOnlyProduct;

impl ProductRegistration for PingOnlyProduct {
    fn supports_ping(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn dead_node_is_pinged_once_resurrecting_then_trusted_again() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.push("http://a:9200", Err(transit::invoker::InvokerError::Transient(Box::new(std::io::Error::other("down")))));
    invoker.push("http://a:9200", Ok(invoker_outcome(200, b"{}", "application/json"))); // ping
    invoker.push("http://a:9200", Ok(invoker_outcome(200, br#"{"ok":true}"#, "application/json"))); // real attempt

    let clock = Arc::new(ManualClock::new());
    let clock_dyn: Arc<dyn transit::clock::Clock> = clock.clone();
    let node = Node::new("http://a:9200", vec![]);
    let pool = Arc::new(NodePool::new(PoolKind::Single, vec![node], false, clock_dyn).unwrap());

    let transport = Transport::new(
        TransportConfiguration::builder().dead_timeout(Duration::from_millis(50)).build().unwrap(),
        pool,
        invoker,
        Arc::new(PingOnlyProduct),
        Arc::new(PooledMemoryStreamFactory::default()),
    );

    let first: transit::TransportResponse<Doc> =
        transport.get("/", &FakeSerializer, CancellationToken::new()).await.unwrap();
    assert!(first.body.is_none(), "the only node is dead, so the call ends in a failure response");

    clock.advance(Duration::from_millis(100));

    let second: transit::TransportResponse<Doc> =
        transport.get("/", &FakeSerializer, CancellationToken::new()).await.unwrap();
    assert!(second.body.is_some());

    let kinds: Vec<_> = second.details.audit_trail.events().iter().map(|e| e.kind.clone()).collect();
    assert_eq!(kinds, vec![AuditEventKind::Resurrection, AuditEventKind::PingSuccess, AuditEventKind::HealthyResponse]);
}
