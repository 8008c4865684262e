//! A single healthy node answers every call on the first attempt.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use transit::audit::AuditEventKind;
use transit::node::Node;
use transit::node_pool::{NodePool, PoolKind};
use transit::product::DefaultProductRegistration;
use transit::testing::{invoker_outcome, FakeSerializer, ManualClock, ScriptedInvoker};
use transit::{memory_stream::PooledMemoryStreamFactory, Transport, TransportConfiguration};

#[derive(Debug, Deserialize, PartialEq)]
struct Health {
    status: String,
}

fn single_node_transport(invoker: Arc<ScriptedInvoker>) -> Transport {
    let clock: Arc<dyn transit::clock::Clock> = Arc::new(ManualClock::new());
    let pool = Arc::new(NodePool::new(PoolKind::Single, vec![Node::new("http://es01:9200", vec![])], false, clock).unwrap());
    Transport::new(
        TransportConfiguration::builder().build().unwrap(),
        pool,
        invoker,
        Arc::new(DefaultProductRegistration),
        Arc::new(PooledMemoryStreamFactory::default()),
    )
}

#[tokio::test]
async fn single_attempt_succeeds_and_marks_node_alive() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.push("http://es01:9200", Ok(invoker_outcome(200, br#"{"status":"green"}"#, "application/json")));
    let transport = single_node_transport(Arc::clone(&invoker));

    let response: transit::TransportResponse<Health> =
        transport.get("/_cluster/health", &FakeSerializer, CancellationToken::new()).await.unwrap();

    assert_eq!(response.body, Some(Health { status: "green".to_string() }));
    assert!(response.details.has_successful_status_code);

    let kinds: Vec<_> = response.details.audit_trail.events().iter().map(|e| e.kind.clone()).collect();
    assert_eq!(kinds, vec![AuditEventKind::HealthyResponse]);

    assert_eq!(transport.pool().nodes().count(), 1, "the node stayed alive, so it's still a candidate");
}

#[tokio::test]
async fn only_one_attempt_is_made_when_the_pool_is_all_healthy() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.push("http://es01:9200", Ok(invoker_outcome(200, b"{}", "application/json")));
    let transport = single_node_transport(Arc::clone(&invoker));

    #[derive(Debug, Deserialize)]
    struct Empty {}
    let _: transit::TransportResponse<Empty> = transport.get("/", &FakeSerializer, CancellationToken::new()).await.unwrap();
    assert_eq!(invoker.call_count(), 1);
}
