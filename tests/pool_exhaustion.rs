//! Every node in the pool fails: the call ends in `FailedOverAllNodes`, with the failure either
//! downgraded to a `TransportResponse` (default) or raised as an `Err` (`throw_exceptions`).

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use transit::audit::AuditEventKind;
use transit::node::Node;
use transit::node_pool::{NodePool, PoolKind};
use transit::product::DefaultProductRegistration;
use transit::testing::{invoker_outcome, FakeSerializer, ManualClock, ScriptedInvoker};
use transit::transport::RequestParameters;
use transit::{memory_stream::PooledMemoryStreamFactory, Transport, TransportConfiguration, TransportError};

#[derive(Debug, Deserialize)]
struct Doc {
    #[allow(dead_code)]
    ok: bool,
}

fn two_node_transport(invoker: Arc<ScriptedInvoker>) -> Transport {
    let clock: Arc<dyn transit::clock::Clock> = Arc::new(ManualClock::new());
    let pool = Arc::new(
        NodePool::new(PoolKind::Static, vec![Node::new("http://a:9200", vec![]), Node::new("http://b:9200", vec![])], false, clock)
            .unwrap(),
    );
    Transport::new(
        TransportConfiguration::builder().build().unwrap(),
        pool,
        invoker,
        Arc::new(DefaultProductRegistration),
        Arc::new(PooledMemoryStreamFactory::default()),
    )
}

fn both_nodes_refuse() -> Arc<ScriptedInvoker> {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.push("http://a:9200", Err(transit::invoker::InvokerError::Transient(Box::new(std::io::Error::other("refused (a)")))));
    invoker.push("http://b:9200", Err(transit::invoker::InvokerError::Transient(Box::new(std::io::Error::other("refused (b)")))));
    invoker
}

#[tokio::test]
async fn exhaustion_without_throw_exceptions_yields_a_failure_response_with_full_audit_trail() {
    let transport = two_node_transport(both_nodes_refuse());

    let response: transit::TransportResponse<Doc> =
        transport.get("/", &FakeSerializer, CancellationToken::new()).await.unwrap();

    assert!(response.body.is_none());
    assert!(response.details.original_exception.as_deref().unwrap().contains("refused (b)"));

    let kinds: Vec<_> = response.details.audit_trail.events().iter().map(|e| e.kind.clone()).collect();
    assert_eq!(kinds.last(), Some(&AuditEventKind::FailedOverAllNodes));
    assert_eq!(kinds.iter().filter(|k| **k == AuditEventKind::BadResponse).count(), 2);
}

#[tokio::test]
async fn exhaustion_with_throw_exceptions_raises_pool_exhausted() {
    let transport = two_node_transport(both_nodes_refuse());
    let params = RequestParameters { throw_exceptions: Some(true), ..Default::default() };

    let result = transport
        .request::<Doc, _>(transit::HttpMethod::Get, "/", None, &FakeSerializer, Some(params), CancellationToken::new())
        .await;

    match result {
        Err(TransportError::PoolExhausted { attempts, audit, .. }) => {
            assert_eq!(attempts, 2);
            assert!(!audit.is_empty());
        }
        other => panic!("expected PoolExhausted, got {other:?}"),
    }
}
