//! A product-aware error body (Elasticsearch's `{"error": {"reason": ...}}` shape) is surfaced
//! through `ApiCallDetails::original_exception` even though the HTTP call itself "succeeded".

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use transit::node::Node;
use transit::node_pool::{NodePool, PoolKind};
use transit::product::ElasticsearchProductRegistration;
use transit::testing::{invoker_outcome, FakeSerializer, ManualClock, ScriptedInvoker};
use transit::{memory_stream::PooledMemoryStreamFactory, Transport, TransportConfiguration};

#[tokio::test]
async fn elasticsearch_error_reason_is_extracted_from_the_body() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let body = br#"{"error":{"type":"index_not_found_exception","reason":"no such index [missing]"}}"#;
    invoker.push(
        "http://a:9200",
        Ok(invoker_outcome(404, body, "application/vnd.elasticsearch+json; compatible-with=8")),
    );

    let clock: Arc<dyn transit::clock::Clock> = Arc::new(ManualClock::new());
    let pool = Arc::new(NodePool::new(PoolKind::Static, vec![Node::new("http://a:9200", vec![])], false, clock).unwrap());

    let transport = Transport::new(
        TransportConfiguration::builder().build().unwrap(),
        pool,
        invoker,
        Arc::new(ElasticsearchProductRegistration),
        Arc::new(PooledMemoryStreamFactory::default()),
    );

    let response: transit::TransportResponse<serde_json::Value> =
        transport.get("/some-index/_doc/1", &FakeSerializer, CancellationToken::new()).await.unwrap();

    assert!(!response.details.has_successful_status_code);
    assert!(response.details.has_expected_content_type);
    assert_eq!(response.details.original_exception.as_deref(), Some("no such index [missing]"));
}
