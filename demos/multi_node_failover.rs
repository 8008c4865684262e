//! `cargo run --example multi_node_failover` — a static three-node pool against real HTTP
//! endpoints, demonstrating retry/failover and the resulting audit trail. Point the URIs at
//! any mix of reachable/unreachable hosts to see nodes marked dead and skipped.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use transit::clock::MonotonicClock;
use transit::config::TransportConfiguration;
use transit::memory_stream::PooledMemoryStreamFactory;
use transit::node::Node;
use transit::node_pool::{NodePool, PoolKind};
use transit::product::DefaultProductRegistration;
use transit::transport::Transport;
use transit_json::JsonSerializer;
use transit_reqwest::{ReqwestInvoker, ReqwestInvokerConfig};

#[derive(serde::Deserialize, Debug)]
struct Root {
    #[serde(default)]
    tagline: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let nodes = vec![
        Node::new("http://localhost:9200", vec![]),
        Node::new("http://localhost:9201", vec![]),
        Node::new("http://localhost:9202", vec![]),
    ];
    let pool = Arc::new(NodePool::new(PoolKind::Static, nodes, false, Arc::new(MonotonicClock::default()))?);

    let transport = Transport::new(
        TransportConfiguration::builder().max_retries(2).build()?,
        pool,
        Arc::new(ReqwestInvoker::new(ReqwestInvokerConfig::default())),
        Arc::new(DefaultProductRegistration),
        Arc::new(PooledMemoryStreamFactory::default()),
    );

    let response: transit::TransportResponse<Root> = transport.get("/", &JsonSerializer, CancellationToken::new()).await?;

    println!("reached a node after {} audit event(s):", response.details.audit_trail.len());
    for event in response.details.audit_trail.events() {
        println!("  {:?} @ {}ms", event.kind, event.timestamp_millis);
    }
    if let Some(root) = response.body {
        println!("tagline: {:?}", root.tagline);
    }

    Ok(())
}
