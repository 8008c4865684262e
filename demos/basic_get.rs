//! `cargo run --example basic_get` — a single-node call against a locally running service,
//! using the real `reqwest`-backed invoker and `serde_json` serializer.

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
struct Health {
    status: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(NodePool::new(
        PoolKind::Single,
        vec![Node::new("http://localhost:9200", vec![])],
        false,
        Arc::new(MonotonicClock::default()),
    )?);

    let transport = Transport::new(
        TransportConfiguration::builder().build()?,
        pool,
        Arc::new(ReqwestInvoker::new(ReqwestInvokerConfig::default())),
        Arc::new(DefaultProductRegistration),
        Arc::new(PooledMemoryStreamFactory::default()),
    );

    let response: transit::TransportResponse<Health> =
        transport.get("/_cluster/health", &JsonSerializer, CancellationToken::new()).await?;

    match response.body {
        Some(health) => println!("cluster status: {}", health.status),
        None => println!("call failed: {:?}", response.details.original_exception),
    }

    Ok(())
}
