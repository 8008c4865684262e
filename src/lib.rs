#![forbid(unsafe_code)]

//! # transit
//!
//! A resilient, product-aware HTTP transport pipeline for talking to clustered services:
//! node-pool management, cluster-topology discovery ("sniffing"), ping-on-revival, retry/
//! failover across nodes, and a typed-plus-diagnostic response shape.
//!
//! `transit` itself never touches a socket or a JSON byte: [`invoker::RequestInvoker`] and
//! [`serializer::Serializer`] are the seams a consumer plugs in (`transit-reqwest` and
//! `transit-json` are the shipped implementations). This crate owns the orchestration — which
//! node to try next, when to sniff, when to ping a revived node, how to classify and deserialize
//! whatever comes back.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use transit::clock::MonotonicClock;
//! use transit::config::TransportConfiguration;
//! use transit::memory_stream::PooledMemoryStreamFactory;
//! use transit::node::Node;
//! use transit::node_pool::{NodePool, PoolKind};
//! use transit::product::DefaultProductRegistration;
//! use transit::testing::{invoker_outcome, FakeSerializer, ScriptedInvoker};
//! use transit::transport::Transport;
//!
//! #[derive(serde::Deserialize, Debug)]
//! struct Health {
//!     status: String,
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let invoker = ScriptedInvoker::new();
//! invoker.push("http://localhost:9200", Ok(invoker_outcome(200, br#"{"status":"green"}"#, "application/json")));
//!
//! let pool = Arc::new(
//!     NodePool::new(PoolKind::Single, vec![Node::new("http://localhost:9200", vec![])], false, Arc::new(MonotonicClock::default()))
//!         .expect("non-empty node list"),
//! );
//!
//! let transport = Transport::new(
//!     TransportConfiguration::builder().build().expect("valid configuration"),
//!     pool,
//!     Arc::new(invoker),
//!     Arc::new(DefaultProductRegistration),
//!     Arc::new(PooledMemoryStreamFactory::default()),
//! );
//!
//! let response = transport
//!     .get::<Health, _>("/_cluster/health", &FakeSerializer, CancellationToken::new())
//!     .await
//!     .expect("request succeeds");
//! assert_eq!(response.body.unwrap().status, "green");
//! # }
//! ```

pub mod audit;
pub mod backoff;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod endpoint;
pub mod error;
pub mod invoker;
pub mod memory_stream;
pub mod node;
pub mod node_pool;
pub mod pipeline;
pub mod post_data;
pub mod product;
pub mod response;
pub mod serializer;
pub mod testing;
pub mod timeout;
pub mod transport;

pub mod prelude;

pub use config::{BoundConfiguration, TransportConfiguration, TransportConfigurationBuilder};
pub use endpoint::{Endpoint, HttpMethod};
pub use error::{ConfigError, TransportError};
pub use node::{Node, NodeIdentity, NodeState};
pub use node_pool::{NodePool, PoolKind};
pub use pipeline::RequestPipeline;
pub use post_data::{PostData, PostDataError};
pub use product::{DefaultProductRegistration, ProductRegistration};
pub use response::{ApiCallDetails, TransportResponse};
pub use transport::{RequestParameters, Transport};
