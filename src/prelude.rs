//! Convenient re-exports of the types most callers need.
pub use crate::{
    audit::{AuditEvent, AuditEventKind, AuditTrail},
    config::{BoundConfiguration, TransportConfiguration, TransportConfigurationBuilder},
    diagnostics::{DiagnosticEvent, DiagnosticSink, LogSink, MemorySink, NullSink},
    endpoint::{Endpoint, HttpMethod},
    error::{ConfigError, TransportError},
    invoker::{InvokerError, InvokerOutcome, RequestInvoker},
    memory_stream::{MemoryStream, MemoryStreamFactory, PooledMemoryStreamFactory},
    node::{Node, NodeIdentity, NodeState},
    node_pool::{NodePool, PoolKind},
    post_data::{MultiJsonLine, PostData, PostDataError},
    product::{DefaultProductRegistration, ElasticsearchProductRegistration, ProductRegistration},
    response::{ApiCallDetails, ResponseFactory, TransportResponse},
    serializer::{Serializer, SerializerError},
    transport::{RequestParameters, Transport},
};
