//! `Transport`: the single entry point a caller depends on.
//!
//! Unlike `RequestPipeline` (which is generic over almost nothing and does the actual retry/
//! failover work), `Transport` is the seam a consumer constructs once and calls repeatedly: it
//! owns the long-lived collaborators (pool, invoker, product, response factory, sniff
//! coordinator), merges per-call [`RequestParameters`] overrides into the bound configuration,
//! and hands the result to a fresh `RequestPipeline::run`. One long-lived object wrapping a
//! caller's operation, built once via a builder-ish constructor and then called many times.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::config::{BoundConfiguration, TransportConfiguration};
use crate::diagnostics::{DiagnosticSink, NullSink};
use crate::endpoint::HttpMethod;
use crate::error::TransportError;
use crate::invoker::RequestInvoker;
use crate::memory_stream::MemoryStreamFactory;
use crate::node_pool::NodePool;
use crate::pipeline::{RequestPipeline, SniffCoordinator};
use crate::post_data::PostData;
use crate::product::ProductRegistration;
use crate::response::{ApiCallDetails, ResponseFactory, TransportResponse};
use crate::serializer::Serializer;

/// Per-call overrides layered onto the transport's baseline [`TransportConfiguration`].
/// `BoundConfiguration` is the result: global config merged with per-request overrides.
///
/// Every field defaults to "don't override" (`None`), so only what a caller explicitly sets is
/// touched.
#[derive(Debug, Clone, Default)]
pub struct RequestParameters {
    pub request_timeout: Option<Duration>,
    pub max_retries: Option<usize>,
    pub max_retry_timeout: Option<Duration>,
    pub disable_pings: Option<bool>,
    pub disable_sniff_on_startup: Option<bool>,
    pub disable_sniff_on_connection_failure: Option<bool>,
    pub throw_exceptions: Option<bool>,
    pub disable_direct_streaming: Option<bool>,
    pub authentication_header: Option<String>,
}

impl RequestParameters {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, base: &TransportConfiguration) -> Result<TransportConfiguration, TransportError> {
        let mut builder = base.to_builder();
        if let Some(v) = self.request_timeout {
            builder = builder.request_timeout(v);
        }
        if let Some(v) = self.max_retries {
            builder = builder.max_retries(v);
        }
        if let Some(v) = self.max_retry_timeout {
            builder = builder.max_retry_timeout(v);
        }
        if let Some(v) = self.disable_pings {
            builder = builder.disable_pings(v);
        }
        if let Some(v) = self.disable_sniff_on_startup {
            builder = builder.disable_sniff_on_startup(v);
        }
        if let Some(v) = self.disable_sniff_on_connection_failure {
            builder = builder.disable_sniff_on_connection_failure(v);
        }
        if let Some(v) = self.throw_exceptions {
            builder = builder.throw_exceptions(v);
        }
        if let Some(v) = self.disable_direct_streaming {
            builder = builder.disable_direct_streaming(v);
        }
        if let Some(ref v) = self.authentication_header {
            builder = builder.authentication_header(v.clone());
        }
        builder.build().map_err(TransportError::Configuration)
    }
}

/// The façade a consumer holds onto: one long-lived `Transport` per cluster/service, shared
/// across concurrent calls via `Arc` internally (the pool, invoker, and sniff coordinator are
/// already `Arc`-wrapped so cloning a `Transport` is cheap).
#[derive(Clone)]
pub struct Transport<D: DiagnosticSink = NullSink> {
    config: TransportConfiguration,
    pool: Arc<NodePool>,
    invoker: Arc<dyn RequestInvoker>,
    product: Arc<dyn ProductRegistration>,
    response_factory: Arc<ResponseFactory>,
    sniff_coordinator: Arc<SniffCoordinator>,
    diagnostics: D,
}

impl Transport<NullSink> {
    /// Builds a transport with no diagnostic sink. Use [`Transport::with_diagnostics`] to attach
    /// one.
    pub fn new(
        config: TransportConfiguration,
        pool: Arc<NodePool>,
        invoker: Arc<dyn RequestInvoker>,
        product: Arc<dyn ProductRegistration>,
        memory_streams: Arc<dyn MemoryStreamFactory>,
    ) -> Self {
        Self {
            config,
            pool,
            invoker,
            product,
            response_factory: Arc::new(ResponseFactory::new(memory_streams)),
            sniff_coordinator: Arc::new(SniffCoordinator::new()),
            diagnostics: NullSink,
        }
    }
}

impl<D: DiagnosticSink> Transport<D> {
    /// Rebuilds this transport with a different diagnostic sink, attached once at construction
    /// rather than per-call.
    pub fn with_diagnostics<D2: DiagnosticSink>(self, diagnostics: D2) -> Transport<D2> {
        Transport {
            config: self.config,
            pool: self.pool,
            invoker: self.invoker,
            product: self.product,
            response_factory: self.response_factory,
            sniff_coordinator: self.sniff_coordinator,
            diagnostics,
        }
    }

    /// The node pool backing this transport.
    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    /// Issues one logical call: merges `params` into the baseline configuration, runs the
    /// pipeline to completion, and (when the pool is exhausted and `throw_exceptions` is unset)
    /// downgrades the failure into a synthesized `TransportResponse` rather than an `Err`.
    #[tracing::instrument(skip(self, body, serializer, params, cancellation), fields(method = %method, path = %path_and_query))]
    pub async fn request<T, S>(
        &self,
        method: HttpMethod,
        path_and_query: &str,
        body: Option<PostData>,
        serializer: &S,
        params: Option<RequestParameters>,
        cancellation: CancellationToken,
    ) -> Result<TransportResponse<T>, TransportError>
    where
        T: DeserializeOwned,
        S: Serializer,
    {
        let effective_config = match params {
            Some(ref p) => p.apply(&self.config)?,
            None => self.config.clone(),
        };
        let bound_config = effective_config
            .bind(self.pool.len())
            .with_meta_headers(self.product.meta_header_providers())
            .with_content_type(self.product.default_content_type().to_string());

        self.attach_otel_attributes();

        let pipeline = RequestPipeline::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.invoker),
            Arc::clone(&self.product),
            Arc::clone(&self.response_factory),
            Arc::clone(&self.sniff_coordinator),
            self.diagnostics.clone(),
            self.pool.using_ssl(),
        );

        match pipeline.run::<T, S>(method, path_and_query, body.as_ref(), &bound_config, serializer, &cancellation).await {
            Ok(response) => Ok(response),
            Err(TransportError::PoolExhausted { attempts, last, audit }) if !bound_config.throw_exceptions() => {
                Ok(TransportResponse::new(Self::failed_pool_exhaustion_details(method, path_and_query, attempts, &last, audit), None, false, Vec::new()))
            }
            Err(err) => Err(err),
        }
    }

    fn failed_pool_exhaustion_details(
        method: HttpMethod,
        path_and_query: &str,
        attempts: usize,
        last: &str,
        audit: crate::audit::AuditTrail,
    ) -> ApiCallDetails {
        ApiCallDetails {
            method,
            uri: path_and_query.to_string(),
            status: None,
            mime_type: None,
            content_length: -1,
            headers: std::collections::HashMap::new(),
            original_exception: Some(format!("node pool exhausted after {attempts} attempt(s): {last}")),
            has_successful_status_code: false,
            has_expected_content_type: false,
            request_body_in_bytes: None,
            response_body_in_bytes: None,
            audit_trail: audit,
            timing: Duration::ZERO,
        }
    }

    #[cfg(feature = "otel")]
    fn attach_otel_attributes(&self) {
        let span = tracing::Span::current();
        for attr in self.product.default_open_telemetry_attributes() {
            span.record(attr.key.as_str(), tracing::field::display(attr.value));
        }
    }

    #[cfg(not(feature = "otel"))]
    fn attach_otel_attributes(&self) {}

    /// `GET path_and_query`, no body.
    pub async fn get<T, S>(&self, path_and_query: &str, serializer: &S, cancellation: CancellationToken) -> Result<TransportResponse<T>, TransportError>
    where
        T: DeserializeOwned,
        S: Serializer,
    {
        self.request(HttpMethod::Get, path_and_query, None, serializer, None, cancellation).await
    }

    /// `HEAD path_and_query`, no body.
    pub async fn head<T, S>(&self, path_and_query: &str, serializer: &S, cancellation: CancellationToken) -> Result<TransportResponse<T>, TransportError>
    where
        T: DeserializeOwned,
        S: Serializer,
    {
        self.request(HttpMethod::Head, path_and_query, None, serializer, None, cancellation).await
    }

    /// `POST path_and_query` with `body`.
    pub async fn post<T, S>(
        &self,
        path_and_query: &str,
        body: PostData,
        serializer: &S,
        cancellation: CancellationToken,
    ) -> Result<TransportResponse<T>, TransportError>
    where
        T: DeserializeOwned,
        S: Serializer,
    {
        self.request(HttpMethod::Post, path_and_query, Some(body), serializer, None, cancellation).await
    }

    /// `PUT path_and_query` with `body`.
    pub async fn put<T, S>(
        &self,
        path_and_query: &str,
        body: PostData,
        serializer: &S,
        cancellation: CancellationToken,
    ) -> Result<TransportResponse<T>, TransportError>
    where
        T: DeserializeOwned,
        S: Serializer,
    {
        self.request(HttpMethod::Put, path_and_query, Some(body), serializer, None, cancellation).await
    }

    /// `DELETE path_and_query`, no body.
    pub async fn delete<T, S>(&self, path_and_query: &str, serializer: &S, cancellation: CancellationToken) -> Result<TransportResponse<T>, TransportError>
    where
        T: DeserializeOwned,
        S: Serializer,
    {
        self.request(HttpMethod::Delete, path_and_query, None, serializer, None, cancellation).await
    }
}

impl<D: DiagnosticSink + std::fmt::Debug> std::fmt::Debug for Transport<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("pool_len", &self.pool.len()).field("product", &self.product.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfiguration;
    use crate::memory_stream::PooledMemoryStreamFactory;
    use crate::node::Node;
    use crate::node_pool::PoolKind;
    use crate::product::DefaultProductRegistration;
    use crate::testing::{invoker_outcome, FakeSerializer, ManualClock, ScriptedInvoker};

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Doc {
        ok: bool,
    }

    fn transport(invoker: ScriptedInvoker) -> Transport<NullSink> {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(ManualClock::new());
        let pool = Arc::new(NodePool::new(PoolKind::Static, vec![Node::new("http://a:9200", vec![])], false, clock).unwrap());
        Transport::new(
            TransportConfiguration::builder().build().unwrap(),
            pool,
            Arc::new(invoker),
            Arc::new(DefaultProductRegistration),
            Arc::new(PooledMemoryStreamFactory::default()),
        )
    }

    #[tokio::test]
    async fn successful_call_returns_typed_body() {
        let invoker = ScriptedInvoker::new();
        invoker.push("http://a:9200", Ok(invoker_outcome(200, br#"{"ok":true}"#, "application/json")));
        let transport = transport(invoker);

        let response: TransportResponse<Doc> = transport.get("/", &FakeSerializer, CancellationToken::new()).await.unwrap();
        assert_eq!(response.body, Some(Doc { ok: true }));
    }

    #[tokio::test]
    async fn pool_exhaustion_without_throw_exceptions_returns_failure_response() {
        let invoker = ScriptedInvoker::new();
        invoker.push(
            "http://a:9200",
            Err(crate::invoker::InvokerError::Transient(Box::new(std::io::Error::other("refused")))),
        );
        let transport = transport(invoker);

        let response: TransportResponse<Doc> = transport.get("/", &FakeSerializer, CancellationToken::new()).await.unwrap();
        assert!(response.body.is_none());
        assert!(response.details.original_exception.is_some());
        assert!(!response.details.audit_trail.is_empty());
    }

    #[tokio::test]
    async fn pool_exhaustion_with_throw_exceptions_returns_err() {
        let invoker = ScriptedInvoker::new();
        invoker.push(
            "http://a:9200",
            Err(crate::invoker::InvokerError::Transient(Box::new(std::io::Error::other("refused")))),
        );
        let transport = transport(invoker);
        let params = RequestParameters { throw_exceptions: Some(true), ..Default::default() };

        let result = transport
            .request::<Doc, _>(HttpMethod::Get, "/", None, &FakeSerializer, Some(params), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TransportError::PoolExhausted { .. })));
    }
}
