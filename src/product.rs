//! `ProductRegistration`: the product-aware collaborator.
//!
//! Unlike `RequestInvoker`/`Serializer`, both shipped implementations live inside this crate:
//! [`DefaultProductRegistration`] (no ping/sniff, 2xx success) and
//! [`ElasticsearchProductRegistration`] (both supported, vendor content type, prefers
//! master-eligible nodes when sniffing).

pub mod elasticsearch;

use async_trait::async_trait;

use crate::config::BoundConfiguration;
use crate::endpoint::{Endpoint, HttpMethod};
use crate::invoker::{InvokerError, InvokerOutcome, RequestInvoker};
use crate::node::Node;
use crate::response::ApiCallDetails;

pub use elasticsearch::ElasticsearchProductRegistration;

/// The product-specific behaviors a `Transport` delegates to: success/ping/sniff semantics,
/// content negotiation, and telemetry attribute enrichment.
///
/// Every method has a sensible, overridable default matching [`DefaultProductRegistration`], so
/// a product implementation only needs to override what it actually specializes.
#[async_trait]
pub trait ProductRegistration: Send + Sync + std::fmt::Debug {
    /// Human-readable product name, e.g. `"elasticsearch"`.
    fn name(&self) -> &str {
        "unknown"
    }

    /// Stable identifier used in the product meta header.
    fn service_identifier(&self) -> &str {
        "tr"
    }

    /// Client library version string reported in the product meta header.
    fn product_assembly_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    /// Default `Content-Type`/`Accept` value when the caller doesn't override it.
    fn default_content_type(&self) -> &str {
        "application/json"
    }

    /// Response headers always parsed into `ApiCallDetails`, regardless of per-call config.
    fn default_headers_to_parse(&self) -> Vec<String> {
        Vec::new()
    }

    /// `true` if this product supports revival pings against `Resurrecting` nodes.
    fn supports_ping(&self) -> bool {
        false
    }

    /// `true` if this product supports cluster topology discovery (sniffing).
    fn supports_sniff(&self) -> bool {
        false
    }

    /// `true` if `node` is eligible to receive ordinary API calls.
    fn node_predicate(&self, _node: &Node) -> bool {
        true
    }

    /// Relative ordering hint when sorting sniffed nodes (lower sorts first).
    fn sniff_order(&self, _node: &Node) -> i32 {
        0
    }

    /// Whether `status` counts as success for `method`. Default: 2xx for every method.
    fn http_status_code_classifier(&self, _method: HttpMethod, status: u16) -> bool {
        (200..300).contains(&status)
    }

    /// Builds the endpoint a revival ping is sent to.
    fn create_ping_endpoint(&self, node: &Node, _bound_config: &BoundConfiguration) -> Endpoint {
        Endpoint::new(HttpMethod::Head, "/", node.clone())
    }

    /// Sends a revival ping. The default implementation is never called in practice since
    /// `supports_ping()` is `false` by default; products that override `supports_ping` must also
    /// override this.
    async fn ping(
        &self,
        invoker: &dyn RequestInvoker,
        endpoint: &Endpoint,
        bound_config: &BoundConfiguration,
    ) -> Result<InvokerOutcome, InvokerError> {
        invoker.request(endpoint, bound_config, None).await
    }

    /// Builds the endpoint a sniff request is sent to.
    fn create_sniff_endpoint(&self, node: &Node, _bound_config: &BoundConfiguration) -> Endpoint {
        Endpoint::new(HttpMethod::Get, "/", node.clone())
    }

    /// Sends a sniff request and parses the discovered node set. The default implementation
    /// returns no discovered nodes; products that override `supports_sniff` must also override
    /// this.
    async fn sniff(
        &self,
        invoker: &dyn RequestInvoker,
        _force_ssl: bool,
        endpoint: &Endpoint,
        bound_config: &BoundConfiguration,
    ) -> Result<(InvokerOutcome, Vec<Node>), InvokerError> {
        let outcome = invoker.request(endpoint, bound_config, None).await?;
        Ok((outcome, Vec::new()))
    }

    /// Attempts to extract a product-specific error reason from a non-success response body.
    fn try_get_server_error_reason(&self, _body: &[u8]) -> Option<String> {
        None
    }

    /// Extra headers every request carries identifying this client (name/version pairs, folded
    /// into the product meta header). Realized here as a plain `Vec` rather than a trait-object
    /// list: this product registration already *is* the single source of meta headers for a
    /// given transport, so there is no second axis of pluggability to preserve.
    fn meta_header_providers(&self) -> Vec<(String, String)> {
        vec![("x-client-meta".to_string(), format!("{}={}", self.service_identifier(), self.product_assembly_version()))]
    }

    /// Baseline OpenTelemetry attributes attached to every call's span.
    #[cfg(feature = "otel")]
    fn default_open_telemetry_attributes(&self) -> Vec<opentelemetry::KeyValue> {
        vec![opentelemetry::KeyValue::new("db.system", self.name().to_string())]
    }

    /// Additional attributes derived from a finished call's details (e.g. target node, status).
    #[cfg(feature = "otel")]
    fn parse_open_telemetry_attributes_from_api_call_details(&self, details: &ApiCallDetails) -> Vec<opentelemetry::KeyValue> {
        let mut attrs = vec![opentelemetry::KeyValue::new("http.method", details.method.to_string())];
        if let Some(status) = details.status {
            attrs.push(opentelemetry::KeyValue::new("http.status_code", status as i64));
        }
        attrs
    }
}

/// The product-agnostic default: no ping, no sniff, plain 2xx success classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProductRegistration;

impl ProductRegistration for DefaultProductRegistration {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registration_classifies_2xx_as_success() {
        let p = DefaultProductRegistration;
        assert!(p.http_status_code_classifier(HttpMethod::Get, 200));
        assert!(p.http_status_code_classifier(HttpMethod::Get, 299));
        assert!(!p.http_status_code_classifier(HttpMethod::Get, 404));
    }

    #[test]
    fn default_registration_supports_neither_ping_nor_sniff() {
        let p = DefaultProductRegistration;
        assert!(!p.supports_ping());
        assert!(!p.supports_sniff());
    }

    #[test]
    fn default_registration_accepts_every_node() {
        let p = DefaultProductRegistration;
        let node = Node::new("http://localhost:9200", vec![]);
        assert!(p.node_predicate(&node));
    }
}
