//! The Elasticsearch-flavored `ProductRegistration` (`spec.md` §4.4's worked example): supports
//! both ping and sniff, prefers master-eligible nodes when sniffing, and understands the
//! Elasticsearch vendor content type and error-body shape.

use async_trait::async_trait;

use crate::config::BoundConfiguration;
use crate::endpoint::{Endpoint, HttpMethod};
use crate::invoker::{InvokerError, InvokerOutcome, RequestInvoker};
use crate::node::Node;
use crate::product::ProductRegistration;

/// `ProductRegistration` tuned for an Elasticsearch (or OpenSearch-compatible) cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElasticsearchProductRegistration;

#[async_trait]
impl ProductRegistration for ElasticsearchProductRegistration {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    fn service_identifier(&self) -> &str {
        "es"
    }

    fn default_content_type(&self) -> &str {
        "application/vnd.elasticsearch+json; compatible-with=8"
    }

    fn default_headers_to_parse(&self) -> Vec<String> {
        vec!["x-elastic-product".to_string(), "warning".to_string()]
    }

    fn supports_ping(&self) -> bool {
        true
    }

    fn supports_sniff(&self) -> bool {
        true
    }

    fn node_predicate(&self, _node: &Node) -> bool {
        true
    }

    /// Master-eligible nodes sort first, so the pipeline prefers them when multiple nodes are
    /// otherwise equally good sniff targets. `"master"` is the role string the `_nodes/http`
    /// sniff response uses to denote master eligibility (see `parse_nodes_http_response`).
    fn sniff_order(&self, node: &Node) -> i32 {
        if node.has_capability("master") {
            0
        } else {
            1
        }
    }

    fn http_status_code_classifier(&self, method: HttpMethod, status: u16) -> bool {
        if method.is_head() {
            status == 200 || status == 404
        } else {
            (200..300).contains(&status)
        }
    }

    fn create_ping_endpoint(&self, node: &Node, _bound_config: &BoundConfiguration) -> Endpoint {
        Endpoint::new(HttpMethod::Head, "/", node.clone())
    }

    async fn ping(
        &self,
        invoker: &dyn RequestInvoker,
        endpoint: &Endpoint,
        bound_config: &BoundConfiguration,
    ) -> Result<InvokerOutcome, InvokerError> {
        invoker.request(endpoint, bound_config, None).await
    }

    fn create_sniff_endpoint(&self, node: &Node, _bound_config: &BoundConfiguration) -> Endpoint {
        Endpoint::new(HttpMethod::Get, "/_nodes/http", node.clone())
    }

    async fn sniff(
        &self,
        invoker: &dyn RequestInvoker,
        force_ssl: bool,
        endpoint: &Endpoint,
        bound_config: &BoundConfiguration,
    ) -> Result<(InvokerOutcome, Vec<Node>), InvokerError> {
        let outcome = invoker.request(endpoint, bound_config, None).await?;
        let nodes = parse_nodes_http_response(&outcome.body, force_ssl);
        Ok((outcome, nodes))
    }

    fn try_get_server_error_reason(&self, body: &[u8]) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        value.get("error")?.get("reason")?.as_str().map(str::to_string)
    }
}

/// Parses the Elasticsearch `_nodes/http` response shape into `Node`s.
///
/// ```json
/// { "nodes": { "<id>": { "name": "...", "version": "...",
///                        "roles": ["master", "data"],
///                        "http": { "publish_address": "host:port" } } } }
/// ```
fn parse_nodes_http_response(body: &[u8], force_ssl: bool) -> Vec<Node> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return Vec::new();
    };
    let Some(nodes_obj) = value.get("nodes").and_then(|n| n.as_object()) else {
        return Vec::new();
    };

    let scheme = if force_ssl { "https" } else { "http" };
    let mut nodes = Vec::with_capacity(nodes_obj.len());
    for (id, info) in nodes_obj {
        let Some(publish_address) = info.get("http").and_then(|h| h.get("publish_address")).and_then(|a| a.as_str()) else {
            continue;
        };
        let roles: Vec<String> = info
            .get("roles")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let node = Node::new(format!("{scheme}://{publish_address}"), roles);
        node.set_identity(crate::node::NodeIdentity {
            id: Some(id.clone()),
            name: info.get("name").and_then(|n| n.as_str()).map(str::to_string),
            version: info.get("version").and_then(|v| v.as_str()).map(str::to_string),
        });
        nodes.push(node);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_classifier_treats_404_as_success() {
        let p = ElasticsearchProductRegistration;
        assert!(p.http_status_code_classifier(HttpMethod::Head, 404));
        assert!(p.http_status_code_classifier(HttpMethod::Head, 200));
        assert!(!p.http_status_code_classifier(HttpMethod::Head, 500));
    }

    #[test]
    fn master_eligible_nodes_sort_first() {
        let p = ElasticsearchProductRegistration;
        let body = br#"{
            "nodes": {
                "master-node": {
                    "name": "es-master",
                    "version": "8.11.0",
                    "roles": ["master", "data"],
                    "http": { "publish_address": "127.0.0.1:9200" }
                },
                "data-node": {
                    "name": "es-data",
                    "version": "8.11.0",
                    "roles": ["data"],
                    "http": { "publish_address": "127.0.0.1:9201" }
                }
            }
        }"#;
        let nodes = parse_nodes_http_response(body, false);
        let master = nodes.iter().find(|n| n.has_capability("master")).unwrap();
        let data_only = nodes.iter().find(|n| !n.has_capability("master")).unwrap();
        assert!(p.sniff_order(master) < p.sniff_order(data_only));
    }

    #[test]
    fn parses_nodes_http_response_into_nodes() {
        let body = br#"{
            "nodes": {
                "abc123": {
                    "name": "es01",
                    "version": "8.11.0",
                    "roles": ["master", "data"],
                    "http": { "publish_address": "127.0.0.1:9200" }
                }
            }
        }"#;
        let nodes = parse_nodes_http_response(body, false);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].uri(), "http://127.0.0.1:9200");
        assert!(nodes[0].has_capability("master"));
        let identity = nodes[0].identity().unwrap();
        assert_eq!(identity.name.as_deref(), Some("es01"));
    }

    #[test]
    fn malformed_body_yields_no_nodes() {
        assert!(parse_nodes_http_response(b"not json", false).is_empty());
    }

    #[test]
    fn extracts_server_error_reason() {
        let p = ElasticsearchProductRegistration;
        let body = br#"{"error": {"reason": "index_not_found_exception"}}"#;
        assert_eq!(p.try_get_server_error_reason(body), Some("index_not_found_exception".to_string()));
    }
}
