//! `RequestInvoker`: the HTTP I/O collaborator.
//!
//! The trait itself lives here so the pipeline can be generic over it without depending on any
//! concrete HTTP client; `transit-reqwest::ReqwestInvoker` is the shipped implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::BoundConfiguration;
use crate::endpoint::Endpoint;
use crate::post_data::PostData;

/// A request header as sent on the wire.
pub type Header = (String, String);

/// Everything a successful (from the transport layer's point of view — status code is irrelevant
/// here) HTTP exchange yields. Body bytes are already fully read off the wire: see `DESIGN.md`'s
/// resolution of Open Question 3, which buffers unconditionally in `ResponseFactory` anyway, so
/// there is no benefit to a hand-rolled streaming body abstraction at this seam.
#[derive(Debug, Clone)]
pub struct InvokerOutcome {
    pub status: u16,
    pub headers: Vec<Header>,
    pub content_type: Option<String>,
    /// `-1` if the server didn't report a length (e.g. chunked transfer).
    pub content_length: i64,
    pub body: Bytes,
    pub elapsed: Duration,
}

/// Failure categories a [`RequestInvoker`] attempt can produce: transient vs. unexpected.
#[derive(Debug, thiserror::Error)]
pub enum InvokerError {
    /// Network/TLS/DNS failure, or a non-timeout I/O error. Retryable by the pipeline.
    #[error("transient I/O error: {0}")]
    Transient(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The attempt exceeded `BoundConfiguration::request_timeout`.
    #[error("request timed out after {elapsed:?} (limit {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },
    /// The call's cancellation token fired mid-exchange.
    #[error("request was cancelled")]
    Cancelled,
}

/// Counters exposed by an invoker's handler cache: in-use and removed handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerCacheStats {
    pub in_use: usize,
    pub removed: usize,
}

/// Issues a single HTTP attempt against one node. Never retries internally — retry across nodes
/// is `RequestPipeline`'s job.
#[async_trait]
pub trait RequestInvoker: Send + Sync + std::fmt::Debug {
    /// Sends `endpoint` with `body` (if any), honoring `bound_config`'s timeout, compression,
    /// proxy, and chunked-transfer settings.
    async fn request(
        &self,
        endpoint: &Endpoint,
        bound_config: &BoundConfiguration,
        body: Option<&PostData>,
    ) -> Result<InvokerOutcome, InvokerError>;

    /// Handler-cache in-use/removed counters, for diagnostics. Invokers that don't cache
    /// per-configuration handlers may leave this at its default.
    fn handler_cache_stats(&self) -> HandlerCacheStats {
        HandlerCacheStats::default()
    }
}

/// Hash key identifying a reusable client/handler configuration: equal keys may share one
/// underlying handler: timeout, compression, proxy URL/credentials, disable-proxy-detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    pub request_timeout_millis: u64,
    pub http_compression: bool,
    pub proxy_address: Option<String>,
    pub proxy_username: Option<String>,
    pub disable_automatic_proxy_detection: bool,
}

impl HandlerKey {
    pub fn from_bound_config(cfg: &BoundConfiguration, proxy_address: Option<String>, proxy_username: Option<String>, disable_automatic_proxy_detection: bool) -> Self {
        Self {
            request_timeout_millis: cfg.request_timeout().as_millis() as u64,
            http_compression: cfg.http_compression(),
            proxy_address,
            proxy_username,
            disable_automatic_proxy_detection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn equal_configs_hash_to_the_same_key() {
        let cfg = crate::config::TransportConfiguration::builder()
            .request_timeout(Duration::from_secs(5))
            .build()
            .unwrap()
            .bind(3);
        let a = HandlerKey::from_bound_config(&cfg, None, None, false);
        let b = HandlerKey::from_bound_config(&cfg, None, None, false);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn differing_proxy_address_changes_the_key() {
        let cfg = crate::config::TransportConfiguration::builder().build().unwrap().bind(3);
        let a = HandlerKey::from_bound_config(&cfg, None, None, false);
        let b = HandlerKey::from_bound_config(&cfg, Some("http://proxy:8080".into()), None, false);
        assert_ne!(a, b);
    }
}
