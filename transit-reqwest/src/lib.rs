#![forbid(unsafe_code)]

//! The `reqwest`-backed [`transit::invoker::RequestInvoker`] implementation.
//!
//! Kept as its own crate, separate from `transit`'s core, per `spec.md` §1's scoping of "concrete
//! HTTP/1.1 I/O (actual socket/TLS handling)" out of the pipeline itself. `ReqwestInvoker` caches
//! one `reqwest::Client` per distinct [`transit::invoker::HandlerKey`] (request timeout,
//! compression, proxy) so repeated calls with the same effective settings reuse a connection
//! pool, mirroring `spec.md` §4.2's "handler cache" requirement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use transit::config::BoundConfiguration;
use transit::endpoint::{Endpoint, HttpMethod};
use transit::invoker::{HandlerCacheStats, HandlerKey, InvokerError, InvokerOutcome, RequestInvoker};
use transit::post_data::PostData;

/// Static connection options a [`ReqwestInvoker`] was built with: proxy settings and a fallback
/// Basic-auth credential pair used when a call doesn't already carry
/// `BoundConfiguration::authentication_header`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestInvokerConfig {
    pub proxy_address: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub disable_automatic_proxy_detection: bool,
    pub basic_auth: Option<(String, String)>,
}

/// A [`RequestInvoker`] backed by `reqwest` with `rustls-tls`.
#[derive(Debug)]
pub struct ReqwestInvoker {
    config: ReqwestInvokerConfig,
    handlers: Mutex<HashMap<HandlerKey, reqwest::Client>>,
    removed: AtomicUsize,
}

impl ReqwestInvoker {
    pub fn new(config: ReqwestInvokerConfig) -> Self {
        Self { config, handlers: Mutex::new(HashMap::new()), removed: AtomicUsize::new(0) }
    }

    fn handler_key(&self, bound_config: &BoundConfiguration) -> HandlerKey {
        HandlerKey::from_bound_config(
            bound_config,
            self.config.proxy_address.clone(),
            self.config.proxy_username.clone(),
            self.config.disable_automatic_proxy_detection,
        )
    }

    fn client_for(&self, bound_config: &BoundConfiguration) -> Result<reqwest::Client, InvokerError> {
        let key = self.handler_key(bound_config);
        let mut handlers = self.handlers.lock().unwrap();
        if let Some(client) = handlers.get(&key) {
            return Ok(client.clone());
        }

        let mut builder =
            reqwest::Client::builder().timeout(bound_config.request_timeout()).user_agent(concat!("transit-reqwest/", env!("CARGO_PKG_VERSION")));
        if let Some(address) = &self.config.proxy_address {
            let mut proxy = reqwest::Proxy::all(address).map_err(|e| InvokerError::Transient(Box::new(e)))?;
            if let (Some(username), Some(password)) = (&self.config.proxy_username, &self.config.proxy_password) {
                proxy = proxy.basic_auth(username, password);
            }
            builder = builder.proxy(proxy);
        }
        if self.config.disable_automatic_proxy_detection {
            builder = builder.no_proxy();
        }

        let client = builder.build().map_err(|e| InvokerError::Transient(Box::new(e)))?;
        handlers.insert(key, client.clone());
        Ok(client)
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    fn classify_send_error(err: reqwest::Error, elapsed: std::time::Duration, limit: std::time::Duration) -> InvokerError {
        if err.is_timeout() {
            InvokerError::Timeout { elapsed, limit }
        } else {
            InvokerError::Transient(Box::new(err))
        }
    }
}

#[async_trait]
impl RequestInvoker for ReqwestInvoker {
    async fn request(&self, endpoint: &Endpoint, bound_config: &BoundConfiguration, body: Option<&PostData>) -> Result<InvokerOutcome, InvokerError> {
        let client = self.client_for(bound_config)?;
        let mut request = client.request(Self::method(endpoint.method), endpoint.uri());

        request = request.header(reqwest::header::ACCEPT, bound_config.content_type());
        if let Some(header) = bound_config.authentication_header() {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        } else if let Some((user, pass)) = &self.config.basic_auth {
            let credentials = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
            request = request.header(reqwest::header::AUTHORIZATION, format!("Basic {credentials}"));
        }
        if bound_config.http_compression() {
            request = request.header(reqwest::header::ACCEPT_ENCODING, "gzip");
        }
        for (name, value) in bound_config.meta_headers() {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            let bytes = body.write(bound_config.disable_direct_streaming()).map_err(|e| InvokerError::Transient(Box::new(e)))?;
            request = request.header(reqwest::header::CONTENT_TYPE, bound_config.content_type()).body(bytes);
        }

        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|err| Self::classify_send_error(err, start.elapsed(), bound_config.request_timeout()))?;

        let status = response.status().as_u16();
        let content_type = response.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string);
        let content_length = response.content_length().map(|n| n as i64).unwrap_or(-1);
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
            .collect();

        let body = response.bytes().await.map_err(|err| InvokerError::Transient(Box::new(err)))?;

        Ok(InvokerOutcome { status, headers, content_type, content_length, body, elapsed: start.elapsed() })
    }

    fn handler_cache_stats(&self) -> HandlerCacheStats {
        let handlers = self.handlers.lock().unwrap();
        HandlerCacheStats { in_use: handlers.len(), removed: self.removed.load(Ordering::Relaxed) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit::config::TransportConfiguration;

    #[test]
    fn handler_cache_reuses_client_for_identical_bound_config() {
        let invoker = ReqwestInvoker::new(ReqwestInvokerConfig::default());
        let cfg = TransportConfiguration::builder().build().unwrap().bind(1);

        invoker.client_for(&cfg).unwrap();
        invoker.client_for(&cfg).unwrap();
        assert_eq!(invoker.handler_cache_stats().in_use, 1);
    }

    #[test]
    fn differing_timeout_produces_a_second_cached_client() {
        let invoker = ReqwestInvoker::new(ReqwestInvokerConfig::default());
        let a = TransportConfiguration::builder().build().unwrap().bind(1);
        let b = TransportConfiguration::builder()
            .request_timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap()
            .bind(1);

        invoker.client_for(&a).unwrap();
        invoker.client_for(&b).unwrap();
        assert_eq!(invoker.handler_cache_stats().in_use, 2);
    }
}
