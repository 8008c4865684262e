//! Per-call configuration: the validated builder (`TransportConfiguration`) and the merged
//! snapshot computed once per logical call (`BoundConfiguration`).
//!
//! No environment-variable loading and no descriptor-family overloads here: exactly one builder,
//! `Result`-returning, validated at construction.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;

/// Global, validated transport configuration. Overridden per call by
/// [`RequestParameters`](crate::transport::RequestParameters) to produce a
/// [`BoundConfiguration`].
#[derive(Debug, Clone)]
pub struct TransportConfiguration {
    pub(crate) request_timeout: Duration,
    pub(crate) ping_timeout: Duration,
    pub(crate) max_retries: Option<usize>,
    pub(crate) max_retry_timeout: Option<Duration>,
    pub(crate) dead_timeout: Duration,
    pub(crate) max_dead_timeout: Duration,
    pub(crate) sniff_lifespan: Duration,
    pub(crate) disable_pings: bool,
    pub(crate) disable_sniff_on_startup: bool,
    pub(crate) disable_sniff_on_connection_failure: bool,
    pub(crate) sniff_on_stale_cluster: bool,
    pub(crate) throw_exceptions: bool,
    pub(crate) http_compression: bool,
    pub(crate) transfer_encoding_chunked: bool,
    pub(crate) disable_direct_streaming: bool,
    pub(crate) disable_automatic_proxy_detection: bool,
    pub(crate) connection_limit: usize,
    pub(crate) proxy_address: Option<String>,
    pub(crate) proxy_username: Option<String>,
    pub(crate) proxy_password: Option<String>,
    pub(crate) authentication_header: Option<String>,
    pub(crate) response_headers_to_parse: HashSet<String>,
    pub(crate) skip_deserialization_for_status_codes: HashSet<u16>,
    pub(crate) parse_all_headers: bool,
    pub(crate) retryable_status_codes: HashSet<u16>,
}

impl TransportConfiguration {
    /// Starts a new builder with spec-documented defaults.
    pub fn builder() -> TransportConfigurationBuilder {
        TransportConfigurationBuilder::default()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }
    pub fn dead_timeout(&self) -> Duration {
        self.dead_timeout
    }
    pub fn max_dead_timeout(&self) -> Duration {
        self.max_dead_timeout
    }
    pub fn sniff_lifespan(&self) -> Duration {
        self.sniff_lifespan
    }
    pub fn disable_pings(&self) -> bool {
        self.disable_pings
    }
    pub fn disable_sniff_on_startup(&self) -> bool {
        self.disable_sniff_on_startup
    }
    pub fn disable_sniff_on_connection_failure(&self) -> bool {
        self.disable_sniff_on_connection_failure
    }
    pub fn sniff_on_stale_cluster(&self) -> bool {
        self.sniff_on_stale_cluster
    }
    pub fn throw_exceptions(&self) -> bool {
        self.throw_exceptions
    }
    pub fn disable_direct_streaming(&self) -> bool {
        self.disable_direct_streaming
    }
    pub fn retryable_status_codes(&self) -> &HashSet<u16> {
        &self.retryable_status_codes
    }
    pub fn skip_deserialization_for_status_codes(&self) -> &HashSet<u16> {
        &self.skip_deserialization_for_status_codes
    }

    /// Computes the per-call snapshot, applying `pool_size` to derive the default
    /// `max_retries` (pool size minus one, unless capped lower by the builder).
    pub fn bind(&self, pool_size: usize) -> BoundConfiguration {
        let max_retries = self.max_retries.unwrap_or_else(|| pool_size.saturating_sub(1));
        let max_retry_timeout = self.max_retry_timeout.unwrap_or(self.request_timeout);
        BoundConfiguration { config: self.clone(), max_retries, max_retry_timeout, meta_headers: Arc::new(Vec::new()), content_type: Arc::from("application/json") }
    }

    /// Rehydrates this configuration into a builder, so `Transport` can apply per-call
    /// `RequestParameters` overrides without re-specifying every field.
    pub(crate) fn to_builder(&self) -> TransportConfigurationBuilder {
        TransportConfigurationBuilder {
            request_timeout: self.request_timeout,
            ping_timeout: self.ping_timeout,
            max_retries: self.max_retries,
            max_retry_timeout: self.max_retry_timeout,
            dead_timeout: self.dead_timeout,
            max_dead_timeout: self.max_dead_timeout,
            sniff_lifespan: self.sniff_lifespan,
            disable_pings: self.disable_pings,
            disable_sniff_on_startup: self.disable_sniff_on_startup,
            disable_sniff_on_connection_failure: self.disable_sniff_on_connection_failure,
            sniff_on_stale_cluster: self.sniff_on_stale_cluster,
            throw_exceptions: self.throw_exceptions,
            http_compression: self.http_compression,
            transfer_encoding_chunked: self.transfer_encoding_chunked,
            disable_direct_streaming: self.disable_direct_streaming,
            disable_automatic_proxy_detection: self.disable_automatic_proxy_detection,
            connection_limit: self.connection_limit,
            proxy_address: self.proxy_address.clone(),
            proxy_username: self.proxy_username.clone(),
            proxy_password: self.proxy_password.clone(),
            authentication_header: self.authentication_header.clone(),
            response_headers_to_parse: self.response_headers_to_parse.clone(),
            skip_deserialization_for_status_codes: self.skip_deserialization_for_status_codes.clone(),
            parse_all_headers: self.parse_all_headers,
            retryable_status_codes: self.retryable_status_codes.clone(),
        }
    }
}

/// Validated builder for [`TransportConfiguration`].
#[derive(Debug, Clone)]
pub struct TransportConfigurationBuilder {
    request_timeout: Duration,
    ping_timeout: Duration,
    max_retries: Option<usize>,
    max_retry_timeout: Option<Duration>,
    dead_timeout: Duration,
    max_dead_timeout: Duration,
    sniff_lifespan: Duration,
    disable_pings: bool,
    disable_sniff_on_startup: bool,
    disable_sniff_on_connection_failure: bool,
    sniff_on_stale_cluster: bool,
    throw_exceptions: bool,
    http_compression: bool,
    transfer_encoding_chunked: bool,
    disable_direct_streaming: bool,
    disable_automatic_proxy_detection: bool,
    connection_limit: usize,
    proxy_address: Option<String>,
    proxy_username: Option<String>,
    proxy_password: Option<String>,
    authentication_header: Option<String>,
    response_headers_to_parse: HashSet<String>,
    skip_deserialization_for_status_codes: HashSet<u16>,
    parse_all_headers: bool,
    retryable_status_codes: HashSet<u16>,
}

impl Default for TransportConfigurationBuilder {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(2),
            max_retries: None,
            max_retry_timeout: None,
            dead_timeout: Duration::from_secs(60),
            max_dead_timeout: Duration::from_secs(60 * 30),
            sniff_lifespan: Duration::from_secs(60 * 60),
            disable_pings: false,
            disable_sniff_on_startup: false,
            disable_sniff_on_connection_failure: false,
            sniff_on_stale_cluster: false,
            throw_exceptions: false,
            http_compression: false,
            transfer_encoding_chunked: false,
            disable_direct_streaming: false,
            disable_automatic_proxy_detection: false,
            connection_limit: 80,
            proxy_address: None,
            proxy_username: None,
            proxy_password: None,
            authentication_header: None,
            response_headers_to_parse: HashSet::new(),
            skip_deserialization_for_status_codes: HashSet::new(),
            parse_all_headers: false,
            retryable_status_codes: [502, 503, 504].into_iter().collect(),
        }
    }
}

macro_rules! setter {
    ($name:ident, $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.$name = value;
            self
        }
    };
}

impl TransportConfigurationBuilder {
    setter!(request_timeout, Duration);
    setter!(ping_timeout, Duration);
    setter!(dead_timeout, Duration);
    setter!(max_dead_timeout, Duration);
    setter!(sniff_lifespan, Duration);
    setter!(disable_pings, bool);
    setter!(disable_sniff_on_startup, bool);
    setter!(disable_sniff_on_connection_failure, bool);
    setter!(sniff_on_stale_cluster, bool);
    setter!(throw_exceptions, bool);
    setter!(http_compression, bool);
    setter!(transfer_encoding_chunked, bool);
    setter!(disable_direct_streaming, bool);
    setter!(disable_automatic_proxy_detection, bool);
    setter!(connection_limit, usize);
    setter!(parse_all_headers, bool);

    /// Overrides the default `max_retries` (pool size − 1).
    pub fn max_retries(mut self, value: usize) -> Self {
        self.max_retries = Some(value);
        self
    }

    /// Overrides the default `max_retry_timeout` (equal to `request_timeout`).
    pub fn max_retry_timeout(mut self, value: Duration) -> Self {
        self.max_retry_timeout = Some(value);
        self
    }

    pub fn proxy(mut self, address: impl Into<String>, username: Option<String>, password: Option<String>) -> Self {
        self.proxy_address = Some(address.into());
        self.proxy_username = username;
        self.proxy_password = password;
        self
    }

    pub fn authentication_header(mut self, header: impl Into<String>) -> Self {
        self.authentication_header = Some(header.into());
        self
    }

    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn skip_deserialization_for_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.skip_deserialization_for_status_codes = codes.into_iter().collect();
        self
    }

    pub fn response_headers_to_parse(mut self, headers: impl IntoIterator<Item = String>) -> Self {
        self.response_headers_to_parse = headers.into_iter().collect();
        self
    }

    /// Validates and finalizes the configuration.
    pub fn build(self) -> Result<TransportConfiguration, ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "request_timeout" });
        }
        if self.ping_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "ping_timeout" });
        }
        if self.dead_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "dead_timeout" });
        }
        crate::timeout::TimeoutPolicy::new(self.request_timeout)?;

        Ok(TransportConfiguration {
            request_timeout: self.request_timeout,
            ping_timeout: self.ping_timeout,
            max_retries: self.max_retries,
            max_retry_timeout: self.max_retry_timeout,
            dead_timeout: self.dead_timeout,
            max_dead_timeout: self.max_dead_timeout,
            sniff_lifespan: self.sniff_lifespan,
            disable_pings: self.disable_pings,
            disable_sniff_on_startup: self.disable_sniff_on_startup,
            disable_sniff_on_connection_failure: self.disable_sniff_on_connection_failure,
            sniff_on_stale_cluster: self.sniff_on_stale_cluster,
            throw_exceptions: self.throw_exceptions,
            http_compression: self.http_compression,
            transfer_encoding_chunked: self.transfer_encoding_chunked,
            disable_direct_streaming: self.disable_direct_streaming,
            disable_automatic_proxy_detection: self.disable_automatic_proxy_detection,
            connection_limit: self.connection_limit,
            proxy_address: self.proxy_address,
            proxy_username: self.proxy_username,
            proxy_password: self.proxy_password,
            authentication_header: self.authentication_header,
            response_headers_to_parse: self.response_headers_to_parse,
            skip_deserialization_for_status_codes: self.skip_deserialization_for_status_codes,
            parse_all_headers: self.parse_all_headers,
            retryable_status_codes: self.retryable_status_codes,
        })
    }
}

/// The merged view of global configuration and per-request overrides, computed once per
/// logical call and read-only thereafter.
#[derive(Debug, Clone)]
pub struct BoundConfiguration {
    config: TransportConfiguration,
    max_retries: usize,
    max_retry_timeout: Duration,
    meta_headers: Arc<Vec<(String, String)>>,
    content_type: Arc<str>,
}

impl BoundConfiguration {
    /// Attaches the product's meta headers (see `ProductRegistration::meta_header_providers`)
    /// to this snapshot. Called once by `Transport::request` right after `bind`, since `bind`
    /// itself has no access to the product registration.
    pub(crate) fn with_meta_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.meta_headers = Arc::new(headers);
        self
    }

    /// Name/value pairs every request carries identifying this client, as produced by the
    /// active `ProductRegistration`.
    pub fn meta_headers(&self) -> &[(String, String)] {
        &self.meta_headers
    }

    /// Attaches the product's default content type (`ProductRegistration::default_content_type`)
    /// to this snapshot, for the same reason `with_meta_headers` exists: `bind` has no access to
    /// the product registration.
    pub(crate) fn with_content_type(mut self, content_type: impl Into<Arc<str>>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// The `Accept`/`Content-Type` value every request carries, as produced by the active
    /// `ProductRegistration`.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }
    pub fn ping_timeout(&self) -> Duration {
        self.config.ping_timeout
    }
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }
    pub fn max_retry_timeout(&self) -> Duration {
        self.max_retry_timeout
    }
    pub fn dead_timeout(&self) -> Duration {
        self.config.dead_timeout
    }
    pub fn max_dead_timeout(&self) -> Duration {
        self.config.max_dead_timeout
    }
    pub fn sniff_lifespan(&self) -> Duration {
        self.config.sniff_lifespan
    }
    pub fn disable_pings(&self) -> bool {
        self.config.disable_pings
    }
    pub fn disable_sniff_on_startup(&self) -> bool {
        self.config.disable_sniff_on_startup
    }
    pub fn disable_sniff_on_connection_failure(&self) -> bool {
        self.config.disable_sniff_on_connection_failure
    }
    pub fn sniff_on_stale_cluster(&self) -> bool {
        self.config.sniff_on_stale_cluster
    }
    pub fn throw_exceptions(&self) -> bool {
        self.config.throw_exceptions
    }
    pub fn http_compression(&self) -> bool {
        self.config.http_compression
    }
    pub fn transfer_encoding_chunked(&self) -> bool {
        self.config.transfer_encoding_chunked
    }
    pub fn disable_direct_streaming(&self) -> bool {
        self.config.disable_direct_streaming
    }
    pub fn authentication_header(&self) -> Option<&str> {
        self.config.authentication_header.as_deref()
    }
    pub fn retryable_status_codes(&self) -> &HashSet<u16> {
        &self.config.retryable_status_codes
    }
    pub fn skip_deserialization_for_status_codes(&self) -> &HashSet<u16> {
        &self.config.skip_deserialization_for_status_codes
    }
    pub fn parse_all_headers(&self) -> bool {
        self.config.parse_all_headers
    }
    pub fn response_headers_to_parse(&self) -> &HashSet<String> {
        &self.config.response_headers_to_parse
    }

    /// `true` iff the HTTP method is idempotent and the status code is in the retryable set.
    pub fn is_retryable_status(&self, method: crate::endpoint::HttpMethod, status: u16) -> bool {
        method.is_idempotent() && self.config.retryable_status_codes.contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retryable_statuses_are_502_503_504() {
        let cfg = TransportConfiguration::builder().build().unwrap();
        assert!(cfg.retryable_status_codes().contains(&502));
        assert!(cfg.retryable_status_codes().contains(&503));
        assert!(cfg.retryable_status_codes().contains(&504));
        assert!(!cfg.retryable_status_codes().contains(&500));
    }

    #[test]
    fn rejects_zero_request_timeout() {
        let err = TransportConfiguration::builder().request_timeout(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDuration { field: "request_timeout" }));
    }

    #[test]
    fn bind_defaults_max_retries_to_pool_size_minus_one() {
        let cfg = TransportConfiguration::builder().build().unwrap();
        let bound = cfg.bind(3);
        assert_eq!(bound.max_retries(), 2);
    }

    #[test]
    fn bind_honors_explicit_max_retries() {
        let cfg = TransportConfiguration::builder().max_retries(1).build().unwrap();
        let bound = cfg.bind(5);
        assert_eq!(bound.max_retries(), 1);
    }

    #[test]
    fn bind_defaults_max_retry_timeout_to_request_timeout() {
        let cfg = TransportConfiguration::builder().request_timeout(Duration::from_secs(7)).build().unwrap();
        let bound = cfg.bind(2);
        assert_eq!(bound.max_retry_timeout(), Duration::from_secs(7));
    }

    #[test]
    fn meta_headers_default_to_empty_and_survive_attachment() {
        let cfg = TransportConfiguration::builder().build().unwrap();
        let bound = cfg.bind(2);
        assert!(bound.meta_headers().is_empty());

        let bound = bound.with_meta_headers(vec![("x-client-meta".to_string(), "tr=1.0".to_string())]);
        assert_eq!(bound.meta_headers(), &[("x-client-meta".to_string(), "tr=1.0".to_string())]);
    }

    #[test]
    fn content_type_defaults_to_json_and_survives_attachment() {
        let cfg = TransportConfiguration::builder().build().unwrap();
        let bound = cfg.bind(2);
        assert_eq!(bound.content_type(), "application/json");

        let bound = bound.with_content_type("application/vnd.elasticsearch+json; compatible-with=8".to_string());
        assert_eq!(bound.content_type(), "application/vnd.elasticsearch+json; compatible-with=8");
    }

    #[test]
    fn is_retryable_status_requires_idempotent_method() {
        let cfg = TransportConfiguration::builder().build().unwrap();
        let bound = cfg.bind(2);
        assert!(bound.is_retryable_status(crate::endpoint::HttpMethod::Get, 503));
        assert!(!bound.is_retryable_status(crate::endpoint::HttpMethod::Post, 503));
    }
}
