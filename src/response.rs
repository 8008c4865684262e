//! `ResponseFactory`: turns a raw `InvokerOutcome` into a classified, optionally-deserialized
//! `TransportResponse`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::audit::AuditTrail;
use crate::config::BoundConfiguration;
use crate::endpoint::HttpMethod;
use crate::invoker::InvokerOutcome;
use crate::memory_stream::{MemoryStream, MemoryStreamFactory};
use crate::product::ProductRegistration;
use crate::serializer::Serializer;

/// Everything about one attempt worth reporting back to the caller, independent of whether the
/// body deserialized cleanly.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApiCallDetails {
    pub method: HttpMethod,
    pub uri: String,
    pub status: Option<u16>,
    pub mime_type: Option<String>,
    /// `-1` when the server didn't report a length (e.g. chunked transfer).
    pub content_length: i64,
    pub headers: HashMap<String, String>,
    pub original_exception: Option<String>,
    pub has_successful_status_code: bool,
    pub has_expected_content_type: bool,
    pub request_body_in_bytes: Option<Bytes>,
    pub response_body_in_bytes: Option<Bytes>,
    pub audit_trail: AuditTrail,
    pub timing: Duration,
}

/// An owned resource a [`TransportResponse`] must release exactly once. A tagged union rather
/// than a boxed closure: there's no cyclic-reference or dynamic-dispatch need here, just a
/// small, closed set of owned resources.
pub enum Disposable {
    RecycledBuffer { stream: Option<MemoryStream>, factory: Arc<dyn MemoryStreamFactory> },
}

impl Disposable {
    fn dispose(&mut self) {
        match self {
            Disposable::RecycledBuffer { stream, factory } => {
                if let Some(s) = stream.take() {
                    factory.release(s);
                }
            }
        }
    }
}

impl std::fmt::Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposable::RecycledBuffer { .. } => f.write_str("Disposable::RecycledBuffer"),
        }
    }
}

/// The outcome of a logical call: a typed (or absent, for stream-like/skipped responses) body
/// plus its full `ApiCallDetails`.
///
/// `leave_open = false` (the common case) releases `linked_disposables` as soon as the response
/// is built; `leave_open = true` (stream-like responses) defers release to `Drop`, or to an
/// explicit [`TransportResponse::dispose`] call.
#[derive(Debug)]
pub struct TransportResponse<T> {
    pub details: ApiCallDetails,
    pub body: Option<T>,
    linked_disposables: Vec<Disposable>,
    leave_open: bool,
}

impl<T> TransportResponse<T> {
    pub(crate) fn new(details: ApiCallDetails, body: Option<T>, leave_open: bool, linked_disposables: Vec<Disposable>) -> Self {
        Self { details, body, linked_disposables, leave_open }
    }

    /// `true` if the caller must release this response's resources explicitly (or let `Drop` do
    /// it) rather than them already having been released at construction time.
    pub fn leave_open(&self) -> bool {
        self.leave_open
    }

    /// Releases all linked disposables now, idempotently.
    pub fn dispose(&mut self) {
        for d in &mut self.linked_disposables {
            d.dispose();
        }
        self.linked_disposables.clear();
    }
}

impl<T> Drop for TransportResponse<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Builds [`TransportResponse`]s from raw [`InvokerOutcome`]s via a six-step classification and
/// deserialization algorithm.
#[derive(Debug, Clone)]
pub struct ResponseFactory {
    memory_streams: Arc<dyn MemoryStreamFactory>,
}

impl ResponseFactory {
    pub fn new(memory_streams: Arc<dyn MemoryStreamFactory>) -> Self {
        Self { memory_streams }
    }

    /// Classifies and, where applicable, deserializes `outcome` into a `TransportResponse<T>`.
    ///
    /// Per `DESIGN.md`'s resolution of Open Question 3, the body is already a fully-buffered
    /// `Bytes` by the time it reaches here (the invoker reads it off the wire eagerly), so product
    /// error-parsing and the main deserialization both read the same in-memory buffer — "exactly
    /// once stream consumption" refers to the underlying wire read, not the buffer.
    pub fn build<T, S>(
        &self,
        serializer: &S,
        product: &dyn ProductRegistration,
        method: HttpMethod,
        uri: String,
        outcome: InvokerOutcome,
        bound_config: &BoundConfiguration,
        audit_trail: AuditTrail,
        request_body_in_bytes: Option<Bytes>,
    ) -> TransportResponse<T>
    where
        T: DeserializeOwned,
        S: Serializer,
    {
        let status = outcome.status;
        let has_successful_status_code = product.http_status_code_classifier(method, status);

        let expected = product.default_content_type();
        let expected_base = expected.split(';').next().unwrap_or(expected).trim();
        let has_expected_content_type = outcome
            .content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim() == expected_base)
            .unwrap_or(false);

        let headers: HashMap<String, String> = if bound_config.parse_all_headers() {
            outcome.headers.iter().cloned().collect()
        } else {
            let allowed = product.default_headers_to_parse().into_iter().chain(bound_config.response_headers_to_parse().iter().cloned()).map(|h| h.to_ascii_lowercase()).collect::<std::collections::HashSet<_>>();
            outcome.headers.iter().filter(|(name, _)| allowed.contains(&name.to_ascii_lowercase())).cloned().collect()
        };

        let skip_body = outcome.body.is_empty()
            || outcome.content_length == 0
            || method.is_head()
            || bound_config.skip_deserialization_for_status_codes().contains(&status);

        let base_details = |original_exception: Option<String>, response_body_in_bytes: Option<Bytes>| ApiCallDetails {
            method,
            uri: uri.clone(),
            status: Some(status),
            mime_type: outcome.content_type.clone(),
            content_length: outcome.content_length,
            headers: headers.clone(),
            original_exception,
            has_successful_status_code,
            has_expected_content_type,
            request_body_in_bytes: request_body_in_bytes.clone(),
            response_body_in_bytes,
            audit_trail: audit_trail.clone(),
            timing: outcome.elapsed,
        };

        if skip_body {
            let details = base_details(None, None);
            return TransportResponse::new(details, None, false, Vec::new());
        }

        if !has_expected_content_type {
            // Stream-like: hand the caller a buffer instead of attempting deserialization.
            let mut stream = self.memory_streams.acquire();
            stream.write(&outcome.body);
            let details = base_details(None, Some(outcome.body.clone()));
            let disposable = Disposable::RecycledBuffer { stream: Some(stream), factory: Arc::clone(&self.memory_streams) };
            return TransportResponse::new(details, None, true, vec![disposable]);
        }

        let mut original_exception = None;
        if !has_successful_status_code {
            original_exception = product.try_get_server_error_reason(&outcome.body);
        }

        let response_body_in_bytes = Some(outcome.body.clone());
        match serializer.deserialize::<T>(&outcome.body) {
            Ok(value) => {
                let details = base_details(original_exception, response_body_in_bytes);
                TransportResponse::new(details, Some(value), false, Vec::new())
            }
            Err(err) => {
                let original_exception = original_exception.or_else(|| Some(err.to_string()));
                let details = base_details(original_exception, response_body_in_bytes);
                TransportResponse::new(details, None, false, Vec::new())
            }
        }
    }
}
