//! The outgoing request body: a tagged variant that knows how to render itself to bytes,
//! reusably across pipeline retries.
//!
//! `write` must be callable more than once on the same body (the pipeline retries against other
//! nodes) and, when `disable_direct_streaming` is set, must capture the first write's bytes for
//! reuse by subsequent writes and by diagnostics. `StreamHandler` is the one documented exception
//! — see `DESIGN.md`, Open Question 2.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde::Serialize;

/// Errors produced while rendering a [`PostData`] to bytes.
#[derive(Debug, thiserror::Error)]
pub enum PostDataError {
    /// A `Serializable` body failed to serialize.
    #[error("failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),
    /// A `StreamHandler` writer returned an I/O error.
    #[error("stream handler writer failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One line of a `MultiJson` (newline-delimited JSON) body.
#[derive(Debug, Clone)]
pub enum MultiJsonLine {
    /// A pre-rendered JSON string, used verbatim.
    Raw(String),
    /// A value to be serialized at write time.
    Value(serde_json::Value),
}

type SerializeFn = Arc<dyn Fn() -> Result<Vec<u8>, serde_json::Error> + Send + Sync>;
type StreamWriteFn = Arc<dyn Fn(&mut Vec<u8>) -> std::io::Result<()> + Send + Sync>;

enum Variant {
    Bytes(Bytes),
    Text(String),
    Serializable(SerializeFn),
    MultiJson(Vec<MultiJsonLine>),
    StreamHandler(StreamWriteFn),
}

/// The outgoing body for a single logical call.
///
/// Cheap to clone: the capture cache and any closures are held behind `Arc`, so retrying the
/// same `PostData` against a different node shares the same captured bytes (when capturing
/// applies).
pub struct PostData {
    variant: Variant,
    captured: Arc<Mutex<Option<Bytes>>>,
}

impl Clone for PostData {
    fn clone(&self) -> Self {
        Self { variant: self.variant.clone_ref(), captured: Arc::clone(&self.captured) }
    }
}

impl Variant {
    fn clone_ref(&self) -> Variant {
        match self {
            Variant::Bytes(b) => Variant::Bytes(b.clone()),
            Variant::Text(s) => Variant::Text(s.clone()),
            Variant::Serializable(f) => Variant::Serializable(Arc::clone(f)),
            Variant::MultiJson(lines) => Variant::MultiJson(lines.clone()),
            Variant::StreamHandler(f) => Variant::StreamHandler(Arc::clone(f)),
        }
    }
}

impl PostData {
    fn from_variant(variant: Variant) -> Self {
        Self { variant, captured: Arc::new(Mutex::new(None)) }
    }

    /// A body that is already raw bytes.
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_variant(Variant::Bytes(bytes.into()))
    }

    /// A body that is already a UTF-8 string.
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_variant(Variant::Text(text.into()))
    }

    /// A body serialized lazily from `value` at write time. The concrete type is closed over by
    /// the stored closure rather than threaded through generically.
    pub fn serializable<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        let f: SerializeFn = Arc::new(move || serde_json::to_vec(&value));
        Self::from_variant(Variant::Serializable(f))
    }

    /// A newline-delimited JSON body.
    pub fn multi_json(lines: Vec<MultiJsonLine>) -> Self {
        Self::from_variant(Variant::MultiJson(lines))
    }

    /// A body produced by a caller-supplied writer. Never captured for reuse, even when
    /// `disable_direct_streaming` is set — see `DESIGN.md`, Open Question 2. Callers that need
    /// this body to survive a retry must make the writer itself replayable.
    pub fn stream_handler<F>(writer: F) -> Self
    where
        F: Fn(&mut Vec<u8>) -> std::io::Result<()> + Send + Sync + 'static,
    {
        Self::from_variant(Variant::StreamHandler(Arc::new(writer)))
    }

    /// Renders this body to bytes. When `disable_direct_streaming` is `true` and this isn't a
    /// `StreamHandler` body, the first call caches the result so later calls (retries,
    /// diagnostics) return byte-identical output without re-running the variant's logic.
    pub fn write(&self, disable_direct_streaming: bool) -> Result<Bytes, PostDataError> {
        if disable_direct_streaming && !matches!(self.variant, Variant::StreamHandler(_)) {
            if let Some(cached) = self.captured.lock().unwrap().clone() {
                return Ok(cached);
            }
        }

        let rendered = match &self.variant {
            Variant::Bytes(b) => b.clone(),
            Variant::Text(s) => Bytes::from(s.clone().into_bytes()),
            Variant::Serializable(f) => Bytes::from(f()?),
            Variant::MultiJson(lines) => {
                let mut buf = Vec::new();
                for line in lines {
                    match line {
                        MultiJsonLine::Raw(s) => buf.extend_from_slice(s.as_bytes()),
                        MultiJsonLine::Value(v) => {
                            serde_json::to_writer(&mut buf, v)?;
                        }
                    }
                    buf.push(b'\n');
                }
                Bytes::from(buf)
            }
            Variant::StreamHandler(f) => {
                let mut buf = Vec::new();
                f(&mut buf)?;
                Bytes::from(buf)
            }
        };

        if disable_direct_streaming && !matches!(self.variant, Variant::StreamHandler(_)) {
            *self.captured.lock().unwrap() = Some(rendered.clone());
        }
        Ok(rendered)
    }

    /// The bytes captured by a prior [`PostData::write`] call with `disable_direct_streaming =
    /// true`, for `ApiCallDetails::request_body_in_bytes`. Always `None` for `StreamHandler`
    /// bodies and for bodies that haven't been written yet.
    pub fn captured_bytes(&self) -> Option<Bytes> {
        self.captured.lock().unwrap().clone()
    }

    /// `true` if this is a `StreamHandler` body (never captured, see above).
    pub fn is_stream_handler(&self) -> bool {
        matches!(self.variant, Variant::StreamHandler(_))
    }
}
