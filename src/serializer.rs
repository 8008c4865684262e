//! The pluggable body serializer external collaborator.
//!
//! Unlike `RequestInvoker`/`ProductRegistration`, `Serializer` is not object-safe: `serialize`/
//! `deserialize` are generic over the caller's concrete body type, so it is threaded through
//! `Transport` as a type parameter rather than stored behind `Arc<dyn Serializer>`. The shape
//! follows serde's own convention instead (`Serialize`/`DeserializeOwned` bounds on generic
//! methods).

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors produced while serializing or deserializing a request/response body.
#[derive(Debug, thiserror::Error)]
pub enum SerializerError {
    #[error("failed to serialize request body: {0}")]
    Serialize(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to deserialize response body: {0}")]
    Deserialize(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Converts typed values to and from the wire representation used by `PostData::serializable`
/// bodies and `ResponseFactory`'s deserialization step.
pub trait Serializer: Send + Sync + std::fmt::Debug {
    /// Renders `value` to bytes.
    fn serialize<T>(&self, value: &T) -> Result<Bytes, SerializerError>
    where
        T: Serialize;

    /// Parses `bytes` into `T`.
    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, SerializerError>
    where
        T: DeserializeOwned;
}
