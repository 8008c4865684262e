#![forbid(unsafe_code)]

//! The `serde_json`-backed [`transit::serializer::Serializer`] implementation.
//!
//! Kept as its own crate, separate from `transit`'s core, per `spec.md` §1's scoping of "concrete
//! JSON serialization (serde_json bindings)" out of the pipeline itself — `transit` only depends
//! on the `Serializer` trait, never on `serde_json` as a consumer-facing type.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use transit::serializer::{Serializer, SerializerError};

/// A [`Serializer`] that renders and parses bodies as JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T>(&self, value: &T) -> Result<Bytes, SerializerError>
    where
        T: Serialize,
    {
        serde_json::to_vec(value).map(Bytes::from).map_err(|e| SerializerError::Serialize(Box::new(e)))
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, SerializerError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(|e| SerializerError::Deserialize(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
    struct Doc {
        ok: bool,
        count: u32,
    }

    #[test]
    fn roundtrips_a_struct() {
        let s = JsonSerializer;
        let bytes = s.serialize(&Doc { ok: true, count: 3 }).unwrap();
        let back: Doc = s.deserialize(&bytes).unwrap();
        assert_eq!(back, Doc { ok: true, count: 3 });
    }

    #[test]
    fn malformed_json_is_a_deserialize_error() {
        let s = JsonSerializer;
        let err = s.deserialize::<Doc>(b"not json").unwrap_err();
        assert!(matches!(err, SerializerError::Deserialize(_)));
    }
}
