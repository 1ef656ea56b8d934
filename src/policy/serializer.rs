use crate::error::Result;
use crate::metadata::Metadata;

/// Symmetric bytes-to-metadata codec, parameterizing every topic.
///
/// Round-trips must be exact: `deserialize(serialize(m)) == m` for
/// any Validator-accepted `m` (spec.md §8).
pub trait Serializer: Send + Sync {
    fn serialize(&self, metadata: &Metadata) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Metadata>;

    /// A snapshot sufficient to reconstruct this instance.
    fn metadata(&self) -> Metadata;
}

/// Plain-JSON serializer: `serialize` is just the compact JSON
/// encoding of the metadata document, `deserialize` parses it back.
///
/// Grounded on `docs/_code/energy_serializer.cpp`, whose reference
/// serializer is likewise a thin JSON encode/decode pass.
#[derive(Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, metadata: &Metadata) -> Result<Vec<u8>> {
        Ok(metadata.to_json_string()?.into_bytes())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Metadata> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| crate::error::MofkaError::Protocol(e.to_string()))?;
        Metadata::from_json_str(s)
    }

    fn metadata(&self) -> Metadata {
        Metadata::new(serde_json::json!({ "type": "json" }))
    }
}
