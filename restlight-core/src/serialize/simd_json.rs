// JSON through simd-json

use super::json::{is_json, json_supported};
use super::{
    HttpRequestSerializer, HttpResponseSerializer, RequestEntity, ResponseEntity, json_to_value,
    value_to_json,
};
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, MediaType, Result};

/// JSON serializer backed by `simd-json`.
///
/// simd-json parses in place, so the body is copied into a scratch buffer first.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimdJsonSerializer;

impl HttpRequestSerializer for SimdJsonSerializer {
    fn name(&self) -> &str {
        "simd-json"
    }

    fn supports_read(&self, media_type: &MediaType, ty: &TypeDesc) -> bool {
        is_json(media_type) && json_supported(ty)
    }

    fn deserialize(&self, entity: &RequestEntity<'_>) -> Result<Value> {
        let mut buf = entity.body().to_vec();
        let json: serde_json::Value =
            simd_json::from_slice(&mut buf).map_err(|e| Error::Deserialization(e.to_string()))?;
        json_to_value(json, entity.ty())
    }
}

impl HttpResponseSerializer for SimdJsonSerializer {
    fn name(&self) -> &str {
        "simd-json"
    }

    fn supports_write(&self, media_type: &MediaType, ty: &TypeDesc) -> bool {
        is_json(media_type) && json_supported(ty)
    }

    fn media_type(&self) -> MediaType {
        MediaType::json()
    }

    fn serialize(&self, entity: &mut ResponseEntity<'_>) -> Result<Vec<u8>> {
        let json = value_to_json(entity.value(), Some(entity.ty()))?;
        simd_json::to_vec(&json).map_err(|e| Error::Serialization(e.to_string()))
    }
}
