// Protobuf through prost

use super::{HttpRequestSerializer, HttpResponseSerializer, RequestEntity, ResponseEntity};
use crate::types::{ProtobufCodec, TypeDesc};
use crate::value::Value;
use crate::{Error, MediaType, Result};

/// Schema file of the written message.
pub const PROTOBUF_SCHEMA_HEADER: &str = "X-Protobuf-Schema";
/// Fully qualified name of the written message.
pub const PROTOBUF_MESSAGE_HEADER: &str = "X-Protobuf-Message";

fn is_protobuf(media_type: &MediaType) -> bool {
    media_type.type_ == "application"
        && matches!(media_type.subtype.as_str(), "x-protobuf" | "protobuf")
}

fn codec(ty: &TypeDesc) -> Option<&ProtobufCodec> {
    ty.object().and_then(|o| o.protobuf())
}

/// Reads and writes registered prost messages.
///
/// Only exact protobuf media types match, a wildcard `Accept` never selects it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufSerializer;

impl HttpRequestSerializer for ProtobufSerializer {
    fn name(&self) -> &str {
        "protobuf"
    }

    fn supports_read(&self, media_type: &MediaType, ty: &TypeDesc) -> bool {
        is_protobuf(media_type) && codec(ty).is_some()
    }

    fn deserialize(&self, entity: &RequestEntity<'_>) -> Result<Value> {
        let codec = codec(entity.ty()).ok_or_else(|| {
            Error::Deserialization(format!("{} is not a protobuf message", entity.ty()))
        })?;
        codec.decode(entity.body())
    }
}

impl HttpResponseSerializer for ProtobufSerializer {
    fn name(&self) -> &str {
        "protobuf"
    }

    fn supports_write(&self, media_type: &MediaType, ty: &TypeDesc) -> bool {
        is_protobuf(media_type) && codec(ty).is_some()
    }

    fn media_type(&self) -> MediaType {
        MediaType::protobuf()
    }

    fn serialize(&self, entity: &mut ResponseEntity<'_>) -> Result<Vec<u8>> {
        let codec = codec(entity.ty())
            .ok_or_else(|| Error::Serialization(format!("{} is not a protobuf message", entity.ty())))?
            .clone();
        let bytes = match entity.value() {
            Value::Object(object) => codec.encode(object)?,
            other => {
                return Err(Error::Serialization(format!(
                    "cannot write {} as protobuf",
                    other.kind()
                )));
            }
        };
        let headers = entity.headers_mut();
        headers.insert(PROTOBUF_SCHEMA_HEADER, codec.schema());
        headers.insert(PROTOBUF_MESSAGE_HEADER, codec.full_name());
        Ok(bytes)
    }
}
