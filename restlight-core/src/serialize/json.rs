// JSON through serde_json
//
// Bodies are parsed into `serde_json::Value` first and then shaped by the
// declared `TypeDesc`; registered object types finish the job through their
// serde codec.

use super::{HttpRequestSerializer, HttpResponseSerializer, RequestEntity, ResponseEntity};
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, MediaType, Result};
use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;

/// Whether `media_type` denotes JSON (`application/json`, `*/*+json`, wildcards).
pub(crate) fn is_json(media_type: &MediaType) -> bool {
    media_type.is_compatible_with(&MediaType::json())
        || media_type.suffix() == Some("json")
}

/// Whether values of `ty` have a JSON form.
pub(crate) fn json_supported(ty: &TypeDesc) -> bool {
    match ty {
        TypeDesc::Optional(t)
        | TypeDesc::List(t)
        | TypeDesc::Set(t)
        | TypeDesc::Array(t)
        | TypeDesc::Map(t) => json_supported(t),
        TypeDesc::Object(o) => o.json().is_some(),
        TypeDesc::Bytes | TypeDesc::Headers | TypeDesc::Parsed(_) => false,
        _ => true,
    }
}

/// Shape a parsed JSON document into a value of `ty`.
pub fn json_to_value(json: Json, ty: &TypeDesc) -> Result<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = |json: &Json| {
        Error::Deserialization(format!("cannot read {} as {}", json_kind(json), ty))
    };
    match ty {
        TypeDesc::Optional(inner) => json_to_value(json, inner),
        TypeDesc::Str => match json {
            Json::String(s) => Ok(Value::Str(s)),
            other => Ok(Value::Str(other.to_string())),
        },
        TypeDesc::Bool => json.as_bool().map(Value::Bool).ok_or_else(|| mismatch(&json)),
        TypeDesc::Char => {
            let mut chars = json.as_str().map(str::chars).ok_or_else(|| mismatch(&json))?;
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err(mismatch(&json)),
            }
        }
        TypeDesc::I8 => signed(&json, i8::MIN as i64, i8::MAX as i64).ok_or_else(|| mismatch(&json)),
        TypeDesc::I16 => {
            signed(&json, i16::MIN as i64, i16::MAX as i64).ok_or_else(|| mismatch(&json))
        }
        TypeDesc::I32 => {
            signed(&json, i32::MIN as i64, i32::MAX as i64).ok_or_else(|| mismatch(&json))
        }
        TypeDesc::I64 => signed(&json, i64::MIN, i64::MAX).ok_or_else(|| mismatch(&json)),
        TypeDesc::U8 => unsigned(&json, u8::MAX as u64).ok_or_else(|| mismatch(&json)),
        TypeDesc::U16 => unsigned(&json, u16::MAX as u64).ok_or_else(|| mismatch(&json)),
        TypeDesc::U32 => unsigned(&json, u32::MAX as u64).ok_or_else(|| mismatch(&json)),
        TypeDesc::U64 => unsigned(&json, u64::MAX).ok_or_else(|| mismatch(&json)),
        TypeDesc::F32 | TypeDesc::F64 => {
            json.as_f64().map(Value::Float).ok_or_else(|| mismatch(&json))
        }
        TypeDesc::List(element) | TypeDesc::Array(element) => match json {
            Json::Array(items) => items
                .into_iter()
                .map(|item| json_to_value(item, element))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            other => Err(mismatch(&other)),
        },
        TypeDesc::Set(element) => match json {
            Json::Array(items) => items
                .into_iter()
                .map(|item| json_to_value(item, element))
                .collect::<Result<Vec<_>>>()
                .map(Value::set),
            other => Err(mismatch(&other)),
        },
        TypeDesc::Map(value_ty) => match json {
            Json::Object(fields) => fields
                .into_iter()
                .map(|(k, v)| json_to_value(v, value_ty).map(|v| (k, v)))
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Value::Map),
            other => Err(mismatch(&other)),
        },
        TypeDesc::Cookie => {
            let name = json.get("name").and_then(Json::as_str);
            let value = json.get("value").and_then(Json::as_str);
            match (name, value) {
                (Some(name), Some(value)) => Ok(Value::Cookie(crate::Cookie::new(name, value))),
                _ => Err(mismatch(&json)),
            }
        }
        TypeDesc::Object(object) => match object.json() {
            Some(codec) => codec.decode(json),
            None => Err(Error::Deserialization(format!(
                "{} has no JSON mapping",
                object.name()
            ))),
        },
        TypeDesc::Bytes | TypeDesc::Headers | TypeDesc::Parsed(_) => Err(mismatch(&json)),
    }
}

fn signed(json: &Json, min: i64, max: i64) -> Option<Value> {
    json.as_i64()
        .filter(|v| (min..=max).contains(v))
        .map(Value::Int)
}

fn unsigned(json: &Json, max: u64) -> Option<Value> {
    json.as_u64().filter(|v| *v <= max).map(Value::UInt)
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Render `value` as JSON. `ty` locates codecs of registered object types.
pub fn value_to_json(value: &Value, ty: Option<&TypeDesc>) -> Result<Json> {
    let ty = ty.map(TypeDesc::unwrap_optional);
    let json = match value {
        Value::Null => Json::Null,
        Value::Str(s) => Json::String(s.clone()),
        Value::Bool(b) => Json::Bool(*b),
        Value::Char(c) => Json::String(c.to_string()),
        Value::Int(i) => Json::Number((*i).into()),
        Value::UInt(u) => Json::Number((*u).into()),
        Value::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::Number((*b).into())).collect()),
        Value::List(items) | Value::Set(items) => {
            let element = ty.and_then(TypeDesc::element);
            Json::Array(
                items
                    .iter()
                    .map(|item| value_to_json(item, element))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        Value::Map(entries) => {
            let value_ty = ty.and_then(TypeDesc::map_value);
            let mut map = Map::new();
            for (k, v) in entries {
                map.insert(k.clone(), value_to_json(v, value_ty)?);
            }
            Json::Object(map)
        }
        Value::Cookie(cookie) => serde_json::json!({
            "name": cookie.name(),
            "value": cookie.value(),
        }),
        Value::Headers(headers) => {
            let mut map = Map::new();
            for name in headers.names() {
                map.insert(name.to_string(), serde_json::json!(headers.get_all(name)));
            }
            Json::Object(map)
        }
        Value::Object(object) => {
            let codec = ty.and_then(TypeDesc::object).and_then(|o| o.json());
            match codec {
                Some(codec) => codec.encode(object)?,
                None => {
                    return Err(Error::Serialization(format!(
                        "{} has no JSON mapping",
                        object.type_name()
                    )));
                }
            }
        }
    };
    Ok(json)
}

/// JSON serializer backed by `serde_json`.
///
/// With [`JsonSerializer::streaming`] request bodies are parsed through a reader.
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    streaming: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streaming() -> Self {
        Self { streaming: true }
    }
}

impl HttpRequestSerializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
    }

    fn supports_read(&self, media_type: &MediaType, ty: &TypeDesc) -> bool {
        is_json(media_type) && json_supported(ty)
    }

    fn prefer_stream(&self) -> bool {
        self.streaming
    }

    fn deserialize(&self, entity: &RequestEntity<'_>) -> Result<Value> {
        let json: Json = serde_json::from_slice(entity.body())
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        json_to_value(json, entity.ty())
    }

    fn deserialize_stream(&self, entity: &RequestEntity<'_>) -> Result<Value> {
        let json: Json = serde_json::from_reader(entity.input_stream())
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        json_to_value(json, entity.ty())
    }
}

impl HttpResponseSerializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
    }

    fn supports_write(&self, media_type: &MediaType, ty: &TypeDesc) -> bool {
        is_json(media_type) && json_supported(ty)
    }

    fn media_type(&self) -> MediaType {
        MediaType::json()
    }

    fn prefer_stream(&self) -> bool {
        self.streaming
    }

    fn serialize(&self, entity: &mut ResponseEntity<'_>) -> Result<Vec<u8>> {
        let json = value_to_json(entity.value(), Some(entity.ty()))?;
        serde_json::to_vec(&json).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn serialize_stream(
        &self,
        entity: &mut ResponseEntity<'_>,
        out: &mut dyn std::io::Write,
    ) -> Result<()> {
        let json = value_to_json(entity.value(), Some(entity.ty()))?;
        serde_json::to_writer(out, &json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shapes_follow_declared_type() {
        let ty = TypeDesc::map(TypeDesc::list(TypeDesc::U8));
        let value = json_to_value(json!({"a": [1, 2], "b": []}), &ty).unwrap();
        let Value::Map(map) = &value else {
            panic!("expected map");
        };
        assert_eq!(map["a"], Value::List(vec![Value::UInt(1), Value::UInt(2)]));

        assert!(json_to_value(json!([300]), &TypeDesc::list(TypeDesc::U8)).is_err());
        assert_eq!(json_to_value(json!(null), &TypeDesc::I32).unwrap(), Value::Null);
    }

    #[test]
    fn test_str_accepts_any_document() {
        assert_eq!(
            json_to_value(json!("hi"), &TypeDesc::Str).unwrap(),
            Value::from("hi")
        );
        assert_eq!(
            json_to_value(json!({"a": 1}), &TypeDesc::Str).unwrap(),
            Value::from(r#"{"a":1}"#)
        );
    }

    #[test]
    fn test_value_to_json() {
        let value = Value::from(vec![Value::Int(-1), Value::Float(1.5), Value::Null]);
        assert_eq!(value_to_json(&value, None).unwrap(), json!([-1, 1.5, null]));

        let unregistered = Value::object(5u8);
        assert!(value_to_json(&unregistered, None).is_err());
    }

    #[test]
    fn test_supported_media_types() {
        assert!(is_json(&MediaType::new("application", "problem+json")));
        assert!(is_json(&MediaType::any()));
        assert!(!is_json(&MediaType::protobuf()));
        assert!(!json_supported(&TypeDesc::Bytes));
    }
}
