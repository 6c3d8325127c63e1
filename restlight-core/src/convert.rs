// String conversion for request values
//
// Query parameters, headers, cookies, path and matrix variables all arrive as
// strings. The converter is chosen once per target type at deploy time; an
// unsupported target is a configuration error.

use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, Result};

#[derive(Debug, Clone)]
enum Shape {
    Scalar,
    Bytes,
    List,
    Set,
}

/// Converts raw request strings into values of one target type.
#[derive(Debug, Clone)]
pub struct StringConverter {
    target: TypeDesc,
    element: TypeDesc,
    shape: Shape,
}

impl StringConverter {
    /// Build a converter for `target`, failing for types that have no string form.
    pub fn new(target: &TypeDesc) -> Result<Self> {
        let inner = target.unwrap_optional();
        let (element, shape) = match inner {
            TypeDesc::Bytes => (inner.clone(), Shape::Bytes),
            t if t.is_scalar() => (t.clone(), Shape::Scalar),
            TypeDesc::List(e) | TypeDesc::Array(e) if e.is_scalar() => {
                (e.unwrap_optional().clone(), Shape::List)
            }
            TypeDesc::Set(e) if e.is_scalar() => (e.unwrap_optional().clone(), Shape::Set),
            other => {
                return Err(Error::config(format!(
                    "no string conversion available for type {}",
                    other
                )));
            }
        };
        Ok(Self {
            target: target.clone(),
            element,
            shape,
        })
    }

    /// Whether `target` can be produced from a string.
    pub fn supports(target: &TypeDesc) -> bool {
        Self::new(target).is_ok()
    }

    pub fn target(&self) -> &TypeDesc {
        &self.target
    }

    /// Convert one raw string. Collections split it on commas.
    pub fn convert(&self, raw: &str) -> Result<Value> {
        match self.shape {
            Shape::Scalar => convert_scalar(&self.element, raw),
            Shape::Bytes => Ok(Value::Bytes(bytes::Bytes::copy_from_slice(raw.as_bytes()))),
            Shape::List => Ok(Value::List(self.split(raw)?)),
            Shape::Set => Ok(Value::set(self.split(raw)?)),
        }
    }

    /// Convert every raw value of a source. Scalars take the first; a single raw
    /// value for a collection is comma split, several are converted one by one.
    pub fn convert_all(&self, raws: &[String]) -> Result<Value> {
        match (&self.shape, raws) {
            (_, []) => Ok(Value::Null),
            (Shape::Scalar | Shape::Bytes, [first, ..]) => self.convert(first),
            (_, [single]) => self.convert(single),
            (Shape::List, many) => Ok(Value::List(self.each(many)?)),
            (Shape::Set, many) => Ok(Value::set(self.each(many)?)),
        }
    }

    fn split(&self, raw: &str) -> Result<Vec<Value>> {
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        self.each(parts)
    }

    fn each<S: AsRef<str>>(&self, raws: impl IntoIterator<Item = S>) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for raw in raws {
            let value = convert_scalar(&self.element, raw.as_ref())?;
            if !value.is_null() {
                out.push(value);
            }
        }
        Ok(out)
    }
}

fn convert_scalar(ty: &TypeDesc, raw: &str) -> Result<Value> {
    if let TypeDesc::Str = ty {
        return Ok(Value::Str(raw.to_string()));
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let converted = match ty {
        TypeDesc::Bool => parse_bool(trimmed),
        TypeDesc::Char => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err("expected a single character".to_string()),
            }
        }
        TypeDesc::I8 => parse_int::<i8>(trimmed),
        TypeDesc::I16 => parse_int::<i16>(trimmed),
        TypeDesc::I32 => parse_int::<i32>(trimmed),
        TypeDesc::I64 => parse_int::<i64>(trimmed),
        TypeDesc::U8 => parse_uint::<u8>(trimmed),
        TypeDesc::U16 => parse_uint::<u16>(trimmed),
        TypeDesc::U32 => parse_uint::<u32>(trimmed),
        TypeDesc::U64 => parse_uint::<u64>(trimmed),
        TypeDesc::F32 => trimmed
            .parse::<f32>()
            .map(|f| Value::Float(f as f64))
            .map_err(|e| e.to_string()),
        TypeDesc::F64 => trimmed
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| e.to_string()),
        TypeDesc::Parsed(parsed) => parsed.parse(trimmed),
        other => Err(format!("unsupported target type {}", other)),
    };

    converted.map_err(|reason| {
        Error::BadRequest(format!("cannot convert '{}' to {}: {}", raw, ty, reason))
    })
}

fn parse_bool(raw: &str) -> std::result::Result<Value, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(Value::Bool(true)),
        "false" | "off" | "no" | "0" => Ok(Value::Bool(false)),
        _ => Err("expected a boolean".to_string()),
    }
}

fn parse_int<T>(raw: &str) -> std::result::Result<Value, String>
where
    T: std::str::FromStr + Into<i64>,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map(|v| Value::Int(v.into()))
        .map_err(|e| e.to_string())
}

fn parse_uint<T>(raw: &str) -> std::result::Result<Value, String>
where
    T: std::str::FromStr + Into<u64>,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map(|v| Value::UInt(v.into()))
        .map_err(|e| e.to_string())
}
