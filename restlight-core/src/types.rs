//! Static type descriptors for handler parameters, bean fields and return values.
//!
//! Registration code describes each parameter once with a [`TypeDesc`]; resolver
//! factories and serializers dispatch on it at deploy time, so nothing inspects
//! types while a request is running.

use crate::resolver::bean::BeanType;
use crate::value::{AnyObject, Value};
use crate::{Error, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Descriptor of a parameter, field or return type.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeDesc {
    Str,
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bytes,
    Optional(Box<TypeDesc>),
    List(Box<TypeDesc>),
    Set(Box<TypeDesc>),
    Array(Box<TypeDesc>),
    /// String-keyed map; `Map(List(T))` is the multi-value form.
    Map(Box<TypeDesc>),
    Cookie,
    Headers,
    /// Any `FromStr` type.
    Parsed(ParsedType),
    /// A registered Rust type.
    Object(ObjectType),
}

impl TypeDesc {
    pub fn optional(inner: TypeDesc) -> Self {
        TypeDesc::Optional(Box::new(inner))
    }

    pub fn list(element: TypeDesc) -> Self {
        TypeDesc::List(Box::new(element))
    }

    pub fn set(element: TypeDesc) -> Self {
        TypeDesc::Set(Box::new(element))
    }

    pub fn array(element: TypeDesc) -> Self {
        TypeDesc::Array(Box::new(element))
    }

    pub fn map(value: TypeDesc) -> Self {
        TypeDesc::Map(Box::new(value))
    }

    /// A type parsed from its string form.
    pub fn parsed<T>() -> Self
    where
        T: FromStr + Any + Send + Sync,
        T::Err: fmt::Display,
    {
        TypeDesc::Parsed(ParsedType::of::<T>())
    }

    /// Strip any number of `Optional` wrappers.
    pub fn unwrap_optional(&self) -> &TypeDesc {
        match self {
            TypeDesc::Optional(inner) => inner.unwrap_optional(),
            other => other,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, TypeDesc::Optional(_))
    }

    /// Single-valued types the string converter handles directly.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self.unwrap_optional(),
            TypeDesc::Str
                | TypeDesc::Bool
                | TypeDesc::Char
                | TypeDesc::I8
                | TypeDesc::I16
                | TypeDesc::I32
                | TypeDesc::I64
                | TypeDesc::U8
                | TypeDesc::U16
                | TypeDesc::U32
                | TypeDesc::U64
                | TypeDesc::F32
                | TypeDesc::F64
                | TypeDesc::Parsed(_)
        )
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.unwrap_optional(),
            TypeDesc::List(_) | TypeDesc::Set(_) | TypeDesc::Array(_)
        )
    }

    /// Element type of a list, set or array.
    pub fn element(&self) -> Option<&TypeDesc> {
        match self.unwrap_optional() {
            TypeDesc::List(e) | TypeDesc::Set(e) | TypeDesc::Array(e) => Some(e),
            _ => None,
        }
    }

    /// Value type of a map.
    pub fn map_value(&self) -> Option<&TypeDesc> {
        match self.unwrap_optional() {
            TypeDesc::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_map(&self) -> bool {
        self.map_value().is_some()
    }

    /// `Map(List(_))`, `Map(Set(_))` or `Map(Array(_))`.
    pub fn is_multi_value_map(&self) -> bool {
        self.map_value().is_some_and(TypeDesc::is_collection)
    }

    pub fn object(&self) -> Option<&ObjectType> {
        match self.unwrap_optional() {
            TypeDesc::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.unwrap_optional(), TypeDesc::Str)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Str => f.write_str("String"),
            TypeDesc::Bool => f.write_str("bool"),
            TypeDesc::Char => f.write_str("char"),
            TypeDesc::I8 => f.write_str("i8"),
            TypeDesc::I16 => f.write_str("i16"),
            TypeDesc::I32 => f.write_str("i32"),
            TypeDesc::I64 => f.write_str("i64"),
            TypeDesc::U8 => f.write_str("u8"),
            TypeDesc::U16 => f.write_str("u16"),
            TypeDesc::U32 => f.write_str("u32"),
            TypeDesc::U64 => f.write_str("u64"),
            TypeDesc::F32 => f.write_str("f32"),
            TypeDesc::F64 => f.write_str("f64"),
            TypeDesc::Bytes => f.write_str("Bytes"),
            TypeDesc::Optional(t) => write!(f, "Option<{}>", t),
            TypeDesc::List(t) => write!(f, "Vec<{}>", t),
            TypeDesc::Set(t) => write!(f, "HashSet<{}>", t),
            TypeDesc::Array(t) => write!(f, "[{}]", t),
            TypeDesc::Map(t) => write!(f, "Map<String, {}>", t),
            TypeDesc::Cookie => f.write_str("Cookie"),
            TypeDesc::Headers => f.write_str("HeaderMap"),
            TypeDesc::Parsed(p) => f.write_str(p.name()),
            TypeDesc::Object(o) => f.write_str(o.name()),
        }
    }
}

/// A type converted from a string through its `FromStr` impl.
#[derive(Clone)]
pub struct ParsedType {
    type_id: TypeId,
    name: &'static str,
    parse: fn(&str) -> std::result::Result<Value, String>,
}

impl ParsedType {
    pub fn of<T>() -> Self
    where
        T: FromStr + Any + Send + Sync,
        T::Err: fmt::Display,
    {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            parse: parse_as::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parse(&self, raw: &str) -> std::result::Result<Value, String> {
        (self.parse)(raw)
    }
}

fn parse_as<T>(raw: &str) -> std::result::Result<Value, String>
where
    T: FromStr + Any + Send + Sync,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map(Value::object)
        .map_err(|e| e.to_string())
}

impl PartialEq for ParsedType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl fmt::Debug for ParsedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParsedType").field(&self.name).finish()
    }
}

/// JSON codec of a registered type, going through `serde_json::Value`.
#[derive(Clone, Copy)]
pub struct JsonCodec {
    from_json: fn(serde_json::Value) -> Result<Value>,
    to_json: fn(&AnyObject) -> Result<serde_json::Value>,
}

impl JsonCodec {
    pub fn decode(&self, json: serde_json::Value) -> Result<Value> {
        (self.from_json)(json)
    }

    pub fn encode(&self, object: &AnyObject) -> Result<serde_json::Value> {
        (self.to_json)(object)
    }
}

/// Protobuf codec of a registered message type.
#[derive(Clone)]
pub struct ProtobufCodec {
    decode: fn(&[u8]) -> Result<Value>,
    encode: fn(&AnyObject) -> Result<Vec<u8>>,
    full_name: String,
    schema: String,
}

impl ProtobufCodec {
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        (self.decode)(bytes)
    }

    pub fn encode(&self, object: &AnyObject) -> Result<Vec<u8>> {
        (self.encode)(object)
    }

    /// Fully qualified message name, e.g. `restlight.test.Person`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Schema file the message is declared in.
    pub fn schema(&self) -> &str {
        &self.schema
    }
}

struct ObjectTypeInner {
    type_id: TypeId,
    name: &'static str,
    json: Option<JsonCodec>,
    protobuf: Option<ProtobufCodec>,
    bean: Option<BeanType>,
}

/// A Rust type registered for use as a body, bean or return value.
///
/// Equality is by `TypeId`.
#[derive(Clone)]
pub struct ObjectType {
    inner: Arc<ObjectTypeInner>,
}

impl ObjectType {
    pub fn builder<T: Any + Send + Sync>() -> ObjectTypeBuilder<T> {
        ObjectTypeBuilder {
            inner: ObjectTypeInner {
                type_id: TypeId::of::<T>(),
                name: type_name::<T>(),
                json: None,
                protobuf: None,
                bean: None,
            },
            _marker: std::marker::PhantomData,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.inner.type_id
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn json(&self) -> Option<&JsonCodec> {
        self.inner.json.as_ref()
    }

    pub fn protobuf(&self) -> Option<&ProtobufCodec> {
        self.inner.protobuf.as_ref()
    }

    pub fn bean(&self) -> Option<&BeanType> {
        self.inner.bean.as_ref()
    }
}

impl PartialEq for ObjectType {
    fn eq(&self, other: &Self) -> bool {
        self.inner.type_id == other.inner.type_id
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType")
            .field("name", &self.inner.name)
            .field("json", &self.inner.json.is_some())
            .field("protobuf", &self.inner.protobuf.is_some())
            .field("bean", &self.inner.bean.is_some())
            .finish()
    }
}

impl From<ObjectType> for TypeDesc {
    fn from(object: ObjectType) -> Self {
        TypeDesc::Object(object)
    }
}

/// Builder for [`ObjectType`].
pub struct ObjectTypeBuilder<T> {
    inner: ObjectTypeInner,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ObjectTypeBuilder<T> {
    /// Read and write the type as JSON through serde.
    pub fn json(mut self) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        self.inner.json = Some(JsonCodec {
            from_json: json_decode::<T>,
            to_json: json_encode::<T>,
        });
        self
    }

    /// Read and write the type as a protobuf message.
    ///
    /// The schema file defaults to the package path, `a.b` becoming `a/b.proto`.
    pub fn protobuf(mut self) -> Self
    where
        T: prost::Message + prost::Name + Default,
    {
        let schema = if T::PACKAGE.is_empty() {
            format!("{}.proto", T::NAME.to_ascii_lowercase())
        } else {
            format!("{}.proto", T::PACKAGE.replace('.', "/"))
        };
        self.inner.protobuf = Some(ProtobufCodec {
            decode: protobuf_decode::<T>,
            encode: protobuf_encode::<T>,
            full_name: T::full_name(),
            schema,
        });
        self
    }

    /// Override the schema file reported for protobuf responses.
    pub fn protobuf_schema(mut self, schema: impl Into<String>) -> Self {
        if let Some(codec) = self.inner.protobuf.as_mut() {
            codec.schema = schema.into();
        }
        self
    }

    /// Bind the type field by field from request sources.
    pub fn bean(mut self, bean: BeanType) -> Self {
        self.inner.bean = Some(bean);
        self
    }

    pub fn build(self) -> ObjectType {
        ObjectType {
            inner: Arc::new(self.inner),
        }
    }
}

fn downcast<'a, T: Any>(object: &'a AnyObject) -> Result<&'a T> {
    object.downcast_ref::<T>().ok_or(Error::TypeMismatch {
        expected: type_name::<T>(),
        found: object.type_name(),
    })
}

fn json_decode<T>(json: serde_json::Value) -> Result<Value>
where
    T: DeserializeOwned + Any + Send + Sync,
{
    serde_json::from_value::<T>(json)
        .map(Value::object)
        .map_err(|e| Error::Deserialization(e.to_string()))
}

fn json_encode<T>(object: &AnyObject) -> Result<serde_json::Value>
where
    T: Serialize + Any + Send + Sync,
{
    serde_json::to_value(downcast::<T>(object)?).map_err(|e| Error::Serialization(e.to_string()))
}

fn protobuf_decode<T>(bytes: &[u8]) -> Result<Value>
where
    T: prost::Message + Default + Any + Send + Sync,
{
    T::decode(bytes)
        .map(Value::object)
        .map_err(|e| Error::Deserialization(e.to_string()))
}

fn protobuf_encode<T>(object: &AnyObject) -> Result<Vec<u8>>
where
    T: prost::Message + Any + Send + Sync,
{
    Ok(downcast::<T>(object)?.encode_to_vec())
}
