//! Body serializers and their registry.
//!
//! A request serializer turns a body of some media type into a [`Value`] of the
//! parameter's declared type; a response serializer does the reverse for return
//! values. Serializers are selected by media type, first match wins, in the order
//! they were registered.
//!
//! Built-in serializers:
//!
//! - [`JsonSerializer`]: JSON through `serde_json`
//! - `SimdJsonSerializer`: JSON through `simd-json` (feature `simd-json`)
//! - [`ProtobufSerializer`]: Protobuf through `prost`

mod json;
mod protobuf;
#[cfg(feature = "simd-json")]
mod simd_json;

pub use json::{JsonSerializer, json_to_value, value_to_json};
pub use protobuf::{PROTOBUF_MESSAGE_HEADER, PROTOBUF_SCHEMA_HEADER, ProtobufSerializer};
#[cfg(feature = "simd-json")]
pub use simd_json::SimdJsonSerializer;

use crate::http::AsyncRequest;
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{HeaderMap, MediaType, Result};
use std::io::{Read, Write};
use std::sync::Arc;

/// What a request serializer reads from.
pub struct RequestEntity<'a> {
    request: &'a AsyncRequest,
    media_type: MediaType,
    ty: &'a TypeDesc,
}

impl<'a> RequestEntity<'a> {
    pub fn new(request: &'a AsyncRequest, media_type: MediaType, ty: &'a TypeDesc) -> Self {
        Self {
            request,
            media_type,
            ty,
        }
    }

    pub fn body(&self) -> &[u8] {
        self.request.body()
    }

    /// The body as a reader.
    pub fn input_stream(&self) -> impl Read + 'a {
        self.request.input_stream()
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Declared type of the parameter being read.
    pub fn ty(&self) -> &TypeDesc {
        self.ty
    }

    pub fn request(&self) -> &AsyncRequest {
        self.request
    }
}

/// What a response serializer writes.
pub struct ResponseEntity<'a> {
    value: &'a Value,
    ty: &'a TypeDesc,
    media_type: MediaType,
    headers: &'a mut HeaderMap,
}

impl<'a> ResponseEntity<'a> {
    pub fn new(
        value: &'a Value,
        ty: &'a TypeDesc,
        media_type: MediaType,
        headers: &'a mut HeaderMap,
    ) -> Self {
        Self {
            value,
            ty,
            media_type,
            headers,
        }
    }

    pub fn value(&self) -> &Value {
        self.value
    }

    /// Declared return type.
    pub fn ty(&self) -> &TypeDesc {
        self.ty
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Response headers, for serializers that describe their payload.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.headers
    }
}

/// Reads request bodies.
pub trait HttpRequestSerializer: Send + Sync {
    fn name(&self) -> &str;

    fn supports_read(&self, media_type: &MediaType, ty: &TypeDesc) -> bool;

    /// Read through [`RequestEntity::input_stream`] instead of the body bytes.
    fn prefer_stream(&self) -> bool {
        false
    }

    fn deserialize(&self, entity: &RequestEntity<'_>) -> Result<Value>;

    fn deserialize_stream(&self, entity: &RequestEntity<'_>) -> Result<Value> {
        self.deserialize(entity)
    }
}

/// Writes return values.
pub trait HttpResponseSerializer: Send + Sync {
    fn name(&self) -> &str;

    fn supports_write(&self, media_type: &MediaType, ty: &TypeDesc) -> bool;

    /// Content type written when the negotiated type is a wildcard.
    fn media_type(&self) -> MediaType;

    fn prefer_stream(&self) -> bool {
        false
    }

    fn serialize(&self, entity: &mut ResponseEntity<'_>) -> Result<Vec<u8>>;

    fn serialize_stream(&self, entity: &mut ResponseEntity<'_>, out: &mut dyn Write) -> Result<()> {
        let bytes = self.serialize(entity)?;
        out.write_all(&bytes)?;
        Ok(())
    }
}

/// Ordered serializer registry.
#[derive(Clone, Default)]
pub struct Serializers {
    request: Vec<Arc<dyn HttpRequestSerializer>>,
    response: Vec<Arc<dyn HttpResponseSerializer>>,
}

impl Serializers {
    /// No serializers at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// JSON and Protobuf.
    pub fn defaults() -> Self {
        let mut serializers = Self::empty();
        #[cfg(feature = "simd-json")]
        serializers.register(SimdJsonSerializer::default());
        serializers.register(JsonSerializer::default());
        serializers.register(ProtobufSerializer);
        serializers
    }

    /// Register a serializer for both directions.
    pub fn register<S>(&mut self, serializer: S) -> &mut Self
    where
        S: HttpRequestSerializer + HttpResponseSerializer + 'static,
    {
        let serializer = Arc::new(serializer);
        self.request.push(serializer.clone());
        self.response.push(serializer);
        self
    }

    pub fn register_request(&mut self, serializer: Arc<dyn HttpRequestSerializer>) -> &mut Self {
        self.request.push(serializer);
        self
    }

    pub fn register_response(&mut self, serializer: Arc<dyn HttpResponseSerializer>) -> &mut Self {
        self.response.push(serializer);
        self
    }

    pub fn request_serializers(&self) -> &[Arc<dyn HttpRequestSerializer>] {
        &self.request
    }

    pub fn response_serializers(&self) -> &[Arc<dyn HttpResponseSerializer>] {
        &self.response
    }

    /// First serializer able to read `ty` from `media_type`.
    pub fn find_reader(
        &self,
        media_type: &MediaType,
        ty: &TypeDesc,
    ) -> Option<&Arc<dyn HttpRequestSerializer>> {
        self.request
            .iter()
            .find(|s| s.supports_read(media_type, ty))
    }

    /// First serializer able to write `ty` as `media_type`.
    pub fn find_writer(
        &self,
        media_type: &MediaType,
        ty: &TypeDesc,
    ) -> Option<&Arc<dyn HttpResponseSerializer>> {
        self.response
            .iter()
            .find(|s| s.supports_write(media_type, ty))
    }
}

impl std::fmt::Debug for Serializers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializers")
            .field(
                "request",
                &self.request.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field(
                "response",
                &self.response.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Read a serializer for the request side out of an entity, streaming when preferred.
pub(crate) fn read_with(
    serializer: &dyn HttpRequestSerializer,
    entity: &RequestEntity<'_>,
) -> Result<Value> {
    if serializer.prefer_stream() {
        serializer.deserialize_stream(entity)
    } else {
        serializer.deserialize(entity)
    }
}
