// Writing handler return values to the response

use crate::config::RestlightOptions;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::media_type::Accept;
use crate::param::{MethodMeta, SerializerImpl};
use crate::route::COMPATIBLE_MEDIA_TYPES;
use crate::serialize::{HttpResponseSerializer, ResponseEntity, Serializers};
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, MediaType, Result};
use std::io::Write;
use std::sync::Arc;

/// Writes a handler's return value.
pub trait ReturnValueResolver: Send + Sync {
    fn write(&self, value: Value, request: &AsyncRequest, response: &mut AsyncResponse) -> Result<()>;
}

/// Pick the writer for a handler method at deploy time.
///
/// A `ResponseSerializer` on the method or its class fixes the serializer;
/// text, scalar and byte returns are written as is; everything else is
/// negotiated against the serializer registry.
pub fn resolver_for(
    method: &MethodMeta,
    returns: Option<&TypeDesc>,
    serializers: &Serializers,
    options: &RestlightOptions,
) -> Result<Arc<dyn ReturnValueResolver>> {
    let Some(ty) = returns else {
        return Ok(Arc::new(EmptyBody));
    };

    let fixed = method
        .annotations
        .response_serializer()
        .or_else(|| method.declaring.annotations.response_serializer());
    if let Some(class) = fixed {
        let serializer = class.instantiate().ok_or_else(|| {
            Error::config(format!(
                "response serializer {} on {} cannot be instantiated",
                class.name,
                method.qualified_name()
            ))
        })?;
        return Ok(Arc::new(FixedSerializerWriter {
            ty: ty.clone(),
            serializer,
        }));
    }

    if ty.is_scalar() || matches!(ty.unwrap_optional(), TypeDesc::Bytes) {
        return Ok(Arc::new(PlainWriter));
    }

    let negotiation = &options.serialize;
    Ok(Arc::new(NegotiatedWriter {
        ty: ty.clone(),
        serializers: serializers.clone(),
        format_param: negotiation
            .negotiation
            .then(|| negotiation.negotiation_param.clone()),
    }))
}

/// Serialize `value` into the response body and commit it.
fn write_with(
    serializer: &dyn HttpResponseSerializer,
    value: &Value,
    ty: &TypeDesc,
    media_type: MediaType,
    response: &mut AsyncResponse,
) -> Result<()> {
    let content_type = media_type.to_header_value();
    if serializer.prefer_stream() {
        let (headers, mut out) = response.headers_and_output();
        let mut entity = ResponseEntity::new(value, ty, media_type, headers);
        serializer.serialize_stream(&mut entity, &mut out)?;
        out.flush()?;
        drop(out);
        response.set_header("Content-Type", content_type);
        response.commit()
    } else {
        let bytes = {
            let mut entity = ResponseEntity::new(value, ty, media_type, response.headers_mut());
            serializer.serialize(&mut entity)?
        };
        response.set_header("Content-Type", content_type);
        response.send_result(bytes)
    }
}

/// Handlers without a body.
struct EmptyBody;

impl ReturnValueResolver for EmptyBody {
    fn write(&self, _value: Value, _request: &AsyncRequest, response: &mut AsyncResponse) -> Result<()> {
        response.send_result(b"")
    }
}

/// Text, scalars and raw bytes.
struct PlainWriter;

impl ReturnValueResolver for PlainWriter {
    fn write(&self, value: Value, _request: &AsyncRequest, response: &mut AsyncResponse) -> Result<()> {
        let (body, media_type) = match value {
            Value::Null => return response.send_result(b""),
            Value::Bytes(bytes) => (bytes.to_vec(), MediaType::octet_stream()),
            Value::Str(s) => (s.into_bytes(), MediaType::text_plain_utf8()),
            Value::Bool(b) => (b.to_string().into_bytes(), MediaType::text_plain_utf8()),
            Value::Char(c) => (c.to_string().into_bytes(), MediaType::text_plain_utf8()),
            Value::Int(i) => (i.to_string().into_bytes(), MediaType::text_plain_utf8()),
            Value::UInt(u) => (u.to_string().into_bytes(), MediaType::text_plain_utf8()),
            Value::Float(f) => (f.to_string().into_bytes(), MediaType::text_plain_utf8()),
            other => {
                return Err(Error::Serialization(format!(
                    "cannot write {} as plain text",
                    other.kind()
                )));
            }
        };
        response.set_header("Content-Type", media_type.to_header_value());
        response.send_result(body)
    }
}

/// Serializer chosen from produces, `Accept` or a format parameter.
struct NegotiatedWriter {
    ty: TypeDesc,
    serializers: Serializers,
    format_param: Option<String>,
}

impl NegotiatedWriter {
    /// Media types to try, most preferred first.
    fn candidates(&self, request: &AsyncRequest) -> Vec<MediaType> {
        let format = self
            .format_param
            .as_deref()
            .and_then(|p| request.param(p))
            .and_then(MediaType::from_format);

        let mut candidates: Vec<MediaType> = format.into_iter().collect();
        match request.attributes().get::<Vec<MediaType>>(COMPATIBLE_MEDIA_TYPES) {
            Some(produces) if !produces.is_empty() => candidates.extend(produces.iter().cloned()),
            _ => match request.headers().accept() {
                Some(accept) => candidates.extend(Accept::parse(accept).acceptable().cloned()),
                None => candidates.push(MediaType::json()),
            },
        }
        candidates
    }
}

impl ReturnValueResolver for NegotiatedWriter {
    fn write(&self, value: Value, request: &AsyncRequest, response: &mut AsyncResponse) -> Result<()> {
        if value.is_null() {
            return response.send_result(b"");
        }
        for candidate in self.candidates(request) {
            if let Some(serializer) = self.serializers.find_writer(&candidate, &self.ty) {
                let media_type = if candidate.is_wildcard_type() || candidate.is_wildcard_subtype() {
                    serializer.media_type()
                } else {
                    candidate
                };
                tracing::trace!(serializer = serializer.name(), %media_type, "writing response");
                return write_with(serializer.as_ref(), &value, &self.ty, media_type, response);
            }
        }
        Err(Error::NotAcceptable(format!(
            "no serializer can write {} as {}",
            self.ty,
            request.headers().accept().unwrap_or("application/json")
        )))
    }
}

/// Serializer fixed by a `ResponseSerializer` annotation.
struct FixedSerializerWriter {
    ty: TypeDesc,
    serializer: Arc<dyn SerializerImpl>,
}

impl ReturnValueResolver for FixedSerializerWriter {
    fn write(&self, value: Value, _request: &AsyncRequest, response: &mut AsyncResponse) -> Result<()> {
        if value.is_null() {
            return response.send_result(b"");
        }
        let serializer: &dyn HttpResponseSerializer = self.serializer.as_ref();
        let media_type = serializer.media_type();
        write_with(serializer, &value, &self.ty, media_type, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::param::ClassMeta;

    fn method() -> MethodMeta {
        MethodMeta::new(Arc::new(ClassMeta::new("Test")), "get")
    }

    #[test]
    fn test_plain_text() {
        let writer = resolver_for(
            &method(),
            Some(&TypeDesc::Str),
            &Serializers::defaults(),
            &RestlightOptions::default(),
        )
        .unwrap();
        let req = AsyncRequest::new(HttpMethod::GET, "/");
        let mut resp = AsyncResponse::new();
        writer.write(Value::from("hello"), &req, &mut resp).unwrap();
        assert_eq!(resp.body(), b"hello");
        assert_eq!(
            resp.headers().content_type(),
            Some("text/plain;charset=utf-8")
        );
    }

    #[test]
    fn test_negotiated_defaults_to_json() {
        let ty = TypeDesc::list(TypeDesc::I32);
        let writer = resolver_for(
            &method(),
            Some(&ty),
            &Serializers::defaults(),
            &RestlightOptions::default(),
        )
        .unwrap();
        let req = AsyncRequest::new(HttpMethod::GET, "/");
        let mut resp = AsyncResponse::new();
        writer
            .write(Value::from(vec![1i32, 2]), &req, &mut resp)
            .unwrap();
        assert_eq!(resp.body(), b"[1,2]");
        assert_eq!(resp.headers().content_type(), Some("application/json"));
    }

    #[test]
    fn test_not_acceptable() {
        let ty = TypeDesc::list(TypeDesc::I32);
        let writer = resolver_for(
            &method(),
            Some(&ty),
            &Serializers::defaults(),
            &RestlightOptions::default(),
        )
        .unwrap();
        let req = AsyncRequest::builder(HttpMethod::GET, "/")
            .accept("text/html")
            .build();
        let err = writer
            .write(Value::from(vec![1i32]), &req, &mut AsyncResponse::new())
            .unwrap_err();
        assert_eq!(err.status_code(), 406);
    }
}
