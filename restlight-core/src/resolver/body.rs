// Request bodies read through the serializer registry

use super::{ArgumentResolver, ArgumentResolverFactory, ResolverContext, order};
use crate::convert::StringConverter;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::param::Param;
use crate::serialize::{RequestEntity, Serializers, read_with};
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, MediaType, Result};
use std::sync::Arc;

/// Whether the body should go through the string converter.
pub(super) fn is_text(content_type: Option<&MediaType>) -> bool {
    content_type.is_none_or(|mt| mt.same_mime(&MediaType::text_plain()))
}

/// Decode a UTF-8 body with the string converter. An empty body is `Null`.
pub(super) fn read_text(
    request: &AsyncRequest,
    converter: &StringConverter,
    param: &str,
) -> Result<Value> {
    if request.body().is_empty() {
        return Ok(Value::Null);
    }
    let text = std::str::from_utf8(request.body())
        .map_err(|e| Error::BadRequest(format!("request body of '{}' is not UTF-8: {}", param, e)))?;
    converter.convert(text)
}

/// Fail on a missing body when it is required.
pub(super) fn check_required(value: Value, required: bool, param: &str) -> Result<Value> {
    if value.is_null() && required {
        return Err(Error::MissingRequiredValue {
            source_kind: "request body",
            name: param.to_string(),
        });
    }
    Ok(value)
}

struct RequestBodyResolver {
    name: String,
    ty: TypeDesc,
    required: bool,
    converter: Option<StringConverter>,
    serializers: Serializers,
    /// Request parameter overriding `Content-Type`, e.g. `format=protobuf`.
    negotiation_param: Option<String>,
}

impl RequestBodyResolver {
    fn media_type(&self, request: &AsyncRequest) -> Option<MediaType> {
        let negotiated = self
            .negotiation_param
            .as_deref()
            .and_then(|p| request.param(p))
            .and_then(MediaType::from_format);
        negotiated.or_else(|| request.content_type())
    }
}

impl ArgumentResolver for RequestBodyResolver {
    fn resolve(&self, request: &AsyncRequest, _response: &mut AsyncResponse) -> Result<Value> {
        let media_type = self.media_type(request);

        let value = match (&self.converter, is_text(media_type.as_ref())) {
            (Some(converter), true) => read_text(request, converter, &self.name)?,
            _ if request.body().is_empty() => Value::Null,
            _ => {
                let media_type = media_type.unwrap_or_else(MediaType::text_plain);
                let serializer = self
                    .serializers
                    .find_reader(&media_type, &self.ty)
                    .ok_or_else(|| {
                        Error::UnsupportedMediaType(format!(
                            "content type '{}' not supported for '{}'",
                            media_type, self.name
                        ))
                    })?;
                let entity = RequestEntity::new(request, media_type, &self.ty);
                read_with(serializer.as_ref(), &entity)?
            }
        };

        check_required(value, self.required, &self.name)
    }
}

/// Binds `RequestBody` parameters.
///
/// `text/plain` or a missing content type goes through the string converter;
/// anything else through the first serializer that reads it, or 415. With
/// negotiation enabled a `format` request parameter picks the media type.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBodyResolverFactory;

impl ArgumentResolverFactory for RequestBodyResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        param.annotations.request_body().is_some()
    }

    fn create_resolver(
        &self,
        param: &Param,
        ctx: &ResolverContext<'_>,
    ) -> Result<Arc<dyn ArgumentResolver>> {
        let required = param.annotations.request_body().unwrap_or(true) && !param.ty.is_optional();
        let negotiation = &ctx.options.serialize;
        tracing::debug!(
            param = %param.describe(),
            negotiation = negotiation.negotiation,
            "request body resolver"
        );
        Ok(Arc::new(RequestBodyResolver {
            name: param.name.clone(),
            ty: param.ty.clone(),
            required,
            converter: StringConverter::new(&param.ty).ok(),
            serializers: ctx.serializers.clone(),
            negotiation_param: negotiation
                .negotiation
                .then(|| negotiation.negotiation_param.clone()),
        }))
    }

    fn order(&self) -> i32 {
        order::REQUEST_BODY
    }
}
