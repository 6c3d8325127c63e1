// Request bodies read through one serializer fixed by annotation

use super::body::check_required;
use super::{ArgumentResolver, ArgumentResolverFactory, ResolverContext, order};
use crate::http::{AsyncRequest, AsyncResponse};
use crate::param::{Param, SerializerImpl};
use crate::serialize::{HttpRequestSerializer, RequestEntity, read_with};
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, MediaType, Result};
use std::sync::Arc;

struct FixedBodyResolver {
    name: String,
    ty: TypeDesc,
    required: bool,
    serializer: Arc<dyn SerializerImpl>,
}

impl ArgumentResolver for FixedBodyResolver {
    fn resolve(&self, request: &AsyncRequest, _response: &mut AsyncResponse) -> Result<Value> {
        let content_type = request.content_type();
        let value = if request.body().is_empty() {
            Value::Null
        } else {
            let entity = RequestEntity::new(
                request,
                content_type.unwrap_or_else(MediaType::any),
                &self.ty,
            );
            let serializer: &dyn HttpRequestSerializer = self.serializer.as_ref();
            read_with(serializer, &entity)?
        };
        check_required(value, self.required, &self.name)
    }
}

/// Binds `RequestBody` parameters whose parameter, method or class names a
/// `RequestSerializer`. That serializer is used whatever the content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRequestSerializerResolverFactory;

impl ArgumentResolverFactory for FixedRequestSerializerResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        param.annotations.request_body().is_some()
            && param
                .find_inherited(|a| a.request_serializer().cloned())
                .is_some()
    }

    fn create_resolver(
        &self,
        param: &Param,
        _ctx: &ResolverContext<'_>,
    ) -> Result<Arc<dyn ArgumentResolver>> {
        let class = param
            .find_inherited(|a| a.request_serializer().cloned())
            .ok_or_else(|| Error::config(format!("no request serializer on {}", param.describe())))?;
        let serializer = class.instantiate().ok_or_else(|| {
            Error::config(format!(
                "request serializer {} on {} cannot be instantiated",
                class.name,
                param.describe()
            ))
        })?;
        tracing::debug!(param = %param.describe(), serializer = class.name, "fixed request serializer");

        Ok(Arc::new(FixedBodyResolver {
            name: param.name.clone(),
            ty: param.ty.clone(),
            required: param.annotations.request_body().unwrap_or(true) && !param.ty.is_optional(),
            serializer,
        }))
    }

    fn order(&self) -> i32 {
        order::FIXED_REQUEST_SERIALIZER
    }
}
