// Request headers

use super::{ArgumentResolver, ArgumentResolverFactory, MapConverter, ResolverContext, order};
use crate::convert::StringConverter;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::name_value::{NameAndValue, NameValueSource, NamedValueResolver, RawValue};
use crate::param::Param;
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, Result};
use std::sync::Arc;

struct HeaderSource;

impl NameValueSource for HeaderSource {
    fn kind(&self) -> &'static str {
        "header"
    }

    fn resolve_name(&self, name: &str, request: &AsyncRequest) -> Result<Option<RawValue>> {
        let values = request.headers().get_all(name);
        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(RawValue::Multi(
            values.into_iter().map(str::to_string).collect(),
        )))
    }
}

/// Binds `RequestHeader` parameters.
///
/// Scalars take the first value, collections every value. `HeaderMap` and
/// unnamed maps receive all headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestHeaderResolverFactory;

impl ArgumentResolverFactory for RequestHeaderResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        param.annotations.request_header().is_some()
    }

    fn create_resolver(
        &self,
        param: &Param,
        _ctx: &ResolverContext<'_>,
    ) -> Result<Arc<dyn ArgumentResolver>> {
        let Some(named) = param.annotations.request_header() else {
            return Err(Error::config(format!("{} is not a header", param.describe())));
        };

        match param.ty.unwrap_optional() {
            TypeDesc::Headers => {
                return Ok(Arc::new(
                    |request: &AsyncRequest, _: &mut AsyncResponse| -> Result<Value> {
                        Ok(Value::Headers(request.headers().clone()))
                    },
                ));
            }
            ty if ty.is_map() && named.name.is_empty() => {
                let maps = MapConverter::new(ty, param)?;
                return Ok(Arc::new(
                    move |request: &AsyncRequest, _: &mut AsyncResponse| -> Result<Value> {
                        let headers = request.headers();
                        let entries: Vec<(&str, Vec<String>)> = headers
                            .names()
                            .into_iter()
                            .map(|name| {
                                let values = headers
                                    .get_all(name)
                                    .into_iter()
                                    .map(str::to_string)
                                    .collect();
                                (name, values)
                            })
                            .collect();
                        maps.build(entries.iter().map(|(k, v)| (*k, v.as_slice())))
                    },
                ));
            }
            _ => {}
        }

        let converter = StringConverter::new(&param.ty).map_err(|e| {
            Error::config(format!("cannot bind {} from a header: {}", param.describe(), e))
        })?;
        let nv = NameAndValue::from_annotation(named, param, Some(&converter))?;
        Ok(Arc::new(NamedValueResolver::new(
            HeaderSource,
            nv,
            Some(converter),
        )))
    }

    fn order(&self) -> i32 {
        order::REQUEST_HEADER
    }
}
