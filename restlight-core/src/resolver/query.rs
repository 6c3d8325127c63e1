// Query string parameters

use super::{ArgumentResolver, ArgumentResolverFactory, MapConverter, ResolverContext, order};
use crate::convert::StringConverter;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::name_value::{NameAndValue, NameValueSource, NamedValueResolver, RawValue};
use crate::param::{NamedValue, Param};
use crate::value::Value;
use crate::{Error, Result};
use std::sync::Arc;

/// Looks values up in the query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParamSource;

impl NameValueSource for QueryParamSource {
    fn kind(&self) -> &'static str {
        "request parameter"
    }

    fn resolve_name(&self, name: &str, request: &AsyncRequest) -> Result<Option<RawValue>> {
        Ok(request.params(name).map(|values| RawValue::Multi(values.to_vec())))
    }
}

/// Binds `RequestParam` parameters, or unannotated simple parameters.
///
/// An unnamed `Map(T)` receives every parameter's first value, an unnamed
/// `Map(List(T))` every value. A named map is rejected at deploy time.
#[derive(Debug, Clone, Copy)]
pub struct RequestParamResolverFactory {
    unannotated: bool,
}

impl RequestParamResolverFactory {
    pub fn annotated() -> Self {
        Self { unannotated: false }
    }

    /// Fallback for parameters without annotations, bound as optional query parameters.
    pub fn unannotated() -> Self {
        Self { unannotated: true }
    }

    /// Resolver for one named query parameter.
    pub(crate) fn named_resolver(
        named: &NamedValue,
        param: &Param,
    ) -> Result<Arc<dyn ArgumentResolver>> {
        let converter = StringConverter::new(&param.ty).map_err(|e| {
            Error::config(format!("cannot bind {} from the query string: {}", param.describe(), e))
        })?;
        let nv = NameAndValue::from_annotation(named, param, Some(&converter))?;
        Ok(Arc::new(NamedValueResolver::new(
            QueryParamSource,
            nv,
            Some(converter),
        )))
    }
}

impl ArgumentResolverFactory for RequestParamResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        if self.unannotated {
            param.annotations.is_empty() && StringConverter::supports(&param.ty)
        } else {
            param.annotations.request_param().is_some()
        }
    }

    fn create_resolver(
        &self,
        param: &Param,
        _ctx: &ResolverContext<'_>,
    ) -> Result<Arc<dyn ArgumentResolver>> {
        let named = match param.annotations.request_param() {
            Some(named) => named.clone(),
            None => NamedValue::unnamed().optional(),
        };

        if param.ty.is_map() {
            if !named.name.is_empty() {
                return Err(Error::config(format!(
                    "request parameter map {} must not be named '{}'",
                    param.describe(),
                    named.name
                )));
            }
            let maps = MapConverter::new(&param.ty, param)?;
            return Ok(Arc::new(
                move |request: &AsyncRequest, _: &mut AsyncResponse| -> Result<Value> {
                    maps.build(
                        request
                            .param_map()
                            .iter()
                            .map(|(k, v)| (k.as_str(), v.as_slice())),
                    )
                },
            ));
        }

        Self::named_resolver(&named, param)
    }

    fn order(&self) -> i32 {
        if self.unannotated {
            order::UNANNOTATED_PARAM
        } else {
            order::REQUEST_PARAM
        }
    }
}
