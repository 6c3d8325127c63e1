// Cookies

use super::{ArgumentResolver, ArgumentResolverFactory, ResolverContext, order};
use crate::convert::StringConverter;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::name_value::{NameAndValue, NameValueSource, NamedValueResolver, RawValue};
use crate::param::Param;
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, Result};
use std::sync::Arc;

/// One cookie's value as a string.
struct CookieValueSource;

impl NameValueSource for CookieValueSource {
    fn kind(&self) -> &'static str {
        "cookie"
    }

    fn resolve_name(&self, name: &str, request: &AsyncRequest) -> Result<Option<RawValue>> {
        Ok(request
            .cookie(name)
            .map(|c| RawValue::Single(c.value().to_string())))
    }
}

/// One cookie as an object.
struct CookieObjectSource;

impl NameValueSource for CookieObjectSource {
    fn kind(&self) -> &'static str {
        "cookie"
    }

    fn resolve_name(&self, name: &str, request: &AsyncRequest) -> Result<Option<RawValue>> {
        Ok(request
            .cookie(name)
            .map(|c| RawValue::Value(Value::Cookie(c.clone()))))
    }
}

/// Binds `CookieValue` parameters.
///
/// The variant is picked from the declared type: a scalar receives the value of
/// one cookie, `Cookie` the cookie itself, `Set(Cookie)`/`List(Cookie)` every
/// cookie of the request (the name is not used).
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieValueResolverFactory;

impl ArgumentResolverFactory for CookieValueResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        param.annotations.cookie_value().is_some()
    }

    fn create_resolver(
        &self,
        param: &Param,
        _ctx: &ResolverContext<'_>,
    ) -> Result<Arc<dyn ArgumentResolver>> {
        let Some(named) = param.annotations.cookie_value() else {
            return Err(Error::config(format!("{} is not a cookie", param.describe())));
        };

        match param.ty.unwrap_optional() {
            TypeDesc::Set(e) if **e == TypeDesc::Cookie => Ok(Arc::new(
                |request: &AsyncRequest, _: &mut AsyncResponse| -> Result<Value> {
                    Ok(Value::set(request.cookies().iter().cloned().map(Value::Cookie)))
                },
            )),
            TypeDesc::List(e) | TypeDesc::Array(e) if **e == TypeDesc::Cookie => Ok(Arc::new(
                |request: &AsyncRequest, _: &mut AsyncResponse| -> Result<Value> {
                    Ok(Value::List(
                        request.cookies().iter().cloned().map(Value::Cookie).collect(),
                    ))
                },
            )),
            TypeDesc::Cookie => {
                let nv = NameAndValue::from_annotation(named, param, None)?;
                Ok(Arc::new(NamedValueResolver::new(CookieObjectSource, nv, None)))
            }
            _ => {
                let converter = StringConverter::new(&param.ty).map_err(|e| {
                    Error::config(format!("cannot bind {} from a cookie: {}", param.describe(), e))
                })?;
                let nv = NameAndValue::from_annotation(named, param, Some(&converter))?;
                Ok(Arc::new(NamedValueResolver::new(
                    CookieValueSource,
                    nv,
                    Some(converter),
                )))
            }
        }
    }

    fn order(&self) -> i32 {
        order::COOKIE_VALUE
    }
}
