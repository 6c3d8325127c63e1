// Path variables

use super::{ArgumentResolver, ArgumentResolverFactory, MapConverter, ResolverContext, order};
use crate::convert::StringConverter;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::name_value::{NameAndValue, NameValueSource, NamedValueResolver, RawValue};
use crate::param::Param;
use crate::value::Value;
use crate::{Error, Result};
use std::sync::Arc;

struct PathVariableSource;

impl NameValueSource for PathVariableSource {
    fn kind(&self) -> &'static str {
        "path variable"
    }

    fn resolve_name(&self, name: &str, request: &AsyncRequest) -> Result<Option<RawValue>> {
        Ok(request
            .path_variable(name)
            .map(|v| RawValue::Single(v.to_string())))
    }
}

/// Binds `PathVariable` parameters; an unnamed map receives every variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathVariableResolverFactory;

impl ArgumentResolverFactory for PathVariableResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        param.annotations.path_variable().is_some()
    }

    fn create_resolver(
        &self,
        param: &Param,
        ctx: &ResolverContext<'_>,
    ) -> Result<Arc<dyn ArgumentResolver>> {
        let Some(named) = param.annotations.path_variable() else {
            return Err(Error::config(format!("{} is not a path variable", param.describe())));
        };

        if param.ty.is_map() && named.name.is_empty() {
            let maps = MapConverter::new(&param.ty, param)?;
            return Ok(Arc::new(
                move |request: &AsyncRequest, _: &mut AsyncResponse| -> Result<Value> {
                    let entries: Vec<(&str, [String; 1])> = request
                        .path_variables()
                        .iter()
                        .map(|(k, v)| (k.as_str(), [v.clone()]))
                        .collect();
                    maps.build(entries.iter().map(|(k, v)| (*k, v.as_slice())))
                },
            ));
        }

        let converter = StringConverter::new(&param.ty).map_err(|e| {
            Error::config(format!(
                "cannot bind {} from a path variable: {}",
                param.describe(),
                e
            ))
        })?;
        let nv = NameAndValue::from_annotation(named, param, Some(&converter))?;
        if let Some(declared) = ctx.path_variables {
            if !declared.iter().any(|v| *v == nv.name) {
                tracing::warn!(
                    param = %param.describe(),
                    name = %nv.name,
                    "path variable is not declared by the route pattern"
                );
            }
        }
        Ok(Arc::new(NamedValueResolver::new(
            PathVariableSource,
            nv,
            Some(converter),
        )))
    }

    fn order(&self) -> i32 {
        order::PATH_VARIABLE
    }
}
