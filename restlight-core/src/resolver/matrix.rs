// Matrix variables (`/cars;color=red;year=2012`)

use super::{ArgumentResolver, ArgumentResolverFactory, MapConverter, ResolverContext, order};
use crate::convert::StringConverter;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::name_value::{NameAndValue, NameValueSource, NamedValueResolver, RawValue};
use crate::param::Param;
use crate::value::Value;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Looks a key up in one pinned segment, or in every segment.
struct MatrixSource {
    path_var: Option<String>,
}

impl NameValueSource for MatrixSource {
    fn kind(&self) -> &'static str {
        "matrix variable"
    }

    fn resolve_name(&self, name: &str, request: &AsyncRequest) -> Result<Option<RawValue>> {
        let vars = request.matrix_variables();
        if let Some(path_var) = &self.path_var {
            return Ok(vars
                .segment(path_var)
                .and_then(|segment| segment.get(name))
                .map(|values| RawValue::Multi(values.clone())));
        }

        let mut found: Vec<(&str, &Vec<String>)> = vars
            .segments()
            .filter_map(|(segment, keys)| keys.get(name).map(|values| (segment, values)))
            .collect();
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop().map(|(_, values)| RawValue::Multi(values.clone()))),
            _ => Err(Error::AmbiguousMatrixVariable {
                name: name.to_string(),
                segments: found.iter().map(|(s, _)| s.to_string()).collect(),
            }),
        }
    }
}

/// Binds `MatrixVariable` parameters.
///
/// Three independent choices are made at deploy time: map or named key, pinned
/// `path_var` or every segment, and for maps single or multi value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixVariableResolverFactory;

impl ArgumentResolverFactory for MatrixVariableResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        param.annotations.matrix_variable().is_some()
    }

    fn create_resolver(
        &self,
        param: &Param,
        ctx: &ResolverContext<'_>,
    ) -> Result<Arc<dyn ArgumentResolver>> {
        let Some((named, path_var)) = param.annotations.matrix_variable() else {
            return Err(Error::config(format!(
                "{} is not a matrix variable",
                param.describe()
            )));
        };
        let path_var = path_var.filter(|p| !p.is_empty()).map(str::to_string);

        if let (Some(pinned), Some(declared)) = (&path_var, ctx.path_variables) {
            if !declared.iter().any(|v| v == pinned) {
                return Err(Error::config(format!(
                    "matrix variable {} refers to path variable '{}' which the route does not declare",
                    param.describe(),
                    pinned
                )));
            }
        }

        if param.ty.is_map() && named.name.is_empty() {
            let maps = MapConverter::new(&param.ty, param)?;
            return Ok(Arc::new(
                move |request: &AsyncRequest, _: &mut AsyncResponse| -> Result<Value> {
                    let vars = request.matrix_variables();
                    let mut merged: BTreeMap<&str, Vec<String>> = BTreeMap::new();
                    for (segment, keys) in vars.segments() {
                        if path_var.as_deref().is_some_and(|p| p != segment) {
                            continue;
                        }
                        for (key, values) in keys {
                            merged.entry(key.as_str()).or_default().extend(values.iter().cloned());
                        }
                    }
                    maps.build(merged.iter().map(|(k, v)| (*k, v.as_slice())))
                },
            ));
        }

        let converter = StringConverter::new(&param.ty).map_err(|e| {
            Error::config(format!(
                "cannot bind {} from a matrix variable: {}",
                param.describe(),
                e
            ))
        })?;
        let mut nv = NameAndValue::from_annotation(named, param, Some(&converter))?;
        // a key missing from every segment binds Null rather than failing
        nv.required = false;
        Ok(Arc::new(NamedValueResolver::new(
            MatrixSource { path_var },
            nv,
            Some(converter),
        )))
    }

    fn order(&self) -> i32 {
        order::MATRIX_VARIABLE
    }
}
