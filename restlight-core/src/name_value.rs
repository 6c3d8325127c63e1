// Named request values: query params, headers, cookies, path and matrix variables

use crate::convert::StringConverter;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::param::{NamedValue, Param};
use crate::resolver::ArgumentResolver;
use crate::value::Value;
use crate::{Error, Result};

/// The `{name, required, default}` contract of one named-value resolver.
///
/// Built once per parameter at deploy time. A default literal is converted to
/// the parameter's type right away, so a bad literal fails deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct NameAndValue {
    pub name: String,
    pub required: bool,
    pub default_value: Option<Value>,
}

impl NameAndValue {
    pub fn new(name: impl Into<String>, required: bool, default_value: Option<Value>) -> Self {
        Self {
            name: name.into(),
            required,
            default_value,
        }
    }

    /// Build from an annotation; an empty name falls back to the parameter name.
    pub fn from_annotation(
        named: &NamedValue,
        param: &Param,
        converter: Option<&StringConverter>,
    ) -> Result<Self> {
        let name = if named.name.is_empty() {
            param.name.clone()
        } else {
            named.name.clone()
        };
        if name.is_empty() {
            return Err(Error::config(format!(
                "name for argument of type {} not specified on {}",
                param.ty,
                param.describe()
            )));
        }

        let default_value = match (&named.default_value, converter) {
            (None, _) => None,
            (Some(literal), Some(converter)) => {
                let value = converter.convert(literal).map_err(|e| {
                    Error::config(format!(
                        "invalid default value '{}' for {}: {}",
                        literal,
                        param.describe(),
                        e
                    ))
                })?;
                Some(value)
            }
            (Some(literal), None) => {
                return Err(Error::config(format!(
                    "default value '{}' cannot be converted to {} on {}",
                    literal,
                    param.ty,
                    param.describe()
                )));
            }
        };

        Ok(Self {
            name,
            // an optional type never fails on absence
            required: named.required && !param.ty.is_optional(),
            default_value,
        })
    }

    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
    }
}

/// A value as the request carries it, before conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Single(String),
    Multi(Vec<String>),
    /// Already typed by the source, e.g. a cookie object.
    Value(Value),
}

/// Where a named value is looked up.
pub trait NameValueSource: Send + Sync {
    /// Used in error messages: "header", "cookie", ...
    fn kind(&self) -> &'static str;

    fn resolve_name(&self, name: &str, request: &AsyncRequest) -> Result<Option<RawValue>>;
}

/// Generic resolver applying absent, default and conversion rules over a source.
pub struct NamedValueResolver<S> {
    source: S,
    nv: NameAndValue,
    converter: Option<StringConverter>,
}

impl<S: NameValueSource> NamedValueResolver<S> {
    pub fn new(source: S, nv: NameAndValue, converter: Option<StringConverter>) -> Self {
        Self {
            source,
            nv,
            converter,
        }
    }

    pub fn name_and_value(&self) -> &NameAndValue {
        &self.nv
    }

    fn absent(&self) -> Result<Value> {
        if let Some(default) = &self.nv.default_value {
            return Ok(default.clone());
        }
        if self.nv.required {
            return Err(Error::MissingRequiredValue {
                source_kind: self.source.kind(),
                name: self.nv.name.clone(),
            });
        }
        Ok(Value::Null)
    }

    fn convert(&self, raw: RawValue) -> Result<Value> {
        let converted = match (raw, &self.converter) {
            (RawValue::Value(value), _) => Ok(value),
            (RawValue::Single(s), Some(conv)) => conv.convert(&s),
            (RawValue::Multi(values), Some(conv)) => conv.convert_all(&values),
            (RawValue::Single(s), None) => Ok(Value::Str(s)),
            (RawValue::Multi(values), None) => Ok(Value::List(
                values.into_iter().map(Value::Str).collect(),
            )),
        };
        converted.map_err(|e| match e {
            Error::BadRequest(reason) => Error::BadRequest(format!(
                "invalid {} '{}': {}",
                self.source.kind(),
                self.nv.name,
                reason
            )),
            other => other,
        })
    }
}

fn is_blank(raw: &RawValue) -> bool {
    match raw {
        RawValue::Single(s) => s.is_empty(),
        RawValue::Multi(values) => values.iter().all(String::is_empty),
        RawValue::Value(v) => v.is_null(),
    }
}

impl<S: NameValueSource> ArgumentResolver for NamedValueResolver<S> {
    fn resolve(&self, request: &AsyncRequest, _response: &mut AsyncResponse) -> Result<Value> {
        let raw = match self.source.resolve_name(&self.nv.name, request)? {
            None => return self.absent(),
            Some(RawValue::Multi(values)) if values.is_empty() => return self.absent(),
            Some(raw) => raw,
        };

        // legacy rule: a blank value counts as absent when there is a default
        if self.nv.has_default() && is_blank(&raw) {
            return self.absent();
        }

        match self.convert(raw)? {
            Value::Null => self.absent(),
            value => Ok(value),
        }
    }
}
