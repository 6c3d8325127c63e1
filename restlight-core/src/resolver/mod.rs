//! Argument resolvers and the factories that build them.
//!
//! Every handler parameter is matched against the registered factories once, at
//! deploy time. The first factory (by ascending [`ArgumentResolverFactory::order`])
//! that supports the parameter builds an [`ArgumentResolver`] bound to it; a
//! parameter no factory supports receives `Value::Null`.

pub mod bean;
mod body;
mod cookie;
mod fixed_body;
mod header;
mod matrix;
mod path;
mod query;

pub use bean::{BeanFlavor, BeanMetaCache, BeanResolverFactory, BeanType, FieldAndSetter, TypeMeta};
pub use body::RequestBodyResolverFactory;
pub use cookie::CookieValueResolverFactory;
pub use fixed_body::FixedRequestSerializerResolverFactory;
pub use header::RequestHeaderResolverFactory;
pub use matrix::MatrixVariableResolverFactory;
pub use path::PathVariableResolverFactory;
pub use query::{QueryParamSource, RequestParamResolverFactory};

use crate::config::RestlightOptions;
use crate::convert::StringConverter;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::param::Param;
use crate::serialize::Serializers;
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Resolution order of the built-in factories, lower runs first.
pub mod order {
    pub const PATH_VARIABLE: i32 = -100;
    pub const MATRIX_VARIABLE: i32 = -90;
    pub const REQUEST_PARAM: i32 = -80;
    pub const REQUEST_HEADER: i32 = -70;
    pub const COOKIE_VALUE: i32 = -60;
    pub const FIXED_REQUEST_SERIALIZER: i32 = -50;
    pub const REQUEST_BODY: i32 = -40;
    pub const BEAN: i32 = -30;
    /// Custom factories registered without an explicit order.
    pub const DEFAULT: i32 = 0;
    /// Unannotated simple parameters bound from the query string.
    pub const UNANNOTATED_PARAM: i32 = 1000;
}

/// Extracts one argument from a request.
pub trait ArgumentResolver: Send + Sync {
    fn resolve(&self, request: &AsyncRequest, response: &mut AsyncResponse) -> Result<Value>;
}

impl<F> ArgumentResolver for F
where
    F: Fn(&AsyncRequest, &mut AsyncResponse) -> Result<Value> + Send + Sync,
{
    fn resolve(&self, request: &AsyncRequest, response: &mut AsyncResponse) -> Result<Value> {
        self(request, response)
    }
}

/// Everything a factory may consult while building a resolver.
#[derive(Clone, Copy)]
pub struct ResolverContext<'a> {
    pub serializers: &'a Serializers,
    pub options: &'a RestlightOptions,
    pub registry: &'a ResolverRegistry,
    pub bean_cache: &'a BeanMetaCache,
    /// Path variables declared by the route pattern, when known.
    pub path_variables: Option<&'a [String]>,
}

/// Builds resolvers for the parameters it supports.
pub trait ArgumentResolverFactory: Send + Sync {
    fn supports(&self, param: &Param) -> bool;

    fn create_resolver(
        &self,
        param: &Param,
        ctx: &ResolverContext<'_>,
    ) -> Result<Arc<dyn ArgumentResolver>>;

    fn order(&self) -> i32 {
        order::DEFAULT
    }
}

type Predicate = Box<dyn Fn(&Param) -> bool + Send + Sync>;
type Builder =
    Box<dyn Fn(&Param, &ResolverContext<'_>) -> Result<Arc<dyn ArgumentResolver>> + Send + Sync>;

/// A factory made of a predicate and a builder closure.
pub struct FnResolverFactory {
    order: i32,
    predicate: Predicate,
    builder: Builder,
}

impl FnResolverFactory {
    pub fn new<P, B>(order: i32, predicate: P, builder: B) -> Self
    where
        P: Fn(&Param) -> bool + Send + Sync + 'static,
        B: Fn(&Param, &ResolverContext<'_>) -> Result<Arc<dyn ArgumentResolver>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            order,
            predicate: Box::new(predicate),
            builder: Box::new(builder),
        }
    }
}

impl ArgumentResolverFactory for FnResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        (self.predicate)(param)
    }

    fn create_resolver(
        &self,
        param: &Param,
        ctx: &ResolverContext<'_>,
    ) -> Result<Arc<dyn ArgumentResolver>> {
        (self.builder)(param, ctx)
    }

    fn order(&self) -> i32 {
        self.order
    }
}

/// Ordered set of resolver factories.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    factories: Vec<Arc<dyn ArgumentResolverFactory>>,
}

impl ResolverRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// All built-in factories.
    pub fn defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register(PathVariableResolverFactory)
            .register(MatrixVariableResolverFactory)
            .register(RequestParamResolverFactory::annotated())
            .register(RequestHeaderResolverFactory)
            .register(CookieValueResolverFactory)
            .register(FixedRequestSerializerResolverFactory)
            .register(RequestBodyResolverFactory)
            .register(BeanResolverFactory)
            .register(RequestParamResolverFactory::unannotated());
        registry
    }

    /// Add a factory; registration order breaks ties between equal orders.
    pub fn register<F: ArgumentResolverFactory + 'static>(&mut self, factory: F) -> &mut Self {
        self.register_arc(Arc::new(factory))
    }

    pub fn register_arc(&mut self, factory: Arc<dyn ArgumentResolverFactory>) -> &mut Self {
        self.factories.push(factory);
        self.factories.sort_by_key(|f| f.order());
        self
    }

    /// Register a `(predicate, builder)` pair.
    pub fn register_fn<P, B>(&mut self, order: i32, predicate: P, builder: B) -> &mut Self
    where
        P: Fn(&Param) -> bool + Send + Sync + 'static,
        B: Fn(&Param, &ResolverContext<'_>) -> Result<Arc<dyn ArgumentResolver>>
            + Send
            + Sync
            + 'static,
    {
        self.register(FnResolverFactory::new(order, predicate, builder))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build the resolver for `param`, `None` when no factory supports it.
    pub fn resolver_for(
        &self,
        param: &Param,
        ctx: &ResolverContext<'_>,
    ) -> Result<Option<Arc<dyn ArgumentResolver>>> {
        match self.factories.iter().find(|f| f.supports(param)) {
            Some(factory) => factory.create_resolver(param, ctx).map(Some),
            None => {
                tracing::debug!(param = %param.describe(), "no argument resolver, passing null");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("factories", &self.factories.len())
            .finish()
    }
}

/// Builds a string-keyed map out of `(name, raw values)` pairs.
///
/// Single-value maps keep the first converted value per name, multi-value maps
/// (`Map(List(_))`) keep every value.
#[derive(Debug, Clone)]
pub(crate) struct MapConverter {
    multi: bool,
    converter: StringConverter,
}

impl MapConverter {
    pub(crate) fn new(ty: &TypeDesc, param: &Param) -> Result<Self> {
        let value_ty = ty.map_value().ok_or_else(|| {
            Error::config(format!("{} is not a map on {}", ty, param.describe()))
        })?;
        let converter = StringConverter::new(value_ty).map_err(|e| {
            Error::config(format!("unsupported map value type on {}: {}", param.describe(), e))
        })?;
        Ok(Self {
            multi: ty.is_multi_value_map(),
            converter,
        })
    }

    pub(crate) fn build<'a, I>(&self, entries: I) -> Result<Value>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let mut map = BTreeMap::new();
        for (name, values) in entries {
            if map.contains_key(name) && !self.multi {
                continue;
            }
            let value = if self.multi {
                self.converter.convert_all(values)?
            } else {
                match values.first() {
                    Some(first) => self.converter.convert(first)?,
                    None => continue,
                }
            };
            map.insert(name.to_string(), value);
        }
        Ok(Value::Map(map))
    }
}
