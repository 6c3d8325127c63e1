//! Aggregate ("bean") arguments bound field by field.
//!
//! A bean type registers a zero-argument constructor and a table of fields with
//! their setters. At deploy time every field is matched against the resolver
//! registry (request beans) or bound to a query parameter (query beans); the
//! result is cached per type and flavour in the deployment's [`BeanMetaCache`].
//!
//! ```
//! use restlight_core::resolver::BeanType;
//! use restlight_core::types::TypeDesc;
//!
//! #[derive(Default)]
//! struct Page {
//!     number: u32,
//!     size: u32,
//! }
//!
//! let bean = BeanType::builder::<Page>()
//!     .field("number", TypeDesc::U32, |p: &mut Page, v: u32| p.number = v)
//!     .field("size", TypeDesc::U32, |p: &mut Page, v: u32| p.size = v)
//!     .build();
//! assert_eq!(bean.fields().len(), 2);
//! ```

use super::query::RequestParamResolverFactory;
use super::{ArgumentResolver, ArgumentResolverFactory, ResolverContext, order};
use crate::convert::StringConverter;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::param::{Annotation, Annotations, NamedValue, Param};
use crate::types::TypeDesc;
use crate::value::{AnyObject, FromValue, Value};
use crate::{Error, Result};
use dashmap::DashMap;
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type Allocator = fn() -> Box<dyn Any + Send + Sync>;
type Setter = Arc<dyn Fn(&mut (dyn Any + Send + Sync), Value) -> Result<()> + Send + Sync>;

/// One declared field of a bean type.
#[derive(Clone)]
pub struct BeanField {
    name: String,
    ty: TypeDesc,
    annotations: Annotations,
    direct: Option<Setter>,
    setter: Option<Setter>,
}

impl BeanField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeDesc {
        &self.ty
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// The setter method if one is registered, else direct field access.
    fn access(&self) -> Option<&Setter> {
        self.setter.as_ref().or(self.direct.as_ref())
    }
}

impl fmt::Debug for BeanField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanField")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

/// Construction and field table of a bindable type.
#[derive(Clone)]
pub struct BeanType {
    type_id: TypeId,
    name: &'static str,
    allocator: Option<Allocator>,
    fields: Vec<BeanField>,
}

fn allocate<T: Default + Any + Send + Sync>() -> Box<dyn Any + Send + Sync> {
    Box::new(T::default())
}

fn wrap<T, V, F>(set: F) -> Setter
where
    T: Any,
    V: FromValue,
    F: Fn(&mut T, V) + Send + Sync + 'static,
{
    Arc::new(move |target: &mut (dyn Any + Send + Sync), value: Value| {
        let target = target.downcast_mut::<T>().ok_or(Error::TypeMismatch {
            expected: type_name::<T>(),
            found: "bean instance",
        })?;
        set(target, V::from_value(value)?);
        Ok(())
    })
}

impl BeanType {
    /// A type constructed through `Default`.
    pub fn builder<T: Default + Any + Send + Sync>() -> BeanTypeBuilder<T> {
        BeanTypeBuilder::new(Some(allocate::<T>))
    }

    /// A type with no zero-argument constructor; binding it fails deployment.
    pub fn without_constructor<T: Any + Send + Sync>() -> BeanTypeBuilder<T> {
        BeanTypeBuilder::new(None)
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[BeanField] {
        &self.fields
    }

    pub fn has_constructor(&self) -> bool {
        self.allocator.is_some()
    }
}

impl fmt::Debug for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanType")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Builder for [`BeanType`].
pub struct BeanTypeBuilder<T> {
    allocator: Option<Allocator>,
    fields: Vec<BeanField>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> BeanTypeBuilder<T> {
    fn new(allocator: Option<Allocator>) -> Self {
        Self {
            allocator,
            fields: Vec::new(),
            _marker: PhantomData,
        }
    }

    fn field_mut(&mut self, name: &str, ty: TypeDesc) -> &mut BeanField {
        let pos = match self.fields.iter().position(|f| f.name == name) {
            Some(pos) => pos,
            None => {
                self.fields.push(BeanField {
                    name: name.to_string(),
                    ty,
                    annotations: Annotations::new(),
                    direct: None,
                    setter: None,
                });
                self.fields.len() - 1
            }
        };
        &mut self.fields[pos]
    }

    /// Declare a field written directly.
    pub fn field<V, F>(mut self, name: &str, ty: TypeDesc, set: F) -> Self
    where
        V: FromValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.field_mut(name, ty).direct = Some(wrap::<T, V, F>(set));
        self
    }

    /// Declare a setter method; it takes precedence over direct access.
    pub fn setter<V, F>(mut self, name: &str, ty: TypeDesc, set: F) -> Self
    where
        V: FromValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.field_mut(name, ty).setter = Some(wrap::<T, V, F>(set));
        self
    }

    /// Annotate a declared field.
    pub fn annotate(mut self, name: &str, annotation: Annotation) -> Self {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
            field.annotations.push(annotation);
        }
        self
    }

    pub fn build(self) -> BeanType {
        BeanType {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            allocator: self.allocator,
            fields: self.fields,
        }
    }
}

/// Which default resolver bean fields get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeanFlavor {
    /// Each field through the resolver registry.
    Request,
    /// Each field from a query parameter.
    Query,
}

/// A field with its setter and bound resolver.
pub struct FieldAndSetter {
    pub name: String,
    setter: Setter,
    resolver: Arc<dyn ArgumentResolver>,
}

/// Deploy-time metadata of one bean type and flavour.
pub struct TypeMeta {
    type_name: &'static str,
    allocator: Allocator,
    fields: Vec<FieldAndSetter>,
}

impl TypeMeta {
    fn build(bean: &BeanType, flavor: BeanFlavor, ctx: &ResolverContext<'_>) -> Result<Self> {
        let allocator = bean.allocator.ok_or_else(|| {
            Error::config(format!(
                "{} has no zero-argument constructor and cannot be bound",
                bean.name
            ))
        })?;

        let mut fields = Vec::with_capacity(bean.fields.len());
        for (index, field) in bean.fields.iter().enumerate() {
            let Some(setter) = field.access() else {
                continue;
            };
            let param = Param::field(
                bean.name,
                index,
                field.name.clone(),
                field.ty.clone(),
                field.annotations.clone(),
            );
            let resolver = match flavor {
                BeanFlavor::Request => ctx.registry.resolver_for(&param, ctx)?,
                BeanFlavor::Query => query_field_resolver(&param, field)?,
            };
            match resolver {
                Some(resolver) => fields.push(FieldAndSetter {
                    name: field.name.clone(),
                    setter: setter.clone(),
                    resolver,
                }),
                None => {
                    tracing::debug!(bean = bean.name, field = %field.name, "field skipped, no resolver");
                }
            }
        }

        Ok(Self {
            type_name: bean.name,
            allocator,
            fields,
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldAndSetter] {
        &self.fields
    }

    /// Allocate an instance and fill every field that resolves to a value.
    pub fn instantiate(&self, request: &AsyncRequest, response: &mut AsyncResponse) -> Result<Value> {
        let mut instance = (self.allocator)();
        for field in &self.fields {
            let value = field.resolver.resolve(request, response)?;
            if value.is_null() {
                continue;
            }
            (field.setter)(instance.as_mut(), value)?;
        }
        Ok(Value::Object(AnyObject::from_boxed(instance, self.type_name)))
    }
}

fn query_field_resolver(param: &Param, field: &BeanField) -> Result<Option<Arc<dyn ArgumentResolver>>> {
    if !StringConverter::supports(&param.ty) {
        return Ok(None);
    }
    let name = field.annotations.query_name().unwrap_or(&field.name);
    let named = NamedValue::new(name).optional();
    RequestParamResolverFactory::named_resolver(&named, param).map(Some)
}

/// Bean metadata shared by every route of a deployment.
///
/// Built on first use per `(type, flavour)`; when two routes race, the first
/// inserted entry wins and both use it.
#[derive(Default)]
pub struct BeanMetaCache {
    entries: DashMap<(TypeId, BeanFlavor), Arc<TypeMeta>>,
}

impl BeanMetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_id: TypeId, flavor: BeanFlavor) -> Option<Arc<TypeMeta>> {
        self.entries.get(&(type_id, flavor)).map(|e| e.value().clone())
    }

    /// Cached metadata, building it with `build` when missing.
    pub fn get_or_try_insert(
        &self,
        type_id: TypeId,
        flavor: BeanFlavor,
        build: impl FnOnce() -> Result<TypeMeta>,
    ) -> Result<Arc<TypeMeta>> {
        if let Some(existing) = self.get(type_id, flavor) {
            return Ok(existing);
        }
        // built outside the shard lock: field resolvers may recurse into the cache
        let meta = Arc::new(build()?);
        Ok(self
            .entries
            .entry((type_id, flavor))
            .or_insert(meta)
            .value()
            .clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for BeanMetaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanMetaCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

struct BeanResolver {
    meta: Arc<TypeMeta>,
}

impl ArgumentResolver for BeanResolver {
    fn resolve(&self, request: &AsyncRequest, response: &mut AsyncResponse) -> Result<Value> {
        self.meta.instantiate(request, response)
    }
}

/// Binds `RequestBean` and `QueryBean` parameters of registered bean types.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeanResolverFactory;

impl ArgumentResolverFactory for BeanResolverFactory {
    fn supports(&self, param: &Param) -> bool {
        param.annotations.has_request_bean() || param.annotations.has_query_bean()
    }

    fn create_resolver(
        &self,
        param: &Param,
        ctx: &ResolverContext<'_>,
    ) -> Result<Arc<dyn ArgumentResolver>> {
        let flavor = if param.annotations.has_query_bean() {
            BeanFlavor::Query
        } else {
            BeanFlavor::Request
        };
        let bean = param
            .ty
            .object()
            .and_then(|o| o.bean())
            .ok_or_else(|| {
                Error::config(format!(
                    "{} of type {} is not a registered bean type",
                    param.describe(),
                    param.ty
                ))
            })?;

        let meta = ctx
            .bean_cache
            .get_or_try_insert(bean.type_id(), flavor, || TypeMeta::build(bean, flavor, ctx))?;
        tracing::debug!(
            param = %param.describe(),
            bean = bean.name(),
            ?flavor,
            fields = meta.fields().len(),
            "bean resolver"
        );
        Ok(Arc::new(BeanResolver { meta }))
    }

    fn order(&self) -> i32 {
        order::BEAN
    }
}
