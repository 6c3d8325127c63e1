// Parameter metadata built by route registration code

use crate::serialize::{HttpRequestSerializer, HttpResponseSerializer};
use crate::types::TypeDesc;
use std::fmt;
use std::sync::Arc;

/// Name, required flag and default literal shared by the named-value annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedValue {
    pub name: String,
    pub required: bool,
    pub default_value: Option<String>,
}

impl NamedValue {
    /// A required value; an empty name means the parameter's own name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            default_value: None,
        }
    }

    /// Unnamed, required.
    pub fn unnamed() -> Self {
        Self::new("")
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }
}

/// Serializer named by a `RequestSerializer`/`ResponseSerializer` annotation.
///
/// A class without a constructor stands for an abstract type and fails deployment.
#[derive(Clone)]
pub struct SerializerClass {
    pub name: &'static str,
    pub constructor: Option<fn() -> Arc<dyn SerializerImpl>>,
}

/// A serializer usable on both the request and the response side.
pub trait SerializerImpl: HttpRequestSerializer + HttpResponseSerializer {}

impl<T: HttpRequestSerializer + HttpResponseSerializer> SerializerImpl for T {}

impl SerializerClass {
    pub fn of<S>(name: &'static str) -> Self
    where
        S: HttpRequestSerializer + HttpResponseSerializer + Default + 'static,
    {
        Self {
            name,
            constructor: Some(construct::<S>),
        }
    }

    pub fn abstract_class(name: &'static str) -> Self {
        Self {
            name,
            constructor: None,
        }
    }

    pub fn instantiate(&self) -> Option<Arc<dyn SerializerImpl>> {
        self.constructor.map(|ctor| ctor())
    }
}

fn construct<S>() -> Arc<dyn SerializerImpl>
where
    S: HttpRequestSerializer + HttpResponseSerializer + Default + 'static,
{
    Arc::new(S::default())
}

impl fmt::Debug for SerializerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerClass")
            .field("name", &self.name)
            .field("abstract", &self.constructor.is_none())
            .finish()
    }
}

impl PartialEq for SerializerClass {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Declarative metadata on a class, method, parameter or bean field.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    RequestParam(NamedValue),
    RequestHeader(NamedValue),
    CookieValue(NamedValue),
    PathVariable(NamedValue),
    MatrixVariable {
        value: NamedValue,
        /// Restrict lookup to the segment of this path variable.
        path_var: Option<String>,
    },
    RequestBody {
        required: bool,
    },
    RequestBean,
    QueryBean,
    /// Alias of a query-bean field.
    QueryName(String),
    RequestSerializer(SerializerClass),
    ResponseSerializer(SerializerClass),
    ResponseStatus(u16),
}

/// Ordered annotation list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations(Vec<Annotation>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, annotation: Annotation) -> Self {
        self.0.push(annotation);
        self
    }

    pub fn push(&mut self, annotation: Annotation) {
        self.0.push(annotation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn find<'a, T>(&'a self, f: impl FnMut(&'a Annotation) -> Option<T>) -> Option<T> {
        self.0.iter().find_map(f)
    }

    pub fn request_param(&self) -> Option<&NamedValue> {
        self.find(|a| match a {
            Annotation::RequestParam(v) => Some(v),
            _ => None,
        })
    }

    pub fn request_header(&self) -> Option<&NamedValue> {
        self.find(|a| match a {
            Annotation::RequestHeader(v) => Some(v),
            _ => None,
        })
    }

    pub fn cookie_value(&self) -> Option<&NamedValue> {
        self.find(|a| match a {
            Annotation::CookieValue(v) => Some(v),
            _ => None,
        })
    }

    pub fn path_variable(&self) -> Option<&NamedValue> {
        self.find(|a| match a {
            Annotation::PathVariable(v) => Some(v),
            _ => None,
        })
    }

    pub fn matrix_variable(&self) -> Option<(&NamedValue, Option<&str>)> {
        self.find(|a| match a {
            Annotation::MatrixVariable { value, path_var } => Some((value, path_var.as_deref())),
            _ => None,
        })
    }

    /// `Some(required)` when a `RequestBody` annotation is present.
    pub fn request_body(&self) -> Option<bool> {
        self.find(|a| match a {
            Annotation::RequestBody { required } => Some(*required),
            _ => None,
        })
    }

    pub fn has_request_bean(&self) -> bool {
        self.iter().any(|a| matches!(a, Annotation::RequestBean))
    }

    pub fn has_query_bean(&self) -> bool {
        self.iter().any(|a| matches!(a, Annotation::QueryBean))
    }

    pub fn query_name(&self) -> Option<&str> {
        self.find(|a| match a {
            Annotation::QueryName(v) => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn request_serializer(&self) -> Option<&SerializerClass> {
        self.find(|a| match a {
            Annotation::RequestSerializer(v) => Some(v),
            _ => None,
        })
    }

    pub fn response_serializer(&self) -> Option<&SerializerClass> {
        self.find(|a| match a {
            Annotation::ResponseSerializer(v) => Some(v),
            _ => None,
        })
    }

    pub fn response_status(&self) -> Option<u16> {
        self.find(|a| match a {
            Annotation::ResponseStatus(v) => Some(*v),
            _ => None,
        })
    }
}

impl From<Vec<Annotation>> for Annotations {
    fn from(v: Vec<Annotation>) -> Self {
        Self(v)
    }
}

impl FromIterator<Annotation> for Annotations {
    fn from_iter<I: IntoIterator<Item = Annotation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The controller type a handler method belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMeta {
    pub name: String,
    pub annotations: Annotations,
}

impl ClassMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Annotations::new(),
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

/// A handler method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodMeta {
    pub name: String,
    pub annotations: Annotations,
    pub declaring: Arc<ClassMeta>,
}

impl MethodMeta {
    pub fn new(declaring: Arc<ClassMeta>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Annotations::new(),
            declaring,
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// `Class::method`, as used in logs.
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.declaring.name, self.name)
    }
}

/// Who declares a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamOwner {
    Method(Arc<MethodMeta>),
    /// Field of a bean type.
    Field { bean: &'static str },
}

/// A handler parameter or a bean field.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeDesc,
    pub index: usize,
    pub annotations: Annotations,
    pub owner: ParamOwner,
}

impl Param {
    pub fn method_param(
        method: Arc<MethodMeta>,
        index: usize,
        name: impl Into<String>,
        ty: TypeDesc,
        annotations: Annotations,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            index,
            annotations,
            owner: ParamOwner::Method(method),
        }
    }

    pub fn field(
        bean: &'static str,
        index: usize,
        name: impl Into<String>,
        ty: TypeDesc,
        annotations: Annotations,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            index,
            annotations,
            owner: ParamOwner::Field { bean },
        }
    }

    pub fn method(&self) -> Option<&Arc<MethodMeta>> {
        match &self.owner {
            ParamOwner::Method(m) => Some(m),
            ParamOwner::Field { .. } => None,
        }
    }

    /// Parameter annotation first, then the method's, then the class's.
    pub fn find_inherited<T>(&self, f: impl Fn(&Annotations) -> Option<T>) -> Option<T> {
        f(&self.annotations).or_else(|| {
            self.method()
                .and_then(|m| f(&m.annotations).or_else(|| f(&m.declaring.annotations)))
        })
    }

    /// `Class::method#name`, as used in error messages.
    pub fn describe(&self) -> String {
        match &self.owner {
            ParamOwner::Method(m) => format!("{}#{}", m.qualified_name(), self.name),
            ParamOwner::Field { bean } => format!("{}.{}", bean, self.name),
        }
    }
}
