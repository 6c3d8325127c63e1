// Deploying handler methods into a router

use crate::advice::HandlerAdvice;
use crate::config::RestlightOptions;
use crate::handler::{Invoker, ResolvableParam, RouteHandler, RouteHandlerParts};
use crate::http::{AsyncRequest, AsyncResponse, HttpMethod};
use crate::interceptor::{Interceptor, InterceptorMatcher};
use crate::param::{Annotation, Annotations, ClassMeta, MethodMeta, Param};
use crate::resolver::{BeanMetaCache, ResolverContext, ResolverRegistry};
use crate::return_value;
use crate::route::{ExceptionResolver, Route, RouteConditionBuilder, Router};
use crate::serialize::Serializers;
use crate::types::TypeDesc;
use crate::{Error, Result};
use std::sync::Arc;

struct ParamDecl {
    name: String,
    ty: TypeDesc,
    annotations: Annotations,
}

/// A handler method ready to be deployed.
pub struct HandlerMethod {
    method: MethodMeta,
    condition: RouteConditionBuilder,
    params: Vec<ParamDecl>,
    returns: Option<TypeDesc>,
    invoker: Invoker,
}

impl HandlerMethod {
    pub fn builder(class: Arc<ClassMeta>, name: impl Into<String>) -> HandlerMethodBuilder {
        HandlerMethodBuilder {
            method: MethodMeta::new(class, name),
            condition: RouteConditionBuilder::default(),
            params: Vec::new(),
            returns: None,
            invoker: None,
        }
    }

    pub fn method(&self) -> &MethodMeta {
        &self.method
    }
}

/// Describes a handler method: its route, parameters, return type and body.
pub struct HandlerMethodBuilder {
    method: MethodMeta,
    condition: RouteConditionBuilder,
    params: Vec<ParamDecl>,
    returns: Option<TypeDesc>,
    invoker: Option<Invoker>,
}

impl HandlerMethodBuilder {
    /// Add a method level annotation.
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.method = self.method.annotate(annotation);
        self
    }

    pub fn path(mut self, pattern: impl Into<String>) -> Self {
        self.condition = self.condition.path(pattern);
        self
    }

    pub fn http_method(mut self, method: HttpMethod) -> Self {
        self.condition = self.condition.method(method);
        self
    }

    pub fn consumes(mut self, media_type: impl Into<String>) -> Self {
        self.condition = self.condition.consumes(media_type);
        self
    }

    pub fn produces(mut self, media_type: impl Into<String>) -> Self {
        self.condition = self.condition.produces(media_type);
        self
    }

    /// Header expression such as `X-Version=2` or `!X-Legacy`.
    pub fn header_condition(mut self, expression: impl Into<String>) -> Self {
        self.condition = self.condition.header(expression);
        self
    }

    /// Query parameter expression such as `mode=fast`.
    pub fn param_condition(mut self, expression: impl Into<String>) -> Self {
        self.condition = self.condition.param(expression);
        self
    }

    /// Declare the next handler parameter.
    pub fn param(mut self, name: impl Into<String>, ty: TypeDesc, annotations: Annotations) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            ty,
            annotations,
        });
        self
    }

    /// Declared return type. Handlers without one write no body.
    pub fn returns(mut self, ty: TypeDesc) -> Self {
        self.returns = Some(ty);
        self
    }

    pub fn invoker(mut self, invoker: Invoker) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn build(self) -> Result<HandlerMethod> {
        let invoker = self.invoker.ok_or_else(|| {
            Error::config(format!("handler {} has no invoker", self.method.qualified_name()))
        })?;
        Ok(HandlerMethod {
            method: self.method,
            condition: self.condition,
            params: self.params,
            returns: self.returns,
            invoker,
        })
    }
}

/// Collects handler methods and binds them into a [`Router`].
///
/// Resolvers, serializers, interceptors and advices must be registered before
/// the handlers that should see them are deployed.
pub struct Deployment {
    options: RestlightOptions,
    registry: ResolverRegistry,
    serializers: Serializers,
    bean_cache: BeanMetaCache,
    interceptors: Vec<Arc<dyn Interceptor>>,
    advices: Vec<Arc<dyn HandlerAdvice>>,
    router: Router,
}

impl Deployment {
    pub fn new(options: RestlightOptions) -> Self {
        Self {
            router: Router::new(options.route.clone()),
            options,
            registry: ResolverRegistry::defaults(),
            serializers: Serializers::defaults(),
            bean_cache: BeanMetaCache::new(),
            interceptors: Vec::new(),
            advices: Vec::new(),
        }
    }

    pub fn options(&self) -> &RestlightOptions {
        &self.options
    }

    pub fn resolvers_mut(&mut self) -> &mut ResolverRegistry {
        &mut self.registry
    }

    pub fn serializers(&self) -> &Serializers {
        &self.serializers
    }

    pub fn serializers_mut(&mut self) -> &mut Serializers {
        &mut self.serializers
    }

    pub fn bean_cache(&self) -> &BeanMetaCache {
        &self.bean_cache
    }

    pub fn add_interceptor(&mut self, interceptor: impl Interceptor + 'static) -> &mut Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn add_advice(&mut self, advice: impl HandlerAdvice + 'static) -> &mut Self {
        self.advices.push(Arc::new(advice));
        self
    }

    pub fn set_exception_resolver(&mut self, resolver: Arc<dyn ExceptionResolver>) -> &mut Self {
        let router = std::mem::take(&mut self.router);
        self.router = router.with_exception_resolver(resolver);
        self
    }

    /// Bind every parameter, the interceptors, advices and return writer of
    /// `handler`, then register its route.
    pub fn deploy(&mut self, handler: HandlerMethod) -> Result<()> {
        let HandlerMethod {
            method,
            condition,
            params,
            returns,
            invoker,
        } = handler;
        let method = Arc::new(method);
        let condition = condition.build().map_err(|e| {
            Error::config(format!("invalid route on {}: {}", method.qualified_name(), e))
        })?;

        let path_variables = condition.path_variables();
        let ctx = ResolverContext {
            serializers: &self.serializers,
            options: &self.options,
            registry: &self.registry,
            bean_cache: &self.bean_cache,
            path_variables: Some(&path_variables),
        };

        let mut resolvable = Vec::with_capacity(params.len());
        for (index, decl) in params.into_iter().enumerate() {
            let param = Param::method_param(method.clone(), index, decl.name, decl.ty, decl.annotations);
            let resolver = self.registry.resolver_for(&param, &ctx)?;
            resolvable.push(ResolvableParam { param, resolver });
        }

        let return_resolver =
            return_value::resolver_for(&method, returns.as_ref(), &self.serializers, &self.options)?;
        let interceptors = InterceptorMatcher::new(
            &self.interceptors,
            &method,
            &condition,
            self.options.route.use_matrix_variables,
        )?;
        let response_status = method
            .annotations
            .response_status()
            .or_else(|| method.declaring.annotations.response_status());

        tracing::debug!(
            route = %condition,
            handler = %method.qualified_name(),
            params = resolvable.len(),
            "deploying handler"
        );

        let handler = RouteHandler::new(RouteHandlerParts {
            method,
            params: resolvable,
            interceptors,
            advices: self.advices.clone(),
            invoker,
            requires_value: returns.as_ref().is_some_and(|ty| !ty.is_optional()),
            response_status,
            return_resolver,
        });
        self.router.add(Route::new(condition, Arc::new(handler)))
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn into_router(self) -> Router {
        tracing::info!(routes = self.router.len(), "deployment complete");
        self.router
    }

    pub async fn dispatch(&self, request: &mut AsyncRequest, response: &mut AsyncResponse) {
        self.router.dispatch(request, response).await
    }
}

impl Default for Deployment {
    fn default() -> Self {
        Self::new(RestlightOptions::default())
    }
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("options", &self.options)
            .field("resolvers", &self.registry)
            .field("interceptors", &self.interceptors.len())
            .field("advices", &self.advices.len())
            .field("router", &self.router)
            .finish()
    }
}
