// Route table, dispatch and the error boundary

pub mod pattern;
pub mod predicate;

pub use pattern::{PathMatch, PathPattern};
pub use predicate::{
    ConsumesPredicate, Expression, HeadersPredicate, MethodsPredicate, Mismatch, ParamsPredicate,
    ProducesPredicate, RouteCondition, RouteConditionBuilder, RouteMatch,
};

use crate::config::RouteOptions;
use crate::handler::RouteHandler;
use crate::http::{AsyncRequest, AsyncResponse};
use crate::{Error, MediaType, Result};
use std::sync::Arc;

/// Request attribute holding the route's produces types that the client
/// accepts (`Vec<MediaType>`), most preferred first.
pub const COMPATIBLE_MEDIA_TYPES: &str = "restlight.compatible-media-types";

/// A condition and the handler it leads to.
#[derive(Debug, Clone)]
pub struct Route {
    condition: RouteCondition,
    handler: Arc<RouteHandler>,
}

impl Route {
    pub fn new(condition: RouteCondition, handler: Arc<RouteHandler>) -> Self {
        Self { condition, handler }
    }

    pub fn condition(&self) -> &RouteCondition {
        &self.condition
    }

    pub fn handler(&self) -> &Arc<RouteHandler> {
        &self.handler
    }
}

/// Turns a failed request into a response.
pub trait ExceptionResolver: Send + Sync {
    fn resolve(&self, error: &Error, request: &AsyncRequest, response: &mut AsyncResponse);
}

/// Client errors answer with their message, which names the offending
/// parameter. Server errors answer with the bare reason phrase and log the
/// cause.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExceptionResolver;

impl ExceptionResolver for DefaultExceptionResolver {
    fn resolve(&self, error: &Error, request: &AsyncRequest, response: &mut AsyncResponse) {
        let status = error.http_status();
        if error.is_server_error() {
            tracing::error!(
                method = %request.method(),
                path = %request.path(),
                error = %error,
                "request failed"
            );
        } else {
            tracing::debug!(
                method = %request.method(),
                path = %request.path(),
                status = status.code(),
                error = %error,
                "request rejected"
            );
        }

        if response.is_committed() {
            tracing::warn!(path = %request.path(), "error after response was committed");
            return;
        }

        let body = if error.is_server_error() {
            status.reason().to_string()
        } else {
            error.to_string()
        };
        response.set_status(error.status_code());
        response.set_header("Content-Type", MediaType::text_plain_utf8().to_header_value());
        if let Error::MethodNotAllowed(allowed) = error {
            response.set_header("Allow", allowed.clone());
        }
        if let Err(e) = response.send_result(body) {
            tracing::warn!(error = %e, "cannot write error response");
        }
    }
}

/// Ordered route table.
///
/// Routes are kept most specific first. Registering a route that may match
/// the same requests as an existing one is logged, or refused when
/// `reject_ambiguous_routes` is set.
pub struct Router {
    routes: Vec<Route>,
    options: RouteOptions,
    exception_resolver: Arc<dyn ExceptionResolver>,
}

impl Router {
    pub fn new(options: RouteOptions) -> Self {
        Self {
            routes: Vec::new(),
            options,
            exception_resolver: Arc::new(DefaultExceptionResolver),
        }
    }

    pub fn with_exception_resolver(mut self, resolver: Arc<dyn ExceptionResolver>) -> Self {
        self.exception_resolver = resolver;
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn add(&mut self, route: Route) -> Result<()> {
        for existing in &self.routes {
            if !route.condition.may_ambiguous_with(&existing.condition) {
                continue;
            }
            if self.options.reject_ambiguous_routes {
                return Err(Error::config(format!(
                    "route {} ({}) is ambiguous with {} ({})",
                    route.condition,
                    route.handler.method().qualified_name(),
                    existing.condition,
                    existing.handler.method().qualified_name()
                )));
            }
            tracing::warn!(
                route = %route.condition,
                existing = %existing.condition,
                "ambiguous routes, the more specific one wins"
            );
        }

        let rank = route.condition.rank();
        let pos = self
            .routes
            .iter()
            .position(|r| r.condition.rank() > rank)
            .unwrap_or(self.routes.len());
        tracing::debug!(
            route = %route.condition,
            handler = %route.handler.method().qualified_name(),
            position = pos,
            "route registered"
        );
        self.routes.insert(pos, route);
        Ok(())
    }

    /// The first route accepting `request`, or the error explaining why none did.
    pub fn find(&self, request: &AsyncRequest) -> Result<(&Route, RouteMatch)> {
        let mut closest: Option<Mismatch> = None;
        for route in &self.routes {
            match route
                .condition
                .evaluate(request, self.options.use_matrix_variables)
            {
                Ok(m) => return Ok((route, m)),
                Err(mismatch) => closest = closest.max(Some(mismatch)),
            }
        }

        let target = format!("{} {}", request.method(), request.path());
        Err(match closest {
            None | Some(Mismatch::Path) | Some(Mismatch::Headers) | Some(Mismatch::Params) => {
                Error::RouteNotFound(target)
            }
            Some(Mismatch::Method) => Error::MethodNotAllowed(self.allowed_methods(request)),
            Some(Mismatch::Consumes) => Error::UnsupportedMediaType(format!(
                "{} does not accept {}",
                target,
                request.headers().content_type().unwrap_or("")
            )),
            Some(Mismatch::Produces) => Error::NotAcceptable(format!(
                "{} cannot produce {}",
                target,
                request.headers().accept().unwrap_or("")
            )),
        })
    }

    fn allowed_methods(&self, request: &AsyncRequest) -> String {
        let mut allowed: Vec<&str> = Vec::new();
        for route in &self.routes {
            if route
                .condition
                .match_path(request.path(), self.options.use_matrix_variables)
                .is_none()
            {
                continue;
            }
            for method in route.condition.methods() {
                if !allowed.contains(&method.as_str()) {
                    allowed.push(method.as_str());
                }
            }
        }
        allowed.join(", ")
    }

    /// Match, bind route variables and run the handler pipeline.
    pub async fn try_dispatch(
        &self,
        request: &mut AsyncRequest,
        response: &mut AsyncResponse,
    ) -> Result<()> {
        let (route, matched) = self.find(request)?;
        let handler = route.handler.clone();

        request.set_route_variables(matched.path.variables, matched.path.matrix);
        if matched.produces.is_empty() {
            request.attributes_mut().remove(COMPATIBLE_MEDIA_TYPES);
        } else {
            request
                .attributes_mut()
                .insert(COMPATIBLE_MEDIA_TYPES, matched.produces);
        }

        handler.handle(request, response).await
    }

    /// Dispatch and render any failure through the exception resolver.
    pub async fn dispatch(&self, request: &mut AsyncRequest, response: &mut AsyncResponse) {
        if let Err(error) = self.try_dispatch(request, response).await {
            self.exception_resolver.resolve(&error, request, response);
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouteOptions::default())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .field("options", &self.options)
            .finish()
    }
}
