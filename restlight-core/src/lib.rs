// Core library for the Restlight handler framework
// Request binding, serialization, interceptors and routing for REST handlers

pub mod advice;
pub mod config;
pub mod convert;
pub mod deploy;
pub mod error;
pub mod handler;
pub mod headers;
pub mod http;
pub mod interceptor;
pub mod logging;
pub mod media_type;
pub mod name_value;
pub mod param;
pub mod resolver;
pub mod return_value;
pub mod route;
pub mod serialize;
pub mod status;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use advice::{AdviceChain, HandlerAdvice, Next};
pub use config::{RestlightOptions, RouteOptions, SerializeOptions};
pub use deploy::{Deployment, HandlerMethod, HandlerMethodBuilder};
pub use error::*;
pub use handler::{
    DeferredResult, Invoker, ReturnValue, RouteHandler, async_invoker, invoker, sync_invoker,
};
pub use headers::HeaderMap;
pub use http::{AsyncRequest, AsyncResponse, Cookie, HttpMethod, MatrixVariables};
pub use interceptor::{Interceptor, InterceptorPredicate};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use media_type::MediaType;
pub use name_value::NameAndValue;
pub use param::{Annotation, Annotations, ClassMeta, MethodMeta, NamedValue, Param, SerializerClass};
pub use resolver::{ArgumentResolver, ArgumentResolverFactory, ResolverRegistry};
pub use route::{ExceptionResolver, Route, RouteCondition, Router};
pub use serialize::{HttpRequestSerializer, HttpResponseSerializer, Serializers};
pub use status::*;
pub use types::{ObjectType, TypeDesc};
pub use value::{AnyObject, Args, FromValue, Value};
