// Restlight - annotation-style request binding and routing for async Rust
//
// Handler methods declare their parameters and return type once; Restlight
// binds request data to them, runs interceptors and advices around the call
// and writes the result through the negotiated serializer.

// Re-export core functionality
pub use restlight_core::*;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Annotation,
        Annotations,
        Args,
        AsyncRequest,
        AsyncResponse,
        ClassMeta,
        DeferredResult,
        Deployment,
        Error,
        HandlerAdvice,
        HandlerMethod,
        HttpMethod,
        Interceptor,
        InterceptorPredicate,
        MethodMeta,
        NamedValue,
        Next,
        ObjectType,
        RestlightOptions,
        Result,
        ReturnValue,
        Router,
        TypeDesc,
        Value,
        async_invoker,
        sync_invoker,
    };
}
