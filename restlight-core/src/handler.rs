// Handler invocation: argument resolution, interceptors, advices, return values

use crate::advice::{AdviceChain, HandlerAdvice, Terminal};
use crate::http::{AsyncRequest, AsyncResponse};
use crate::interceptor::{Interceptor, InterceptorMatcher};
use crate::param::{MethodMeta, Param};
use crate::resolver::ArgumentResolver;
use crate::return_value::ReturnValueResolver;
use crate::value::{Args, Value};
use crate::{Error, Result};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// What a handler returned.
///
/// Every asynchronous shape is normalized into one future before
/// post-processing, so interceptors and return-value resolvers only ever see
/// a finished [`Value`].
pub enum ReturnValue {
    /// Returned synchronously.
    Value(Value),
    Future(BoxFuture<'static, Result<Value>>),
    /// Completed by whoever holds the sender.
    Receiver(oneshot::Receiver<Result<Value>>),
    /// A spawned task.
    Task(JoinHandle<Result<Value>>),
    /// Completed through [`DeferredResult::set_result`].
    Deferred(DeferredResult),
}

impl ReturnValue {
    pub fn future(future: impl Future<Output = Result<Value>> + Send + 'static) -> Self {
        ReturnValue::Future(Box::pin(future))
    }

    pub fn is_async(&self) -> bool {
        !matches!(self, ReturnValue::Value(_))
    }

    /// Wait for the value.
    pub async fn resolve(self) -> Result<Value> {
        match self {
            ReturnValue::Value(value) => Ok(value),
            ReturnValue::Future(future) => future.await,
            ReturnValue::Receiver(rx) => rx
                .await
                .map_err(|_| Error::Internal("async result sender dropped".to_string()))?,
            ReturnValue::Task(handle) => handle
                .await
                .map_err(|e| Error::Internal(format!("handler task failed: {}", e)))?,
            ReturnValue::Deferred(deferred) => deferred.wait().await,
        }
    }
}

impl From<Value> for ReturnValue {
    fn from(value: Value) -> Self {
        ReturnValue::Value(value)
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ReturnValue::Future(_) => f.write_str("Future"),
            ReturnValue::Receiver(_) => f.write_str("Receiver"),
            ReturnValue::Task(_) => f.write_str("Task"),
            ReturnValue::Deferred(d) => f.debug_tuple("Deferred").field(&d.is_set()).finish(),
        }
    }
}

type Listener = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct DeferredState {
    completed: bool,
    result: Option<Result<Value>>,
    waiter: Option<oneshot::Sender<Result<Value>>>,
    listeners: Vec<Listener>,
}

/// A result set later from any thread.
///
/// Clones share the same state. The first `set_result`/`set_error` wins;
/// completion listeners run once, on the completing thread.
#[derive(Clone, Default)]
pub struct DeferredResult {
    inner: Arc<Mutex<DeferredState>>,
}

impl DeferredResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete with a value. Returns `false` if already completed.
    pub fn set_result(&self, value: Value) -> bool {
        self.complete(Ok(value))
    }

    /// Complete with an error. Returns `false` if already completed.
    pub fn set_error(&self, error: Error) -> bool {
        self.complete(Err(error))
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().completed
    }

    /// Run `listener` on completion, or now if already completed.
    pub fn on_completion(&self, listener: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.inner.lock();
            if !state.completed {
                state.listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    fn complete(&self, result: Result<Value>) -> bool {
        let listeners = {
            let mut state = self.inner.lock();
            if state.completed {
                return false;
            }
            state.completed = true;
            match state.waiter.take() {
                Some(tx) => {
                    // receiver gone means the request was dropped
                    let _ = tx.send(result);
                }
                None => state.result = Some(result),
            }
            std::mem::take(&mut state.listeners)
        };
        for listener in listeners {
            listener();
        }
        true
    }

    async fn wait(self) -> Result<Value> {
        let rx = {
            let mut state = self.inner.lock();
            if let Some(result) = state.result.take() {
                return result;
            }
            if state.completed {
                return Err(Error::Internal("deferred result already consumed".to_string()));
            }
            let (tx, rx) = oneshot::channel();
            state.waiter = Some(tx);
            rx
        };
        drop(self);
        rx.await
            .map_err(|_| Error::Internal("deferred result dropped without a value".to_string()))?
    }
}

/// Calls the application method with resolved arguments.
pub type Invoker = Arc<dyn Fn(Args) -> Result<ReturnValue> + Send + Sync>;

/// Wrap a function returning any [`ReturnValue`].
pub fn invoker(f: impl Fn(Args) -> Result<ReturnValue> + Send + Sync + 'static) -> Invoker {
    Arc::new(f)
}

/// Wrap a synchronous handler.
pub fn sync_invoker(f: impl Fn(Args) -> Result<Value> + Send + Sync + 'static) -> Invoker {
    Arc::new(move |args| f(args).map(ReturnValue::Value))
}

/// Wrap an async handler.
pub fn async_invoker<F, Fut>(f: F) -> Invoker
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |args| Ok(ReturnValue::future(f(args))))
}

/// Where a request is in the handler pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    ResolvingArgs,
    Invoking,
    SyncResult,
    AsyncPending,
    PostHandling,
    Completing,
    Terminal,
}

/// A handler parameter and the resolver bound to it. Parameters without a
/// resolver receive `Null`.
#[derive(Clone)]
pub struct ResolvableParam {
    pub param: Param,
    pub resolver: Option<Arc<dyn ArgumentResolver>>,
}

impl fmt::Debug for ResolvableParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvableParam")
            .field("param", &self.param.name)
            .field("resolved", &self.resolver.is_some())
            .finish()
    }
}

/// One deployed handler method.
pub struct RouteHandler {
    method: Arc<MethodMeta>,
    params: Vec<ResolvableParam>,
    interceptors: InterceptorMatcher,
    advices: AdviceChain,
    response_status: Option<u16>,
    return_resolver: Arc<dyn ReturnValueResolver>,
}

pub(crate) struct RouteHandlerParts {
    pub method: Arc<MethodMeta>,
    pub params: Vec<ResolvableParam>,
    pub interceptors: InterceptorMatcher,
    pub advices: Vec<Arc<dyn HandlerAdvice>>,
    pub invoker: Invoker,
    /// An async `Null` is an error when the handler declares a non-optional
    /// body type.
    pub requires_value: bool,
    pub response_status: Option<u16>,
    pub return_resolver: Arc<dyn ReturnValueResolver>,
}

impl RouteHandler {
    pub(crate) fn new(parts: RouteHandlerParts) -> Self {
        let RouteHandlerParts {
            method,
            params,
            interceptors,
            advices,
            invoker,
            requires_value,
            response_status,
            return_resolver,
        } = parts;

        let name = method.qualified_name();
        let terminal: Terminal = Arc::new(move |args: Args| -> BoxFuture<'static, Result<Value>> {
            let invoked = invoker(args);
            let name = name.clone();
            Box::pin(async move {
                let returned = invoked?;
                let is_async = returned.is_async();
                let state = if is_async {
                    ExecutionState::AsyncPending
                } else {
                    ExecutionState::SyncResult
                };
                tracing::trace!(handler = %name, ?state, "handler returned");
                let value = returned.resolve().await?;
                if is_async && requires_value && value.is_null() {
                    return Err(Error::NullAsyncResult(name));
                }
                Ok(value)
            })
        });

        Self {
            advices: AdviceChain::new(advices, method.clone(), terminal),
            method,
            params,
            interceptors,
            response_status,
            return_resolver,
        }
    }

    pub fn method(&self) -> &MethodMeta {
        &self.method
    }

    pub fn params(&self) -> &[ResolvableParam] {
        &self.params
    }

    fn trace(&self, state: ExecutionState) {
        tracing::trace!(handler = %self.method.name, ?state, "pipeline");
    }

    fn resolve_args(&self, request: &AsyncRequest, response: &mut AsyncResponse) -> Result<Args> {
        let mut values = Vec::with_capacity(self.params.len());
        for p in &self.params {
            let value = match &p.resolver {
                Some(resolver) => resolver.resolve(request, response)?,
                None => Value::Null,
            };
            values.push(value);
        }
        Ok(Args::new(values))
    }

    /// Run the whole pipeline for one request.
    ///
    /// On success the response is committed, unless an interceptor stopped
    /// the request. Errors are returned for the router's exception resolver.
    pub async fn handle(&self, request: &AsyncRequest, response: &mut AsyncResponse) -> Result<()> {
        self.trace(ExecutionState::ResolvingArgs);
        let args = self.resolve_args(request, response)?;

        let interceptors = self.interceptors.matching(request);
        let mut completed = 0;
        let mut outcome: Option<Result<()>> = None;
        for interceptor in &interceptors {
            match interceptor.pre_handle(request, response, &self.method).await {
                Ok(true) => completed += 1,
                Ok(false) => {
                    completed += 1;
                    tracing::debug!(
                        handler = %self.method.name,
                        interceptor = interceptor.name(),
                        "request stopped by interceptor"
                    );
                    outcome = Some(Ok(()));
                    break;
                }
                Err(e) => {
                    outcome = Some(Err(e));
                    break;
                }
            }
        }

        let result = match outcome {
            Some(stopped) => stopped,
            None => self.invoke(args, &interceptors, request, response).await,
        };

        self.trace(ExecutionState::Completing);
        for interceptor in interceptors[..completed].iter().rev() {
            if let Err(e) = interceptor
                .after_completion(request, response, &self.method, result.as_ref().err())
                .await
            {
                tracing::warn!(
                    handler = %self.method.name,
                    interceptor = interceptor.name(),
                    error = %e,
                    "after_completion failed"
                );
            }
        }
        self.trace(ExecutionState::Terminal);
        result
    }

    async fn invoke(
        &self,
        args: Args,
        interceptors: &[Arc<dyn Interceptor>],
        request: &AsyncRequest,
        response: &mut AsyncResponse,
    ) -> Result<()> {
        self.trace(ExecutionState::Invoking);
        let value = self.advices.invoke(request, response, args).await?;

        self.trace(ExecutionState::PostHandling);
        for interceptor in interceptors.iter().rev() {
            interceptor.post_handle(request, response, &self.method).await?;
        }

        if response.is_committed() {
            return Ok(());
        }
        if let Some(status) = self.response_status {
            response.set_status(status);
        }
        self.return_resolver.write(value, request, response)
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandler")
            .field("method", &self.method.qualified_name())
            .field("params", &self.params)
            .field("interceptors", &self.interceptors)
            .field("advices", &self.advices.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_shapes() {
        assert_eq!(
            ReturnValue::from(Value::from(1i64)).resolve().await.unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            ReturnValue::future(async { Ok(Value::from("f")) })
                .resolve()
                .await
                .unwrap(),
            Value::from("f")
        );

        let (tx, rx) = oneshot::channel();
        tx.send(Ok(Value::from(true))).unwrap();
        assert_eq!(ReturnValue::Receiver(rx).resolve().await.unwrap(), Value::Bool(true));

        let task = tokio::spawn(async { Ok(Value::from(2i64)) });
        assert_eq!(ReturnValue::Task(task).resolve().await.unwrap(), Value::Int(2));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_internal_error() {
        let (tx, rx) = oneshot::channel::<Result<Value>>();
        drop(tx);
        let err = ReturnValue::Receiver(rx).resolve().await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_deferred_completed_later() {
        let deferred = DeferredResult::new();
        let fired = Arc::new(Mutex::new(0));
        let counter = fired.clone();
        deferred.on_completion(move || *counter.lock() += 1);

        let producer = deferred.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            assert!(producer.set_result(Value::from("later")));
            assert!(!producer.set_result(Value::from("again")));
        });

        let value = ReturnValue::Deferred(deferred).resolve().await.unwrap();
        assert_eq!(value, Value::from("later"));
        assert_eq!(*fired.lock(), 1);
    }

    #[tokio::test]
    async fn test_deferred_completed_before_wait() {
        let deferred = DeferredResult::new();
        deferred.set_error(Error::BadRequest("nope".into()));
        assert!(deferred.is_set());

        let late = Arc::new(Mutex::new(false));
        let flag = late.clone();
        deferred.on_completion(move || *flag.lock() = true);
        assert!(*late.lock());

        let err = ReturnValue::Deferred(deferred).resolve().await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
