// Handler advices wrapping the invocation itself

use crate::http::{AsyncRequest, AsyncResponse};
use crate::param::MethodMeta;
use crate::value::{Args, Value};
use crate::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// The rest of the chain, ending in the handler.
pub type Next = Box<
    dyn for<'r> FnOnce(&'r AsyncRequest, &'r mut AsyncResponse, Args) -> BoxFuture<'r, Result<Value>>
        + Send,
>;

/// Innermost step of a chain: invoke the handler and wait for its value.
pub type Terminal = Arc<dyn Fn(Args) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Wraps handler invocation.
///
/// An advice sees the resolved arguments and may replace them, skip the
/// handler by returning its own value, write the response itself, or fail.
/// Calling `next` continues with the following advice.
#[async_trait]
pub trait HandlerAdvice: Send + Sync {
    async fn invoke(
        &self,
        handler: &MethodMeta,
        request: &AsyncRequest,
        response: &mut AsyncResponse,
        args: Args,
        next: Next,
    ) -> Result<Value>;
}

fn next_fn<F>(f: F) -> Next
where
    F: for<'r> FnOnce(&'r AsyncRequest, &'r mut AsyncResponse, Args) -> BoxFuture<'r, Result<Value>>
        + Send
        + 'static,
{
    Box::new(f)
}

/// Advices bound to one handler, outermost first.
#[derive(Clone)]
pub struct AdviceChain {
    advices: Arc<Vec<Arc<dyn HandlerAdvice>>>,
    handler: Arc<MethodMeta>,
    terminal: Terminal,
}

impl AdviceChain {
    pub fn new(advices: Vec<Arc<dyn HandlerAdvice>>, handler: Arc<MethodMeta>, terminal: Terminal) -> Self {
        Self {
            advices: Arc::new(advices),
            handler,
            terminal,
        }
    }

    pub fn len(&self) -> usize {
        self.advices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advices.is_empty()
    }

    /// Run the chain.
    pub fn invoke<'r>(
        &self,
        request: &'r AsyncRequest,
        response: &'r mut AsyncResponse,
        args: Args,
    ) -> BoxFuture<'r, Result<Value>> {
        self.execute_from(0, request, response, args)
    }

    fn execute_from<'r>(
        &self,
        index: usize,
        request: &'r AsyncRequest,
        response: &'r mut AsyncResponse,
        args: Args,
    ) -> BoxFuture<'r, Result<Value>> {
        let Some(advice) = self.advices.get(index).cloned() else {
            tracing::trace!(handler = %self.handler.name, "advice chain complete, invoking handler");
            return (self.terminal)(args);
        };

        let chain = self.clone();
        tracing::trace!(advice_index = index, "executing advice");
        Box::pin(async move {
            let handler = chain.handler.clone();
            let next = next_fn(move |request, response, args| {
                chain.execute_from(index + 1, request, response, args)
            });
            advice.invoke(&handler, request, response, args, next).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::param::ClassMeta;
    use parking_lot::Mutex;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl HandlerAdvice for Recording {
        async fn invoke(
            &self,
            _handler: &MethodMeta,
            request: &AsyncRequest,
            response: &mut AsyncResponse,
            args: Args,
            next: Next,
        ) -> Result<Value> {
            self.log.lock().push(format!("{} before", self.name));
            let value = next(request, response, args).await;
            self.log.lock().push(format!("{} after", self.name));
            value
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl HandlerAdvice for ShortCircuit {
        async fn invoke(
            &self,
            _handler: &MethodMeta,
            _request: &AsyncRequest,
            response: &mut AsyncResponse,
            _args: Args,
            _next: Next,
        ) -> Result<Value> {
            response.set_header("X-Cached", "1");
            Ok(Value::from("cached"))
        }
    }

    fn chain(advices: Vec<Arc<dyn HandlerAdvice>>, log: Arc<Mutex<Vec<String>>>) -> AdviceChain {
        let handler = Arc::new(MethodMeta::new(Arc::new(ClassMeta::new("C")), "m"));
        let terminal: Terminal = Arc::new(move |args: Args| -> BoxFuture<'static, Result<Value>> {
            let log = log.clone();
            Box::pin(async move {
                log.lock().push("handler".to_string());
                Ok(Value::from(args.len() as i64))
            })
        });
        AdviceChain::new(advices, handler, terminal)
    }

    #[tokio::test]
    async fn test_advices_nest_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let advices: Vec<Arc<dyn HandlerAdvice>> = vec![
            Arc::new(Recording { name: "outer", log: log.clone() }),
            Arc::new(Recording { name: "inner", log: log.clone() }),
        ];
        let chain = chain(advices, log.clone());
        let req = AsyncRequest::new(HttpMethod::GET, "/");
        let mut resp = AsyncResponse::new();

        let value = chain
            .invoke(&req, &mut resp, Args::from(vec![Value::Null, Value::Null]))
            .await
            .unwrap();
        assert_eq!(value, Value::Int(2));
        assert_eq!(
            *log.lock(),
            vec!["outer before", "inner before", "handler", "inner after", "outer after"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let advices: Vec<Arc<dyn HandlerAdvice>> = vec![
            Arc::new(Recording { name: "outer", log: log.clone() }),
            Arc::new(ShortCircuit),
        ];
        let chain = chain(advices, log.clone());
        let req = AsyncRequest::new(HttpMethod::GET, "/");
        let mut resp = AsyncResponse::new();

        let value = chain.invoke(&req, &mut resp, Args::new(Vec::new())).await.unwrap();
        assert_eq!(value, Value::from("cached"));
        assert_eq!(resp.headers().get("X-Cached"), Some("1"));
        assert_eq!(*log.lock(), vec!["outer before", "outer after"]);
    }
}
