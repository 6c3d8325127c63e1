use async_trait::async_trait;
use parking_lot::Mutex;
use restlight_core::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: &'static str,
    order: i32,
    proceed: bool,
    log: Log,
}

#[async_trait]
impl Interceptor for Recorder {
    async fn pre_handle(
        &self,
        _request: &AsyncRequest,
        _response: &mut AsyncResponse,
        _handler: &MethodMeta,
    ) -> Result<bool> {
        self.log.lock().push(format!("pre {}", self.name));
        Ok(self.proceed)
    }

    async fn post_handle(
        &self,
        _request: &AsyncRequest,
        _response: &mut AsyncResponse,
        _handler: &MethodMeta,
    ) -> Result<()> {
        self.log.lock().push(format!("post {}", self.name));
        Ok(())
    }

    async fn after_completion(
        &self,
        _request: &AsyncRequest,
        _response: &mut AsyncResponse,
        _handler: &MethodMeta,
        error: Option<&Error>,
    ) -> Result<()> {
        let suffix = if error.is_some() { " (error)" } else { "" };
        self.log.lock().push(format!("after {}{}", self.name, suffix));
        Ok(())
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn name(&self) -> &str {
        self.name
    }
}

fn recorder(name: &'static str, order: i32, proceed: bool, log: &Log) -> Recorder {
    Recorder {
        name,
        order,
        proceed,
        log: log.clone(),
    }
}

fn class() -> Arc<ClassMeta> {
    Arc::new(ClassMeta::new("Pipeline"))
}

fn logging_handler(path: &str, log: &Log) -> HandlerMethod {
    let log = log.clone();
    HandlerMethod::builder(class(), "handle")
        .path(path)
        .returns(TypeDesc::Str)
        .invoker(sync_invoker(move |_| {
            log.lock().push("handler".to_string());
            Ok(Value::from("done"))
        }))
        .build()
        .unwrap()
}

async fn get(deployment: &Deployment, path: &str) -> AsyncResponse {
    let mut request = AsyncRequest::new(HttpMethod::GET, path);
    let mut response = AsyncResponse::new();
    deployment.dispatch(&mut request, &mut response).await;
    response
}

#[tokio::test]
async fn test_interceptors_wrap_handler() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut deployment = Deployment::default();
    deployment
        .add_interceptor(recorder("b", 1, true, &log))
        .add_interceptor(recorder("a", 0, true, &log));
    deployment.deploy(logging_handler("/", &log)).unwrap();

    let resp = get(&deployment, "/").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.body(), b"done");
    assert_eq!(
        *log.lock(),
        vec!["pre a", "pre b", "handler", "post b", "post a", "after b", "after a"]
    );
}

#[tokio::test]
async fn test_interceptor_stops_request() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut deployment = Deployment::default();
    deployment
        .add_interceptor(recorder("a", 0, true, &log))
        .add_interceptor(recorder("b", 1, false, &log))
        .add_interceptor(recorder("c", 2, true, &log));
    deployment.deploy(logging_handler("/", &log)).unwrap();

    let resp = get(&deployment, "/").await;
    assert!(!resp.is_committed());
    assert_eq!(*log.lock(), vec!["pre a", "pre b", "after b", "after a"]);
}

#[tokio::test]
async fn test_lower_order_runs_first_even_when_registered_later() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut deployment = Deployment::default();
    deployment
        .add_interceptor(recorder("a", 0, true, &log))
        .add_interceptor(recorder("b", -1, false, &log));
    deployment.deploy(logging_handler("/", &log)).unwrap();

    get(&deployment, "/").await;
    assert_eq!(*log.lock(), vec!["pre b", "after b"]);
}

#[tokio::test]
async fn test_after_completion_sees_handler_error() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut deployment = Deployment::default();
    deployment.add_interceptor(recorder("a", 0, true, &log));
    let failing = HandlerMethod::builder(class(), "fail")
        .path("/fail")
        .returns(TypeDesc::Str)
        .invoker(sync_invoker(|_| Err(Error::Internal("boom".to_string()))))
        .build()
        .unwrap();
    deployment.deploy(failing).unwrap();

    let resp = get(&deployment, "/fail").await;
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.body(), b"Internal Server Error");
    assert_eq!(*log.lock(), vec!["pre a", "after a (error)"]);
}

#[tokio::test]
async fn test_path_scoped_interceptor() {
    struct Admin(Log);

    #[async_trait]
    impl Interceptor for Admin {
        async fn pre_handle(
            &self,
            _request: &AsyncRequest,
            _response: &mut AsyncResponse,
            _handler: &MethodMeta,
        ) -> Result<bool> {
            self.0.lock().push("admin".to_string());
            Ok(true)
        }

        fn predicate(&self) -> InterceptorPredicate {
            InterceptorPredicate::paths(["/admin/**"], Vec::<String>::new())
        }
    }

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut deployment = Deployment::default();
    deployment.add_interceptor(Admin(log.clone()));
    deployment.deploy(logging_handler("/**", &log)).unwrap();

    get(&deployment, "/public").await;
    assert_eq!(*log.lock(), vec!["handler"]);

    log.lock().clear();
    get(&deployment, "/admin/users").await;
    assert_eq!(*log.lock(), vec!["admin", "handler"]);
}

struct CacheAdvice;

#[async_trait]
impl HandlerAdvice for CacheAdvice {
    async fn invoke(
        &self,
        _handler: &MethodMeta,
        request: &AsyncRequest,
        response: &mut AsyncResponse,
        args: Args,
        next: Next,
    ) -> Result<Value> {
        if request.param("cached").is_some() {
            return Ok(Value::from("from cache"));
        }
        next(request, response, args).await
    }
}

struct UppercaseArgs;

#[async_trait]
impl HandlerAdvice for UppercaseArgs {
    async fn invoke(
        &self,
        _handler: &MethodMeta,
        request: &AsyncRequest,
        response: &mut AsyncResponse,
        args: Args,
        next: Next,
    ) -> Result<Value> {
        let upper = args
            .iter()
            .map(|v| match v {
                Value::Str(s) => Value::from(s.to_uppercase()),
                other => other.clone(),
            })
            .collect::<Vec<_>>();
        next(request, response, Args::new(upper)).await
    }
}

#[tokio::test]
async fn test_advices_replace_args_and_short_circuit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut deployment = Deployment::default();
    deployment.add_advice(CacheAdvice).add_advice(UppercaseArgs);
    let echo = HandlerMethod::builder(class(), "echo")
        .path("/echo")
        .param(
            "word",
            TypeDesc::Str,
            Annotations::new().with(Annotation::RequestParam(NamedValue::new("word").optional())),
        )
        .returns(TypeDesc::Str)
        .invoker(sync_invoker(move |mut args| {
            counter.fetch_add(1, Ordering::SeqCst);
            let word: Option<String> = args.take(0)?;
            Ok(Value::from(word.unwrap_or_default()))
        }))
        .build()
        .unwrap();
    deployment.deploy(echo).unwrap();

    let resp = get(&deployment, "/echo?word=hi").await;
    assert_eq!(resp.body(), b"HI");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let resp = get(&deployment, "/echo?word=hi&cached=1").await;
    assert_eq!(resp.body(), b"from cache");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_future_result() {
    let mut deployment = Deployment::default();
    let handler = HandlerMethod::builder(class(), "later")
        .path("/later")
        .returns(TypeDesc::I32)
        .invoker(async_invoker(|_| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(Value::from(7i32))
        }))
        .build()
        .unwrap();
    deployment.deploy(handler).unwrap();

    let resp = get(&deployment, "/later").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.body(), b"7");
}

#[tokio::test]
async fn test_async_null_for_required_value_is_server_error() {
    let mut deployment = Deployment::default();
    let handler = HandlerMethod::builder(class(), "nothing")
        .path("/nothing")
        .returns(TypeDesc::Str)
        .invoker(async_invoker(|_| async { Ok(Value::Null) }))
        .build()
        .unwrap();
    deployment.deploy(handler).unwrap();
    let resp = get(&deployment, "/nothing").await;
    assert_eq!(resp.status(), 500);

    let mut deployment = Deployment::default();
    let handler = HandlerMethod::builder(class(), "maybe")
        .path("/maybe")
        .returns(TypeDesc::optional(TypeDesc::Str))
        .invoker(async_invoker(|_| async { Ok(Value::Null) }))
        .build()
        .unwrap();
    deployment.deploy(handler).unwrap();
    let resp = get(&deployment, "/maybe").await;
    assert_eq!(resp.status(), 200);
    assert!(resp.body().is_empty());
}

#[tokio::test]
async fn test_deferred_result_completed_by_another_task() {
    let mut deployment = Deployment::default();
    let handler = HandlerMethod::builder(class(), "deferred")
        .path("/deferred")
        .returns(TypeDesc::Str)
        .invoker(invoker(|_| {
            let deferred = DeferredResult::new();
            let completer = deferred.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                completer.set_result(Value::from("ready"));
            });
            Ok(ReturnValue::Deferred(deferred))
        }))
        .build()
        .unwrap();
    deployment.deploy(handler).unwrap();

    let resp = get(&deployment, "/deferred").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.body(), b"ready");
}

#[tokio::test]
async fn test_response_status_annotation() {
    let mut deployment = Deployment::default();
    let class = Arc::new(ClassMeta::new("Created").annotate(Annotation::ResponseStatus(201)));
    let handler = HandlerMethod::builder(class, "create")
        .path("/items")
        .http_method(HttpMethod::POST)
        .returns(TypeDesc::Str)
        .invoker(sync_invoker(|_| Ok(Value::from("created"))))
        .build()
        .unwrap();
    deployment.deploy(handler).unwrap();

    let mut request = AsyncRequest::new(HttpMethod::POST, "/items");
    let mut response = AsyncResponse::new();
    deployment.dispatch(&mut request, &mut response).await;
    assert_eq!(response.status(), 201);
    assert_eq!(response.body(), b"created");
}

#[tokio::test]
async fn test_argument_error_skips_interceptors() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut deployment = Deployment::default();
    deployment.add_interceptor(recorder("a", 0, true, &log));
    let handler = HandlerMethod::builder(class(), "strict")
        .path("/strict")
        .param(
            "id",
            TypeDesc::I32,
            Annotations::new().with(Annotation::RequestParam(NamedValue::new("id"))),
        )
        .invoker(sync_invoker(|_| Ok(Value::Null)))
        .build()
        .unwrap();
    deployment.deploy(handler).unwrap();

    let resp = get(&deployment, "/strict").await;
    assert_eq!(resp.status(), 400);
    assert!(log.lock().is_empty());
}
