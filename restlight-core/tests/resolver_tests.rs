use parking_lot::Mutex;
use restlight_core::http::Cookie;
use restlight_core::*;
use std::collections::BTreeMap;
use std::sync::Arc;

type Captured = Arc<Mutex<Option<Args>>>;

fn capture() -> (Invoker, Captured) {
    let captured: Captured = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let invoker = sync_invoker(move |args| {
        *sink.lock() = Some(args);
        Ok(Value::Null)
    });
    (invoker, captured)
}

fn single(
    path: &str,
    name: &str,
    ty: TypeDesc,
    annotation: Annotation,
) -> (Deployment, Captured) {
    let (invoker, captured) = capture();
    let mut deployment = Deployment::default();
    let handler = HandlerMethod::builder(Arc::new(ClassMeta::new("Resolvers")), "handle")
        .path(path)
        .param(name, ty, Annotations::new().with(annotation))
        .invoker(invoker)
        .build()
        .unwrap();
    deployment.deploy(handler).unwrap();
    (deployment, captured)
}

async fn run(deployment: &Deployment, mut request: AsyncRequest) -> AsyncResponse {
    let mut response = AsyncResponse::new();
    deployment.dispatch(&mut request, &mut response).await;
    response
}

fn first_arg(captured: &Captured) -> Value {
    captured
        .lock()
        .as_ref()
        .and_then(|args| args.get(0).cloned())
        .expect("handler was not invoked")
}

#[tokio::test]
async fn test_cookie_value_as_string() {
    let (deployment, captured) = single(
        "/",
        "foo",
        TypeDesc::Str,
        Annotation::CookieValue(NamedValue::new("foo")),
    );
    let req = AsyncRequest::builder(HttpMethod::GET, "/")
        .header("Cookie", "foo=1; bar=2")
        .build();
    let resp = run(&deployment, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(first_arg(&captured), Value::from("1"));
}

#[tokio::test]
async fn test_cookie_object_and_set() {
    let (deployment, captured) = single(
        "/",
        "foo",
        TypeDesc::Cookie,
        Annotation::CookieValue(NamedValue::new("foo")),
    );
    let req = AsyncRequest::builder(HttpMethod::GET, "/").cookie("foo", "1").build();
    run(&deployment, req).await;
    assert_eq!(first_arg(&captured), Value::Cookie(Cookie::new("foo", "1")));

    let (deployment, captured) = single(
        "/",
        "all",
        TypeDesc::set(TypeDesc::Cookie),
        Annotation::CookieValue(NamedValue::unnamed()),
    );
    let req = AsyncRequest::builder(HttpMethod::GET, "/")
        .header("Cookie", "a=1; b=2; a=1")
        .build();
    run(&deployment, req).await;
    assert_eq!(
        first_arg(&captured),
        Value::Set(vec![
            Value::Cookie(Cookie::new("a", "1")),
            Value::Cookie(Cookie::new("b", "2")),
        ])
    );
}

#[tokio::test]
async fn test_missing_required_cookie_is_bad_request() {
    let (deployment, captured) = single(
        "/",
        "session",
        TypeDesc::Str,
        Annotation::CookieValue(NamedValue::new("session")),
    );
    let resp = run(&deployment, AsyncRequest::new(HttpMethod::GET, "/")).await;
    assert_eq!(resp.status(), 400);
    assert!(String::from_utf8_lossy(resp.body()).contains("session"));
    assert!(captured.lock().is_none());
}

#[tokio::test]
async fn test_header_scalar_takes_first_value() {
    let (deployment, captured) = single(
        "/",
        "token",
        TypeDesc::Str,
        Annotation::RequestHeader(NamedValue::new("X-Token")),
    );
    let req = AsyncRequest::builder(HttpMethod::GET, "/")
        .header("X-Token", "first")
        .header("X-Token", "second")
        .build();
    run(&deployment, req).await;
    assert_eq!(first_arg(&captured), Value::from("first"));
}

#[tokio::test]
async fn test_header_list_takes_every_value() {
    let (deployment, captured) = single(
        "/",
        "ids",
        TypeDesc::list(TypeDesc::I32),
        Annotation::RequestHeader(NamedValue::new("X-Id")),
    );
    let req = AsyncRequest::builder(HttpMethod::GET, "/")
        .header("X-Id", "1")
        .header("X-Id", "2")
        .build();
    run(&deployment, req).await;
    assert_eq!(first_arg(&captured), Value::from(vec![1i32, 2]));
}

#[tokio::test]
async fn test_header_empty_value_falls_back_to_default() {
    let (deployment, captured) = single(
        "/",
        "mode",
        TypeDesc::Str,
        Annotation::RequestHeader(NamedValue::new("X-Mode").default_value("d")),
    );
    let req = AsyncRequest::builder(HttpMethod::GET, "/")
        .header("X-Mode", "")
        .build();
    let resp = run(&deployment, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(first_arg(&captured), Value::from("d"));
}

#[tokio::test]
async fn test_query_default_value() {
    let (deployment, captured) = single(
        "/",
        "page",
        TypeDesc::I32,
        Annotation::RequestParam(NamedValue::new("page").default_value("1")),
    );
    run(&deployment, AsyncRequest::new(HttpMethod::GET, "/")).await;
    assert_eq!(first_arg(&captured), Value::Int(1));

    run(&deployment, AsyncRequest::new(HttpMethod::GET, "/?page=7")).await;
    assert_eq!(first_arg(&captured), Value::Int(7));
}

#[tokio::test]
async fn test_query_conversion_failure_is_bad_request() {
    let (deployment, _) = single(
        "/",
        "page",
        TypeDesc::I32,
        Annotation::RequestParam(NamedValue::new("page")),
    );
    let resp = run(&deployment, AsyncRequest::new(HttpMethod::GET, "/?page=abc")).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_unannotated_param_is_optional_query() {
    let (invoker, captured) = capture();
    let mut deployment = Deployment::default();
    let handler = HandlerMethod::builder(Arc::new(ClassMeta::new("Resolvers")), "search")
        .path("/search")
        .param("q", TypeDesc::Str, Annotations::new())
        .invoker(invoker)
        .build()
        .unwrap();
    deployment.deploy(handler).unwrap();

    run(&deployment, AsyncRequest::new(HttpMethod::GET, "/search")).await;
    assert_eq!(first_arg(&captured), Value::Null);

    run(&deployment, AsyncRequest::new(HttpMethod::GET, "/search?q=rust")).await;
    assert_eq!(first_arg(&captured), Value::from("rust"));
}

#[test]
fn test_named_query_map_fails_deployment() {
    let (invoker, _) = capture();
    let mut deployment = Deployment::default();
    let handler = HandlerMethod::builder(Arc::new(ClassMeta::new("Resolvers")), "all")
        .path("/")
        .param(
            "params",
            TypeDesc::map(TypeDesc::Str),
            Annotations::new().with(Annotation::RequestParam(NamedValue::new("p"))),
        )
        .invoker(invoker)
        .build()
        .unwrap();
    assert!(deployment.deploy(handler).unwrap_err().is_configuration_error());
}

#[tokio::test]
async fn test_path_variable() {
    let (deployment, captured) = single(
        "/users/{id}",
        "id",
        TypeDesc::I64,
        Annotation::PathVariable(NamedValue::unnamed()),
    );
    run(&deployment, AsyncRequest::new(HttpMethod::GET, "/users/42")).await;
    assert_eq!(first_arg(&captured), Value::Int(42));
}

#[tokio::test]
async fn test_matrix_variable_pinned_and_unpinned() {
    let (deployment, captured) = single(
        "/cars/{car}/owners/{owner}",
        "year",
        TypeDesc::I32,
        Annotation::MatrixVariable {
            value: NamedValue::new("year"),
            path_var: Some("owner".to_string()),
        },
    );
    let path = "/cars/bmw;year=2012/owners/ada;year=1990";
    run(&deployment, AsyncRequest::new(HttpMethod::GET, path)).await;
    assert_eq!(first_arg(&captured), Value::Int(1990));

    let (deployment, captured) = single(
        "/cars/{car}/owners/{owner}",
        "color",
        TypeDesc::list(TypeDesc::Str),
        Annotation::MatrixVariable {
            value: NamedValue::new("color"),
            path_var: None,
        },
    );
    let path = "/cars/bmw;color=red,blue/owners/ada";
    run(&deployment, AsyncRequest::new(HttpMethod::GET, path)).await;
    assert_eq!(first_arg(&captured), Value::from(vec!["red", "blue"]));
}

fn matrix_map(path_var: Option<&str>, ty: TypeDesc) -> (Deployment, Captured) {
    single(
        "/cars/{car}/owners/{owner}",
        "vars",
        ty,
        Annotation::MatrixVariable {
            value: NamedValue::unnamed(),
            path_var: path_var.map(str::to_string),
        },
    )
}

fn map_of(entries: &[(&str, Value)]) -> Value {
    Value::Map(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<BTreeMap<_, _>>(),
    )
}

#[tokio::test]
async fn test_matrix_variable_single_and_multi_value_maps() {
    let path = "/cars/bmw;a=1;a=2/owners/ada;b=3";

    let (deployment, captured) = matrix_map(Some("car"), TypeDesc::map(TypeDesc::Str));
    run(&deployment, AsyncRequest::new(HttpMethod::GET, path)).await;
    assert_eq!(first_arg(&captured), map_of(&[("a", Value::from("1"))]));

    let (deployment, captured) =
        matrix_map(Some("car"), TypeDesc::map(TypeDesc::list(TypeDesc::Str)));
    run(&deployment, AsyncRequest::new(HttpMethod::GET, path)).await;
    assert_eq!(first_arg(&captured), map_of(&[("a", Value::from(vec!["1", "2"]))]));

    let (deployment, captured) = matrix_map(None, TypeDesc::map(TypeDesc::list(TypeDesc::Str)));
    run(&deployment, AsyncRequest::new(HttpMethod::GET, path)).await;
    assert_eq!(
        first_arg(&captured),
        map_of(&[
            ("a", Value::from(vec!["1", "2"])),
            ("b", Value::from(vec!["3"])),
        ])
    );

    let (deployment, captured) = matrix_map(None, TypeDesc::map(TypeDesc::Str));
    run(&deployment, AsyncRequest::new(HttpMethod::GET, path)).await;
    assert_eq!(
        first_arg(&captured),
        map_of(&[("a", Value::from("1")), ("b", Value::from("3"))])
    );
}

#[tokio::test]
async fn test_matrix_variable_absent_segment_is_empty_map() {
    let (deployment, captured) = matrix_map(Some("owner"), TypeDesc::map(TypeDesc::Str));
    let resp = run(&deployment, AsyncRequest::new(HttpMethod::GET, "/cars/bmw;a=1/owners/ada")).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(first_arg(&captured), map_of(&[]));
}

#[tokio::test]
async fn test_matrix_variable_absent_key_is_null() {
    let (deployment, captured) = single(
        "/cars/{car}/owners/{owner}",
        "zzz",
        TypeDesc::Str,
        Annotation::MatrixVariable {
            value: NamedValue::new("zzz"),
            path_var: None,
        },
    );
    let path = "/cars/bmw;a=1;a=2/owners/ada;b=3";
    let resp = run(&deployment, AsyncRequest::new(HttpMethod::GET, path)).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(first_arg(&captured), Value::Null);

    let (deployment, captured) = single(
        "/cars/{car}/owners/{owner}",
        "year",
        TypeDesc::I32,
        Annotation::MatrixVariable {
            value: NamedValue::new("year").default_value("2000"),
            path_var: Some("owner".to_string()),
        },
    );
    run(&deployment, AsyncRequest::new(HttpMethod::GET, path)).await;
    assert_eq!(first_arg(&captured), Value::Int(2000));
}

#[tokio::test]
async fn test_matrix_variable_ambiguous_across_segments() {
    let (deployment, captured) = single(
        "/cars/{car}/owners/{owner}",
        "year",
        TypeDesc::I32,
        Annotation::MatrixVariable {
            value: NamedValue::new("year"),
            path_var: None,
        },
    );
    let path = "/cars/bmw;year=2012/owners/ada;year=1990";
    let resp = run(&deployment, AsyncRequest::new(HttpMethod::GET, path)).await;
    assert_eq!(resp.status(), 400);
    assert!(captured.lock().is_none());
}

#[test]
fn test_matrix_variable_unknown_path_var_fails_deployment() {
    let (invoker, _) = capture();
    let mut deployment = Deployment::default();
    let handler = HandlerMethod::builder(Arc::new(ClassMeta::new("Resolvers")), "car")
        .path("/cars/{car}")
        .param(
            "year",
            TypeDesc::I32,
            Annotations::new().with(Annotation::MatrixVariable {
                value: NamedValue::new("year"),
                path_var: Some("owner".to_string()),
            }),
        )
        .invoker(invoker)
        .build()
        .unwrap();
    assert!(deployment.deploy(handler).unwrap_err().is_configuration_error());
}

#[tokio::test]
async fn test_text_body() {
    let (deployment, captured) = single(
        "/echo",
        "body",
        TypeDesc::Str,
        Annotation::RequestBody { required: true },
    );
    let req = AsyncRequest::builder(HttpMethod::POST, "/echo")
        .content_type("text/plain")
        .body("hello")
        .build();
    run(&deployment, req).await;
    assert_eq!(first_arg(&captured), Value::from("hello"));
}

#[tokio::test]
async fn test_empty_required_body_is_bad_request() {
    let (deployment, _) = single(
        "/echo",
        "body",
        TypeDesc::Str,
        Annotation::RequestBody { required: true },
    );
    let resp = run(&deployment, AsyncRequest::new(HttpMethod::POST, "/echo")).await;
    assert_eq!(resp.status(), 400);

    let (deployment, captured) = single(
        "/echo",
        "body",
        TypeDesc::optional(TypeDesc::Str),
        Annotation::RequestBody { required: true },
    );
    let resp = run(&deployment, AsyncRequest::new(HttpMethod::POST, "/echo")).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(first_arg(&captured), Value::Null);
}

#[tokio::test]
async fn test_unreadable_body_is_unsupported_media_type() {
    let (deployment, _) = single(
        "/numbers",
        "numbers",
        TypeDesc::list(TypeDesc::I32),
        Annotation::RequestBody { required: true },
    );
    let req = AsyncRequest::builder(HttpMethod::POST, "/numbers")
        .content_type("application/xml")
        .body("<numbers/>")
        .build();
    let resp = run(&deployment, req).await;
    assert_eq!(resp.status(), 415);
}

#[tokio::test]
async fn test_json_body_list() {
    let (deployment, captured) = single(
        "/numbers",
        "numbers",
        TypeDesc::list(TypeDesc::I32),
        Annotation::RequestBody { required: true },
    );
    let req = AsyncRequest::builder(HttpMethod::POST, "/numbers")
        .content_type("application/json")
        .body("[1, 2, 3]")
        .build();
    run(&deployment, req).await;
    assert_eq!(first_arg(&captured), Value::from(vec![1i32, 2, 3]));
}

#[tokio::test]
async fn test_path_variable_map() {
    let (deployment, captured) = single(
        "/orgs/{org}/repos/{repo}",
        "vars",
        TypeDesc::map(TypeDesc::Str),
        Annotation::PathVariable(NamedValue::unnamed()),
    );
    run(&deployment, AsyncRequest::new(HttpMethod::GET, "/orgs/rust/repos/cargo")).await;
    let vars: std::collections::BTreeMap<String, String> = first_arg(&captured).into_typed().unwrap();
    assert_eq!(vars["org"], "rust");
    assert_eq!(vars["repo"], "cargo");
}

#[derive(Debug, Default)]
struct Paging {
    page: u32,
    token: Option<String>,
}

#[tokio::test]
async fn test_request_bean_binds_fields_from_each_source() {
    let bean = resolver::BeanType::builder::<Paging>()
        .field("page", TypeDesc::U32, |p: &mut Paging, v: u32| p.page = v)
        .annotate("page", Annotation::RequestParam(NamedValue::new("page").default_value("1")))
        .field("token", TypeDesc::Str, |p: &mut Paging, v: String| p.token = Some(v))
        .annotate("token", Annotation::RequestHeader(NamedValue::new("X-Token").optional()))
        .build();
    let ty: TypeDesc = ObjectType::builder::<Paging>().bean(bean).build().into();
    let (deployment, captured) = single("/items", "paging", ty, Annotation::RequestBean);

    let req = AsyncRequest::builder(HttpMethod::GET, "/items?page=3")
        .header("X-Token", "abc")
        .build();
    run(&deployment, req).await;
    let paging: Arc<Paging> = first_arg(&captured).into_arc().unwrap();
    assert_eq!(paging.page, 3);
    assert_eq!(paging.token.as_deref(), Some("abc"));

    run(&deployment, AsyncRequest::new(HttpMethod::GET, "/items")).await;
    let paging: Arc<Paging> = first_arg(&captured).into_arc().unwrap();
    assert_eq!(paging.page, 1);
    assert_eq!(paging.token, None);
    assert_eq!(deployment.bean_cache().len(), 1);
}
