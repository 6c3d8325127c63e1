use restlight_core::route::COMPATIBLE_MEDIA_TYPES;
use restlight_core::*;
use std::sync::Arc;

fn text_handler(name: &str, reply: &'static str) -> HandlerMethodBuilder {
    HandlerMethod::builder(Arc::new(ClassMeta::new("Routes")), name)
        .returns(TypeDesc::Str)
        .invoker(sync_invoker(move |_| Ok(Value::from(reply))))
}

async fn send(deployment: &Deployment, mut request: AsyncRequest) -> AsyncResponse {
    let mut response = AsyncResponse::new();
    deployment.dispatch(&mut request, &mut response).await;
    response
}

fn users() -> Deployment {
    let mut deployment = Deployment::default();
    deployment
        .deploy(
            text_handler("list", "all users")
                .path("/users")
                .http_method(HttpMethod::GET)
                .build()
                .unwrap(),
        )
        .unwrap();
    deployment
        .deploy(
            text_handler("me", "me")
                .path("/users/me")
                .http_method(HttpMethod::GET)
                .build()
                .unwrap(),
        )
        .unwrap();
    deployment
        .deploy(
            text_handler("one", "one user")
                .path("/users/{id}")
                .http_method(HttpMethod::GET)
                .build()
                .unwrap(),
        )
        .unwrap();
    deployment
        .deploy(
            text_handler("delete", "deleted")
                .path("/users/{id}")
                .http_method(HttpMethod::DELETE)
                .build()
                .unwrap(),
        )
        .unwrap();
    deployment
}

#[tokio::test]
async fn test_literal_wins_over_variable() {
    let deployment = users();
    let resp = send(&deployment, AsyncRequest::new(HttpMethod::GET, "/users/me")).await;
    assert_eq!(resp.body(), b"me");
    let resp = send(&deployment, AsyncRequest::new(HttpMethod::GET, "/users/7")).await;
    assert_eq!(resp.body(), b"one user");
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let deployment = users();
    let resp = send(&deployment, AsyncRequest::new(HttpMethod::GET, "/posts")).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.headers().content_type(), Some("text/plain;charset=utf-8"));
}

#[tokio::test]
async fn test_wrong_method_is_not_allowed() {
    let deployment = users();
    let resp = send(&deployment, AsyncRequest::new(HttpMethod::PUT, "/users/7")).await;
    assert_eq!(resp.status(), 405);
    let allow = resp.headers().get("Allow").unwrap();
    assert!(allow.contains("GET"));
    assert!(allow.contains("DELETE"));
}

#[tokio::test]
async fn test_consumes_mismatch_is_unsupported_media_type() {
    let mut deployment = Deployment::default();
    deployment
        .deploy(
            text_handler("create", "created")
                .path("/pets")
                .http_method(HttpMethod::POST)
                .consumes("application/json")
                .build()
                .unwrap(),
        )
        .unwrap();

    let xml = AsyncRequest::builder(HttpMethod::POST, "/pets")
        .content_type("application/xml")
        .build();
    assert_eq!(send(&deployment, xml).await.status(), 415);

    let bare = AsyncRequest::new(HttpMethod::POST, "/pets");
    assert_eq!(send(&deployment, bare).await.status(), 200);
}

#[tokio::test]
async fn test_produces_mismatch_is_not_acceptable() {
    let mut deployment = Deployment::default();
    deployment
        .deploy(
            HandlerMethod::builder(Arc::new(ClassMeta::new("Routes")), "numbers")
                .path("/numbers")
                .produces("application/json")
                .returns(TypeDesc::list(TypeDesc::I32))
                .invoker(sync_invoker(|_| Ok(Value::from(vec![1i32, 2]))))
                .build()
                .unwrap(),
        )
        .unwrap();

    let html = AsyncRequest::builder(HttpMethod::GET, "/numbers")
        .accept("text/html")
        .build();
    assert_eq!(send(&deployment, html).await.status(), 406);

    let json = AsyncRequest::builder(HttpMethod::GET, "/numbers")
        .accept("application/json")
        .build();
    let resp = send(&deployment, json).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.body(), b"[1,2]");
}

#[tokio::test]
async fn test_compatible_media_types_attribute() {
    let mut deployment = Deployment::default();
    deployment
        .deploy(
            text_handler("pets", "pets")
                .path("/pets")
                .produces("application/json")
                .produces("application/x-protobuf")
                .build()
                .unwrap(),
        )
        .unwrap();

    let mut request = AsyncRequest::builder(HttpMethod::GET, "/pets")
        .accept("application/x-protobuf")
        .build();
    let mut response = AsyncResponse::new();
    deployment.dispatch(&mut request, &mut response).await;
    let compatible = request
        .attributes()
        .get::<Vec<MediaType>>(COMPATIBLE_MEDIA_TYPES)
        .unwrap();
    assert_eq!(compatible, &vec![MediaType::protobuf()]);
}

#[tokio::test]
async fn test_header_condition_selects_route() {
    let mut deployment = Deployment::default();
    deployment
        .deploy(
            text_handler("v1", "v1")
                .path("/api")
                .header_condition("X-Version=1")
                .build()
                .unwrap(),
        )
        .unwrap();
    deployment
        .deploy(
            text_handler("v2", "v2")
                .path("/api")
                .header_condition("X-Version=2")
                .build()
                .unwrap(),
        )
        .unwrap();

    let v2 = AsyncRequest::builder(HttpMethod::GET, "/api")
        .header("X-Version", "2")
        .build();
    assert_eq!(send(&deployment, v2).await.body(), b"v2");

    let none = AsyncRequest::new(HttpMethod::GET, "/api");
    assert_eq!(send(&deployment, none).await.status(), 404);
}

#[test]
fn test_ambiguous_routes_rejected_when_configured() {
    let options = RestlightOptions::new().reject_ambiguous_routes(true);
    let mut deployment = Deployment::new(options);
    deployment
        .deploy(text_handler("a", "a").path("/items/{id}").build().unwrap())
        .unwrap();
    let err = deployment
        .deploy(text_handler("b", "b").path("/items/{name}").build().unwrap())
        .unwrap_err();
    assert!(err.is_configuration_error());

    let mut lenient = Deployment::default();
    lenient
        .deploy(text_handler("a", "a").path("/items/{id}").build().unwrap())
        .unwrap();
    lenient
        .deploy(text_handler("b", "b").path("/items/{name}").build().unwrap())
        .unwrap();
    assert_eq!(lenient.router().len(), 2);
}

#[tokio::test]
async fn test_repeated_dispatch_is_stable() {
    let deployment = users();
    for _ in 0..2 {
        let resp = send(&deployment, AsyncRequest::new(HttpMethod::GET, "/users")).await;
        assert_eq!(resp.body(), b"all users");
    }
}

#[tokio::test]
async fn test_custom_exception_resolver() {
    struct Teapot;

    impl ExceptionResolver for Teapot {
        fn resolve(&self, _error: &Error, _request: &AsyncRequest, response: &mut AsyncResponse) {
            response.set_status(418);
            let _ = response.send_result("teapot");
        }
    }

    let mut deployment = users();
    deployment.set_exception_resolver(Arc::new(Teapot));
    let resp = send(&deployment, AsyncRequest::new(HttpMethod::GET, "/nowhere")).await;
    assert_eq!(resp.status(), 418);
    assert_eq!(resp.body(), b"teapot");
}
