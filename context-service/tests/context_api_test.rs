mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
};
use common::TestApp;
use serde_json::{json, Value};
use service_core::genai::{MockCall, MockGenAi};
use tower::util::ServiceExt;

async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    app.router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn load_context_caches_object_and_returns_handle() {
    let app = TestApp::spawn(MockGenAi::new().with_file_uri("U").with_cache_name("H2")).await;

    let response = send(&app, Method::POST, "/load-context", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["contextCacheName"], "H2");
    assert_eq!(body["message"], "Context loaded and cached successfully");

    assert_eq!(app.state.cache.current().await.as_deref(), Some("H2"));
    assert!(app.scratch_is_empty());

    let uploaded = app.mock.calls().into_iter().find_map(|c| match c {
        MockCall::Upload { contents, .. } => Some(contents),
        _ => None,
    });
    assert_eq!(uploaded.as_deref(), Some(common::CONTEXT_OBJECT));
}

#[tokio::test]
async fn load_context_failure_is_server_error_without_details() {
    let app = TestApp::spawn(MockGenAi::new()).await;
    app.mock.fail_create(true);

    let response = send(&app, Method::POST, "/load-context", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Error loading and caching context mapping");
    assert!(body.get("details").is_none());
    assert!(!app.state.cache.is_loaded().await);
    assert!(app.scratch_is_empty());
}

#[tokio::test]
async fn load_context_with_missing_object_fails_before_upload() {
    let app = TestApp::spawn(MockGenAi::new()).await;
    tokio::fs::remove_file(app.storage_dir.path().join("context.txt"))
        .await
        .unwrap();

    let response = send(&app, Method::POST, "/load-context", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.mock.calls().is_empty());
}

#[tokio::test]
async fn delete_context_without_handle_is_bad_request() {
    let app = TestApp::spawn(MockGenAi::new()).await;

    let response = send(&app, Method::DELETE, "/delete-context", None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.mock.delete_calls().is_empty());
}

#[tokio::test]
async fn delete_context_removes_remote_cache() {
    let app = TestApp::spawn_with_handle(MockGenAi::new(), Some("H")).await;

    let response = send(&app, Method::DELETE, "/delete-context", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Context cache deleted successfully");
    assert_eq!(app.mock.delete_calls(), vec!["H".to_string()]);
    assert!(!app.state.cache.is_loaded().await);
}

#[tokio::test]
async fn delete_context_remote_failure_is_server_error() {
    let app = TestApp::spawn_with_handle(MockGenAi::new(), Some("H")).await;
    app.mock.fail_delete(true);

    let response = send(&app, Method::DELETE, "/delete-context", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!app.state.cache.is_loaded().await);
}

#[tokio::test]
async fn find_match_without_cache_is_unavailable() {
    let app = TestApp::spawn(MockGenAi::new()).await;

    let response = send(
        &app,
        Method::POST,
        "/find-match",
        Some(json!({"data": "x", "prompt": "y"})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(app.mock.generate_calls().is_empty());
}

#[tokio::test]
async fn find_match_without_cache_is_unavailable_even_without_body() {
    let app = TestApp::spawn(MockGenAi::new()).await;

    let response = send(&app, Method::POST, "/find-match", None).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn find_match_with_missing_fields_is_bad_request() {
    let app = TestApp::spawn_with_handle(MockGenAi::new(), Some("H")).await;

    for body in [
        json!({"data": "x"}),
        json!({"prompt": "y"}),
        json!({"data": "", "prompt": "y"}),
    ] {
        let response = send(&app, Method::POST, "/find-match", Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    assert!(app.mock.generate_calls().is_empty());
    assert_eq!(app.state.cache.current().await.as_deref(), Some("H"));
}

#[tokio::test]
async fn find_match_returns_generated_text() {
    let app = TestApp::spawn_with_handle(MockGenAi::new().with_reply("acme-001"), Some("H")).await;

    let response = send(
        &app,
        Method::POST,
        "/find-match",
        Some(json!({"data": "x", "prompt": "y"})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["closestMatch"], "acme-001");

    let calls = app.mock.generate_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].cached_content.as_deref(), Some("H"));
    let joined = calls[0].parts.join("\n");
    assert!(joined.contains('y'));
    assert!(joined.contains('x'));
    assert_eq!(app.state.cache.current().await.as_deref(), Some("H"));
}

#[tokio::test]
async fn find_match_failure_clears_cache_and_next_query_is_unavailable() {
    let app = TestApp::spawn_with_handle(MockGenAi::new(), Some("H")).await;
    app.mock.fail_generate(true);

    let response = send(
        &app,
        Method::POST,
        "/find-match",
        Some(json!({"data": "x", "prompt": "y"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Error finding match");
    assert!(!app.state.cache.is_loaded().await);

    let response = send(
        &app,
        Method::POST,
        "/find-match",
        Some(json!({"data": "x", "prompt": "y"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn context_status_reports_handle() {
    let app = TestApp::spawn_with_handle(MockGenAi::new(), Some("cachedContents/H")).await;

    let response = send(&app, Method::GET, "/context", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["loaded"], true);
    assert_eq!(body["contextCacheName"], "cachedContents/H");
}

#[tokio::test]
async fn full_lifecycle_load_query_delete() {
    let app = TestApp::spawn(MockGenAi::new().with_cache_name("H1").with_reply("globex-002")).await;

    let response = send(&app, Method::POST, "/load-context", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        Method::POST,
        "/find-match",
        Some(json!({"data": {"company": "Globex"}, "prompt": "Return the id"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let calls = app.mock.generate_calls();
    assert!(calls[0].parts[1].contains(r#"{"company":"Globex"}"#));

    let response = send(&app, Method::DELETE, "/delete-context", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, Method::DELETE, "/delete-context", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.config.cache.ttl_seconds, 3600);
}
