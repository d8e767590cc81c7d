use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use rpcwire::{
    transport::http::{router, router_with_limit, start_server, HttpServerConfig, HttpTransport},
    Client, ClientConfig, ClientError, EndpointMap, ErrorCode, Handler, Json, TransportError,
};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tower::ServiceExt;

#[derive(Serialize)]
struct User {
    id: i64,
    name: String,
}

fn test_endpoints() -> EndpointMap {
    EndpointMap::new()
        .with("ping", || async { anyhow::Ok("pong") })
        .with("add", |a: i64, b: i64| async move { anyhow::Ok(a + b) })
        .with("getUser", |id: i64| async move {
            anyhow::Ok(Json(User {
                id,
                name: format!("User {id}"),
            }))
        })
        .with("throwError", || async {
            Err::<(), _>(anyhow::anyhow!("Test error"))
        })
        .with("returnDate", || async {
            anyhow::Ok(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        })
        .with("nextDay", |dt: DateTime<Utc>| async move {
            anyhow::Ok(dt + chrono::Duration::days(1))
        })
        .with("slow", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            anyhow::Ok(())
        })
}

fn app() -> Router {
    router(Handler::new(test_endpoints()), "/rpc")
}

async fn send(app: Router, method: Method, uri: &str, body: impl Into<Body>) -> (StatusCode, JsonValue) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(app: Router, uri: &str, body: JsonValue) -> (StatusCode, JsonValue) {
    send(app, Method::POST, uri, body.to_string()).await
}

#[tokio::test]
async fn successful_call() {
    let (status, body) = post(app(), "/rpc", json!({"endpoint": "ping", "params": []})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["json"], "pong");
}

#[tokio::test]
async fn call_with_params() {
    let (status, body) = post(app(), "/rpc", json!({"endpoint": "add", "params": [5, 3]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["json"], 8);
}

#[tokio::test]
async fn complex_return_types() {
    let (status, body) = post(app(), "/rpc", json!({"endpoint": "getUser", "params": [123]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["json"], json!({"id": 123, "name": "User 123"}));
}

#[tokio::test]
async fn custom_and_nested_paths() {
    let custom = router(Handler::new(test_endpoints()), "/api/rpc");
    let (status, body) = post(custom, "/api/rpc", json!({"endpoint": "ping", "params": []})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["json"], "pong");

    let nested = Router::new().nest("/v1", router(Handler::new(test_endpoints()), "/api/rpc"));
    let (status, body) = post(nested, "/v1/api/rpc", json!({"endpoint": "ping", "params": []})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["json"], "pong");
}

#[tokio::test]
async fn unknown_endpoint() {
    let (status, body) = post(app(), "/rpc", json!({"endpoint": "nonExistent", "params": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"error": {"message": "Endpoint 'nonExistent' not found", "code": "ENDPOINT_NOT_FOUND"}})
    );
}

#[tokio::test]
async fn endpoint_errors() {
    let (status, body) = post(app(), "/rpc", json!({"endpoint": "throwError", "params": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        json!({"message": "Test error", "code": "INTERNAL_ERROR"})
    );
}

#[tokio::test]
async fn invalid_request_format() {
    let (status, body) = post(app(), "/rpc", json!({"endpoint": "ping"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        json!({"message": "Invalid RPC request format", "code": "INVALID_REQUEST"})
    );
}

#[tokio::test]
async fn malformed_json() {
    let (status, body) = send(app(), Method::POST, "/rpc", "invalid json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn other_methods_are_rejected() {
    let (status, body) = send(app(), Method::GET, "/rpc", Body::empty()).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["code"], "METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn oversized_body_is_an_adapter_failure() {
    let app = router_with_limit(Handler::new(test_endpoints()), "/rpc", 16);
    let (status, body) = post(app, "/rpc", json!({"endpoint": "add", "params": [5, 3]})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"error": {"message": "Internal server error", "code": "INTERNAL_ERROR"}})
    );
}

#[tokio::test]
async fn dates_are_tagged() {
    let (status, body) = post(app(), "/rpc", json!({"endpoint": "returnDate", "params": []})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["json"], "2024-01-01T00:00:00.000Z");
    assert_eq!(body["data"]["meta"]["values"][""], "Date");
}

async fn serve() -> String {
    let addr = start_server(Handler::new(test_endpoints()), &HttpServerConfig::default())
        .await
        .unwrap();
    format!("http://{addr}/rpc")
}

#[tokio::test]
async fn client_over_network() {
    let client = Client::new(HttpTransport::new(serve().await));

    let sum: i64 = client.call("add", (5, 3)).await.unwrap();
    assert_eq!(sum, 8);

    let dt = Utc.with_ymd_and_hms(2024, 2, 28, 12, 0, 0).unwrap();
    let next: DateTime<Utc> = client.call("nextDay", (dt,)).await.unwrap();
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap());
}

#[tokio::test]
async fn client_sees_remote_error_codes() {
    let client = Client::new(HttpTransport::new(serve().await));

    let err = client.call::<_, ()>("throwError", ()).await.unwrap_err();
    assert_eq!(err.to_string(), "Test error");
    assert_eq!(err.code(), Some(&ErrorCode::InternalError));

    let err = client.call::<_, ()>("nope", ()).await.unwrap_err();
    assert_eq!(err.code(), Some(&ErrorCode::EndpointNotFound));
}

#[tokio::test]
async fn client_reports_bare_status_failures() {
    let url = serve().await.replace("/rpc", "/elsewhere");
    let client = Client::new(HttpTransport::new(url));

    let err = client.call::<_, ()>("ping", ()).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Transport(TransportError::Status { status: 404, .. })
    ));
    assert_eq!(err.to_string(), "RPC call failed: Not Found");
}

#[tokio::test]
async fn client_times_out_on_slow_endpoint() {
    let client = Client::with_config(
        HttpTransport::new(serve().await),
        ClientConfig::default().timeout(Duration::from_millis(50)),
    );
    let err = client.call::<_, ()>("slow", ()).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "RPC call timed out after 50ms");
}
