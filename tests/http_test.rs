//! Calls through the built-in HTTP markers against a local axum server

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use callbox::config::Config;
use callbox::descriptor::{Interface, MethodSpec, ParamSpec, ReturnKind};
use callbox::handlers::HandlerResolver;
use callbox::markers::{
    Body, Endpoint, ExpectStatus, Header, HeaderParam, PathParam, QueryParam, Request,
    ResponseAs, Retry, Timeout,
};
use callbox::{Arg, CallError, ClientBuilder, Data, RemoteClient};

#[derive(Default)]
struct ServerState {
    flaky_hits: AtomicUsize,
}

async fn get_user(
    Path(id): Path<u64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "id": id,
        "name": "ada",
        "fields": query.get("fields"),
        "request_id": header("x-request-id"),
        "api_key": header("x-api-key"),
    }))
}

async fn echo(headers: HeaderMap, body: String) -> impl IntoResponse {
    let content_type = headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();
    (
        [("content-type", "text/plain; charset=utf-8")],
        format!("{} | {}", content_type, body),
    )
}

async fn flaky(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let hit = state.flaky_hits.fetch_add(1, Ordering::SeqCst) + 1;
    if hit < 3 {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"hit": hit})));
    }
    (StatusCode::OK, Json(json!({"hit": hit})))
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(2)).await;
    "too late"
}

async fn missing() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "no such thing"})))
}

async fn created() -> impl IntoResponse {
    (StatusCode::CREATED, Json(json!({"created": true})))
}

async fn garbled() -> impl IntoResponse {
    ([("content-type", "application/json")], "{not json")
}

async fn user_agent(headers: HeaderMap) -> String {
    headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string()
}

async fn plain_json() -> &'static str {
    r#"{"served_as": "text/plain"}"#
}

/// Start the mock server on an ephemeral port and return its base URL
async fn start_mock_server() -> String {
    let state = Arc::new(ServerState::default());
    let app = Router::new()
        .route("/users/{id}", get(get_user))
        .route("/echo", post(echo))
        .route("/flaky", get(flaky))
        .route("/slow", get(slow))
        .route("/missing", get(missing))
        .route("/created", post(created))
        .route("/garbled", get(garbled))
        .route("/plain", get(plain_json))
        .route("/ua", get(user_agent))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    format!("http://{}", bound_addr)
}

fn build_client(base_url: &str, methods: Vec<MethodSpec>) -> RemoteClient {
    let mut interface = Interface::new("Api")
        .marker(Endpoint::url(base_url))
        .marker(Header::new("x-api-key", "secret"));
    for method in methods {
        interface = interface.method(method);
    }
    ClientBuilder::new(Config::default())
        .resolver(Arc::new(HandlerResolver::with_builtins()))
        .build(interface)
        .expect("client should build")
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: u64,
    name: String,
    fields: Option<String>,
    request_id: Option<String>,
    api_key: Option<String>,
}

#[tokio::test]
async fn test_json_get_with_bound_params() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![
            MethodSpec::new("get_user", ReturnKind::Json)
                .marker(Request::get("/users/{id}"))
                .param(ParamSpec::value("id").marker(PathParam::new()))
                .param(ParamSpec::value("fields").marker(QueryParam::new()))
                .param(ParamSpec::value("request_id").marker(HeaderParam::named("x-request-id"))),
        ],
    );

    let user: User = client
        .call("get_user", vec![42u64.into(), "name,email".into(), "req-7".into()])
        .await
        .unwrap();

    assert_eq!(
        user,
        User {
            id: 42,
            name: "ada".into(),
            fields: Some("name,email".into()),
            request_id: Some("req-7".into()),
            api_key: Some("secret".into()),
        }
    );
    assert_eq!(client.metrics().snapshot().calls_succeeded, 1);
}

#[tokio::test]
async fn test_null_query_param_is_omitted() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![
            MethodSpec::new("get_user", ReturnKind::Json)
                .marker(Request::get("/users/{id}"))
                .param(ParamSpec::value("id").marker(PathParam::new()))
                .param(ParamSpec::value("fields").marker(QueryParam::new())),
        ],
    );

    let user: User = client
        .call("get_user", vec![1u64.into(), Arg::Null])
        .await
        .unwrap();
    assert_eq!(user.fields, None);
}

#[tokio::test]
async fn test_text_body_round_trip() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![
            MethodSpec::new("echo", ReturnKind::Text)
                .marker(Request::post("/echo"))
                .param(ParamSpec::value("message").marker(Body::text())),
        ],
    );

    let result = client.invoke("echo", vec!["héllo".into()]).await.unwrap();

    assert_eq!(
        result,
        Some(Data::Text("text/plain; charset=utf-8 | héllo".into()))
    );
}

#[tokio::test]
async fn test_json_body_sets_content_type() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![
            MethodSpec::new("echo", ReturnKind::Text)
                .marker(Request::post("/echo"))
                .param(ParamSpec::value("payload").marker(Body::json())),
        ],
    );

    let result = client
        .invoke("echo", vec![Arg::Value(json!({"a": 1}))])
        .await
        .unwrap();

    assert_eq!(result, Some(Data::Text(r#"application/json | {"a":1}"#.into())));
}

#[tokio::test]
async fn test_retries_unavailable_until_ok() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![
            MethodSpec::new("flaky", ReturnKind::Json)
                .marker(Request::get("/flaky"))
                .marker(Retry::default().backoff(Duration::from_millis(10))),
        ],
    );

    let result = client.invoke("flaky", vec![]).await.unwrap();

    assert_eq!(result, Some(Data::Json(json!({"hit": 3}))));
    let metrics = client.metrics().snapshot();
    assert_eq!(metrics.attempts, 3);
    assert_eq!(metrics.retries, 2);
}

#[tokio::test]
async fn test_retry_budget_exhausted_returns_last_response() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![
            MethodSpec::new("flaky", ReturnKind::Json)
                .marker(Request::get("/flaky"))
                .marker(Retry::default().max_retries(1)),
        ],
    );

    let result = client.invoke("flaky", vec![]).await.unwrap();

    // Second 503 is past the budget and comes back as the call's data
    assert_eq!(result, Some(Data::Json(json!({"hit": 2}))));
    assert_eq!(client.metrics().snapshot().attempts, 2);
}

#[tokio::test]
async fn test_unsuccessful_status_returns_data_without_retry() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![MethodSpec::new("missing", ReturnKind::Json).marker(Request::get("/missing"))],
    );

    let result = client.invoke("missing", vec![]).await.unwrap();

    assert_eq!(result, Some(Data::Json(json!({"error": "no such thing"}))));
    assert_eq!(client.metrics().snapshot().attempts, 1);
}

#[tokio::test]
async fn test_expected_status_list() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![
            MethodSpec::new("create", ReturnKind::Json)
                .marker(Request::post("/created"))
                .marker(ExpectStatus::codes([201]))
                .marker(Retry::default().statuses([201])),
        ],
    );

    // 201 is a success here, so the retry rule for it never fires
    let result = client.invoke("create", vec![]).await.unwrap();

    assert_eq!(result, Some(Data::Json(json!({"created": true}))));
    assert_eq!(client.metrics().snapshot().attempts, 1);
}

#[tokio::test]
async fn test_timeout_is_swallowed_without_retry() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![
            MethodSpec::new("slow", ReturnKind::Text)
                .marker(Request::get("/slow"))
                .marker(Timeout::millis(100)),
        ],
    );

    let started = std::time::Instant::now();
    let result = client.invoke("slow", vec![]).await.unwrap();

    assert!(result.is_none());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_timeout_retried_then_given_up() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![
            MethodSpec::new("slow", ReturnKind::Text)
                .marker(Request::get("/slow"))
                .marker(Timeout::millis(50))
                .marker(Retry::default().max_retries(2)),
        ],
    );

    let result = client.invoke("slow", vec![]).await.unwrap();

    assert!(result.is_none());
    let metrics = client.metrics().snapshot();
    assert_eq!(metrics.attempts, 3);
    assert_eq!(metrics.retries, 2);
}

#[tokio::test]
async fn test_invalid_json_is_fatal() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![MethodSpec::new("garbled", ReturnKind::Json).marker(Request::get("/garbled"))],
    );

    let err = client.invoke("garbled", vec![]).await.unwrap_err();

    match err {
        CallError::Fatal(message) => assert!(message.contains("invalid json")),
        other => panic!("expected a fatal error, got {:?}", other),
    }
    assert_eq!(client.metrics().snapshot().calls_failed, 1);
}

#[tokio::test]
async fn test_response_type_override() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![
            MethodSpec::new("plain", ReturnKind::Json)
                .marker(Request::get("/plain"))
                .return_marker(ResponseAs::mime("application/json")),
        ],
    );

    let result = client.invoke("plain", vec![]).await.unwrap();
    assert_eq!(result, Some(Data::Json(json!({"served_as": "text/plain"}))));
}

#[tokio::test]
async fn test_bytes_return_kind() {
    let base_url = start_mock_server().await;
    let client = build_client(
        &base_url,
        vec![MethodSpec::new("plain", ReturnKind::Bytes).marker(Request::get("/plain"))],
    );

    let result = client.invoke("plain", vec![]).await.unwrap();
    let bytes = result.as_ref().and_then(Data::as_bytes).unwrap();
    assert_eq!(bytes.as_ref(), br#"{"served_as": "text/plain"}"#);
}

#[tokio::test]
async fn test_connection_refused_with_retry() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = build_client(
        &format!("http://{}", addr),
        vec![
            MethodSpec::new("get", ReturnKind::Json)
                .marker(Request::get("/"))
                .marker(Retry::default().max_retries(2)),
        ],
    );

    let result = client.invoke("get", vec![]).await.unwrap();

    assert!(result.is_none());
    assert_eq!(client.metrics().snapshot().attempts, 3);
}

#[tokio::test]
async fn test_clients_on_one_resolver_keep_their_settings() {
    let base_url = start_mock_server().await;
    let resolver = Arc::new(HandlerResolver::with_builtins());

    let client_with_agent = |agent: &str| {
        let mut config = Config::default();
        config.client.user_agent = agent.to_string();
        let interface = Interface::new("Api")
            .marker(Endpoint::url(base_url.as_str()))
            .method(MethodSpec::new("ua", ReturnKind::Text).marker(Request::get("/ua")));
        ClientBuilder::new(config)
            .resolver(resolver.clone())
            .build(interface)
            .unwrap()
    };
    let first = client_with_agent("agent-a");
    let second = client_with_agent("agent-b");

    let a = first.invoke("ua", vec![]).await.unwrap();
    let b = second.invoke("ua", vec![]).await.unwrap();

    assert_eq!(a, Some(Data::Text("agent-a".into())));
    assert_eq!(b, Some(Data::Text("agent-b".into())));
}
