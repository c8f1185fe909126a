//! Proxy integration tests
//!
//! Drive the router with `tower::ServiceExt::oneshot` against a wiremock
//! upstream standing in for Ollama.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chatrelay::proxy::{router, UpstreamMode, UPSTREAM_HEADER};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_json, header as wm_header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn body_json_of(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn tags_are_relayed_in_fixed_mode() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "llama3.2:latest", "size": 2019393189}]
        })))
        .mount(&upstream)
        .await;

    let app = router(UpstreamMode::Fixed(upstream.uri())).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/ollama/tags")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
    let body = body_json_of(response).await;
    assert_eq!(body["models"][0]["name"], "llama3.2:latest");
}

#[tokio::test]
async fn tags_upstream_failure_yields_200_with_empty_list() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;

    let app = router(UpstreamMode::Fixed(upstream.uri())).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/ollama/tags")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json_of(response).await;
    assert_eq!(body["models"], json!([]));
    assert!(body["error"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn tags_unreachable_upstream_yields_200_with_empty_list() {
    // Nothing listens on port 1.
    let app = router(UpstreamMode::Fixed("http://127.0.0.1:1".to_string())).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/ollama/tags")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json_of(response).await;
    assert_eq!(body["models"], json!([]));
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn tags_header_mode_missing_header_yields_200_with_error() {
    let app = router(UpstreamMode::Header).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/ollama/tags")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json_of(response).await;
    assert_eq!(body["models"], json!([]));
    assert!(body["error"].as_str().unwrap().contains(UPSTREAM_HEADER));
}

#[tokio::test]
async fn tags_header_mode_uses_header_url() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"models": [{"name": "m:1"}]})),
        )
        .mount(&upstream)
        .await;

    let app = router(UpstreamMode::Header).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/ollama/tags")
                .header(UPSTREAM_HEADER, upstream.uri())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json_of(response).await;
    assert_eq!(body["models"][0]["name"], "m:1");
}

#[tokio::test]
async fn chat_relays_ndjson_stream_unchanged() {
    let ndjson = concat!(
        "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
    );
    let request_body = json!({
        "model": "llama3.2:latest",
        "messages": [{"role": "user", "content": "hi"}],
        "stream": true
    });

    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(&request_body))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(ndjson.as_bytes(), "application/x-ndjson"),
        )
        .mount(&upstream)
        .await;

    let app = router(UpstreamMode::Fixed(upstream.uri())).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ollama/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-ndjson"
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.as_ref(), ndjson.as_bytes());
}

#[tokio::test]
async fn chat_relays_upstream_error_status() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string("{\"error\":\"model not found\"}"),
        )
        .mount(&upstream)
        .await;

    let app = router(UpstreamMode::Fixed(upstream.uri())).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ollama/chat")
                .body(Body::from("{\"model\":\"missing\",\"messages\":[]}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(std::str::from_utf8(&bytes).unwrap().contains("model not found"));
}

#[tokio::test]
async fn chat_header_mode_missing_header_is_400() {
    let app = router(UpstreamMode::Header).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ollama/chat")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json_of(response).await;
    assert!(body["error"].as_str().unwrap().contains(UPSTREAM_HEADER));
}

#[tokio::test]
async fn chat_unreachable_upstream_is_503() {
    let app = router(UpstreamMode::Fixed("http://127.0.0.1:1".to_string())).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ollama/chat")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn preflight_carries_cors_headers() {
    let app = router(UpstreamMode::Header).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/ollama/chat")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    assert!(headers
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("POST"));
    assert!(headers
        .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
        .unwrap()
        .to_str()
        .unwrap()
        .contains(UPSTREAM_HEADER));
}

#[tokio::test]
async fn diagnostics_reports_all_checks() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&upstream)
        .await;

    let app = router(UpstreamMode::Fixed(upstream.uri())).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/ollama/diagnostics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json_of(response).await;
    assert!(body["timestamp"].is_string());
    assert_eq!(body["tests"]["url_parsing"]["success"], true);
    assert_eq!(body["tests"]["dns_resolution"]["success"], true);
    assert_eq!(body["tests"]["basic_connectivity"]["success"], true);
}

#[tokio::test]
async fn diagnostics_records_failed_probe_as_data() {
    let app = router(UpstreamMode::Fixed("http://127.0.0.1:1".to_string())).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/ollama/diagnostics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // The failing check is part of the report, not an HTTP error.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json_of(response).await;
    assert_eq!(body["tests"]["basic_connectivity"]["success"], false);
}

#[tokio::test]
async fn diagnostics_header_mode_missing_header_is_400() {
    let app = router(UpstreamMode::Header).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/ollama/diagnostics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_forwards_custom_header_upstream_url() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(wm_header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "{\"message\":{\"content\":\"ok\"},\"done\":true}\n".as_bytes(),
            "application/x-ndjson",
        ))
        .mount(&upstream)
        .await;

    let app = router(UpstreamMode::Header).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ollama/chat")
                .header(UPSTREAM_HEADER, upstream.uri())
                .body(Body::from("{\"model\":\"m\",\"messages\":[]}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
