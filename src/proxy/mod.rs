//! Streaming proxy in front of an Ollama server
//!
//! Exposes `/api/ollama/tags`, `/api/ollama/chat`, and
//! `/api/ollama/diagnostics` for browser clients that cannot reach the
//! upstream directly (CORS). The upstream base address comes either from
//! a fixed server-side configuration or from the `x-ollama-url` request
//! header; the mode is chosen per deployment and never mixed.
//!
//! The proxy is stateless: no caching, no retries, no per-client state.
//! Chat responses are relayed as an unbuffered byte stream so the first
//! token reaches the browser as soon as the upstream emits it.

pub mod diagnostics;

use crate::error::{ChatRelayError, Result};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use std::time::Duration;

/// Request header carrying the upstream base URL in header mode
pub const UPSTREAM_HEADER: &str = "x-ollama-url";

/// Timeout for the model-listing forward
const TAGS_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a whole proxied chat turn
const CHAT_TIMEOUT: Duration = Duration::from_secs(120);

/// How the proxy resolves the upstream base address
#[derive(Debug, Clone)]
pub enum UpstreamMode {
    /// Read the base URL from the `x-ollama-url` header on every request
    Header,
    /// Always forward to one configured base URL
    Fixed(String),
}

#[derive(Clone)]
struct ProxyState {
    client: reqwest::Client,
    mode: UpstreamMode,
}

/// Build the proxy router
///
/// # Errors
///
/// Returns error if the HTTP client cannot be initialized
pub fn router(mode: UpstreamMode) -> Result<Router> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("chatrelay/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ChatRelayError::Proxy(format!("Failed to create HTTP client: {}", e)))?;

    let state = ProxyState { client, mode };
    Ok(Router::new()
        .route("/api/ollama/tags", get(tags).options(preflight))
        .route("/api/ollama/chat", post(chat).options(preflight))
        .route(
            "/api/ollama/diagnostics",
            get(diagnostics::report).options(preflight),
        )
        .with_state(state))
}

/// Resolve the upstream base for one request, trailing slash stripped
fn resolve_base(mode: &UpstreamMode, headers: &HeaderMap) -> Option<String> {
    let raw = match mode {
        UpstreamMode::Fixed(url) => url.clone(),
        UpstreamMode::Header => headers
            .get(UPSTREAM_HEADER)
            .and_then(|v| v.to_str().ok())?
            .to_string(),
    };
    Some(raw.trim_end_matches('/').to_string())
}

fn cors_headers() -> [(header::HeaderName, &'static str); 3] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            "Content-Type, x-ollama-url",
        ),
    ]
}

async fn preflight() -> Response {
    (StatusCode::NO_CONTENT, cors_headers()).into_response()
}

/// Forward the model listing
///
/// Every failure, including a missing header in header mode, responds
/// HTTP 200 with an empty list and a diagnostic so the browser UI can
/// render the empty state instead of choking on the status.
async fn tags(State(state): State<ProxyState>, headers: HeaderMap) -> Response {
    let Some(base) = resolve_base(&state.mode, &headers) else {
        return tags_fallback(format!("Missing {} header", UPSTREAM_HEADER));
    };

    let url = format!("{}/api/tags", base);
    tracing::debug!("Forwarding tags request to {}", url);

    let response = match state
        .client
        .get(&url)
        .timeout(TAGS_TIMEOUT)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            let (_, message) = classify_failure(&e);
            return tags_fallback(message);
        }
    };

    if !response.status().is_success() {
        return tags_fallback(format!("Upstream returned HTTP {}", response.status()));
    }

    match response.json::<serde_json::Value>().await {
        Ok(body) => (StatusCode::OK, cors_headers(), axum::Json(body)).into_response(),
        Err(e) => tags_fallback(format!("Unparseable upstream response: {}", e)),
    }
}

fn tags_fallback(message: String) -> Response {
    tracing::warn!("Tags forward failed: {}", message);
    (
        StatusCode::OK,
        cors_headers(),
        axum::Json(json!({ "models": [], "error": message })),
    )
        .into_response()
}

/// Forward a chat request and relay the response stream
///
/// The request body is passed upstream unchanged. A non-success upstream
/// status is relayed as-is; transport failures map to 504 (timeout) or
/// 503 with a cause-specific message.
async fn chat(State(state): State<ProxyState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(base) = resolve_base(&state.mode, &headers) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Missing {} header", UPSTREAM_HEADER),
        );
    };

    let url = format!("{}/api/chat", base);
    tracing::debug!("Forwarding chat request to {} ({} bytes)", url, body.len());

    let response = match state
        .client
        .post(&url)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .timeout(CHAT_TIMEOUT)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            let (status, message) = classify_failure(&e);
            tracing::warn!("Chat forward failed: {}", message);
            return error_response(status, message);
        }
    };

    let status = response.status();
    if !status.is_success() {
        // Relay the upstream's own error verbatim.
        let body = response.bytes().await.unwrap_or_default();
        tracing::warn!("Upstream chat returned HTTP {}", status);
        return (
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            cors_headers(),
            body,
        )
            .into_response();
    }

    (
        StatusCode::OK,
        cors_headers(),
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(response.bytes_stream()),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: String) -> Response {
    (
        status,
        cors_headers(),
        axum::Json(json!({ "error": message })),
    )
        .into_response()
}

/// Map a send failure to a status and a user-facing cause
fn classify_failure(err: &reqwest::Error) -> (StatusCode, String) {
    if err.is_timeout() {
        return (
            StatusCode::GATEWAY_TIMEOUT,
            "Upstream request timed out".to_string(),
        );
    }
    classify_cause(&cause_chain(err))
}

/// Collect the lowercased source chain of an error into one string
fn cause_chain(err: &reqwest::Error) -> String {
    let mut chain = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain.to_lowercase()
}

/// Classify a lowercased failure chain into a response
///
/// Kept as a pure string function so the mapping is unit-testable without
/// manufacturing real socket errors.
fn classify_cause(chain: &str) -> (StatusCode, String) {
    if chain.contains("connection refused") {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Connection refused: is the Ollama server running?".to_string(),
        )
    } else if chain.contains("dns error")
        || chain.contains("failed to lookup")
        || chain.contains("name or service not known")
    {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Could not resolve the Ollama host".to_string(),
        )
    } else if chain.contains("certificate") {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "TLS certificate problem talking to the Ollama server".to_string(),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Could not reach the Ollama server".to_string(),
        )
    }
}
