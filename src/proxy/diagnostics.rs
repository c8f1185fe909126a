//! Upstream connectivity diagnostics
//!
//! Runs three independent checks against the resolved upstream address
//! (URL parsing, DNS resolution, a short HTTP probe) and returns them as
//! one JSON report. Check failures are data, not HTTP errors: only a
//! missing upstream address fails the request itself.

use super::{cors_headers, resolve_base, ProxyState, UPSTREAM_HEADER};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// Timeout for the connectivity probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct DiagnosticsReport {
    timestamp: String,
    ollama_url: String,
    tests: Checks,
}

#[derive(Debug, Serialize)]
struct Checks {
    url_parsing: CheckResult,
    dns_resolution: CheckResult,
    basic_connectivity: CheckResult,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckResult {
    fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: Some(detail.into()),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: None,
            error: Some(error.into()),
        }
    }
}

/// `GET /api/ollama/diagnostics`
pub(super) async fn report(State(state): State<ProxyState>, headers: HeaderMap) -> Response {
    let Some(base) = resolve_base(&state.mode, &headers) else {
        return (
            StatusCode::BAD_REQUEST,
            cors_headers(),
            axum::Json(json!({
                "error": format!("Missing {} header", UPSTREAM_HEADER)
            })),
        )
            .into_response();
    };

    let url_parsing = check_url(&base);
    let dns_resolution = check_dns(&base).await;
    let basic_connectivity = check_connectivity(&state, &base).await;

    let report = DiagnosticsReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        ollama_url: base,
        tests: Checks {
            url_parsing,
            dns_resolution,
            basic_connectivity,
        },
    };

    (StatusCode::OK, cors_headers(), axum::Json(report)).into_response()
}

fn check_url(base: &str) -> CheckResult {
    match url::Url::parse(base) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => CheckResult::ok(format!(
                "scheme={}, host={}, port={}",
                parsed.scheme(),
                host,
                parsed.port_or_known_default().unwrap_or(0)
            )),
            None => CheckResult::failed("URL has no host"),
        },
        Err(e) => CheckResult::failed(format!("Invalid URL: {}", e)),
    }
}

async fn check_dns(base: &str) -> CheckResult {
    let parsed = match url::Url::parse(base) {
        Ok(p) => p,
        Err(e) => return CheckResult::failed(format!("Invalid URL: {}", e)),
    };
    let Some(host) = parsed.host_str() else {
        return CheckResult::failed("URL has no host");
    };
    let port = parsed.port_or_known_default().unwrap_or(80);

    let result = match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => {
            let resolved: Vec<String> = addrs.map(|a| a.ip().to_string()).collect();
            if resolved.is_empty() {
                CheckResult::failed("Host resolved to no addresses")
            } else {
                CheckResult::ok(format!("Resolved to {}", resolved.join(", ")))
            }
        }
        Err(e) => CheckResult::failed(format!("Lookup failed: {}", e)),
    };
    result
}

async fn check_connectivity(state: &ProxyState, base: &str) -> CheckResult {
    let url = format!("{}/api/tags", base);
    match state
        .client
        .get(&url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            CheckResult::ok(format!("HTTP {}", response.status().as_u16()))
        }
        Ok(response) => {
            CheckResult::failed(format!("Upstream returned HTTP {}", response.status()))
        }
        Err(e) => CheckResult::failed(format!("Probe failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_url_valid() {
        let result = check_url("http://localhost:11434");
        assert!(result.success);
        assert!(result.detail.unwrap().contains("host=localhost"));
    }

    #[test]
    fn test_check_url_invalid() {
        let result = check_url("not a url");
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_check_url_default_port() {
        let result = check_url("http://example.com");
        assert!(result.success);
        assert!(result.detail.unwrap().contains("port=80"));
    }

    #[tokio::test]
    async fn test_check_dns_localhost_resolves() {
        let result = check_dns("http://localhost:11434").await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_check_dns_invalid_url() {
        let result = check_dns("::::").await;
        assert!(!result.success);
    }

    #[test]
    fn test_check_result_serialization_omits_empty_fields() {
        let ok = serde_json::to_string(&CheckResult::ok("fine")).unwrap();
        assert!(!ok.contains("error"));
        let failed = serde_json::to_string(&CheckResult::failed("broken")).unwrap();
        assert!(!failed.contains("detail"));
    }
}
