//! Shared HTTP plumbing for the external adapters

use std::time::Duration;

use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use core_kernel::{ExternalAuthConfig, ExternalSystemConfig, PortError};

/// Builds a pooled client with the configured per-request timeout
pub(crate) fn build_client(config: &ExternalSystemConfig) -> Result<Client, PortError> {
    ClientBuilder::new()
        .timeout(Duration::from_millis(config.timeout_ms))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| PortError::Connection {
            message: format!("failed to build HTTP client: {}", e),
            source: Some(Box::new(e)),
        })
}

pub(crate) fn authorize(request: RequestBuilder, auth: &ExternalAuthConfig) -> RequestBuilder {
    match auth {
        ExternalAuthConfig::None => request,
        ExternalAuthConfig::BearerToken { token } => request.bearer_auth(token),
    }
}

/// Joins a base URL and path segments with single slashes
pub(crate) fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(&urlencoding::encode(segment.trim_matches('/')));
    }
    url
}

/// Maps a transport-level failure
pub(crate) fn transport_error(err: reqwest::Error, operation: &str, timeout_ms: u64) -> PortError {
    if err.is_timeout() {
        PortError::Timeout {
            operation: operation.to_string(),
            duration_ms: timeout_ms,
        }
    } else {
        PortError::Connection {
            message: format!("{} failed: {}", operation, err),
            source: Some(Box::new(err)),
        }
    }
}

/// Details pulled out of an error response body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ErrorDetail {
    pub message: String,
    pub code: Option<String>,
    pub retry_after_secs: Option<u64>,
}

/// Maps a non-success HTTP status to a port error
pub(crate) fn status_error(service: &str, status: StatusCode, detail: ErrorDetail) -> PortError {
    let message = if detail.message.is_empty() {
        status.to_string()
    } else {
        detail.message
    };

    match status.as_u16() {
        401 | 403 => PortError::Unauthorized { message },
        402 => PortError::Rejected {
            message,
            code: detail.code,
        },
        404 => PortError::NotFound {
            entity_type: service.to_string(),
            id: message,
        },
        400 | 422 => PortError::Validation {
            message,
            field: detail.code,
        },
        429 => PortError::RateLimited {
            retry_after_secs: detail.retry_after_secs.unwrap_or(30),
        },
        500..=599 => PortError::ServiceUnavailable {
            service: format!("{} ({})", service, message),
        },
        _ => PortError::Internal {
            message: format!("unexpected status {}: {}", status, message),
            source: None,
        },
    }
}

/// Reads a response, mapping failures with `parse_error`
///
/// `parse_error` turns the raw body of a failed response into an
/// [`ErrorDetail`]; each service formats its errors differently.
pub(crate) async fn read_json<T, F>(
    response: Response,
    service: &str,
    operation: &str,
    timeout_ms: u64,
    parse_error: F,
) -> Result<T, PortError>
where
    T: DeserializeOwned,
    F: FnOnce(&str) -> ErrorDetail,
{
    let status = response.status();
    let retry_after_secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let body = response
        .text()
        .await
        .map_err(|e| transport_error(e, operation, timeout_ms))?;

    if !status.is_success() {
        debug!(%status, operation, "{} returned an error", service);
        let mut detail = parse_error(&body);
        detail.retry_after_secs = detail.retry_after_secs.or(retry_after_secs);
        return Err(status_error(service, status, detail));
    }

    serde_json::from_str(&body).map_err(|e| {
        PortError::transformation(format!("{}: unexpected {} response: {}", operation, service, e))
    })
}
