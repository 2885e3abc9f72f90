use serde_json::Value;
use thiserror::Error;

/// Failure of a single backend call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Network unreachable, timeout, connection reset.
    #[error("request failed: {0}")]
    Transport(String),

    /// The backend answered 2xx but the body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// HTTP 401. The client has already broadcast the invalidation by the
    /// time the caller sees this.
    #[error("not authorized")]
    Unauthorized,

    /// Any other non-2xx answer. `body` is the parsed JSON payload, or the raw
    /// text wrapped in a JSON string when it was not JSON.
    #[error("backend returned status {status}")]
    Backend { status: u16, body: Value },
}

impl ApiError {
    /// Human-readable text for the user, falling back to `fallback` when the
    /// error carries nothing presentable (transport failures, bare 401s).
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Backend { body, .. } => {
                backend_message(body).unwrap_or_else(|| fallback.to_string())
            }
            _ => fallback.to_string(),
        }
    }
}

/// Pull the message out of a backend error payload.
///
/// Precedence: `detail[0].msg` (validation errors), then `detail` when it is a
/// string, then `message`.
pub fn backend_message(body: &Value) -> Option<String> {
    let detail = body.get("detail");

    let first_msg = detail
        .and_then(|d| d.get(0))
        .and_then(|first| first.get("msg"))
        .and_then(Value::as_str);
    if let Some(msg) = non_empty(first_msg) {
        return Some(msg);
    }

    if let Some(msg) = non_empty(detail.and_then(Value::as_str)) {
        return Some(msg);
    }

    non_empty(body.get("message").and_then(Value::as_str))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
