//! Error taxonomy shared by every layer.
//!
//! Operations return `anyhow::Result`; the failures callers need to tell apart
//! are raised as a [`GatewayError`] inside the `anyhow::Error` so the HTTP
//! boundary can recover them with `downcast_ref`.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed or missing argument. Raised before any network call.
    #[error("{0}")]
    Validation(String),

    /// Non-2xx upstream response that was not retried, or the retry budget ran out.
    #[error("Upstream request failed with status {status} after {attempts} attempt(s): {message}")]
    Upstream {
        status: u16,
        attempts: u32,
        message: String,
        body: String,
    },

    /// Upstream answered 2xx but the body was not the JSON we expected.
    #[error("Failed to parse upstream response: {0}")]
    Parse(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation(message.into())
    }

    /// Build an upstream error, preferring the structured message the upstream
    /// put in its body over the raw body text.
    pub fn upstream(status: u16, attempts: u32, body: String) -> Self {
        let message = upstream_error_message(&body).unwrap_or_else(|| body.clone());
        GatewayError::Upstream {
            status,
            attempts,
            message,
            body,
        }
    }
}

/// Fail with a validation error unless `test` holds.
pub fn check_input(test: bool, message: &str) -> anyhow::Result<()> {
    if test {
        Ok(())
    } else {
        Err(GatewayError::validation(message).into())
    }
}

/// Pull a human-readable message out of an upstream error body.
///
/// CoinMarketCap and CoinGecko both answer `{"status": {"error_message": ...}}`;
/// other upstreams use a top-level `error` or `message` string.
fn upstream_error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.pointer("/status/error_message")
        .or_else(|| json.get("error"))
        .or_else(|| json.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_from_status_payload() {
        let body = r#"{"status":{"error_code":1002,"error_message":"API key missing."}}"#;
        match GatewayError::upstream(401, 1, body.to_string()) {
            GatewayError::Upstream { message, body: raw, .. } => {
                assert_eq!(message, "API key missing.");
                assert_eq!(raw, body);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_upstream_message_falls_back_to_raw_body() {
        let err = GatewayError::upstream(500, 1, "Internal Server Error".to_string());
        assert!(err.to_string().contains("Internal Server Error"));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_check_input() {
        assert!(check_input(true, "unused").is_ok());
        let err = check_input(false, "Expected ticker value").unwrap_err();
        let gateway = err.downcast_ref::<GatewayError>().unwrap();
        assert!(matches!(gateway, GatewayError::Validation(m) if m == "Expected ticker value"));
    }
}
