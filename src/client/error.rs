//! Client-side error type

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("There are already {0} featured posts")]
    FeaturedLimit(i64),
}

impl ClientError {
    /// Build a status error from a non-2xx response body
    ///
    /// Understands the server's `{"error": {"code", "message"}}` envelope and
    /// falls back to the raw body text.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let detail = body.get("error");
        let code = detail
            .and_then(|d| d.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = detail
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| body.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("Request failed with status {}", status));

        ClientError::Status {
            status,
            code,
            message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Network failures and 404/500/503 are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Status { status, .. } => matches!(status, 404 | 500 | 503),
            _ => false,
        }
    }

    /// 4xx other than 404, plus errors raised before a request is sent
    pub fn is_client_error(&self) -> bool {
        match self {
            ClientError::Status { status, .. } => (400..500).contains(status) && *status != 404,
            ClientError::Validation(_) | ClientError::FeaturedLimit(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_response_envelope() {
        let err = ClientError::from_response(
            400,
            &json!({"error": {"code": "FEATURED_LIMIT", "message": "full"}}),
        );
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.code(), Some("FEATURED_LIMIT"));
        assert!(err.to_string().contains("full"));

        let plain = ClientError::from_response(502, &json!("Bad gateway"));
        assert_eq!(plain.to_string(), "HTTP 502: Bad gateway");

        let empty = ClientError::from_response(500, &Value::Null);
        assert!(empty.to_string().contains("status 500"));
    }

    #[test]
    fn test_classification() {
        let status = |s| ClientError::from_response(s, &Value::Null);

        for s in [404, 500, 503] {
            assert!(status(s).is_retryable(), "{}", s);
        }
        for s in [400, 401, 403, 409, 502] {
            assert!(!status(s).is_retryable(), "{}", s);
        }
        assert!(ClientError::Network("reset".into()).is_retryable());
        assert!(!ClientError::Timeout.is_retryable());

        assert!(status(401).is_client_error());
        assert!(!status(404).is_client_error());
        assert!(!status(500).is_client_error());
        assert!(ClientError::FeaturedLimit(3).is_client_error());
    }
}
