//! Errors from the network controller client

use thiserror::Error;

/// Error type for network controller requests
#[derive(Debug, Error)]
pub enum NetworkClientError {
    /// Could not reach the controller
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Resource does not exist on the controller
    #[error("not found: {0}")]
    NotFound(String),

    /// Controller rejected the request
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type for network controller requests
pub type Result<T> = std::result::Result<T, NetworkClientError>;

impl From<reqwest::Error> for NetworkClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            NetworkClientError::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            NetworkClientError::InvalidResponse(e.to_string())
        } else {
            NetworkClientError::Api {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkClientError::ConnectionFailed("refused".to_string());
        assert_eq!(err.to_string(), "connection failed: refused");

        let err = NetworkClientError::Api {
            status: 409,
            message: "MAC in use".to_string(),
        };
        assert_eq!(err.to_string(), "API error (409): MAC in use");
    }
}
