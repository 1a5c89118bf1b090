//! Error types for gateway operations

use thiserror::Error;

/// Errors that can occur when calling the ticketing backend
///
/// Transport-level failures (`Timeout`, `Transport`) are retryable: the
/// request may simply not have reached the backend. Everything else is a
/// definitive answer and is not retryable by default.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS, refused, reset)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The response body could not be decoded into the expected shape
    #[error("Response parsing failed: {0}")]
    Decode(String),

    /// The backend answered with an unexpected HTTP status
    #[error("Backend error (status {status}): {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, best effort
        message: String,
    },

    /// The realtime endpoint rejected or dropped the connection
    #[error("Realtime channel failed: {0}")]
    Realtime(String),
}

impl GatewayError {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }

    /// Classify a `reqwest` error into the gateway taxonomy
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::Transport("connection reset".into()).is_retryable());
    }

    #[test]
    fn definitive_answers_are_not_retryable() {
        assert!(!GatewayError::Decode("bad json".into()).is_retryable());
        assert!(
            !GatewayError::Http {
                status: 403,
                message: "forbidden".into()
            }
            .is_retryable()
        );
    }
}
