//! Generation backend errors
//!
//! Every variant surfacing from a step's generation call is handled by the
//! workflow engine as a transport failure: recorded inline, never fatal to the run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that can occur while opening or consuming a generation stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// API request failed with the given message
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    /// Authentication failed or credentials are invalid
    AuthenticationError { message: String },

    /// No fragment arrived within the configured timeout (in seconds)
    TimeoutError { seconds: u64 },

    /// Rate limit exceeded, retry after the specified duration (in seconds)
    RateLimitError { retry_after: Option<u64> },

    /// Malformed stream payload from the backend
    InvalidResponse {
        message: String,
        raw_response: Option<String>,
    },

    /// Configuration error (missing API keys, invalid endpoint, etc.)
    ConfigurationError { message: String },

    /// Connection dropped or could not be established
    NetworkError { message: String },

    /// Generic error for other cases
    Other { message: String },
}

impl BackendError {
    /// Maps an HTTP status and body to the closest variant
    pub fn from_status(status_code: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status_code {
            401 | 403 => BackendError::AuthenticationError { message },
            429 => BackendError::RateLimitError { retry_after: None },
            _ => BackendError::ApiError {
                message,
                status_code: Some(status_code),
            },
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::ApiError {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "API error ({}): {}", code, message)
                } else {
                    write!(f, "API error: {}", message)
                }
            }
            BackendError::AuthenticationError { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            BackendError::TimeoutError { seconds } => {
                write!(f, "Request timed out after {} seconds", seconds)
            }
            BackendError::RateLimitError { retry_after } => {
                if let Some(seconds) = retry_after {
                    write!(f, "Rate limit exceeded, retry after {} seconds", seconds)
                } else {
                    write!(f, "Rate limit exceeded")
                }
            }
            BackendError::InvalidResponse { message, .. } => {
                write!(f, "Invalid response from backend: {}", message)
            }
            BackendError::ConfigurationError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            BackendError::NetworkError { message } => {
                write!(f, "Network error: {}", message)
            }
            BackendError::Other { message } => {
                write!(f, "Error: {}", message)
            }
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            BackendError::from_status(401, "nope"),
            BackendError::AuthenticationError { .. }
        ));
        assert!(matches!(
            BackendError::from_status(429, ""),
            BackendError::RateLimitError { retry_after: None }
        ));
        assert_eq!(
            BackendError::from_status(502, "bad gateway"),
            BackendError::ApiError {
                message: "bad gateway".to_string(),
                status_code: Some(502),
            }
        );
    }

    #[test]
    fn test_display() {
        let err = BackendError::TimeoutError { seconds: 30 };
        assert_eq!(err.to_string(), "Request timed out after 30 seconds");

        let err = BackendError::ApiError {
            message: "boom".to_string(),
            status_code: None,
        };
        assert_eq!(err.to_string(), "API error: boom");
    }
}
