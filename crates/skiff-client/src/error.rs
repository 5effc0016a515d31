//! Error types for the client boundary.
//!
//! Transport failures are absorbed by the link state machine and surface
//! only as a connection status; these errors cover the REST boundary and
//! payload decoding. Retry decisions key off [`ClientError::is_transient`]:
//! timeouts and transport hiccups may be retried, authorization failures
//! and malformed responses never are.

use thiserror::Error;

/// Errors crossing the client's REST and socket boundaries.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server rejected the credentials (401-class). Never retried; the
    /// token provider is notified and owns recovery.
    #[error("authorization rejected")]
    Unauthorized,

    /// A non-success HTTP status other than 401.
    #[error("request failed with status {status}")]
    Http {
        /// The response status code.
        status: u16,
    },

    /// The request did not complete within its timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (DNS, TCP, TLS, socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not match the contract.
    #[error("malformed payload: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether a retry of the same idempotent request may succeed.
    ///
    /// Timeouts and transport failures are transient; authorization
    /// failures, contract violations, and other HTTP errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_transport_failures_are_transient() {
        assert!(ClientError::Timeout.is_transient());
        assert!(ClientError::Transport("connection reset".into()).is_transient());
    }

    #[test]
    fn authorization_and_contract_failures_are_not() {
        assert!(!ClientError::Unauthorized.is_transient());
        assert!(!ClientError::Http { status: 500 }.is_transient());
        assert!(!ClientError::Decode("missing field".into()).is_transient());
    }
}
