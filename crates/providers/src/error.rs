//! Error taxonomy for provider streaming.
//!
//! Aborts are a first-class variant so callers can tell "user stopped"
//! apart from "provider failed" and preserve partial output.

use shared::chat::Provider;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("missing API key for {provider}; configure it in settings")]
    MissingCredential { provider: Provider },

    #[error("{provider} error: {status}\n{body}")]
    Http {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("request aborted")]
    Aborted,

    #[error("tool loop exceeded {max_rounds} continuation rounds")]
    ToolLoopExceeded { max_rounds: usize },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    Protocol(String),
}

impl StreamError {
    /// True when the failure was a deliberate stop, not a provider fault.
    pub fn is_abort(&self) -> bool {
        matches!(self, StreamError::Aborted)
    }

    /// Build an HTTP error from a failed response, capping the body
    /// detail at 800 characters.
    pub fn from_response(provider: Provider, status: u16, body: &str) -> Self {
        let detail: String = body.trim().chars().take(800).collect();
        StreamError::Http {
            provider,
            status,
            body: detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_distinguished() {
        assert!(StreamError::Aborted.is_abort());
        assert!(!StreamError::Protocol("x".into()).is_abort());
    }

    #[test]
    fn test_http_body_is_capped() {
        let long = "x".repeat(2000);
        let err = StreamError::from_response(Provider::OpenAi, 500, &long);
        match err {
            StreamError::Http { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), 800);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
