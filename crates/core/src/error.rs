use thiserror::Error;

pub const UNEXPECTED_STATUS_MESSAGE: &str = "Received an unexpected status from server.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("empty identifier")]
    EmptyIdentifier,
}

/// Failure of a single matching request.
///
/// `Display` renders the message shown to the operator, so callers can store
/// `error.to_string()` directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("{0}")]
    Transport(String),

    #[error("{}", server_error_message(.status, .detail))]
    Server { status: u16, detail: Option<String> },

    #[error("{0}")]
    Protocol(String),

    #[error("{}", .message.as_deref().unwrap_or(UNEXPECTED_STATUS_MESSAGE))]
    UnexpectedStatus {
        status: Option<String>,
        message: Option<String>,
    },
}

impl MatchError {
    pub fn transport(error: &(dyn std::error::Error + 'static)) -> Self {
        Self::Transport(error_chain(error))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Server { .. } => "server",
            Self::Protocol(_) => "protocol",
            Self::UnexpectedStatus { .. } => "unexpected_status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("a search is already in flight")]
    Busy,

    #[error("search controller was shut down")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("unsupported url scheme `{0}` (expected http or https)")]
    UnsupportedScheme(String),

    #[error("http client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

fn server_error_message(status: &u16, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => detail.clone(),
        None => format!("Request failed! Status: {status}"),
    }
}

// reqwest hides the useful part ("connection refused", "timed out") in the source chain.
fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_prefers_detail() {
        let error = MatchError::Server {
            status: 500,
            detail: Some("db down".to_string()),
        };
        assert_eq!(error.to_string(), "db down");
    }

    #[test]
    fn server_error_falls_back_to_status_code() {
        let error = MatchError::Server {
            status: 502,
            detail: None,
        };
        assert_eq!(error.to_string(), "Request failed! Status: 502");
    }

    #[test]
    fn unexpected_status_uses_default_message() {
        let error = MatchError::UnexpectedStatus {
            status: Some("pending".to_string()),
            message: None,
        };
        assert_eq!(error.to_string(), UNEXPECTED_STATUS_MESSAGE);
        assert_eq!(error.kind(), "unexpected_status");
    }

    #[test]
    fn transport_error_includes_source_chain() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let outer = std::io::Error::new(std::io::ErrorKind::Other, inner);
        let error = MatchError::transport(&outer);
        assert!(error.to_string().contains("connection refused"));
    }
}
