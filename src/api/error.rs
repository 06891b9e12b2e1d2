use thiserror::Error;

/// Why a remote fetch produced no usable payload.
///
/// The `Display` strings are what ends up in a sync failure message, one
/// class per variant.
#[derive(Error, Debug)]
pub enum FetchError {
    /// No response was obtained (DNS, connect, timeout, reset)
    #[error("Network error: {0}")]
    Transport(String),

    /// A response arrived with a non-success status
    #[error("HTTP error: {status}")]
    Status { status: u16, body: String },

    /// A response arrived but the body did not match the expected schema
    #[error("Unexpected error: {0}")]
    Decode(String),
}

/// Maximum length for error response bodies kept on the error
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        FetchError::Status {
            status: status.as_u16(),
            body: Self::truncate_body(body),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }

    /// Response body of a status error, if the server sent one
    pub fn body(&self) -> Option<&str> {
        match self {
            FetchError::Status { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}
