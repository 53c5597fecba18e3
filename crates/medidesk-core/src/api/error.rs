use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The request went out but nothing came back (connect failure, timeout).
    #[error("No response from {method} {path}: {detail}")]
    NetworkUnreachable {
        method: String,
        path: String,
        detail: String,
    },

    /// The server answered with a non-2xx status.
    #[error("Server returned {status} for {method} {path}: {body}")]
    Server {
        status: StatusCode,
        method: String,
        path: String,
        body: String,
    },

    /// The request could not be built or handed to the network.
    #[error("Could not send request: {0}")]
    ClientSetup(String),

    #[error("Session refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: StatusCode, method: &str, path: &str, body: &str) -> Self {
        ApiError::Server {
            status,
            method: method.to_string(),
            path: path.to_string(),
            body: Self::truncate_body(body),
        }
    }

    /// HTTP status when the server responded.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 401 from the server: the session token is missing, expired or revoked.
    pub fn is_auth_expired(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}
