use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Authentication required")]
    AuthRequired,

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Server(String),
}

impl ClientError {
    /// True only for the abort class, i.e. the caller's cancellation token fired.
    pub fn is_abort(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
