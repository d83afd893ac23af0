use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Network error: {0}")]
    Network(String),
    #[error("API rejected request: http {status}; {message}")]
    Api { status: u16, message: String },
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl InfraError {
    /// Connectivity failures are the only errors worth retrying; a
    /// rejected request will be rejected again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
