use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Malformed frame: {0}")]
    Frame(String),

    #[error("Invalid message payload: {0}")]
    Payload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ChatError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            ChatError::Handshake(_) => "HANDSHAKE_ERROR",
            ChatError::Frame(_) => "FRAME_ERROR",
            ChatError::Payload(_) => "PAYLOAD_ERROR",
            ChatError::Io(_) => "TRANSPORT_ERROR",
            ChatError::InvalidConfig(_) => "INVALID_CONFIG",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }

    /// Whether the error is local to one message and leaves the connection usable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChatError::Payload(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
