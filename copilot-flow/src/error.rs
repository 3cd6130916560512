use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("A turn is already being processed for session {0}")]
    TurnInProgress(String),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Turn execution failed: {0}")]
    TurnFailed(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
