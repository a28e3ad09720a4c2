//! Error types for the chat pipeline.

use medtutor_core::error::MedtutorError;

/// Errors from the chat pipeline.
///
/// Only transport-level failures ever reach the user as text. Frame and
/// document parse problems are absorbed inside the decoder and parser.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("at most {0} images can be attached to one message")]
    TooManyImages(usize),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("provider returned an empty response")]
    EmptyResponse,
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("conversation was closed while the request was in flight")]
    Superseded,
    #[error("storage error: {0}")]
    StorageError(String),
}

impl ChatError {
    /// Whether this error came from talking to the provider.
    ///
    /// These are the failures rendered as an error turn in the conversation.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ChatError::Transport(_)
                | ChatError::Upstream { .. }
                | ChatError::EmptyResponse
                | ChatError::InvalidResponse(_)
        )
    }
}

impl From<MedtutorError> for ChatError {
    fn from(err: MedtutorError) -> Self {
        match err {
            MedtutorError::Transport(msg) => ChatError::Transport(msg),
            other => ChatError::StorageError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}
