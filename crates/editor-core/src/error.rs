use thiserror::Error;

use crate::core::NodeKind;

/// Failure of an edit attempt. Every variant is recoverable: the document and
/// selection are left exactly as they were before the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// The current selection/document does not satisfy the command's preconditions.
    #[error("{0}")]
    Structural(String),

    #[error("document changed since the transaction began (expected version {expected}, found {actual})")]
    Conflict { expected: u64, actual: u64 },

    /// An attribute value outside its declared domain, or an undeclared attribute.
    #[error("invalid value: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("editor is read-only")]
    ReadOnly,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("normalization did not converge")]
    NormalizeDidNotConverge,

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl EditError {
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_in_table() -> Self {
        Self::Structural("not in table".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("malformed markup at byte {position}: {message}")]
    Malformed { position: usize, message: String },
}

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("invalid editor value: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported schema {0:?}")]
    Schema(String),

    #[error("value format version {found} is newer than {supported}")]
    Version { found: u32, supported: u32 },

    #[error("node kind {0} is not enabled in this editor")]
    UnknownKind(NodeKind),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid session config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid initial content: {0}")]
    Content(#[from] MarkupError),

    #[error("invalid plugin set: {0}")]
    Registry(String),
}
