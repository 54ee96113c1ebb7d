use std::fmt;

use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Parse,
    CredentialDocument,
    Lookup,
    Encoding,
    Pull,
    Save,
    Cancelled,
    Task,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchStage::Parse => "parse",
            FetchStage::CredentialDocument => "credential-document",
            FetchStage::Lookup => "lookup",
            FetchStage::Encoding => "encoding",
            FetchStage::Pull => "pull",
            FetchStage::Save => "save",
            FetchStage::Cancelled => "cancelled",
            FetchStage::Task => "task",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid reference format: {reference}: {reason}")]
    Parse { reference: String, reason: String },

    #[error("invalid credential document: {0}")]
    CredentialDocument(String),

    #[error("credential lookup for {registry} failed: {reason}")]
    Lookup { registry: String, reason: String },

    #[error("failed to encode registry credentials: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("pulling {image} failed: {message}")]
    Pull { image: String, message: String },

    #[error("saving images failed: {0}")]
    Save(String),

    #[error("image fetch was cancelled")]
    Cancelled,

    #[error("image fetch task failed: {0}")]
    Task(String),
}

impl FetchError {
    pub fn parse(reference: &str, reason: impl Into<String>) -> Self {
        FetchError::Parse {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    pub fn pull(image: &str, message: impl fmt::Display) -> Self {
        FetchError::Pull {
            image: image.to_string(),
            message: message.to_string(),
        }
    }

    pub fn stage(&self) -> FetchStage {
        match self {
            FetchError::Parse { .. } => FetchStage::Parse,
            FetchError::CredentialDocument(_) => FetchStage::CredentialDocument,
            FetchError::Lookup { .. } => FetchStage::Lookup,
            FetchError::Encoding(_) => FetchStage::Encoding,
            FetchError::Pull { .. } => FetchStage::Pull,
            FetchError::Save(_) => FetchStage::Save,
            FetchError::Cancelled => FetchStage::Cancelled,
            FetchError::Task(_) => FetchStage::Task,
        }
    }

    /// True for errors caused by what the client sent rather than by the runtime.
    pub fn is_client_input(&self) -> bool {
        matches!(
            self.stage(),
            FetchStage::Parse | FetchStage::CredentialDocument
        )
    }
}

pub type Result<T, E = FetchError> = std::result::Result<T, E>;
