use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocsetError {
    /// Bad operator, non-scalar comparison value, scalar passed to `set`, bad `like` pattern.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing field on `reindex`, or a duplicate key it would produce.
    #[error("Key error: {0}")]
    Key(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("File {} does not contain valid JSON: {source}", path.display())]
    CorruptData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Pattern error: {0}")]
    Pattern(String),
}

impl DocsetError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        DocsetError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DocsetError>;
