use std::path::PathBuf;
use thiserror::Error;

/// Failures of the data file layer. None of these are fatal: the manager
/// logs them and reports a boolean failure to its caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid project data: {0}")]
    Mapping(#[from] serde_json::Error),

    #[error("Invalid project data: {0}")]
    Structure(String),

    #[error("Source file {} does not exist", .0.display())]
    MissingSource(PathBuf),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
