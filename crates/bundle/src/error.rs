use tenet_core::{DocumentError, ParseError, ProviderError};
use thiserror::Error;

/// Errors produced while reading, building, validating or writing a bundle.
///
/// Any of these aborts the whole bundle: there are no partially loaded bundles.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("{source_path}: missing manifest.json")]
    MissingManifest { source_path: String },

    #[error("{source_path}: unable to read manifest.json: {reason}")]
    UnreadableManifest { source_path: String, reason: String },

    #[error("{source_path}: manifest.json not a regular file")]
    ManifestNotRegular { source_path: String },

    #[error("unrecognized bundle format version: {0:?}")]
    UnrecognizedFormatVersion(String),

    #[error("invalid manifest: missing or invalid bundle format version: {0:?}")]
    InvalidManifest(String),

    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    #[error(transparent)]
    ParseModule(#[from] ParseError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BundleError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(message: impl Into<String>) -> Self {
        Self::Archive(message.into())
    }

    pub(crate) fn unreadable(source_path: &str, reason: impl ToString) -> Self {
        Self::UnreadableManifest {
            source_path: source_path.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<BundleError> for ProviderError {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::ParseModule(e) => ProviderError::Parse(e),
            BundleError::Document(e) => ProviderError::Document(e),
            BundleError::Io { path, source } => ProviderError::Io { path, source },
            other => ProviderError::failed("bundle", other.to_string()),
        }
    }
}

/// Result alias for bundle operations.
pub type Result<T> = std::result::Result<T, BundleError>;
