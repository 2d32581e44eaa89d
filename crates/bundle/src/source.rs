//! Where a bundle came from, and file checksums.

use std::fmt;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of location a bundle was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Archive,
    Directory,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Archive => "archive",
            SourceType::Directory => "directory",
        }
    }

    /// Provenance label used when tagging evaluation results.
    pub fn bundle_source(&self) -> &'static str {
        match self {
            SourceType::Archive => "bundle_archive",
            SourceType::Directory => "bundle_directory",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source_type: SourceType,
    pub file_info: FileInfo,
}

impl SourceInfo {
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Directory,
            file_info: FileInfo {
                path: path.into(),
                checksum: None,
            },
        }
    }

    pub fn archive(path: impl Into<String>, raw: &[u8]) -> Self {
        Self {
            source_type: SourceType::Archive,
            file_info: FileInfo {
                path: path.into(),
                checksum: Some(checksum(raw)),
            },
        }
    }

    pub fn path(&self) -> &str {
        &self.file_info.path
    }

    pub fn checksum(&self) -> Option<&str> {
        self.file_info.checksum.as_deref()
    }
}

/// A file handed from a producer to a bundle parser.
#[derive(Debug, Clone)]
pub struct File {
    pub raw: Vec<u8>,
    pub info: FileInfo,
}

/// Unpadded base64 of the SHA-256 digest of `raw`.
///
/// Identifies bundle contents in evaluation output; not a signature.
pub fn checksum(raw: &[u8]) -> String {
    STANDARD_NO_PAD.encode(Sha256::digest(raw))
}
