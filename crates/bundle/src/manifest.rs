//! The v1 bundle manifest and the options used to synthesize one.

use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};

/// Format version handled by [`crate::v1`].
pub const VERSION_V1: &str = "v1";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsMetadata {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub uri: String,
}

impl VcsMetadata {
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.uri.is_empty()
    }
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub bundle_format_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_engine_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsMetadata>,
}

impl Manifest {
    /// The manifest must claim the version its parser handles.
    pub fn validate(&self, expected_version: &str) -> Result<()> {
        if self.bundle_format_version != expected_version {
            return Err(BundleError::InvalidManifest(
                self.bundle_format_version.clone(),
            ));
        }
        Ok(())
    }
}

/// Caller-supplied fields for a synthesized manifest.
///
/// Consumed by [`ManifestOptions::finish`]; the resulting [`Manifest`] is
/// never modified afterwards.
#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
    format_version: Option<String>,
    revision: Option<String>,
    vcs_type: Option<String>,
    vcs_uri: Option<String>,
}

impl ManifestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format_version(mut self, version: impl Into<String>) -> Self {
        self.format_version = Some(version.into());
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_vcs_type(mut self, kind: impl Into<String>) -> Self {
        self.vcs_type = Some(kind.into());
        self
    }

    pub fn with_vcs_uri(mut self, uri: impl Into<String>) -> Self {
        self.vcs_uri = Some(uri.into());
        self
    }

    /// Requested format version, `v1` when unset.
    pub fn format_version(&self) -> &str {
        self.format_version.as_deref().unwrap_or(VERSION_V1)
    }

    pub fn finish(self) -> Manifest {
        let vcs = VcsMetadata {
            kind: self.vcs_type.unwrap_or_default(),
            uri: self.vcs_uri.unwrap_or_default(),
        };
        Manifest {
            bundle_format_version: self
                .format_version
                .unwrap_or_else(|| VERSION_V1.to_string()),
            policy_engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            revision: self.revision.filter(|r| !r.is_empty()),
            vcs: (!vcs.is_empty()).then_some(vcs),
        }
    }
}
