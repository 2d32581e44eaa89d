//! Gzip-compressed tar output, readable again by [`crate::read_bundle`].

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, Header};
use tracing::debug;

use crate::bundle::Bundle;
use crate::error::{BundleError, Result};
use crate::reader::MANIFEST_FILE;

/// Writes a bundle as `.tar.gz`: every module source under its original
/// path, the merged data tree as `data.json`, then `manifest.json`.
pub struct TarGzWriter<W: Write> {
    builder: Builder<GzEncoder<W>>,
}

impl<W: Write> TarGzWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            builder: Builder::new(GzEncoder::new(writer, Compression::default())),
        }
    }

    /// Serialize `bundle` and flush the compressed stream, returning the sink.
    pub fn write(mut self, bundle: &Bundle) -> Result<W> {
        for (path, module) in bundle.modules() {
            self.append(path, module.source.as_bytes())?;
        }
        let data = serde_json::to_vec(bundle.document())?;
        self.append("data.json", &data)?;
        let manifest = serde_json::to_vec(bundle.manifest())?;
        self.append(MANIFEST_FILE, &manifest)?;

        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| BundleError::archive(format!("tar finish: {e}")))?;
        encoder
            .finish()
            .map_err(|e| BundleError::archive(format!("gzip finish: {e}")))
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let mut header = Header::new_gnu();
        header
            .set_path(path)
            .map_err(|e| BundleError::archive(format!("set path '{path}': {e}")))?;
        header.set_size(data.len() as u64);
        header.set_mode(0o600);
        header.set_mtime(0);
        header.set_cksum();
        self.builder
            .append(&header, data)
            .map_err(|e| BundleError::archive(format!("append '{path}': {e}")))?;
        debug!(path, bytes = data.len(), "bundle file written");
        Ok(())
    }
}
