//! A provider over a loose directory of rule modules and data files.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;
use walkdir::WalkDir;

use tenet_core::document::{is_document_path, load_document};
use tenet_core::module::is_module_path;
use tenet_core::{Consumer, ModuleParser, Provider, ProviderError};

use crate::reader::clean_path;

/// Feeds every rule module and data document below `root` to a consumer.
///
/// Each data document is nested under its directory path relative to `root`
/// and delivered on its own; a document whose root is not an object fails
/// the whole provider.
pub struct DirProvider {
    name: String,
    root: PathBuf,
    parser: Arc<dyn ModuleParser>,
}

impl DirProvider {
    pub fn new(root: impl Into<PathBuf>, parser: Arc<dyn ModuleParser>) -> Self {
        let root = root.into();
        Self {
            name: root.display().to_string(),
            root,
            parser,
        }
    }
}

impl Provider for DirProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provide(&self, consumer: &mut dyn Consumer) -> Result<(), ProviderError> {
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| ProviderError::Io {
                path: self.name.clone(),
                source: e.into(),
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let rel = clean_path(&rel.to_string_lossy());
            // A root that is itself a file is read without a data prefix.
            let rel = if rel.is_empty() {
                entry.file_name().to_string_lossy().into_owned()
            } else {
                rel
            };

            let is_module = is_module_path(&rel);
            if !is_module && !is_document_path(&rel) {
                continue;
            }
            let raw = fs::read(entry.path()).map_err(|source| ProviderError::Io {
                path: rel.clone(),
                source,
            })?;
            if is_module {
                let module = self
                    .parser
                    .parse_module(&rel, &String::from_utf8_lossy(&raw))?;
                consumer.module(&rel, module)?;
            } else {
                let document = load_document(&rel, &raw)?;
                consumer.data_document(&rel, document)?;
            }
            debug!(provider = %self.name, path = %rel, "loaded file");
        }
        Ok(())
    }
}
