use std::collections::BTreeMap;

use tracing::debug;

use tenet_core::document::{load_document, merge_objects};
use tenet_core::{Consumer, Module, ModuleParser, Object, Provider, ProviderError, RuleBundle};

use crate::error::{BundleError, Result};
use crate::manifest::Manifest;
use crate::source::{FileInfo, SourceInfo};

/// Modules, merged data and the list of loaded files, accumulated while a
/// parser walks a bundle.
#[derive(Debug, Default)]
pub(crate) struct Contents {
    pub modules: BTreeMap<String, Module>,
    pub document: Object,
    pub files: Vec<FileInfo>,
}

impl Contents {
    pub fn add_module(
        &mut self,
        parser: &dyn ModuleParser,
        info: FileInfo,
        raw: &[u8],
    ) -> Result<()> {
        let source = String::from_utf8_lossy(raw);
        let module = parser.parse_module(&info.path, &source)?;
        debug!(path = %info.path, package = %module.package, "bundle module parsed");
        self.modules.insert(info.path.clone(), module);
        self.files.push(info);
        Ok(())
    }

    pub fn add_document(&mut self, info: FileInfo, raw: &[u8]) -> Result<()> {
        let document = load_document(&info.path, raw)?;
        merge_objects(&mut self.document, document);
        self.files.push(info);
        Ok(())
    }
}

/// A validated-on-demand, immutable collection of rule modules, their merged
/// data document and the manifest describing them.
#[derive(Debug, Clone)]
pub struct Bundle {
    format_version: &'static str,
    info: SourceInfo,
    manifest: Manifest,
    modules: BTreeMap<String, Module>,
    document: Object,
    files: Vec<FileInfo>,
}

impl Bundle {
    pub(crate) fn new(
        format_version: &'static str,
        info: SourceInfo,
        manifest: Manifest,
        contents: Contents,
    ) -> Self {
        Self {
            format_version,
            info,
            manifest,
            modules: contents.modules,
            document: contents.document,
            files: contents.files,
        }
    }

    /// Format version of the parser that produced this bundle.
    pub fn format_version(&self) -> &str {
        self.format_version
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn source_info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn modules(&self) -> &BTreeMap<String, Module> {
        &self.modules
    }

    pub fn document(&self) -> &Object {
        &self.document
    }

    /// Every file that contributed a module or data document.
    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    /// Provenance triple used to tag evaluation output.
    pub fn rule_bundle(&self) -> RuleBundle {
        RuleBundle::new(self.info.path(), self.info.source_type.bundle_source())
            .with_checksum(self.info.file_info.checksum.clone())
    }

    pub fn validate(&self) -> Result<()> {
        self.manifest.validate(self.format_version)?;
        if self.modules.is_empty() {
            return Err(BundleError::InvalidBundle("no rule modules found".into()));
        }
        Ok(())
    }
}

impl Provider for Bundle {
    fn name(&self) -> &str {
        self.info.path()
    }

    fn provide(&self, consumer: &mut dyn Consumer) -> std::result::Result<(), ProviderError> {
        for (path, module) in &self.modules {
            consumer.module(path, module.clone())?;
        }
        consumer.data_document("", self.document.clone())
    }
}
