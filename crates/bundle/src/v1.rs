//! Parser for `bundle_format_version: v1`.
//!
//! Files are taken by extension: rule modules are parsed, `.json`, `.yaml`
//! and `.yml` files are merged into the data tree under their directory
//! prefix, everything else is ignored. `manifest.json` is never data.

use tenet_core::document::is_document_path;
use tenet_core::module::is_module_path;
use tenet_core::ModuleParser;

use crate::bundle::{Bundle, Contents};
use crate::error::{BundleError, Result};
use crate::manifest::{Manifest, ManifestOptions, VERSION_V1};
use crate::producer::FileProducer;
use crate::reader::MANIFEST_FILE;
use crate::source::File;

pub const VERSION: &str = VERSION_V1;

/// Read a bundle whose manifest lives in `manifest.json`.
pub fn read(producer: &FileProducer<'_>, parser: &dyn ModuleParser) -> Result<Bundle> {
    let info = producer.info();
    let mut contents = Contents::default();
    let mut manifest: Option<Manifest> = None;

    producer.produce(&mut |file: File| {
        if file.info.path == MANIFEST_FILE {
            let parsed = serde_json::from_slice(&file.raw)
                .map_err(|e| BundleError::unreadable(info.path(), e))?;
            manifest = Some(parsed);
            return Ok(());
        }
        add_file(&mut contents, parser, file)
    })?;

    let manifest = manifest.ok_or_else(|| BundleError::MissingManifest {
        source_path: info.path().to_string(),
    })?;
    Ok(Bundle::new(VERSION, info, manifest, contents))
}

/// Package a raw directory: same walk as [`read`], but the manifest comes
/// from `options` and any `manifest.json` on disk is skipped.
pub fn build(
    producer: &FileProducer<'_>,
    parser: &dyn ModuleParser,
    options: ManifestOptions,
) -> Result<Bundle> {
    let mut contents = Contents::default();

    producer.produce(&mut |file: File| {
        if file.info.path == MANIFEST_FILE {
            return Ok(());
        }
        add_file(&mut contents, parser, file)
    })?;

    let bundle = Bundle::new(VERSION, producer.info(), options.finish(), contents);
    bundle.validate()?;
    Ok(bundle)
}

fn add_file(contents: &mut Contents, parser: &dyn ModuleParser, file: File) -> Result<()> {
    let File { raw, info } = file;
    if is_module_path(&info.path) {
        contents.add_module(parser, info, &raw)
    } else if is_document_path(&info.path) {
        contents.add_document(info, &raw)
    } else {
        Ok(())
    }
}
