//! Versioned, checksummed packages of rule modules and data.
//!
//! A bundle is read through a [`BundleReader`] (directory, `.tar.gz`, or an
//! in-memory tree). `manifest.json` is probed first and its
//! `bundle_format_version` selects the parser for the rest of the files.

pub mod bundle;
pub mod error;
pub mod local;
pub mod manifest;
pub mod producer;
pub mod reader;
pub mod source;
pub mod v1;
pub mod writer;

use std::path::Path;

use tracing::info;

use tenet_core::ModuleParser;

pub use bundle::Bundle;
pub use error::{BundleError, Result};
pub use local::DirProvider;
pub use manifest::{Manifest, ManifestOptions, VcsMetadata};
pub use producer::{bundle_filter, FileProducer};
pub use reader::{BundleReader, DirReader, MemReader, TarGzReader};
pub use source::{checksum, SourceInfo, SourceType};
pub use writer::TarGzWriter;

/// Read a bundle, dispatching on the manifest's format version.
///
/// The bundle is not validated; see [`Bundle::validate`] and [`load_bundle`].
pub fn read_bundle(reader: &dyn BundleReader, parser: &dyn ModuleParser) -> Result<Bundle> {
    let header = reader.manifest()?;
    let producer = FileProducer::new(reader).with_filter(bundle_filter);
    let bundle = match header.bundle_format_version.as_str() {
        v1::VERSION => v1::read(&producer, parser)?,
        other => return Err(BundleError::UnrecognizedFormatVersion(other.to_string())),
    };
    info!(
        source = %bundle.source_info().path(),
        version = bundle.format_version(),
        modules = bundle.modules().len(),
        "bundle read"
    );
    Ok(bundle)
}

/// Read and validate.
pub fn load_bundle(reader: &dyn BundleReader, parser: &dyn ModuleParser) -> Result<Bundle> {
    let bundle = read_bundle(reader, parser)?;
    bundle.validate()?;
    Ok(bundle)
}

/// Package the files of `reader` with a manifest synthesized from `options`.
pub fn build_bundle(
    reader: &dyn BundleReader,
    parser: &dyn ModuleParser,
    options: ManifestOptions,
) -> Result<Bundle> {
    let producer = FileProducer::new(reader).with_filter(bundle_filter);
    match options.format_version() {
        v1::VERSION => v1::build(&producer, parser, options),
        other => Err(BundleError::UnrecognizedFormatVersion(other.to_string())),
    }
}

/// Pick a reader for a path on disk: directories are read in place,
/// anything else is treated as a `.tar.gz` archive.
pub fn open_reader(path: impl AsRef<Path>) -> Result<Box<dyn BundleReader>> {
    let path = path.as_ref();
    if path.is_dir() {
        Ok(Box::new(DirReader::new(path)))
    } else {
        Ok(Box::new(TarGzReader::open(path)?))
    }
}
