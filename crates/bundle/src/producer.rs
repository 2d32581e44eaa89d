use std::io::Read;

use crate::error::{BundleError, Result};
use crate::reader::{clean_path, BundleReader, MANIFEST_FILE};
use crate::source::{checksum, File, FileInfo, SourceInfo};

/// Paths a bundle parser ever looks at.
pub fn bundle_filter(path: &str) -> bool {
    path == MANIFEST_FILE
        || path == "data.json"
        || path.starts_with("rules/")
        || path.starts_with("lib/")
}

/// Streams the filtered, checksum-annotated files of a reader.
pub struct FileProducer<'r> {
    reader: &'r dyn BundleReader,
    filter: Option<fn(&str) -> bool>,
}

impl<'r> FileProducer<'r> {
    pub fn new(reader: &'r dyn BundleReader) -> Self {
        Self {
            reader,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: fn(&str) -> bool) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn info(&self) -> SourceInfo {
        self.reader.info()
    }

    /// Hand every accepted file to `consumer`, stopping at its first error.
    pub fn produce(&self, consumer: &mut dyn FnMut(File) -> Result<()>) -> Result<()> {
        self.reader.walk_files(&mut |path: &str, body: &mut dyn Read| {
            let path = clean_path(path);
            if let Some(filter) = self.filter {
                if !filter(&path) {
                    return Ok(());
                }
            }
            let mut raw = Vec::new();
            body.read_to_end(&mut raw)
                .map_err(|e| BundleError::io(&path, e))?;
            let info = FileInfo {
                checksum: Some(checksum(&raw)),
                path,
            };
            consumer(File { raw, info })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MemReader;

    #[test]
    fn filter_keeps_bundle_paths() {
        assert!(bundle_filter("manifest.json"));
        assert!(bundle_filter("data.json"));
        assert!(bundle_filter("rules/aws/s3.rego"));
        assert!(bundle_filter("lib/util.rego"));
        assert!(!bundle_filter("README.md"));
        assert!(!bundle_filter("nested/data.json"));
        assert!(!bundle_filter("rulesets/x.rego"));
    }

    #[test]
    fn produce_applies_filter_and_checksums() {
        let reader = MemReader::new("mem")
            .with_file("README.md", "ignored")
            .with_file("rules/a.rego", "package rules.a");
        let producer = FileProducer::new(&reader).with_filter(bundle_filter);

        let mut files = Vec::new();
        producer
            .produce(&mut |f: File| {
                files.push(f);
                Ok(())
            })
            .unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].info.path, "rules/a.rego");
        assert_eq!(files[0].info.checksum.as_deref(), Some(checksum(b"package rules.a").as_str()));
    }
}
