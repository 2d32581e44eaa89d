//! End-to-end bundle handling against real directories and archive files.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use tenet_bundle::{
    build_bundle, load_bundle, open_reader, read_bundle, BundleError, DirProvider, DirReader,
    ManifestOptions, SourceType, TarGzWriter,
};
use tenet_core::{Consumer, HeaderScanner, Module, Object, Provider, ProviderError};

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn rules_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "rules/net/open_ports.rego",
        "package rules.net.open_ports\n\ninput_type := \"tf\"\n\ndeny[msg] {\n  msg := \"x\"\n}\n",
    );
    write(dir.path(), "rules/net/ports.json", r#"{"blocked": [22, 3389]}"#);
    write(dir.path(), "lib/helpers.rego", "package lib.helpers\n");
    write(dir.path(), "docs/index.md", "# docs");
    dir
}

#[test]
fn build_write_read_round_trip_on_disk() {
    let src = rules_dir();
    let built = build_bundle(
        &DirReader::new(src.path()),
        &HeaderScanner,
        ManifestOptions::new().with_revision("deadbeef"),
    )
    .unwrap();
    assert_eq!(built.source_info().source_type, SourceType::Directory);
    assert!(built.source_info().checksum().is_none());

    let out = TempDir::new().unwrap();
    let archive_path = out.path().join("rules.tar.gz");
    let file = fs::File::create(&archive_path).unwrap();
    TarGzWriter::new(file).write(&built).unwrap();

    let reader = open_reader(&archive_path).unwrap();
    let read = load_bundle(reader.as_ref(), &HeaderScanner).unwrap();

    assert_eq!(read.manifest().revision.as_deref(), Some("deadbeef"));
    assert_eq!(read.modules().len(), 2);
    assert_eq!(read.source_info().source_type, SourceType::Archive);
    assert!(read.source_info().checksum().is_some());
    assert_eq!(
        serde_json::Value::Object(read.document().clone()),
        json!({"rules": {"net": {"blocked": [22, 3389]}}})
    );
}

#[test]
fn directory_bundle_reads_manifest_from_disk() {
    let src = rules_dir();
    write(src.path(), "manifest.json", r#"{"bundle_format_version":"v1"}"#);

    let reader = open_reader(src.path()).unwrap();
    let bundle = load_bundle(reader.as_ref(), &HeaderScanner).unwrap();
    assert_eq!(bundle.rule_bundle().source, "bundle_directory");
    assert_eq!(bundle.rule_bundle().checksum, None);
}

#[test]
fn missing_manifest_fails_for_both_source_types() {
    let src = rules_dir();
    let err = read_bundle(&DirReader::new(src.path()), &HeaderScanner).unwrap_err();
    assert!(matches!(err, BundleError::MissingManifest { .. }));

    let out = TempDir::new().unwrap();
    let path = out.path().join("empty.tar.gz");
    let encoder = flate2::write::GzEncoder::new(
        fs::File::create(&path).unwrap(),
        flate2::Compression::default(),
    );
    let mut builder = tar::Builder::new(encoder);
    let mut header = tar::Header::new_gnu();
    header.set_size(2);
    header.set_mode(0o600);
    header.set_cksum();
    builder.append_data(&mut header, "data.json", &b"{}"[..]).unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let reader = open_reader(&path).unwrap();
    let err = read_bundle(reader.as_ref(), &HeaderScanner).unwrap_err();
    assert!(matches!(err, BundleError::MissingManifest { .. }));
}

#[derive(Default)]
struct Collect {
    modules: Vec<String>,
    documents: Vec<(String, Object)>,
}

impl Consumer for Collect {
    fn module(&mut self, path: &str, _: Module) -> Result<(), ProviderError> {
        self.modules.push(path.to_string());
        Ok(())
    }

    fn data_document(&mut self, path: &str, document: Object) -> Result<(), ProviderError> {
        self.documents.push((path.to_string(), document));
        Ok(())
    }
}

#[test]
fn dir_provider_feeds_modules_and_nested_documents() {
    let src = rules_dir();
    let provider = DirProvider::new(src.path(), Arc::new(HeaderScanner));
    let mut sink = Collect::default();
    provider.provide(&mut sink).unwrap();

    assert_eq!(sink.modules, vec!["lib/helpers.rego", "rules/net/open_ports.rego"]);
    assert_eq!(sink.documents.len(), 1);
    assert_eq!(sink.documents[0].0, "rules/net/ports.json");
    assert_eq!(
        serde_json::Value::Object(sink.documents[0].1.clone()),
        json!({"rules": {"net": {"blocked": [22, 3389]}}})
    );
}

#[test]
fn dir_provider_rejects_non_object_root() {
    let src = TempDir::new().unwrap();
    write(src.path(), "list.yaml", "- a\n- b\n");
    let provider = DirProvider::new(src.path(), Arc::new(HeaderScanner));
    let err = provider.provide(&mut Collect::default()).unwrap_err();
    assert!(matches!(err, ProviderError::Document(_)));
}
