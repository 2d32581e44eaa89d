//! Readers expose "a named bag of files": a directory on disk, a gzipped
//! tarball held in memory, or an in-memory file tree.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::Deserialize;
use tar::{Archive, EntryType};
use walkdir::WalkDir;

use crate::error::{BundleError, Result};
use crate::source::SourceInfo;

pub const MANIFEST_FILE: &str = "manifest.json";

/// The version probe every manifest must satisfy before a version-specific
/// parser is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ManifestHeader {
    #[serde(default)]
    pub bundle_format_version: String,
}

impl ManifestHeader {
    fn parse(source_path: &str, raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(|e| BundleError::unreadable(source_path, e))
    }
}

/// Callback invoked once per regular file with its slash-separated relative path.
pub type WalkHandler<'a> = dyn FnMut(&str, &mut dyn Read) -> Result<()> + 'a;

/// A source of bundle files.
pub trait BundleReader {
    fn info(&self) -> SourceInfo;

    /// Locate and probe `manifest.json`.
    fn manifest(&self) -> Result<ManifestHeader>;

    /// Visit every regular file.
    fn walk_files(&self, handler: &mut WalkHandler<'_>) -> Result<()>;
}

/// Normalize a relative path: forward slashes, no `.` or empty segments,
/// `..` resolved lexically.
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

// ── Directory ──────────────────────────────────────────────────

/// Reads a bundle laid out as a plain directory.
#[derive(Debug, Clone)]
pub struct DirReader {
    root: PathBuf,
}

impl DirReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn display(&self) -> String {
        self.root.display().to_string()
    }
}

impl BundleReader for DirReader {
    fn info(&self) -> SourceInfo {
        SourceInfo::directory(self.display())
    }

    fn manifest(&self) -> Result<ManifestHeader> {
        let source_path = self.display();
        let path = self.root.join(MANIFEST_FILE);
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BundleError::MissingManifest { source_path })
            }
            Err(e) => return Err(BundleError::unreadable(&source_path, e)),
        };
        if !meta.is_file() {
            return Err(BundleError::ManifestNotRegular { source_path });
        }
        let raw = fs::read(&path).map_err(|e| BundleError::unreadable(&source_path, e))?;
        ManifestHeader::parse(&source_path, &raw)
    }

    fn walk_files(&self, handler: &mut WalkHandler<'_>) -> Result<()> {
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| self.display());
                BundleError::io(path, io::Error::from(e))
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = relative(&self.root, entry.path());
            let mut file =
                fs::File::open(entry.path()).map_err(|e| BundleError::io(&rel, e))?;
            handler(&rel, &mut file)?;
        }
        Ok(())
    }
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    clean_path(&rel.to_string_lossy())
}

// ── Gzipped tarball ────────────────────────────────────────────

/// Reads a `.tar.gz` bundle. The raw archive bytes are kept in memory; they
/// are walked twice (manifest probe, then files) and checksummed.
#[derive(Debug, Clone)]
pub struct TarGzReader {
    path: String,
    raw: Vec<u8>,
}

impl TarGzReader {
    pub fn new(path: impl Into<String>, mut reader: impl Read) -> Result<Self> {
        let path = path.into();
        let mut raw = Vec::new();
        reader
            .read_to_end(&mut raw)
            .map_err(|e| BundleError::io(&path, e))?;
        Ok(Self { path, raw })
    }

    pub fn from_bytes(path: impl Into<String>, raw: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            raw,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = fs::read(path).map_err(|e| BundleError::io(&display, e))?;
        Ok(Self::from_bytes(display, raw))
    }

    fn archive(&self) -> Archive<GzDecoder<&[u8]>> {
        Archive::new(GzDecoder::new(self.raw.as_slice()))
    }
}

impl BundleReader for TarGzReader {
    fn info(&self) -> SourceInfo {
        SourceInfo::archive(&self.path, &self.raw)
    }

    fn manifest(&self) -> Result<ManifestHeader> {
        let mut archive = self.archive();
        let entries = archive
            .entries()
            .map_err(|e| BundleError::archive(format!("{}: {}", self.path, e)))?;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| BundleError::archive(format!("{}: {}", self.path, e)))?;
            let name = entry
                .path()
                .map(|p| clean_path(&p.to_string_lossy()))
                .map_err(|e| BundleError::archive(format!("{}: {}", self.path, e)))?;
            if name != MANIFEST_FILE {
                continue;
            }
            if entry.header().entry_type() != EntryType::Regular {
                return Err(BundleError::ManifestNotRegular {
                    source_path: self.path.clone(),
                });
            }
            let mut raw = Vec::new();
            entry
                .read_to_end(&mut raw)
                .map_err(|e| BundleError::unreadable(&self.path, e))?;
            return ManifestHeader::parse(&self.path, &raw);
        }
        Err(BundleError::MissingManifest {
            source_path: self.path.clone(),
        })
    }

    fn walk_files(&self, handler: &mut WalkHandler<'_>) -> Result<()> {
        let mut archive = self.archive();
        let entries = archive
            .entries()
            .map_err(|e| BundleError::archive(format!("{}: {}", self.path, e)))?;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| BundleError::archive(format!("{}: {}", self.path, e)))?;
            if entry.header().entry_type() != EntryType::Regular {
                continue;
            }
            let name = entry
                .path()
                .map(|p| clean_path(&p.to_string_lossy()))
                .map_err(|e| BundleError::archive(format!("{}: {}", self.path, e)))?;
            handler(&name, &mut entry)?;
        }
        Ok(())
    }
}

// ── In-memory tree ─────────────────────────────────────────────

#[derive(Debug, Clone)]
enum MemEntry {
    File(Vec<u8>),
    Dir,
}

/// An in-memory file tree, read as a directory source. Useful for embedding
/// bundles and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemReader {
    path: String,
    entries: BTreeMap<String, MemEntry>,
}

impl MemReader {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.entries
            .insert(clean_path(path), MemEntry::File(contents.into()));
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        self.entries.insert(clean_path(path), MemEntry::Dir);
        self
    }
}

impl BundleReader for MemReader {
    fn info(&self) -> SourceInfo {
        SourceInfo::directory(&self.path)
    }

    fn manifest(&self) -> Result<ManifestHeader> {
        match self.entries.get(MANIFEST_FILE) {
            None => Err(BundleError::MissingManifest {
                source_path: self.path.clone(),
            }),
            Some(MemEntry::Dir) => Err(BundleError::ManifestNotRegular {
                source_path: self.path.clone(),
            }),
            Some(MemEntry::File(raw)) => ManifestHeader::parse(&self.path, raw),
        }
    }

    fn walk_files(&self, handler: &mut WalkHandler<'_>) -> Result<()> {
        for (path, entry) in &self.entries {
            if let MemEntry::File(raw) = entry {
                handler(path, &mut raw.as_slice())?;
            }
        }
        Ok(())
    }
}
