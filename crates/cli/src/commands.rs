//! `tenet bundle` subcommands.
//!
//! Rule modules are read with [`HeaderScanner`], which records package and
//! rule heads without compiling rule bodies; that is all bundle tooling needs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use tenet_bundle::{build_bundle, load_bundle, open_reader, read_bundle, Bundle, DirReader, ManifestOptions, TarGzWriter};
use tenet_core::HeaderScanner;

/// Build a bundle from `dir` and write it to `output` as `.tar.gz`.
pub fn create(dir: &Path, output: &Path, options: ManifestOptions) -> Result<Bundle> {
    let reader = DirReader::new(dir);
    let bundle = build_bundle(&reader, &HeaderScanner, options)
        .with_context(|| format!("failed to build bundle from {}", dir.display()))?;
    bundle
        .validate()
        .with_context(|| format!("invalid bundle in {}", dir.display()))?;

    let file = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut sink = TarGzWriter::new(BufWriter::new(file))
        .write(&bundle)
        .with_context(|| format!("failed to write {}", output.display()))?;
    sink.flush()?;

    info!(
        output = %output.display(),
        modules = bundle.modules().len(),
        "bundle created"
    );
    Ok(bundle)
}

/// Check every target, reporting each outcome on `out`.
///
/// Returns the number of targets that failed; a failing target never stops
/// the remaining ones from being checked.
pub fn validate(targets: &[PathBuf], out: &mut impl Write) -> Result<usize> {
    let mut failed = 0;
    for target in targets {
        match check(target) {
            Ok(bundle) => {
                writeln!(
                    out,
                    "ok    {} ({} modules)",
                    target.display(),
                    bundle.modules().len()
                )?;
            }
            Err(e) => {
                warn!(target = %target.display(), error = %format!("{e:#}"), "bundle invalid");
                writeln!(out, "FAIL  {}: {e:#}", target.display())?;
                failed += 1;
            }
        }
    }
    Ok(failed)
}

fn check(target: &Path) -> Result<Bundle> {
    let reader = open_reader(target)?;
    Ok(load_bundle(reader.as_ref(), &HeaderScanner)?)
}

/// JSON summary of a bundle: manifest, source, module paths and data keys.
pub fn show(target: &Path) -> Result<Value> {
    let reader = open_reader(target)
        .with_context(|| format!("failed to open {}", target.display()))?;
    let bundle = read_bundle(reader.as_ref(), &HeaderScanner)
        .with_context(|| format!("failed to read {}", target.display()))?;

    Ok(json!({
        "format_version": bundle.format_version(),
        "manifest": bundle.manifest(),
        "source": bundle.source_info(),
        "modules": bundle.modules().keys().collect::<Vec<_>>(),
        "data": bundle.document().keys().collect::<Vec<_>>(),
    }))
}
