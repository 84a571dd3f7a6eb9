//! Resign and strip commands
//!
//! Both stream the input through a block filter into a temporary file next
//! to the destination, then move it into place.

use std::fs::File;
use std::io::{BufReader, BufWriter, IntoInnerError};
use std::path::Path;

use adb_format::{BlockFilter, Resign, StripSignatures, Transform};
use anyhow::{Context, Result, bail};
use tempfile::NamedTempFile;

use crate::config::Settings;

type Sink = BufWriter<NamedTempFile>;

/// Replace the signatures of `path` with one per configured private key.
pub fn resign(path: &Path, output: Option<&Path>, settings: &Settings) -> Result<()> {
    if settings.trust.private_keys().is_empty() {
        bail!("no signing keys (use --key or ADB_SIGNING_KEY)");
    }
    let dest = output.unwrap_or(path);
    let mut filter = Resign::new(&settings.trust);
    rewrite(path, dest, &mut filter)?;
    println!("  signed {} ({} signatures)", dest.display(), filter.signed());
    Ok(())
}

/// Remove every Sig block from `path`.
pub fn strip(path: &Path, output: Option<&Path>) -> Result<()> {
    let dest = output.unwrap_or(path);
    let mut filter = StripSignatures::new();
    rewrite(path, dest, &mut filter)?;
    println!("  stripped {} signatures from {}", filter.removed(), dest.display());
    Ok(())
}

fn rewrite<F: BlockFilter<Sink>>(src: &Path, dest: &Path, filter: &mut F) -> Result<()> {
    let input = File::open(src).with_context(|| format!("Failed to open {}", src.display()))?;
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;

    let sink = Transform::new(BufReader::new(input), BufWriter::new(tmp))
        .run(filter)
        .with_context(|| format!("Failed to rewrite {}", src.display()))?;
    let tmp = sink.into_inner().map_err(IntoInnerError::into_error)?;
    tmp.persist(dest)
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(())
}
