//! Dump command

use std::path::Path;

use adb_format::Db;
use adb_format::dump::dump as render;
use anyhow::{Context, Result};

/// Print the value tree of a container without a schema.
pub fn dump(path: &Path) -> Result<()> {
    let db = Db::open(path, None, None)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    println!("# schema {:#010x}", db.schema_id());
    print!("{}", render(db.view(), None)?);
    Ok(())
}
