//! Point-in-time JSON dump of the collection.
//!
//! Written on `save`/`exit` for people to look at. Never read back: the
//! journal is what the server starts from.

use crate::core::{MarineError, OwnedMarine, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const DEFAULT_SNAPSHOT_FILE: &str = "base.json";

/// Pretty JSON rendering shared by `show` and the snapshot file.
pub fn render_json(records: &[OwnedMarine]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Atomically replaces `path` with the rendered records.
pub fn save_snapshot<P: AsRef<Path>>(path: P, records: &[OwnedMarine]) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent)?;
            parent
        }
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(render_json(records)?.as_bytes())?;
    temp.write_all(b"\n")?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| MarineError::Io(e.error))?;
    Ok(())
}
