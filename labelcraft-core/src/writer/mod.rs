//! Writer module serializing workbooks back to xlsx

mod drawing;
mod worksheet;
mod xlsx_writer;

pub use drawing::EMU_PER_PIXEL;
pub use xlsx_writer::write_workbook_bytes;

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Persist bytes through a temporary file in the destination directory.
///
/// The file is moved into place once complete. On failure the temporary file
/// is removed and the destination is left untouched.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;
    file.write_all(bytes)?;
    file.flush()?;
    file.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
