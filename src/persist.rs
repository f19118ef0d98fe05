//! Owner-only atomic file replacement for the lock and token cache.

use std::{io::Write, path::Path};

use tempfile::NamedTempFile;

/// Replace `path` with `data`.
///
/// The content is written to a randomly named sibling created with
/// `O_EXCL` and mode `0600`, synced, then renamed over `path`. A symlink
/// already sitting at `path` is replaced, never followed.
pub(crate) fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}
