//! Build context archives.

use std::path::Path;

use bytes::Bytes;
use skiff_common::{SkiffError, SkiffResult};
use walkdir::WalkDir;

/// Tar every entry under `dir`, with paths relative to `dir`.
///
/// Entries are visited in file-name order and symlinks are stored as links.
pub(crate) fn pack_context(dir: &Path) -> SkiffResult<Bytes> {
    if !dir.is_dir() {
        return Err(SkiffError::Config {
            message: format!("Build context is not a directory: {}", dir.display()),
        });
    }

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| SkiffError::Internal {
                message: format!("Context entry outside {}: {e}", dir.display()),
            })?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        if entry.file_type().is_dir() {
            builder.append_dir(relative, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), relative)?;
        }
    }

    let archive = builder.into_inner()?;
    tracing::debug!(context = %dir.display(), size = archive.len(), "Packed build context");
    Ok(Bytes::from(archive))
}
