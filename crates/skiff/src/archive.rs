//! In-memory single-file tar archives for copying payloads into containers.

use bytes::Bytes;
use skiff_common::{SkiffError, SkiffResult};
use tar::{Builder, EntryType, Header};

/// One file to place inside a container filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Destination path, relative to the extraction root.
    pub path: String,
    /// File content.
    pub content: Bytes,
    /// Owner user ID.
    pub uid: u64,
    /// Owner group ID.
    pub gid: u64,
    /// Unix permission bits.
    pub mode: u32,
}

impl ArchiveEntry {
    /// Default permission bits for copied files.
    pub const DEFAULT_MODE: u32 = 0o644;

    /// A root-owned entry with [`Self::DEFAULT_MODE`].
    pub fn new(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            uid: 0,
            gid: 0,
            mode: Self::DEFAULT_MODE,
        }
    }

    /// Set the permission bits.
    #[must_use]
    pub const fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Set the owning user and group.
    #[must_use]
    pub const fn with_owner(mut self, uid: u64, gid: u64) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Path as stored in the archive: leading slashes removed.
    fn archive_path(&self) -> &str {
        self.path.trim_start_matches('/')
    }
}

/// Pack `entry` into a tar stream holding exactly that one file.
///
/// The output depends only on the entry: modification time is fixed at zero and
/// user/group names are left empty, so identical entries produce identical bytes.
///
/// # Errors
///
/// Returns an error if the path is empty, names a directory, or cannot be encoded
/// in a tar header.
pub fn pack(entry: &ArchiveEntry) -> SkiffResult<Bytes> {
    let path = entry.archive_path();
    if path.is_empty() || path.ends_with('/') {
        return Err(SkiffError::Config {
            message: format!("Archive path must name a file: {:?}", entry.path),
        });
    }

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(entry.content.len() as u64);
    header.set_uid(entry.uid);
    header.set_gid(entry.gid);
    header.set_mode(entry.mode);
    header.set_mtime(0);

    let mut builder = Builder::new(Vec::with_capacity(entry.content.len() + 2048));
    builder.append_data(&mut header, path, entry.content.as_ref())?;
    let archive = builder.into_inner()?;

    tracing::trace!(path, size = archive.len(), "Packed archive");
    Ok(Bytes::from(archive))
}
