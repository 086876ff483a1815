//! Filesystem operations used by the directory copy flow.
//!
//! - Enumerating a source tree into copy items
//! - Copying files with modification time preservation
//! - Creating parent directories on demand
//! - Deciding whether an existing destination file should be replaced

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::EngineError;
use crate::model::OverwritePolicy;

/// One file or directory to transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyItem {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,

    /// File size in bytes (0 for directories)
    pub file_size: u64,

    pub is_dir: bool,

    /// Set on a directory whose contents could not be listed
    pub enumeration_error: Option<String>,
}

impl CopyItem {
    fn new(source_path: PathBuf, destination_path: PathBuf, file_size: u64, is_dir: bool) -> Self {
        CopyItem {
            source_path,
            destination_path,
            file_size,
            is_dir,
            enumeration_error: None,
        }
    }
}

/// Enumerate the source directory tree, mapping every entry under `destination_root`.
///
/// A subdirectory that cannot be listed is kept with `enumeration_error` set
/// and enumeration carries on with its siblings.
///
/// # Errors
/// Returns EngineError if the root itself cannot be enumerated.
pub fn enumerate_tree(source: &Path, destination_root: &Path) -> Result<Vec<CopyItem>, EngineError> {
    fn recurse(
        path: &Path,
        rel_path: &Path,
        destination_root: &Path,
        items: &mut Vec<CopyItem>,
    ) -> Result<(), EngineError> {
        let entries = fs::read_dir(path).map_err(|e| EngineError::EnumerationFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| EngineError::EnumerationFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            let metadata = entry.metadata().map_err(|e| EngineError::EnumerationFailed {
                path: entry.path(),
                source: e,
            })?;

            let rel_full_path = rel_path.join(entry.file_name());
            let dest_path = destination_root.join(&rel_full_path);
            let entry_path = entry.path();

            if metadata.is_dir() {
                items.push(CopyItem::new(entry_path.clone(), dest_path, 0, true));
                let dir_index = items.len() - 1;

                if let Err(e) = recurse(&entry_path, &rel_full_path, destination_root, items) {
                    items[dir_index].enumeration_error = Some(e.to_string());
                }
            } else {
                items.push(CopyItem::new(entry_path, dest_path, metadata.len(), false));
            }
        }
        Ok(())
    }

    let mut items = Vec::new();
    recurse(source, Path::new(""), destination_root, &mut items)?;
    Ok(items)
}

/// Copy a file from source to destination, preserving its modification time.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let src_mtime = src_file
        .metadata()
        .map_err(|e| EngineError::ReadError {
            path: src.to_path_buf(),
            source: e,
        })?
        .modified()
        .ok();

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::ReadError {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;

    // Best effort: a copy with a fresh mtime is still a successful copy.
    if let Some(mtime) = src_mtime {
        let _ = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime));
    }

    Ok(bytes_copied)
}

/// Create a directory (and its parents) if it does not exist yet.
pub fn ensure_dir_exists(path: &Path) -> Result<(), EngineError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
                path: path.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_exists(parent),
        _ => Ok(()),
    }
}

/// Resolve `path` to an absolute path with symlinks resolved, even when it
/// does not exist yet: the deepest existing ancestor is canonicalized and the
/// missing tail is appended with `.` and `..` folded.
pub fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    for ancestor in absolute.ancestors() {
        let Ok(mut resolved) = ancestor.canonicalize() else {
            continue;
        };
        let tail = absolute.strip_prefix(ancestor).unwrap_or(Path::new(""));
        for component in tail.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                other => resolved.push(other),
            }
        }
        return Ok(resolved);
    }

    Ok(absolute)
}

/// Decide whether `item` should be written given what is at its destination.
pub fn should_copy(item: &CopyItem, policy: OverwritePolicy) -> bool {
    if item.is_dir {
        return true;
    }

    match fs::metadata(&item.destination_path) {
        Err(_) => true,
        Ok(existing) => match policy {
            OverwritePolicy::Skip => false,
            OverwritePolicy::Overwrite => true,
            OverwritePolicy::Smart => existing.len() != item.file_size,
        },
    }
}
