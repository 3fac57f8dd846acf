//! Project folder storage.
//!
//! # Responsibility
//! - Own one project folder and resolve paths relative to it.
//! - Create subfolders on demand.
//! - Read and atomically replace individual files.
//!
//! # Invariants
//! - Relative paths never escape the project folder.
//! - A write either replaces the whole target or leaves it untouched.
//! - Failures are returned, never retried.

use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tempfile::Builder;

/// Subfolder holding the project file.
pub const PROJECT_FOLDER: &str = "project";
/// Subfolder holding per-item content files.
pub const CONTENT_FOLDER: &str = "content";
/// Project file name inside `PROJECT_FOLDER`.
pub const PROJECT_FILE: &str = "project.xml";

/// Project file path relative to the project folder.
pub fn project_file_path() -> PathBuf {
    Path::new(PROJECT_FOLDER).join(PROJECT_FILE)
}

/// Result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from project folder storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Project folder does not exist or is not a directory.
    PathNotFound(PathBuf),
    /// Read target is missing or is not a regular file.
    NotAFile(PathBuf),
    /// Read target exists but cannot be opened for reading.
    NotReadable { path: PathBuf, source: io::Error },
    /// Write target or its folder refuses writes.
    NotWritable { path: PathBuf, source: io::Error },
    /// Write target is a directory.
    IsAFolder(PathBuf),
    /// Subfolder could not be created.
    FolderCreateFailed { path: PathBuf, source: io::Error },
    /// Reading an opened file failed.
    ReadFailed { path: PathBuf, source: io::Error },
    /// Writing, syncing or replacing a file failed.
    WriteFailed { path: PathBuf, source: io::Error },
    /// Relative path is absolute or climbs out of the project folder.
    InvalidPath(PathBuf),
}

impl StorageError {
    /// Path the failing operation was working on.
    pub fn path(&self) -> &Path {
        match self {
            Self::PathNotFound(path)
            | Self::NotAFile(path)
            | Self::IsAFolder(path)
            | Self::InvalidPath(path) => path,
            Self::NotReadable { path, .. }
            | Self::NotWritable { path, .. }
            | Self::FolderCreateFailed { path, .. }
            | Self::ReadFailed { path, .. }
            | Self::WriteFailed { path, .. } => path,
        }
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PathNotFound(path) => write!(f, "path not found: {}", path.display()),
            Self::NotAFile(path) => write!(f, "path is not a file: {}", path.display()),
            Self::NotReadable { path, source } => {
                write!(f, "path is not readable: {}: {source}", path.display())
            }
            Self::NotWritable { path, source } => {
                write!(f, "path is not writable: {}: {source}", path.display())
            }
            Self::IsAFolder(path) => write!(f, "path is a folder: {}", path.display()),
            Self::FolderCreateFailed { path, source } => {
                write!(f, "could not create folder: {}: {source}", path.display())
            }
            Self::ReadFailed { path, source } => {
                write!(f, "could not read file: {}: {source}", path.display())
            }
            Self::WriteFailed { path, source } => {
                write!(f, "could not write file: {}: {source}", path.display())
            }
            Self::InvalidPath(path) => {
                write!(f, "path escapes the project folder: {}", path.display())
            }
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotReadable { source, .. }
            | Self::NotWritable { source, .. }
            | Self::FolderCreateFailed { source, .. }
            | Self::ReadFailed { source, .. }
            | Self::WriteFailed { source, .. } => Some(source),
            Self::PathNotFound(_)
            | Self::NotAFile(_)
            | Self::IsAFolder(_)
            | Self::InvalidPath(_) => None,
        }
    }
}

/// File-level access to one project folder.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Binds storage to an existing project folder.
    ///
    /// # Errors
    /// - `PathNotFound` when `path` does not exist or is not a directory.
    pub fn locate(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let root = match fs::canonicalize(path) {
            Ok(root) => root,
            Err(err) => {
                warn!(
                    "event=storage_locate module=storage status=error path={} error={}",
                    path.display(),
                    err
                );
                return Err(StorageError::PathNotFound(path.to_path_buf()));
            }
        };
        if !root.is_dir() {
            warn!(
                "event=storage_locate module=storage status=error path={} error=not_a_directory",
                root.display()
            );
            return Err(StorageError::PathNotFound(path.to_path_buf()));
        }
        info!(
            "event=storage_locate module=storage status=ok path={}",
            root.display()
        );
        Ok(Self { root })
    }

    /// Absolute project folder path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns whether `relative` names an existing entry.
    pub fn exists(&self, relative: impl AsRef<Path>) -> StorageResult<bool> {
        Ok(self.resolve(relative.as_ref())?.exists())
    }

    /// Creates the named subfolder when absent and returns its path.
    ///
    /// # Errors
    /// - `FolderCreateFailed` when the folder cannot be created, including
    ///   when a file already occupies the name.
    pub fn ensure_folder(&self, relative: impl AsRef<Path>) -> StorageResult<PathBuf> {
        let path = self.resolve(relative.as_ref())?;
        if path.is_dir() {
            return Ok(path);
        }
        if path.exists() {
            return Err(StorageError::FolderCreateFailed {
                source: io::Error::new(ErrorKind::AlreadyExists, "a file occupies this name"),
                path,
            });
        }
        match fs::create_dir_all(&path) {
            Ok(()) => {
                info!(
                    "event=storage_mkdir module=storage status=ok path={}",
                    path.display()
                );
                Ok(path)
            }
            Err(source) => {
                error!(
                    "event=storage_mkdir module=storage status=error path={} error={}",
                    path.display(),
                    source
                );
                Err(StorageError::FolderCreateFailed { path, source })
            }
        }
    }

    /// Reads one whole file.
    ///
    /// # Errors
    /// - `NotAFile` when the target is missing or is a directory.
    /// - `NotReadable` when the target cannot be opened.
    /// - `ReadFailed` when reading the opened file fails.
    pub fn read_file(&self, relative: impl AsRef<Path>) -> StorageResult<Vec<u8>> {
        let started_at = Instant::now();
        let path = self.resolve(relative.as_ref())?;
        if !path.is_file() {
            warn!(
                "event=storage_read module=storage status=error path={} error_code=not_a_file",
                path.display()
            );
            return Err(StorageError::NotAFile(path));
        }

        let mut file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(source) => {
                error!(
                    "event=storage_read module=storage status=error path={} error_code=not_readable error={}",
                    path.display(),
                    source
                );
                return Err(StorageError::NotReadable { path, source });
            }
        };

        let mut bytes = Vec::new();
        if let Err(source) = file.read_to_end(&mut bytes) {
            error!(
                "event=storage_read module=storage status=error path={} error_code=read_failed error={}",
                path.display(),
                source
            );
            return Err(StorageError::ReadFailed { path, source });
        }

        info!(
            "event=storage_read module=storage status=ok path={} bytes={} duration_ms={}",
            path.display(),
            bytes.len(),
            started_at.elapsed().as_millis()
        );
        Ok(bytes)
    }

    /// Replaces one file with `bytes`.
    ///
    /// Data goes to a temporary file next to the target, is synced, and is
    /// then renamed over the target.
    ///
    /// # Errors
    /// - `IsAFolder` when the target is a directory.
    /// - `NotWritable` when the target is read-only or its folder refuses
    ///   new files.
    /// - `WriteFailed` for any other I/O failure.
    pub fn write_file(&self, relative: impl AsRef<Path>, bytes: &[u8]) -> StorageResult<()> {
        let started_at = Instant::now();
        let path = self.resolve(relative.as_ref())?;
        let result = write_atomically(&path, bytes);
        match &result {
            Ok(()) => info!(
                "event=storage_write module=storage status=ok path={} bytes={} duration_ms={}",
                path.display(),
                bytes.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=storage_write module=storage status=error path={} duration_ms={} error={}",
                path.display(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Deletes one file; returns `false` when there was nothing to delete.
    ///
    /// # Errors
    /// - `IsAFolder` when the target is a directory.
    /// - `NotWritable` when the folder refuses the deletion.
    /// - `WriteFailed` for any other I/O failure.
    pub fn remove_file(&self, relative: impl AsRef<Path>) -> StorageResult<bool> {
        let path = self.resolve(relative.as_ref())?;
        if path.is_dir() {
            return Err(StorageError::IsAFolder(path));
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(
                    "event=storage_remove module=storage status=ok path={}",
                    path.display()
                );
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => {
                error!(
                    "event=storage_remove module=storage status=error path={} error={}",
                    path.display(),
                    source
                );
                Err(classify_write_error(&path, source))
            }
        }
    }

    /// Names of the regular files directly inside a subfolder, sorted.
    ///
    /// A missing subfolder lists as empty.
    ///
    /// # Errors
    /// - `NotAFile` when `relative` names a file instead of a folder.
    /// - `ReadFailed` when the folder cannot be listed.
    pub fn list_files(&self, relative: impl AsRef<Path>) -> StorageResult<Vec<String>> {
        let path = self.resolve(relative.as_ref())?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        if !path.is_dir() {
            return Err(StorageError::NotAFile(path));
        }

        let read_failed = |source: io::Error| StorageError::ReadFailed {
            path: path.clone(),
            source,
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(&path).map_err(read_failed)? {
            let entry = entry.map_err(read_failed)?;
            if entry.file_type().map_err(read_failed)?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn resolve(&self, relative: &Path) -> StorageResult<PathBuf> {
        let escapes = relative.as_os_str().is_empty()
            || relative.components().any(|component| {
                !matches!(component, Component::Normal(_) | Component::CurDir)
            });
        if escapes {
            return Err(StorageError::InvalidPath(relative.to_path_buf()));
        }
        Ok(self.root.join(relative))
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if path.is_dir() {
        return Err(StorageError::IsAFolder(path.to_path_buf()));
    }
    let existing = fs::metadata(path).ok();
    if let Some(metadata) = &existing {
        if metadata.permissions().readonly() {
            return Err(StorageError::NotWritable {
                path: path.to_path_buf(),
                source: io::Error::new(ErrorKind::PermissionDenied, "file is read-only"),
            });
        }
    }

    let folder = match path.parent() {
        Some(folder) if !folder.as_os_str().is_empty() => folder,
        _ => Path::new("."),
    };
    let mut temp = Builder::new()
        .prefix(".collett-")
        .suffix(".tmp")
        .tempfile_in(folder)
        .map_err(|source| classify_write_error(path, source))?;

    // The temp file starts out private; the replacement keeps the target's mode.
    let permissions = existing
        .map(|metadata| metadata.permissions())
        .or_else(new_file_permissions);
    temp.write_all(bytes)
        .and_then(|()| match permissions {
            Some(permissions) => temp.as_file().set_permissions(permissions),
            None => Ok(()),
        })
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|source| StorageError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })?;

    // Dropping the temp file on the error path removes it again.
    temp.persist(path)
        .map_err(|err| classify_write_error(path, err.error))?;
    Ok(())
}

#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

fn classify_write_error(path: &Path, source: io::Error) -> StorageError {
    match source.kind() {
        ErrorKind::PermissionDenied => StorageError::NotWritable {
            path: path.to_path_buf(),
            source,
        },
        _ => StorageError::WriteFailed {
            path: path.to_path_buf(),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{Storage, StorageError};
    use std::path::Path;

    #[test]
    fn resolve_rejects_paths_outside_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::locate(dir.path()).unwrap();

        for relative in ["../outside.xml", "/etc/passwd", ""] {
            let err = storage.read_file(relative).unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidPath(_)),
                "unexpected error for `{relative}`: {err}"
            );
        }
    }

    #[test]
    fn write_leaves_no_temporary_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::locate(dir.path()).unwrap();

        storage.write_file("a.txt", b"first").unwrap();
        storage.write_file("a.txt", b"second").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.txt"]);
        assert_eq!(storage.read_file("a.txt").unwrap(), b"second");
    }

    #[test]
    fn error_path_reports_offending_location() {
        let err = StorageError::NotAFile(Path::new("/tmp/x").to_path_buf());
        assert_eq!(err.path(), Path::new("/tmp/x"));
        assert!(err.to_string().contains("/tmp/x"));
    }
}
