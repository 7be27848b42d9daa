//! File system entries, paths, enumeration and locking.
//!
//! An [`FsEntry`] is a snapshot of one path's metadata. Operations on
//! entries (delete, copy, move, rename, lock) live on the entry type;
//! path-level queries that need no snapshot live here.

pub mod entry;
pub mod enumerate;
pub mod lock;
pub mod path;
pub mod wildcard;

use std::fs;
use std::io;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OsError, OsResult};

pub use entry::{EntryType, EntryTypeMask, FsEntry};
pub use enumerate::{enum_open, EnumFilter, FsEnum, SortBy};
pub use lock::{EntryReadLock, EntryWriteLock, ExclusiveFileLock};
pub use path::{FsPath, PathStyle};
pub use wildcard::matches_wildcards;

/// Whether name comparisons distinguish letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseSensitivity {
    /// `a` and `A` differ.
    Sensitive,
    /// `a` and `A` compare equal.
    Insensitive,
}

impl CaseSensitivity {
    /// The host file system's behaviour.
    pub const fn native() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            CaseSensitivity::Insensitive
        } else {
            CaseSensitivity::Sensitive
        }
    }
}

/// Separator conventions of the host file system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsInfo {
    /// Separates entries in a search path such as `PATH`.
    pub path_separator: String,
    /// Separates path components.
    pub file_separator: String,
    /// Ends a line in a text file.
    pub line_separator: String,
    /// Case behaviour of names.
    pub case_sensitivity: CaseSensitivity,
}

impl FsInfo {
    /// Values for the host.
    pub fn native() -> Self {
        if cfg!(windows) {
            Self {
                path_separator: ";".into(),
                file_separator: "\\".into(),
                line_separator: "\r\n".into(),
                case_sensitivity: CaseSensitivity::native(),
            }
        } else {
            Self {
                path_separator: ":".into(),
                file_separator: "/".into(),
                line_separator: "\n".into(),
                case_sensitivity: CaseSensitivity::native(),
            }
        }
    }
}

/// How [`create_directory`] treats missing parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Create only the last component; parents must exist.
    DirOnly,
    /// Create every missing directory along the path.
    FullPath,
}

/// How one path relates to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRelation {
    /// The first path is not inside the second.
    DoesNotInclude,
    /// The first path is inside the second.
    Includes,
    /// Both name the same location.
    Same,
}

/// Strips trailing separators unless the path is only the root.
pub fn remove_trailing_slashes(path: &str) -> &str {
    PathStyle::native().remove_trailing_separators(path)
}

pub(crate) fn is_overflow(err: &io::Error) -> bool {
    err.raw_os_error() == Some(overflow_code())
}

#[cfg(unix)]
const fn overflow_code() -> i32 {
    libc::EOVERFLOW
}

#[cfg(not(unix))]
const fn overflow_code() -> i32 {
    -1
}

/// Maps an error from operation `op` on `path`; a missing path becomes
/// [`OsError::DoesNotExist`].
pub(crate) fn map_io(op: &'static str, path: &str, err: io::Error) -> OsError {
    if err.kind() == io::ErrorKind::NotFound {
        OsError::DoesNotExist {
            path: path.to_string(),
        }
    } else {
        OsError::from_io(op, err)
    }
}

/// True when something exists at `path`.
///
/// A file too large for the stat structure still exists.
pub fn exists(path: &str) -> OsResult<bool> {
    let path = remove_trailing_slashes(path);
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if is_overflow(&e) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(OsError::from_io("stat", e)),
    }
}

/// Creates the directory `path`.
///
/// Fails with [`OsError::AlreadyExists`] if anything is already there. In
/// [`CreateMode::FullPath`] mode each missing parent is created first.
pub fn create_directory(path: &str, mode: CreateMode) -> OsResult<()> {
    let trimmed = remove_trailing_slashes(path);

    if exists(trimmed)? {
        return Err(OsError::AlreadyExists {
            path: trimmed.to_string(),
        });
    }

    if mode == CreateMode::FullPath {
        let parsed = FsPath::parse(trimmed);
        let style = parsed.style();
        for depth in 1..=parsed.dirs.len() {
            let prefix = style.assemble(&parsed.root, &parsed.dirs[..depth], "", "");
            // Parents that already exist are fine.
            if fs::create_dir(&prefix).is_ok() {
                debug!(path = %prefix, "created parent directory");
            }
        }
    }

    fs::create_dir(trimmed).map_err(|e| map_io("mkdir", trimmed, e))?;
    debug!(path = trimmed, "created directory");
    Ok(())
}

/// Determines whether `path` lies inside `other`.
///
/// Both are normalized before comparison. A path includes itself.
pub fn compare_paths(path: &str, other: &str, case: CaseSensitivity) -> PathRelation {
    let path = format!("{}/", FsPath::parse(path).as_string().trim_end_matches('/'));
    let other = FsPath::parse(other).as_string();
    let other = other.trim_end_matches('/');

    if !matches_wildcards(&path, &format!("{other}/*"), case) {
        return PathRelation::DoesNotInclude;
    }
    if matches_wildcards(&path, &format!("{other}/"), case) {
        PathRelation::Same
    } else {
        PathRelation::Includes
    }
}
