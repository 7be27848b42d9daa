//! Snapshots of one path's metadata and the operations on them.

use std::fmt;
use std::fs::{self, File, Metadata};
use std::io;
use std::ops::BitOr;
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};

use super::lock::{EntryReadLock, EntryWriteLock};
use super::{exists, map_io, remove_trailing_slashes};
use crate::context::OsContext;
use crate::error::{OsError, OsResult};
use crate::timestamp::Timestamp;

/// Link target reported when a symbolic link cannot be read.
pub const UNKNOWN_LINK_TARGET: &str = "<Unknown>";

/// Kind of file system object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Named pipe.
    Pipe,
    /// Local socket.
    Socket,
    /// Symbolic link whose target could not be resolved.
    SymLink,
    /// Character device.
    CharDev,
    /// Block device.
    BlockDev,
    /// Anything else.
    Other,
}

impl EntryType {
    /// One-character code used in listings.
    pub fn type_char(self) -> char {
        match self {
            EntryType::File => 'F',
            EntryType::Directory => 'D',
            EntryType::Pipe => 'P',
            EntryType::Socket => 'S',
            EntryType::SymLink => 'L',
            EntryType::CharDev => 'C',
            EntryType::BlockDev => 'B',
            EntryType::Other => 'O',
        }
    }

    /// The mask bit selecting this type.
    pub fn mask(self) -> EntryTypeMask {
        match self {
            EntryType::File => EntryTypeMask::FILE,
            EntryType::Directory => EntryTypeMask::DIRECTORY,
            EntryType::Pipe => EntryTypeMask::PIPE,
            EntryType::Socket => EntryTypeMask::SOCKET,
            EntryType::SymLink => EntryTypeMask::SYMLINK,
            EntryType::CharDev => EntryTypeMask::CHAR_DEV,
            EntryType::BlockDev => EntryTypeMask::BLOCK_DEV,
            EntryType::Other => EntryTypeMask::OTHER,
        }
    }

    fn from_file_type(ft: fs::FileType) -> Self {
        if ft.is_file() {
            return EntryType::File;
        }
        if ft.is_dir() {
            return EntryType::Directory;
        }
        if ft.is_symlink() {
            return EntryType::SymLink;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if ft.is_fifo() {
                return EntryType::Pipe;
            }
            if ft.is_socket() {
                return EntryType::Socket;
            }
            if ft.is_char_device() {
                return EntryType::CharDev;
            }
            if ft.is_block_device() {
                return EntryType::BlockDev;
            }
        }
        EntryType::Other
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_char())
    }
}

/// Set of entry types used to filter enumerations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryTypeMask(u32);

impl EntryTypeMask {
    /// Regular files.
    pub const FILE: Self = Self(0x001);
    /// Directories.
    pub const DIRECTORY: Self = Self(0x002);
    /// Named pipes.
    pub const PIPE: Self = Self(0x004);
    /// Sockets.
    pub const SOCKET: Self = Self(0x008);
    /// Unresolvable symbolic links.
    pub const SYMLINK: Self = Self(0x010);
    /// Block devices.
    pub const BLOCK_DEV: Self = Self(0x020);
    /// Character devices.
    pub const CHAR_DEV: Self = Self(0x040);
    /// The `.` and `..` directory entries.
    pub const SPECIAL_DIRECTORY: Self = Self(0x080);
    /// Any other type.
    pub const OTHER: Self = Self(0x100);
    /// Files and directories.
    pub const NORMAL: Self = Self(0x003);
    /// Every type, special directories included.
    pub const ALL: Self = Self(0x1FF);

    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit representation.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Builds a mask from raw bits, dropping unknown ones.
    pub const fn from_u32(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Removes the bits of `other`.
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Parses a listing type string such as `"FD"` or `"!D"`.
    ///
    /// `!` selects the special directories. Letters are case-insensitive.
    pub fn from_type_string(types: &str) -> OsResult<Self> {
        types.chars().try_fold(Self::empty(), |mask, c| {
            let bit = match c.to_ascii_uppercase() {
                'F' => Self::FILE,
                'D' => Self::DIRECTORY,
                'P' => Self::PIPE,
                'S' => Self::SOCKET,
                'L' => Self::SYMLINK,
                'B' => Self::BLOCK_DEV,
                'C' => Self::CHAR_DEV,
                'O' => Self::OTHER,
                '!' => Self::SPECIAL_DIRECTORY,
                _ => {
                    return Err(OsError::InvalidValue {
                        reason: format!("Invalid entry type character: {c}"),
                    })
                }
            };
            Ok(mask | bit)
        })
    }
}

impl Default for EntryTypeMask {
    fn default() -> Self {
        Self::ALL.without(Self::SPECIAL_DIRECTORY)
    }
}

impl BitOr for EntryTypeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Metadata of one path at the time it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    path: String,
    entry_type: EntryType,
    is_link: bool,
    size: u64,
    modified: i64,
    link_target: String,
}

fn epoch_seconds(meta: &Metadata) -> i64 {
    match meta.modified() {
        Ok(t) => match t.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            Err(e) => -i64::try_from(e.duration().as_secs()).unwrap_or(i64::MAX),
        },
        Err(_) => 0,
    }
}

#[cfg(unix)]
fn directory_not_empty(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOTEMPTY) | Some(libc::EEXIST))
}

#[cfg(not(unix))]
fn directory_not_empty(err: &io::Error) -> bool {
    // ERROR_DIR_NOT_EMPTY
    err.raw_os_error() == Some(145)
}

#[cfg(unix)]
fn cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn cross_device(err: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    err.raw_os_error() == Some(17)
}

impl FsEntry {
    /// Reads the metadata of `path`.
    ///
    /// For a symbolic link the type, size and time are those of the target;
    /// a dangling link is reported as [`EntryType::SymLink`].
    pub fn get(path: &str) -> OsResult<Self> {
        let path = remove_trailing_slashes(path);
        let link_meta = fs::symlink_metadata(path).map_err(|e| map_io("lstat", path, e))?;

        if !link_meta.file_type().is_symlink() {
            return Ok(Self {
                path: path.to_string(),
                entry_type: EntryType::from_file_type(link_meta.file_type()),
                is_link: false,
                size: link_meta.len(),
                modified: epoch_seconds(&link_meta),
                link_target: String::new(),
            });
        }

        let link_target = fs::read_link(path)
            .map(|t| t.to_string_lossy().into_owned())
            .unwrap_or_else(|_| UNKNOWN_LINK_TARGET.to_string());
        let target_meta = fs::metadata(path).unwrap_or(link_meta);

        Ok(Self {
            path: path.to_string(),
            entry_type: EntryType::from_file_type(target_meta.file_type()),
            is_link: true,
            size: target_meta.len(),
            modified: epoch_seconds(&target_meta),
            link_target,
        })
    }

    /// The path the entry was read from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Kind of object.
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// True if the path itself is a symbolic link.
    pub fn is_link(&self) -> bool {
        self.is_link
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Modification time in seconds since the Unix epoch.
    pub fn modified(&self) -> i64 {
        self.modified
    }

    /// Modification time as a local timestamp.
    pub fn modified_timestamp(&self) -> OsResult<Timestamp> {
        Timestamp::from_unix_seconds(self.modified)
    }

    /// Target of a symbolic link, `<Unknown>` if unreadable, empty otherwise.
    pub fn link_target(&self) -> &str {
        &self.link_target
    }

    /// Removes the entry. A link is removed, not its target.
    pub fn delete(&self) -> OsResult<()> {
        let result = if self.is_link || self.entry_type != EntryType::Directory {
            fs::remove_file(&self.path)
        } else {
            fs::remove_dir(&self.path)
        };

        result.map_err(|e| {
            if directory_not_empty(&e) {
                OsError::DirectoryNotEmpty {
                    path: self.path.clone(),
                }
            } else {
                map_io("delete", &self.path, e)
            }
        })?;
        debug!(path = %self.path, "deleted entry");
        Ok(())
    }

    /// Copies the contents to `target`, replacing it if it exists.
    pub fn copy_to(&self, target: &str) -> OsResult<()> {
        let target = remove_trailing_slashes(target);
        let mut src = File::open(&self.path).map_err(|_| OsError::FileOpen {
            path: self.path.clone(),
        })?;
        let mut dst = File::create(target).map_err(|_| OsError::FileOpen {
            path: target.to_string(),
        })?;
        let copied = io::copy(&mut src, &mut dst).map_err(|e| OsError::from_io("copy", e))?;
        debug!(from = %self.path, to = target, bytes = copied, "copied entry");
        Ok(())
    }

    /// Moves the entry to `target`, replacing an existing file there.
    ///
    /// Across file systems the entry is copied and then deleted.
    pub fn move_to(&self, target: &str) -> OsResult<()> {
        let target = remove_trailing_slashes(target);
        match fs::rename(&self.path, target) {
            Ok(()) => Ok(()),
            Err(e) if cross_device(&e) => {
                warn!(from = %self.path, to = target, "cross-device move, copying");
                self.copy_to(target)?;
                self.delete()
            }
            Err(e) => Err(map_io("move", &self.path, e)),
        }
    }

    /// Renames the entry to `target`, which must not exist.
    pub fn rename_to(&self, target: &str) -> OsResult<()> {
        let target = remove_trailing_slashes(target);
        if exists(target)? {
            return Err(OsError::AlreadyExists {
                path: target.to_string(),
            });
        }
        fs::rename(&self.path, target).map_err(|e| map_io("rename", &self.path, e))
    }

    /// Takes a shared lock on the entry.
    ///
    /// Holders in this process share; the OS exclusive lock on the file
    /// excludes other processes while any holder exists.
    pub fn read_lock<'ctx>(&self, ctx: &'ctx OsContext) -> OsResult<EntryReadLock<'ctx>> {
        EntryReadLock::acquire(ctx, &self.path)
    }

    /// Takes an exclusive lock on the entry.
    pub fn write_lock<'ctx>(&self, ctx: &'ctx OsContext) -> OsResult<EntryWriteLock<'ctx>> {
        EntryWriteLock::acquire(ctx, &self.path)
    }
}
