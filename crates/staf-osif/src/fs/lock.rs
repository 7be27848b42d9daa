//! Exclusive OS file locks and per-path entry locks.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{map_io, remove_trailing_slashes};
use crate::context::OsContext;
use crate::error::{OsError, OsResult};
use crate::sync::{RwSem, WaitTimeout};

/// An advisory record lock covering a whole file.
///
/// Acquisition blocks until the lock is granted. The lock excludes other
/// processes only; threads of one process always share it.
#[derive(Debug)]
pub struct ExclusiveFileLock {
    file: Option<File>,
    path: String,
}

impl ExclusiveFileLock {
    /// Opens `path` for writing and locks it.
    pub fn acquire(path: &str) -> OsResult<Self> {
        let path = remove_trailing_slashes(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| map_io("open", path, e))?;
        sys::lock(&file)?;
        debug!(path, "acquired exclusive file lock");
        Ok(Self {
            file: Some(file),
            path: path.to_string(),
        })
    }

    /// The locked path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Unlocks and closes the file. The file is closed even if unlocking
    /// fails.
    pub fn release(mut self) -> OsResult<()> {
        self.unlock()
    }

    fn unlock(&mut self) -> OsResult<()> {
        let Some(file) = self.file.take() else {
            return Err(OsError::InvalidObject {
                what: "exclusive file lock",
            });
        };
        let result = sys::unlock(&file);
        drop(file);
        debug!(path = %self.path, "released exclusive file lock");
        result
    }
}

impl Drop for ExclusiveFileLock {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.unlock() {
                warn!(path = %self.path, error = %e, "failed to release file lock");
            }
        }
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    use crate::error::{OsError, OsResult};

    fn set_lock(file: &File, lock_type: libc::c_int, op: &'static str) -> OsResult<()> {
        // SAFETY: flock is plain data; all-zero is a valid whole-file range.
        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = lock_type as _;
        fl.l_whence = libc::SEEK_SET as _;

        loop {
            // SAFETY: the descriptor is owned by `file` and open; fl outlives
            // the call.
            let rc = unsafe {
                libc::fcntl(file.as_raw_fd(), libc::F_SETLKW, &fl as *const libc::flock)
            };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(OsError::from_io(op, err));
            }
        }
    }

    pub(super) fn lock(file: &File) -> OsResult<()> {
        set_lock(file, libc::F_WRLCK as libc::c_int, "fcntl(F_WRLCK)")
    }

    pub(super) fn unlock(file: &File) -> OsResult<()> {
        set_lock(file, libc::F_UNLCK as libc::c_int, "fcntl(F_UNLCK)")
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;

    use crate::error::{OsError, OsResult};

    fn unsupported(op: &'static str) -> OsError {
        OsError::BaseOsMessage {
            op,
            message: String::from("file locks are not supported on this platform"),
        }
    }

    pub(super) fn lock(_file: &File) -> OsResult<()> {
        Err(unsupported("lock"))
    }

    pub(super) fn unlock(_file: &File) -> OsResult<()> {
        Err(unsupported("unlock"))
    }
}

#[derive(Default)]
struct Owners {
    os_lock: Option<ExclusiveFileLock>,
    count: usize,
}

#[derive(Default)]
struct EntryRecord {
    owners: Mutex<Owners>,
    rw: RwSem,
}

/// Path → lock record. Records live for the life of the context.
#[derive(Default)]
pub(crate) struct EntryLockTable {
    records: Mutex<HashMap<String, Arc<EntryRecord>>>,
}

impl EntryLockTable {
    fn record(&self, path: &str) -> Arc<EntryRecord> {
        Arc::clone(self.records.lock().entry(path.to_string()).or_default())
    }

    fn lock(&self, path: &str, exclusive: bool) -> OsResult<()> {
        let record = self.record(path);
        {
            let mut owners = record.owners.lock();
            if owners.os_lock.is_none() {
                owners.os_lock = Some(ExclusiveFileLock::acquire(path)?);
            }
            owners.count += 1;
        }

        let granted = if exclusive {
            record.rw.write_lock(WaitTimeout::Indefinite)
        } else {
            record.rw.read_lock(WaitTimeout::Indefinite)
        };
        if let Err(e) = granted {
            self.drop_owner(&record)?;
            return Err(e);
        }
        Ok(())
    }

    fn unlock(&self, path: &str, exclusive: bool) -> OsResult<()> {
        let record = self.record(path);
        if exclusive {
            record.rw.write_unlock()?;
        } else {
            record.rw.read_unlock()?;
        }
        self.drop_owner(&record)
    }

    fn drop_owner(&self, record: &EntryRecord) -> OsResult<()> {
        let mut owners = record.owners.lock();
        owners.count = owners.count.saturating_sub(1);
        if owners.count == 0 {
            if let Some(os_lock) = owners.os_lock.take() {
                return os_lock.release();
            }
        }
        Ok(())
    }

    pub(crate) fn owner_count(&self, path: &str) -> usize {
        self.records
            .lock()
            .get(path)
            .map_or(0, |r| r.owners.lock().count)
    }
}

macro_rules! entry_guard {
    ($name:ident, $exclusive:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug)]
        pub struct $name<'ctx> {
            ctx: &'ctx OsContext,
            path: String,
            held: bool,
        }

        impl<'ctx> $name<'ctx> {
            pub(crate) fn acquire(ctx: &'ctx OsContext, path: &str) -> OsResult<Self> {
                let path = remove_trailing_slashes(path).to_string();
                ctx.entry_locks().lock(&path, $exclusive)?;
                Ok(Self {
                    ctx,
                    path,
                    held: true,
                })
            }

            /// The locked path.
            pub fn path(&self) -> &str {
                &self.path
            }

            /// Releases the lock, reporting unlock errors.
            pub fn release(mut self) -> OsResult<()> {
                self.held = false;
                self.ctx.entry_locks().unlock(&self.path, $exclusive)
            }
        }

        impl Drop for $name<'_> {
            fn drop(&mut self) {
                if self.held {
                    if let Err(e) = self.ctx.entry_locks().unlock(&self.path, $exclusive) {
                        warn!(path = %self.path, error = %e, "failed to release entry lock");
                    }
                }
            }
        }
    };
}

entry_guard!(EntryReadLock, false, "Shared lock on a file system entry.");
entry_guard!(EntryWriteLock, true, "Exclusive lock on a file system entry.");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FsEntry;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn temp_file(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("locked.txt");
        std::fs::write(&path, b"data").unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn test_exclusive_lock_acquire_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir);
        let lock = ExclusiveFileLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path);
        lock.release().unwrap();

        // Dropping also unlocks.
        let _again = ExclusiveFileLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_exclusive_lock_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing").to_string_lossy().into_owned();
        assert!(matches!(
            ExclusiveFileLock::acquire(&missing),
            Err(OsError::DoesNotExist { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_readers_share_entry() {
        let ctx = OsContext::default();
        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir);
        let entry = FsEntry::get(&path).unwrap();

        let a = entry.read_lock(&ctx).unwrap();
        let b = entry.read_lock(&ctx).unwrap();
        assert_eq!(ctx.entry_locks().owner_count(&path), 2);
        a.release().unwrap();
        drop(b);
        assert_eq!(ctx.entry_locks().owner_count(&path), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_writer_excludes_readers() {
        let ctx: &'static OsContext = Box::leak(Box::new(OsContext::default()));
        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir);
        let entry = FsEntry::get(&path).unwrap();

        let writer = entry.write_lock(ctx).unwrap();
        let (tx, rx) = mpsc::channel();
        let reader_entry = entry.clone();
        let reader = thread::spawn(move || {
            let guard = reader_entry.read_lock(ctx).unwrap();
            tx.send(()).unwrap();
            drop(guard);
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        writer.release().unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        reader.join().unwrap();
        assert_eq!(ctx.entry_locks().owner_count(&path), 0);
    }
}
