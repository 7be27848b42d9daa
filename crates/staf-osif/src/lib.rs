#![warn(missing_docs)]

//! STAF OS interface: the portable primitive layer of the STAF runtime
//!
//! This crate wraps the operating system behind one contract: mutex, event
//! and read-write semaphores, thread creation, shared library loading, file
//! system entries with enumeration and locking, and byte-stream
//! connections. Process-wide state lives in an explicit [`OsContext`].

pub mod config;
pub mod conn;
pub mod context;
pub mod dynlib;
pub mod error;
pub mod fs;
pub mod sync;
pub mod thread;
pub mod timestamp;
pub mod trace;
pub mod util;

pub use config::{ConfigInfo, RuntimeConfig};
pub use conn::{Connection, ConnectionProvider, StreamConnection, TcpConnectionProvider};
#[cfg(unix)]
pub use conn::LocalConnectionProvider;
pub use context::OsContext;
pub use dynlib::DynamicLibrary;
pub use error::{OsError, OsResult, ReturnCode};
pub use fs::{CaseSensitivity, EntryType, EntryTypeMask, FsEntry, FsEnum, FsPath};
pub use sync::{EventSem, EventSemState, LockStatus, MutexSem, RwSem, WaitStatus, WaitTimeout};
pub use thread::{ThreadHandle, ThreadId, ThreadSafeScalar};
pub use timestamp::{RelativeTime, Timestamp};
