//! Error types for the OS interface layer.
//!
//! Every primitive reports failures through [`OsError`]. A timeout is not an
//! error: waits return [`crate::sync::LockStatus`] or
//! [`crate::sync::WaitStatus`] so callers can tell "didn't get it" from
//! "something broke".

use thiserror::Error;

/// Result type alias for OS interface operations.
pub type OsResult<T> = Result<T, OsError>;

/// Structured result codes, numbered as on the STAF wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ReturnCode {
    /// Success.
    Ok = 0,
    /// Catch-all for unexpected native failures.
    UnknownError = 6,
    /// An operating system call failed; see the OS code.
    BaseOsError = 10,
    /// A file could not be opened.
    FileOpenError = 17,
    /// A connection read or write failed.
    CommunicationError = 22,
    /// A semaphore is still owned or has waiters.
    SemaphoreHasPendingRequests = 36,
    /// A wait elapsed without the condition being met. Reported through
    /// [`crate::sync::LockStatus::return_code`] and
    /// [`crate::sync::WaitStatus::return_code`], never by an [`OsError`].
    Timeout = 37,
    /// Use of a destructed or null handle.
    InvalidObject = 41,
    /// Null or malformed input.
    InvalidParm = 42,
    /// A value was out of range or badly formatted.
    InvalidValue = 47,
    /// The named entry does not exist.
    DoesNotExist = 48,
    /// The named entry already exists.
    AlreadyExists = 49,
    /// A directory could not be removed because it has entries.
    DirectoryNotEmpty = 50,
    /// An OS thread could not be created.
    CreateThreadError = 57,
}

impl ReturnCode {
    /// Numeric value of the code.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Error variants for OS interface operations.
#[derive(Debug, Error)]
pub enum OsError {
    /// Null or malformed input.
    #[error("Invalid parameter: {reason}")]
    InvalidParameter {
        /// What was wrong with the input.
        reason: String,
    },

    /// Use of a closed or never-opened object.
    #[error("Invalid object: {what}")]
    InvalidObject {
        /// The object that was used.
        what: &'static str,
    },

    /// A value failed range or format validation.
    #[error("Invalid value: {reason}")]
    InvalidValue {
        /// Description suitable for showing to a user.
        reason: String,
    },

    /// An OS call failed with the given code.
    #[error("OS error in {op}: code {code}")]
    BaseOs {
        /// The failing operation.
        op: &'static str,
        /// The native error code (errno / GetLastError).
        code: i32,
    },

    /// An OS call failed with a textual diagnostic (e.g. `dlerror()`).
    #[error("OS error in {op}: {message}")]
    BaseOsMessage {
        /// The failing operation.
        op: &'static str,
        /// The native diagnostic text.
        message: String,
    },

    /// The target already exists.
    #[error("Already exists: {path}")]
    AlreadyExists {
        /// The path that exists.
        path: String,
    },

    /// The target does not exist.
    #[error("Does not exist: {path}")]
    DoesNotExist {
        /// The path that is missing.
        path: String,
    },

    /// A directory still contains entries.
    #[error("Directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The directory path.
        path: String,
    },

    /// A file could not be opened.
    #[error("Could not open file: {path}")]
    FileOpen {
        /// The file path.
        path: String,
    },

    /// Thread creation failed.
    #[error("Error creating thread: code {code}")]
    CreateThread {
        /// The native error code, or -1 if unknown.
        code: i32,
    },

    /// A connection read or write failed.
    #[error("Communication error: {reason}")]
    Communication {
        /// Description of the failure.
        reason: String,
    },

    /// A semaphore was destroyed while still owned.
    #[error("Semaphore has pending requests")]
    SemaphoreHasPendingRequests,

    /// Unexpected failure converted at a primitive boundary.
    #[error("Unknown error: {reason}")]
    Unknown {
        /// Description of the failure.
        reason: String,
    },

    /// Wraps standard I/O errors that carry no OS code.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OsError {
    /// Maps an I/O error from operation `op` into the taxonomy.
    ///
    /// Errors carrying a raw OS code become [`OsError::BaseOs`] so the code
    /// survives for diagnostics.
    pub fn from_io(op: &'static str, err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => OsError::BaseOs { op, code },
            None => OsError::Io(err),
        }
    }

    /// The structured result code of this error.
    pub fn kind(&self) -> ReturnCode {
        match self {
            OsError::InvalidParameter { .. } => ReturnCode::InvalidParm,
            OsError::InvalidObject { .. } => ReturnCode::InvalidObject,
            OsError::InvalidValue { .. } => ReturnCode::InvalidValue,
            OsError::BaseOs { .. } | OsError::BaseOsMessage { .. } => ReturnCode::BaseOsError,
            OsError::AlreadyExists { .. } => ReturnCode::AlreadyExists,
            OsError::DoesNotExist { .. } => ReturnCode::DoesNotExist,
            OsError::DirectoryNotEmpty { .. } => ReturnCode::DirectoryNotEmpty,
            OsError::FileOpen { .. } => ReturnCode::FileOpenError,
            OsError::CreateThread { .. } => ReturnCode::CreateThreadError,
            OsError::Communication { .. } => ReturnCode::CommunicationError,
            OsError::SemaphoreHasPendingRequests => ReturnCode::SemaphoreHasPendingRequests,
            OsError::Unknown { .. } => ReturnCode::UnknownError,
            OsError::Io(_) => ReturnCode::BaseOsError,
        }
    }

    /// The native OS diagnostic code, when one exists.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            OsError::BaseOs { code, .. } => Some(*code),
            OsError::CreateThread { code } if *code >= 0 => Some(*code),
            OsError::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    pub(crate) fn invalid_parameter(reason: impl Into<String>) -> Self {
        OsError::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown(reason: impl Into<String>) -> Self {
        OsError::Unknown {
            reason: reason.into(),
        }
    }
}
