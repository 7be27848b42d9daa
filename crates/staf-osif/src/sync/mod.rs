//! Synchronization primitives: mutex semaphore, event semaphore and
//! read-write semaphore.
//!
//! All waits take a [`WaitTimeout`] and report the outcome as a status enum;
//! running out of time is a normal outcome, not an [`crate::OsError`].

pub mod event;
pub mod mutex;
pub mod rwsem;

use std::time::{Duration, Instant};

use crate::error::ReturnCode;

pub use event::{EventSem, EventSemState};
pub use mutex::{MutexSem, MutexSemLock};
pub use rwsem::{RwSem, RwSemInfo, RwSemReadGuard, RwSemWriteGuard};

/// How long a blocking request may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Block until the request is satisfied.
    Indefinite,
    /// Give up after the duration elapses.
    After(Duration),
}

impl WaitTimeout {
    /// Legacy millisecond value meaning "wait forever".
    pub const INDEFINITE_MILLIS: u32 = u32::MAX;

    /// Converts a legacy millisecond timeout, where `u32::MAX` is indefinite.
    pub fn from_millis(millis: u32) -> Self {
        if millis == Self::INDEFINITE_MILLIS {
            WaitTimeout::Indefinite
        } else {
            WaitTimeout::After(Duration::from_millis(u64::from(millis)))
        }
    }

    /// Absolute deadline, or `None` when the wait is unbounded.
    pub(crate) fn deadline(self) -> Option<Instant> {
        match self {
            WaitTimeout::Indefinite => None,
            WaitTimeout::After(d) => Instant::now().checked_add(d),
        }
    }
}

impl From<Duration> for WaitTimeout {
    fn from(d: Duration) -> Self {
        WaitTimeout::After(d)
    }
}

/// Outcome of a mutex or read-write semaphore request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// The caller now holds the lock.
    Acquired,
    /// The timeout elapsed first.
    TimedOut,
}

impl LockStatus {
    /// True when the lock was obtained.
    pub fn is_acquired(self) -> bool {
        matches!(self, LockStatus::Acquired)
    }

    /// The result code a caller reports for this outcome.
    pub fn return_code(self) -> ReturnCode {
        match self {
            LockStatus::Acquired => ReturnCode::Ok,
            LockStatus::TimedOut => ReturnCode::Timeout,
        }
    }
}

/// Outcome of an event semaphore wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The semaphore was (or became) posted.
    Posted,
    /// The timeout elapsed first.
    TimedOut,
}

impl WaitStatus {
    /// True when the wait ended because of a post.
    pub fn is_posted(self) -> bool {
        matches!(self, WaitStatus::Posted)
    }

    /// The result code a caller reports for this outcome.
    pub fn return_code(self) -> ReturnCode {
        match self {
            WaitStatus::Posted => ReturnCode::Ok,
            WaitStatus::TimedOut => ReturnCode::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_millis_indefinite_sentinel() {
        assert_eq!(WaitTimeout::from_millis(u32::MAX), WaitTimeout::Indefinite);
        assert_eq!(
            WaitTimeout::from_millis(250),
            WaitTimeout::After(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_deadline() {
        assert!(WaitTimeout::Indefinite.deadline().is_none());
        let before = Instant::now();
        let deadline = WaitTimeout::After(Duration::from_millis(10))
            .deadline()
            .unwrap();
        assert!(deadline >= before + Duration::from_millis(10));
    }

    #[test]
    fn test_status_helpers() {
        assert!(LockStatus::Acquired.is_acquired());
        assert!(!LockStatus::TimedOut.is_acquired());
        assert!(WaitStatus::Posted.is_posted());
        assert!(!WaitStatus::TimedOut.is_posted());
    }

    #[test]
    fn test_timed_out_maps_to_timeout_code() {
        assert_eq!(LockStatus::Acquired.return_code(), ReturnCode::Ok);
        assert_eq!(LockStatus::TimedOut.return_code(), ReturnCode::Timeout);
        assert_eq!(WaitStatus::Posted.return_code(), ReturnCode::Ok);
        assert_eq!(WaitStatus::TimedOut.return_code(), ReturnCode::Timeout);

        let sem = EventSem::new();
        let status = sem.wait(WaitTimeout::After(Duration::from_millis(5))).unwrap();
        assert_eq!(status.return_code().as_u32(), 37);
    }
}
