//! Mutual-exclusion semaphore.
//!
//! A binary lock with no owner tracking: the state is only "free" or
//! "held". A second `request` from the thread that already holds the lock
//! blocks like any other caller (the semaphore is not re-entrant), and
//! `release` by a thread that does not hold it simply frees the lock.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::context::OsContext;
use crate::error::{OsError, OsResult};
use crate::sync::{LockStatus, WaitTimeout};

pub(crate) struct MutexInner {
    owned: Mutex<bool>,
    cond: Condvar,
}

impl MutexInner {
    pub(crate) fn new() -> Self {
        Self {
            owned: Mutex::new(false),
            cond: Condvar::new(),
        }
    }
}

/// Binary exclusive lock with timed requests.
///
/// Cloning yields another handle to the same semaphore.
#[derive(Clone)]
pub struct MutexSem {
    inner: Arc<MutexInner>,
    name: Option<String>,
}

impl MutexSem {
    /// Creates an anonymous semaphore private to its holders.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MutexInner::new()),
            name: None,
        }
    }

    /// Opens the process-wide semaphore called `name`, creating it on first
    /// use. Every handle opened with the same name in the same context
    /// refers to one lock.
    pub fn named(ctx: &OsContext, name: &str) -> OsResult<Self> {
        if name.is_empty() {
            return Err(OsError::invalid_parameter("mutex name must not be empty"));
        }
        let inner = ctx.named_mutexes().open_or_create(name, MutexInner::new);
        Ok(Self {
            inner,
            name: Some(name.to_string()),
        })
    }

    /// The name given at construction, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Requests the lock, waiting at most `timeout`.
    pub fn request(&self, timeout: impl Into<WaitTimeout>) -> OsResult<LockStatus> {
        let deadline = timeout.into().deadline();
        let mut owned = self.inner.owned.lock();

        while *owned {
            match deadline {
                None => self.inner.cond.wait(&mut owned),
                Some(at) => {
                    if self.inner.cond.wait_until(&mut owned, at).timed_out() && *owned {
                        trace!(name = ?self.name, "mutex request timed out");
                        return Ok(LockStatus::TimedOut);
                    }
                }
            }
        }

        *owned = true;
        Ok(LockStatus::Acquired)
    }

    /// Requests the lock without waiting.
    pub fn try_request(&self) -> OsResult<LockStatus> {
        self.request(WaitTimeout::After(std::time::Duration::ZERO))
    }

    /// Releases the lock. Releasing a free semaphore is a no-op.
    pub fn release(&self) -> OsResult<()> {
        let mut owned = self.inner.owned.lock();
        if *owned {
            *owned = false;
            self.inner.cond.notify_one();
        }
        Ok(())
    }

    /// True while some holder has the lock.
    pub fn is_owned(&self) -> bool {
        *self.inner.owned.lock()
    }

    /// Requests the lock indefinitely and returns a guard that releases it.
    pub fn lock(&self) -> OsResult<MutexSemLock<'_>> {
        self.request(WaitTimeout::Indefinite)?;
        Ok(MutexSemLock { sem: self })
    }
}

impl Default for MutexSem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MutexSem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexSem")
            .field("name", &self.name)
            .field("owned", &self.is_owned())
            .finish()
    }
}

/// Scoped hold on a [`MutexSem`]; released on drop.
pub struct MutexSemLock<'a> {
    sem: &'a MutexSem,
}

impl Drop for MutexSemLock<'_> {
    fn drop(&mut self) {
        let _ = self.sem.release();
    }
}
