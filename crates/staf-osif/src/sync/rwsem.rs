//! Read-write semaphore built from a state mutex and per-waiter events.
//!
//! Waiters are served strictly in arrival order. A reader that arrives while
//! anyone is queued queues too, so a steady stream of readers cannot starve
//! a waiting writer. When the lock is handed off to a reader, every reader
//! queued directly behind it is admitted in the same batch.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::OsContext;
use crate::error::{OsError, OsResult};
use crate::sync::{EventSem, LockStatus, WaitStatus, WaitTimeout};

/// Snapshot of holders and waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RwSemInfo {
    /// Current read holders.
    pub num_readers: u32,
    /// 1 while a writer holds the lock.
    pub num_writers: u32,
    /// Readers queued for the lock.
    pub num_waiting_readers: u32,
    /// Writers queued for the lock.
    pub num_waiting_writers: u32,
}

struct Waiter {
    id: u64,
    is_reader: bool,
    event: EventSem,
}

#[derive(Default)]
struct RwState {
    owned: bool,
    readers: u32,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
}

impl RwState {
    fn writer_holds(&self) -> bool {
        self.owned && self.readers == 0
    }

    fn enqueue(&mut self, is_reader: bool) -> (u64, EventSem) {
        let id = self.next_waiter_id;
        self.next_waiter_id = self.next_waiter_id.wrapping_add(1);
        let event = EventSem::new();
        self.waiters.push_back(Waiter {
            id,
            is_reader,
            event: event.clone(),
        });
        (id, event)
    }

    /// Passes ownership to the head of the queue, or frees the lock.
    fn hand_off(&mut self) -> OsResult<()> {
        match self.waiters.front() {
            None => self.owned = false,
            Some(w) if w.is_reader => self.admit_head_readers()?,
            Some(_) => {
                if let Some(writer) = self.waiters.pop_front() {
                    writer.event.post()?;
                }
            }
        }
        Ok(())
    }

    fn admit_head_readers(&mut self) -> OsResult<()> {
        while self.waiters.front().is_some_and(|w| w.is_reader) {
            if let Some(reader) = self.waiters.pop_front() {
                reader.event.post()?;
                self.readers += 1;
            }
        }
        Ok(())
    }
}

/// Many-readers / one-writer lock with timed requests.
///
/// Cloning yields another handle to the same semaphore.
#[derive(Clone, Default)]
pub struct RwSem {
    state: Arc<Mutex<RwState>>,
}

impl RwSem {
    /// Creates an unowned semaphore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Named read-write semaphores are not supported; always fails with
    /// [`OsError::InvalidParameter`].
    pub fn named(_ctx: &OsContext, name: &str) -> OsResult<Self> {
        Err(OsError::invalid_parameter(format!(
            "named read-write semaphores are not supported: {name}"
        )))
    }

    /// Requests shared access.
    pub fn read_lock(&self, timeout: impl Into<WaitTimeout>) -> OsResult<LockStatus> {
        let (id, event) = {
            let mut state = self.state.lock();
            if !state.writer_holds() && state.waiters.is_empty() {
                state.owned = true;
                state.readers += 1;
                return Ok(LockStatus::Acquired);
            }
            state.enqueue(true)
        };
        self.await_grant(id, event, timeout.into())
    }

    /// Gives up shared access.
    pub fn read_unlock(&self) -> OsResult<()> {
        let mut state = self.state.lock();
        if !state.owned || state.readers == 0 {
            return Err(OsError::invalid_parameter("read lock is not held"));
        }
        state.readers -= 1;
        if state.readers == 0 {
            state.hand_off()?;
        }
        Ok(())
    }

    /// Requests exclusive access.
    pub fn write_lock(&self, timeout: impl Into<WaitTimeout>) -> OsResult<LockStatus> {
        let (id, event) = {
            let mut state = self.state.lock();
            if !state.owned {
                state.owned = true;
                return Ok(LockStatus::Acquired);
            }
            state.enqueue(false)
        };
        self.await_grant(id, event, timeout.into())
    }

    /// Gives up exclusive access.
    pub fn write_unlock(&self) -> OsResult<()> {
        let mut state = self.state.lock();
        if !state.writer_holds() {
            return Err(OsError::invalid_parameter("write lock is not held"));
        }
        state.hand_off()
    }

    fn await_grant(&self, id: u64, event: EventSem, timeout: WaitTimeout) -> OsResult<LockStatus> {
        if event.wait(timeout)? == WaitStatus::Posted {
            return Ok(LockStatus::Acquired);
        }

        let mut state = self.state.lock();
        let Some(pos) = state.waiters.iter().position(|w| w.id == id) else {
            // Granted between the timeout and re-taking the state lock.
            return Ok(LockStatus::Acquired);
        };
        state.waiters.remove(pos);
        if state.owned && state.readers > 0 {
            state.admit_head_readers()?;
        }
        debug!(waiter = id, "read-write semaphore request timed out");
        Ok(LockStatus::TimedOut)
    }

    /// Blocks for shared access and returns a guard that releases it.
    pub fn read(&self) -> OsResult<RwSemReadGuard<'_>> {
        self.read_lock(WaitTimeout::Indefinite)?;
        Ok(RwSemReadGuard { sem: self })
    }

    /// Blocks for exclusive access and returns a guard that releases it.
    pub fn write(&self) -> OsResult<RwSemWriteGuard<'_>> {
        self.write_lock(WaitTimeout::Indefinite)?;
        Ok(RwSemWriteGuard { sem: self })
    }

    /// Current holders and waiters.
    pub fn query(&self) -> RwSemInfo {
        let state = self.state.lock();
        let waiting_readers = state.waiters.iter().filter(|w| w.is_reader).count();
        RwSemInfo {
            num_readers: state.readers,
            num_writers: u32::from(state.writer_holds()),
            num_waiting_readers: waiting_readers as u32,
            num_waiting_writers: (state.waiters.len() - waiting_readers) as u32,
        }
    }

    /// Destroys this handle, failing while the lock is held.
    pub fn close(self) -> OsResult<()> {
        if self.state.lock().owned {
            return Err(OsError::SemaphoreHasPendingRequests);
        }
        Ok(())
    }
}

impl std::fmt::Debug for RwSem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RwSem").field("info", &self.query()).finish()
    }
}

/// Shared hold on an [`RwSem`].
pub struct RwSemReadGuard<'a> {
    sem: &'a RwSem,
}

impl Drop for RwSemReadGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sem.read_unlock() {
            warn!(error = %e, "failed to release read lock");
        }
    }
}

/// Exclusive hold on an [`RwSem`].
pub struct RwSemWriteGuard<'a> {
    sem: &'a RwSem,
}

impl Drop for RwSemWriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sem.write_unlock() {
            warn!(error = %e, "failed to release write lock");
        }
    }
}
