//! Manual-reset event semaphore.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::context::OsContext;
use crate::error::{OsError, OsResult};
use crate::sync::{WaitStatus, WaitTimeout};

/// Observable state of an [`EventSem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSemState {
    /// Waiters block.
    Reset,
    /// Waiters return immediately.
    Posted,
}

struct EventState {
    posted: bool,
    post_count: u64,
}

pub(crate) struct EventInner {
    state: Mutex<EventState>,
    cond: Condvar,
}

impl EventInner {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(EventState {
                posted: false,
                post_count: 0,
            }),
            cond: Condvar::new(),
        }
    }
}

/// Event semaphore that stays posted until explicitly reset.
///
/// A waiter blocked on a reset semaphore is released by the next
/// reset-to-posted transition even when the event is reset again before the
/// waiter runs.
#[derive(Clone)]
pub struct EventSem {
    inner: Arc<EventInner>,
    name: Option<String>,
}

impl EventSem {
    /// Creates an anonymous event in the reset state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventInner::new()),
            name: None,
        }
    }

    /// Opens the process-wide event called `name`, creating it (reset) on
    /// first use.
    pub fn named(ctx: &OsContext, name: &str) -> OsResult<Self> {
        if name.is_empty() {
            return Err(OsError::invalid_parameter("event name must not be empty"));
        }
        let inner = ctx.named_events().open_or_create(name, EventInner::new);
        Ok(Self {
            inner,
            name: Some(name.to_string()),
        })
    }

    /// The name given at construction, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Posts the event, waking every waiter. Posting twice is a no-op.
    pub fn post(&self) -> OsResult<()> {
        let mut state = self.inner.state.lock();
        if !state.posted {
            state.posted = true;
            state.post_count = state.post_count.wrapping_add(1);
            self.inner.cond.notify_all();
        }
        Ok(())
    }

    /// Returns the event to the reset state.
    pub fn reset(&self) -> OsResult<()> {
        self.inner.state.lock().posted = false;
        Ok(())
    }

    /// Waits until the event is posted or `timeout` elapses.
    pub fn wait(&self, timeout: impl Into<WaitTimeout>) -> OsResult<WaitStatus> {
        let deadline = timeout.into().deadline();
        let mut state = self.inner.state.lock();
        if state.posted {
            return Ok(WaitStatus::Posted);
        }

        let start = state.post_count;
        while state.post_count == start {
            match deadline {
                None => self.inner.cond.wait(&mut state),
                Some(at) => {
                    if self.inner.cond.wait_until(&mut state, at).timed_out()
                        && state.post_count == start
                    {
                        return Ok(WaitStatus::TimedOut);
                    }
                }
            }
        }
        Ok(WaitStatus::Posted)
    }

    /// Current state.
    pub fn query(&self) -> EventSemState {
        if self.inner.state.lock().posted {
            EventSemState::Posted
        } else {
            EventSemState::Reset
        }
    }

    /// Number of reset-to-posted transitions since creation.
    pub fn post_count(&self) -> u64 {
        self.inner.state.lock().post_count
    }
}

impl Default for EventSem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventSem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSem")
            .field("name", &self.name)
            .field("state", &self.query())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_new_is_reset() {
        let ev = EventSem::new();
        assert_eq!(ev.query(), EventSemState::Reset);
        assert_eq!(ev.post_count(), 0);
    }

    #[test]
    fn test_post_is_idempotent() {
        let ev = EventSem::new();
        ev.post().unwrap();
        ev.post().unwrap();
        ev.post().unwrap();
        assert_eq!(ev.query(), EventSemState::Posted);
        assert_eq!(ev.post_count(), 1);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let ev = EventSem::new();
        ev.reset().unwrap();
        ev.reset().unwrap();
        assert_eq!(ev.query(), EventSemState::Reset);
    }

    #[test]
    fn test_wait_on_posted_returns_immediately() {
        let ev = EventSem::new();
        ev.post().unwrap();
        let start = Instant::now();
        assert_eq!(ev.wait(WaitTimeout::Indefinite).unwrap(), WaitStatus::Posted);
        assert_eq!(ev.wait(Duration::ZERO).unwrap(), WaitStatus::Posted);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_wait_times_out() {
        let ev = EventSem::new();
        let start = Instant::now();
        assert_eq!(
            ev.wait(Duration::from_millis(30)).unwrap(),
            WaitStatus::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_post_wakes_all_waiters() {
        let ev = EventSem::new();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let ev = ev.clone();
                thread::spawn(move || ev.wait(WaitTimeout::Indefinite).unwrap())
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        ev.post().unwrap();
        for h in handles {
            assert_eq!(h.join().unwrap(), WaitStatus::Posted);
        }
    }

    #[test]
    fn test_post_then_reset_still_releases_waiter() {
        let ev = EventSem::new();
        let waiter = {
            let ev = ev.clone();
            thread::spawn(move || ev.wait(WaitTimeout::Indefinite).unwrap())
        };

        while !waiter.is_finished() {
            thread::sleep(Duration::from_millis(20));
            ev.post().unwrap();
            ev.reset().unwrap();
        }
        assert_eq!(waiter.join().unwrap(), WaitStatus::Posted);
        assert_eq!(ev.query(), EventSemState::Reset);
    }

    #[test]
    fn test_named_events_share_state() {
        let ctx = OsContext::new(Default::default());
        let a = EventSem::named(&ctx, "STAF/Test/Event").unwrap();
        let b = EventSem::named(&ctx, "STAF/Test/Event").unwrap();
        a.post().unwrap();
        assert_eq!(b.query(), EventSemState::Posted);
        b.reset().unwrap();
        assert_eq!(a.query(), EventSemState::Reset);
    }

    #[test]
    fn test_named_event_recreated_after_last_handle() {
        let ctx = OsContext::new(Default::default());
        {
            let a = EventSem::named(&ctx, "transient").unwrap();
            a.post().unwrap();
        }
        let b = EventSem::named(&ctx, "transient").unwrap();
        assert_eq!(b.query(), EventSemState::Reset);
    }
}
