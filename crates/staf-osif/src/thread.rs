//! OS thread creation and thread-level helpers.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error};

use crate::context::OsContext;
use crate::error::{OsError, OsResult};

/// Stack size used when none is configured.
pub const DEFAULT_STACK_SIZE: usize = 4 * 1024 * 1024;

/// Process-unique identifier of a thread.
pub type ThreadId = u64;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<ThreadId> = const { Cell::new(0) };
}

/// Identifier of the calling thread. Stable for the thread's lifetime and
/// never reused within the process.
pub fn current_thread_id() -> ThreadId {
    THREAD_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        }
        id.get()
    })
}

/// Suspends the calling thread for `millis` milliseconds.
pub fn sleep_current_thread(millis: u32) -> OsResult<()> {
    thread::sleep(Duration::from_millis(u64::from(millis)));
    Ok(())
}

/// Handle to a thread started with [`start`].
#[derive(Debug)]
pub struct ThreadHandle {
    inner: JoinHandle<()>,
}

impl ThreadHandle {
    /// The name given at start.
    pub fn name(&self) -> Option<&str> {
        self.inner.thread().name()
    }

    /// True once the thread body has returned.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Waits for the thread to exit.
    pub fn join(self) -> OsResult<()> {
        self.inner
            .join()
            .map_err(|_| OsError::unknown("thread terminated abnormally"))
    }
}

/// Starts a named OS thread running `body`.
///
/// The stack size comes from the context's configuration, falling back to
/// [`DEFAULT_STACK_SIZE`]. A panic escaping `body` is logged and ends only
/// that thread.
pub fn start<F>(ctx: &OsContext, name: &str, body: F) -> OsResult<ThreadHandle>
where
    F: FnOnce() + Send + 'static,
{
    let stack_size = ctx.config().thread_stack_size.unwrap_or(DEFAULT_STACK_SIZE);
    let thread_name = name.to_string();

    let inner = thread::Builder::new()
        .name(thread_name.clone())
        .stack_size(stack_size)
        .spawn(move || {
            if panic::catch_unwind(AssertUnwindSafe(body)).is_err() {
                error!(thread = %thread_name, "thread body panicked");
            }
        })
        .map_err(|e| OsError::CreateThread {
            code: e.raw_os_error().unwrap_or(-1),
        })?;

    debug!(name, stack_size, "started thread");
    Ok(ThreadHandle { inner })
}

/// Counter whose increment and decrement return the updated value.
#[derive(Debug, Default)]
pub struct ThreadSafeScalar(AtomicI64);

impl ThreadSafeScalar {
    /// Creates a counter holding `value`.
    pub const fn new(value: i64) -> Self {
        Self(AtomicI64::new(value))
    }

    /// Adds one and returns the new value.
    pub fn increment(&self) -> i64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Subtracts one and returns the new value.
    pub fn decrement(&self) -> i64 {
        self.0.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Current value.
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}
