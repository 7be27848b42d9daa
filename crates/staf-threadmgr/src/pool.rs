//! Worker pool and dispatch.
//!
//! Each worker cycles Ready → Working → Ready. Idle workers sit on a stack:
//! a finished worker is pushed on the back and dispatch pops from the back,
//! so the most recently idle thread is reused first.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use staf_osif::sync::{EventSem, WaitTimeout};
use staf_osif::thread::{self, ThreadHandle, ThreadId};
use staf_osif::{OsContext, OsResult};

type Work = Box<dyn FnOnce() + Send + 'static>;

/// Result of [`ThreadManager::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A worker took the item.
    Accepted,
    /// No worker was idle and the pool may not grow.
    Rejected,
}

struct Worker {
    id: usize,
    alive: AtomicBool,
    work: Mutex<Option<Work>>,
    work_available: EventSem,
}

#[derive(Default)]
struct PoolState {
    ready: Vec<Arc<Worker>>,
    all: Vec<Arc<Worker>>,
    handles: Vec<ThreadHandle>,
}

struct Shared {
    state: Mutex<PoolState>,
    next_worker_id: AtomicUsize,
}

/// A pool of OS threads executing dispatched closures.
///
/// Dropping the manager tells every worker to exit once it next wakes and
/// returns without waiting. Use [`ThreadManager::shutdown`] to wait for the
/// workers. An item dispatched to a worker that has not yet woken when
/// teardown starts is dropped without running.
pub struct ThreadManager<'ctx> {
    ctx: &'ctx OsContext,
    shared: Arc<Shared>,
    growth_delta: AtomicUsize,
}

impl<'ctx> ThreadManager<'ctx> {
    /// Creates a pool with `init_threads` ready workers.
    pub fn new(ctx: &'ctx OsContext, init_threads: usize, growth_delta: usize) -> OsResult<Self> {
        let manager = Self {
            ctx,
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState::default()),
                next_worker_id: AtomicUsize::new(1),
            }),
            growth_delta: AtomicUsize::new(growth_delta),
        };
        {
            let mut state = manager.shared.state.lock();
            manager.grow_locked(&mut state, init_threads)?;
        }
        Ok(manager)
    }

    /// Identifier of the calling thread.
    pub fn current_thread_id() -> ThreadId {
        thread::current_thread_id()
    }

    /// Suspends the calling thread for `millis` milliseconds.
    pub fn sleep_current_thread(millis: u32) -> OsResult<()> {
        thread::sleep_current_thread(millis)
    }

    /// Hands `work` to an idle worker, growing the pool if none is idle.
    ///
    /// Growth happens under the pool lock, so concurrent dispatches never
    /// start overlapping batches. A panic inside `work` is logged and the
    /// worker returns to the pool.
    pub fn dispatch<F>(&self, work: F) -> OsResult<DispatchOutcome>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();

        if state.ready.is_empty() {
            let delta = self.growth_delta();
            if delta == 0 {
                debug!("no ready worker and growth disabled, rejecting work");
                return Ok(DispatchOutcome::Rejected);
            }
            self.grow_locked(&mut state, delta)?;
        }

        let Some(worker) = state.ready.pop() else {
            return Ok(DispatchOutcome::Rejected);
        };
        *worker.work.lock() = Some(Box::new(work));
        worker.work_available.post()?;
        Ok(DispatchOutcome::Accepted)
    }

    /// Adds the growth delta's worth of workers.
    pub fn grow_thread_pool(&self) -> OsResult<()> {
        self.grow_thread_pool_by(self.growth_delta())
    }

    /// Adds `delta` workers.
    pub fn grow_thread_pool_by(&self, delta: usize) -> OsResult<()> {
        let mut state = self.shared.state.lock();
        self.grow_locked(&mut state, delta)
    }

    /// Total number of workers.
    pub fn thread_pool_size(&self) -> usize {
        self.shared.state.lock().all.len()
    }

    /// Workers waiting for work.
    pub fn num_ready_threads(&self) -> usize {
        self.shared.state.lock().ready.len()
    }

    /// Workers running an item.
    pub fn num_working_threads(&self) -> usize {
        let state = self.shared.state.lock();
        state.all.len() - state.ready.len()
    }

    /// Workers added per growth.
    pub fn growth_delta(&self) -> usize {
        self.growth_delta.load(Ordering::Relaxed)
    }

    /// Changes the growth delta. Zero disables growth on dispatch.
    pub fn set_growth_delta(&self, growth_delta: usize) {
        self.growth_delta.store(growth_delta, Ordering::Relaxed);
    }

    /// Stops every worker and waits for them to exit.
    ///
    /// Items already running finish first. Returns the first join error.
    pub fn shutdown(self) -> OsResult<()> {
        let handles = self.retire_all();
        let mut result = Ok(());
        for handle in handles {
            if let Err(e) = handle.join() {
                warn!(error = %e, "worker did not exit cleanly");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        debug!("thread pool shut down");
        result
    }

    fn retire_all(&self) -> Vec<ThreadHandle> {
        let mut state = self.shared.state.lock();
        state.ready.clear();
        for worker in state.all.drain(..) {
            worker.alive.store(false, Ordering::Release);
            if let Err(e) = worker.work_available.post() {
                warn!(worker = worker.id, error = %e, "failed to wake worker");
            }
        }
        std::mem::take(&mut state.handles)
    }

    fn grow_locked(&self, state: &mut PoolState, delta: usize) -> OsResult<()> {
        for _ in 0..delta {
            let id = self.shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
            let worker = Arc::new(Worker {
                id,
                alive: AtomicBool::new(true),
                work: Mutex::new(None),
                work_available: EventSem::new(),
            });
            let started = EventSem::new();

            let handle = {
                let shared = Arc::clone(&self.shared);
                let worker = Arc::clone(&worker);
                let started = started.clone();
                thread::start(self.ctx, &format!("staf-worker-{id}"), move || {
                    worker_loop(&shared, &worker, &started)
                })
            };
            let handle = match handle {
                Ok(handle) => handle,
                Err(e) => {
                    error!(
                        error = %e,
                        "Error creating a new thread. May be out of memory."
                    );
                    return Err(e);
                }
            };

            started.wait(WaitTimeout::Indefinite)?;
            state.ready.push(Arc::clone(&worker));
            state.all.push(worker);
            state.handles.push(handle);
        }
        if delta > 0 {
            debug!(delta, size = state.all.len(), "grew thread pool");
        }
        Ok(())
    }
}

fn worker_loop(shared: &Shared, me: &Arc<Worker>, started: &EventSem) {
    if let Err(e) = started.post() {
        error!(worker = me.id, error = %e, "failed to signal worker start");
        return;
    }

    loop {
        if let Err(e) = me
            .work_available
            .wait(WaitTimeout::Indefinite)
            .and_then(|_| me.work_available.reset())
        {
            error!(worker = me.id, error = %e, "worker wait failed");
            break;
        }
        if !me.alive.load(Ordering::Acquire) {
            break;
        }

        let work = me.work.lock().take();
        if let Some(work) = work {
            if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
                error!(worker = me.id, "caught panic in dispatched work");
            }
        }

        let mut state = shared.state.lock();
        if !me.alive.load(Ordering::Acquire) {
            break;
        }
        state.ready.push(Arc::clone(me));
    }
    debug!(worker = me.id, "worker exiting");
}

impl Drop for ThreadManager<'_> {
    fn drop(&mut self) {
        // Handles are dropped, detaching the threads.
        let _ = self.retire_all();
    }
}

impl std::fmt::Debug for ThreadManager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ThreadManager")
            .field("size", &state.all.len())
            .field("ready", &state.ready.len())
            .field("growth_delta", &self.growth_delta())
            .finish()
    }
}
