use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use staf_osif::sync::{EventSem, WaitTimeout};
use staf_osif::OsContext;
use staf_threadmgr::{DispatchOutcome, ThreadManager};

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn blocking_item(gate: &EventSem, done: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
    let gate = gate.clone();
    let done = Arc::clone(done);
    move || {
        gate.wait(WaitTimeout::Indefinite).unwrap();
        done.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_growth_under_load() {
    let ctx = OsContext::default();
    let pool = ThreadManager::new(&ctx, 2, 2).unwrap();
    let gate = EventSem::new();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let outcome = pool.dispatch(blocking_item(&gate, &done)).unwrap();
        assert_eq!(outcome, DispatchOutcome::Accepted);
    }
    assert_eq!(pool.thread_pool_size(), 6);
    assert_eq!(pool.num_working_threads(), 5);
    assert_eq!(pool.num_ready_threads(), 1);

    gate.post().unwrap();
    assert!(wait_until(|| pool.num_ready_threads() == 6));
    assert_eq!(done.load(Ordering::SeqCst), 5);
    assert_eq!(pool.num_working_threads(), 0);
    pool.shutdown().unwrap();
}

#[test]
fn test_rejected_when_saturated_and_fixed() {
    let ctx = OsContext::default();
    let pool = ThreadManager::new(&ctx, 2, 0).unwrap();
    let gate = EventSem::new();
    let done = Arc::new(AtomicUsize::new(0));

    assert_eq!(
        pool.dispatch(blocking_item(&gate, &done)).unwrap(),
        DispatchOutcome::Accepted
    );
    assert_eq!(
        pool.dispatch(blocking_item(&gate, &done)).unwrap(),
        DispatchOutcome::Accepted
    );
    assert_eq!(
        pool.dispatch(blocking_item(&gate, &done)).unwrap(),
        DispatchOutcome::Rejected
    );

    // Re-enabling growth lets the next dispatch through.
    pool.set_growth_delta(1);
    assert_eq!(
        pool.dispatch(blocking_item(&gate, &done)).unwrap(),
        DispatchOutcome::Accepted
    );
    assert_eq!(pool.thread_pool_size(), 3);

    gate.post().unwrap();
    assert!(wait_until(|| done.load(Ordering::SeqCst) == 3));
    pool.shutdown().unwrap();
}

#[test]
fn test_shutdown_waits_for_running_work() {
    let ctx = OsContext::default();
    let pool = ThreadManager::new(&ctx, 1, 1).unwrap();
    let done = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&done);
    pool.dispatch(move || {
        ThreadManager::sleep_current_thread(50).unwrap();
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    pool.shutdown().unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_dispatchers() {
    let ctx = OsContext::default();
    let pool = ThreadManager::new(&ctx, 1, 1).unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..25 {
                    let counter = Arc::clone(&done);
                    let outcome = pool
                        .dispatch(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                    assert_eq!(outcome, DispatchOutcome::Accepted);
                }
            });
        }
    });

    assert!(wait_until(|| done.load(Ordering::SeqCst) == 100));
    assert!(wait_until(|| pool.num_working_threads() == 0));
    assert!(pool.thread_pool_size() <= 4 * 25 + 1);
    pool.shutdown().unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_size_tracks_growth(init in 0usize..4, delta in 1usize..4, items in 0usize..8) {
        let ctx = OsContext::default();
        let pool = ThreadManager::new(&ctx, init, delta).unwrap();
        let gate = EventSem::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..items {
            prop_assert_eq!(
                pool.dispatch(blocking_item(&gate, &done)).unwrap(),
                DispatchOutcome::Accepted
            );
        }

        let size = pool.thread_pool_size();
        let expected = if items <= init {
            init
        } else {
            init + (items - init).div_ceil(delta) * delta
        };
        prop_assert_eq!(size, expected);
        prop_assert_eq!(pool.num_working_threads(), items);
        prop_assert_eq!(pool.num_ready_threads() + pool.num_working_threads(), size);

        gate.post().unwrap();
        prop_assert!(wait_until(|| pool.num_ready_threads() == size));
        pool.shutdown().unwrap();
    }
}
