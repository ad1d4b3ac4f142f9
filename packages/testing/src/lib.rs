#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for tests and benchmarks in the `lone_instance` workspace.

use std::sync::{Barrier, mpsc};
use std::time::Duration;
use std::{env, panic, thread};

/// How long a test may run before [`with_watchdog()`] declares it hung.
const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Miri is dramatically slower at thread synchronization.
const WATCHDOG_TIMEOUT_MIRI: Duration = Duration::from_secs(60);

/// Runs a test on a separate thread and fails it if it does not finish in time.
///
/// Concurrency tests that deadlock would otherwise hang the whole test run. A panic inside the
/// test is propagated to the caller unchanged.
///
/// When the `MUTATION_TESTING` environment variable is `1`, the test runs directly on the
/// calling thread so that the mutation testing tool can detect hangs with its own timeout.
///
/// # Panics
///
/// Panics if the test does not complete within the timeout.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
#[cfg_attr(test, mutants::skip)] // Test infrastructure, mutations only cause hangs.
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        // The receiver is gone only if we already timed out, nobody to report to.
        drop(tx.send(test_fn()));
    });

    let timeout = if cfg!(miri) {
        WATCHDOG_TIMEOUT_MIRI
    } else {
        WATCHDOG_TIMEOUT
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_thread
                .join()
                .expect("test thread already delivered its result so cannot panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded the {timeout:?} watchdog timeout, probably deadlocked");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread exited without delivering a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Calls `f` from `thread_count` threads that all start at the same moment, returning the
/// results in thread spawn order.
///
/// All threads wait on a barrier before calling `f`, which maximizes the chance that the calls
/// genuinely overlap. Borrowing from the caller's stack is allowed because the threads are
/// scoped to this call.
///
/// # Panics
///
/// Propagates a panic from any of the threads.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use testing::run_concurrently;
///
/// let calls = AtomicUsize::new(0);
///
/// let results = run_concurrently(8, || calls.fetch_add(1, Ordering::Relaxed));
///
/// assert_eq!(results.len(), 8);
/// assert_eq!(calls.load(Ordering::Relaxed), 8);
/// ```
pub fn run_concurrently<F, R>(thread_count: usize, f: F) -> Vec<R>
where
    F: Fn() -> R + Sync,
    R: Send,
{
    let barrier = Barrier::new(thread_count);

    thread::scope(|scope| {
        let threads = (0..thread_count)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    f()
                })
            })
            .collect::<Vec<_>>();

        threads
            .into_iter()
            .map(|thread| match thread.join() {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            })
            .collect()
    })
}
