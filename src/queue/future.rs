// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::atomic::{AtomicBool, Ordering::Acquire, Ordering::Release};
use std::sync::{Arc, Condvar, Mutex};

struct State<T> {
    cell: Mutex<Option<crate::Result<T>>>,
    signal: Condvar,
    cancelled: AtomicBool,
}

/// The completing half of an operation future.
///
/// Held by the queued operation until the worker resolves it.
pub(crate) struct Promise<T>(Arc<State<T>>);

impl<T> Promise<T> {
    /// Returns `true` if the associated [`Pending`] was cancelled.
    ///
    /// A cancelled operation must not be executed.
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Acquire)
    }

    /// Resolves the future.
    pub fn complete(self, result: crate::Result<T>) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut cell = self.0.cell.lock().expect("lock poisoned");
        *cell = Some(result);
        self.0.signal.notify_all();
    }
}

/// A handle to the result of a queued operation.
///
/// Dropping a `Pending` detaches it: the operation still runs, its result is
/// discarded. Use [`Pending::cancel`] to remove a not-yet-executed operation
/// from the queue's effect.
#[must_use = "the operation outcome is only observable through the future"]
pub struct Pending<T>(Arc<State<T>>);

impl<T> Pending<T> {
    /// Blocks until the operation was executed, returning its result.
    pub fn wait(self) -> crate::Result<T> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut cell = self.0.cell.lock().expect("lock poisoned");

        loop {
            if let Some(result) = cell.take() {
                return result;
            }

            #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
            {
                cell = self.0.signal.wait(cell).expect("lock poisoned");
            }
        }
    }

    /// Cancels the operation.
    ///
    /// If the operation has not been executed yet, it will be skipped and no
    /// side effect remains. Cancelling during or after execution is ignored.
    pub fn cancel(self) {
        self.0.cancelled.store(true, Release);
    }

    /// Returns `true` if the operation was executed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let cell = self.0.cell.lock().expect("lock poisoned");
        cell.is_some()
    }
}

/// Creates a connected promise/future pair.
pub(crate) fn pair<T>() -> (Promise<T>, Pending<T>) {
    let state = Arc::new(State {
        cell: Mutex::new(None),
        signal: Condvar::new(),
        cancelled: AtomicBool::new(false),
    });
    (Promise(state.clone()), Pending(state))
}

/// Creates a future that is already resolved.
pub(crate) fn ready<T>(result: crate::Result<T>) -> Pending<T> {
    let (promise, pending) = pair();
    promise.complete(result);
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn future_complete_then_wait() {
        let (promise, pending) = pair();
        promise.complete(Ok(42));

        assert!(pending.is_done());
        assert_eq!(42, pending.wait().expect("should resolve"));
    }

    #[test]
    fn future_wait_across_threads() {
        let (promise, pending) = pair();

        let handle = std::thread::spawn(move || pending.wait());
        promise.complete(Ok("hello"));

        assert_eq!(
            "hello",
            handle
                .join()
                .expect("should join")
                .expect("should resolve"),
        );
    }

    #[test]
    fn future_cancel_flags_promise() {
        let (promise, pending) = pair::<()>();
        assert!(!promise.is_cancelled());

        pending.cancel();
        assert!(promise.is_cancelled());
    }

    #[test]
    fn future_ready() {
        assert!(matches!(
            ready::<u64>(Err(crate::Error::Disposed)).wait(),
            Err(crate::Error::Disposed)
        ));
    }
}
