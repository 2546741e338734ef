// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The operation serializer.
//!
//! All mutations of a tangle are funnelled through a FIFO queue drained by a
//! single worker thread, so on-disk invariants never need cross-thread
//! synchronization inside the engine. Submitters never block; they receive
//! a [`Pending`] future instead.

mod barrier;
mod future;

pub use barrier::{Barrier, BarrierCollection};
pub use future::Pending;

pub(crate) use future::{pair, ready, Promise};

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Outcome of [`OpQueue::enqueue`].
pub(crate) enum Enqueue<T> {
    /// Item accepted; `spawn_worker` is `true` if the caller must start a
    /// worker thread (exactly one caller is told so).
    Queued {
        /// Whether the enqueuer has to spawn the worker
        spawn_worker: bool,
    },

    /// The queue was disposed; the item is handed back so the caller can
    /// fail its future.
    Disposed(T),
}

/// One scheduling decision for the worker loop.
pub(crate) enum Tick<T> {
    /// Execute this item.
    Item(T),

    /// The idle timeout elapsed with an empty queue; the worker has been
    /// unregistered and must exit after flushing caches.
    IdleTimeout,

    /// The queue was disposed; the worker has been unregistered and must
    /// fail the drained items, then exit.
    Disposed(Vec<T>),
}

struct QueueState<T> {
    items: VecDeque<T>,
    worker_running: bool,
    disposed: bool,
}

/// A FIFO of work items with a single, lazily spawned consumer.
///
/// The queue itself is worker-agnostic; spawning the worker thread and
/// executing items is the caller's business.
pub(crate) struct OpQueue<T> {
    state: Mutex<QueueState<T>>,
    signal: Condvar,
}

impl<T> OpQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                worker_running: false,
                disposed: false,
            }),
            signal: Condvar::new(),
        }
    }

    /// Enqueues an item, waking (or requesting) the worker.
    pub fn enqueue(&self, item: T) -> Enqueue<T> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut state = self.state.lock().expect("lock poisoned");

        if state.disposed {
            return Enqueue::Disposed(item);
        }

        state.items.push_back(item);

        let spawn_worker = !state.worker_running;
        state.worker_running = true;

        drop(state);
        self.signal.notify_all();

        Enqueue::Queued { spawn_worker }
    }

    /// Called by the worker to fetch its next item, waiting up to
    /// `idle_timeout` before giving up.
    ///
    /// The worker-running flag is cleared under the same lock that decides
    /// `IdleTimeout`/`Disposed`, so a racing [`OpQueue::enqueue`] either sees
    /// the worker gone and spawns a new one, or its item is picked up here.
    pub fn next(&self, idle_timeout: Duration) -> Tick<T> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut state = self.state.lock().expect("lock poisoned");

        loop {
            if state.disposed {
                state.worker_running = false;
                return Tick::Disposed(state.items.drain(..).collect());
            }

            if let Some(item) = state.items.pop_front() {
                return Tick::Item(item);
            }

            #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
            let (guard, timeout) = self
                .signal
                .wait_timeout(state, idle_timeout)
                .expect("lock poisoned");

            state = guard;

            if timeout.timed_out() && state.items.is_empty() && !state.disposed {
                state.worker_running = false;
                return Tick::IdleTimeout;
            }
        }
    }

    /// Marks the queue disposed, waking the worker, and drains whatever was
    /// still pending so the caller can fail the futures.
    pub fn dispose(&self) -> Vec<T> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut state = self.state.lock().expect("lock poisoned");

        state.disposed = true;
        let drained = state.items.drain(..).collect();

        drop(state);
        self.signal.notify_all();

        drained
    }

    /// Returns `true` once the queue was disposed.
    pub fn is_disposed(&self) -> bool {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let state = self.state.lock().expect("lock poisoned");
        state.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn queue_fifo_order() {
        let queue = OpQueue::new();

        assert!(matches!(
            queue.enqueue(1),
            Enqueue::Queued { spawn_worker: true }
        ));
        assert!(matches!(
            queue.enqueue(2),
            Enqueue::Queued {
                spawn_worker: false
            }
        ));

        assert!(matches!(queue.next(Duration::ZERO), Tick::Item(1)));
        assert!(matches!(queue.next(Duration::ZERO), Tick::Item(2)));
        assert!(matches!(queue.next(Duration::ZERO), Tick::IdleTimeout));
    }

    #[test]
    fn queue_respawns_worker_after_idle() {
        let queue = OpQueue::new();

        assert!(matches!(
            queue.enqueue(1),
            Enqueue::Queued { spawn_worker: true }
        ));
        assert!(matches!(queue.next(Duration::ZERO), Tick::Item(1)));
        assert!(matches!(queue.next(Duration::ZERO), Tick::IdleTimeout));

        // Worker exited, so the next enqueue has to spawn again
        assert!(matches!(
            queue.enqueue(2),
            Enqueue::Queued { spawn_worker: true }
        ));
    }

    #[test]
    fn queue_dispose_drains() {
        let queue = OpQueue::new();

        let _ = queue.enqueue(1);
        let _ = queue.enqueue(2);

        assert_eq!(vec![1, 2], queue.dispose());
        assert!(queue.is_disposed());
        assert!(matches!(queue.enqueue(3), Enqueue::Disposed(3)));
    }

    #[test]
    fn queue_worker_sees_dispose() {
        let queue = OpQueue::new();
        let _ = queue.enqueue(1);

        let _ = queue.dispose();

        match queue.next(Duration::from_secs(1)) {
            Tick::Disposed(items) => assert!(items.is_empty()),
            _ => panic!("expected disposed"),
        }
    }
}
