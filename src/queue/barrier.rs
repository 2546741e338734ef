// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::queue::Pending;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

const WAIT_GRANULARITY: Duration = Duration::from_millis(20);

/// A queue sentinel that pauses the worker while closed.
///
/// The barrier's future resolves when the worker *reaches* the barrier; a
/// closed barrier then blocks every later queue item until [`Barrier::open`]
/// is called.
#[derive(Clone)]
pub struct Barrier {
    state: Arc<BarrierState>,
}

struct BarrierState {
    open: Mutex<bool>,
    signal: Condvar,
}

impl Barrier {
    pub(crate) fn new(open: bool) -> Self {
        Self {
            state: Arc::new(BarrierState {
                open: Mutex::new(open),
                signal: Condvar::new(),
            }),
        }
    }

    /// Opens the barrier, releasing the worker.
    pub fn open(&self) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut open = self.state.open.lock().expect("lock poisoned");
        *open = true;
        self.state.signal.notify_all();
    }

    /// Returns `true` if the barrier is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let open = self.state.open.lock().expect("lock poisoned");
        *open
    }

    /// Blocks the calling worker until the barrier opens or `abort` trips.
    pub(crate) fn block_worker(&self, abort: impl Fn() -> bool) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut open = self.state.open.lock().expect("lock poisoned");

        while !*open {
            if abort() {
                return;
            }

            #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
            {
                open = self
                    .state
                    .signal
                    .wait_timeout(open, WAIT_GRANULARITY)
                    .expect("lock poisoned")
                    .0;
            }
        }
    }
}

/// A set of barriers that can be opened together.
///
/// Completion of the whole collection is observable through
/// [`BarrierCollection::wait_reached`], which resolves once the worker has
/// reached every member.
#[derive(Default)]
pub struct BarrierCollection {
    barriers: Vec<Barrier>,
    reached: Vec<Pending<()>>,
}

impl BarrierCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a barrier and its reached-future to the collection.
    pub fn push(&mut self, barrier: (Barrier, Pending<()>)) {
        self.barriers.push(barrier.0);
        self.reached.push(barrier.1);
    }

    /// Returns the number of barriers in the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    /// Returns `true` if the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    /// Opens all barriers.
    pub fn open_all(&self) {
        for barrier in &self.barriers {
            barrier.open();
        }
    }

    /// Blocks until every barrier in the collection has been reached.
    pub fn wait_reached(self) -> crate::Result<()> {
        for pending in self.reached {
            pending.wait()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn barrier_starts_closed() {
        let barrier = Barrier::new(false);
        assert!(!barrier.is_open());

        barrier.open();
        assert!(barrier.is_open());
    }

    #[test]
    fn barrier_blocks_until_open() {
        let barrier = Barrier::new(false);

        let clone = barrier.clone();
        let handle = std::thread::spawn(move || {
            clone.block_worker(|| false);
            true
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        barrier.open();
        assert!(handle.join().expect("should join"));
    }

    #[test]
    fn barrier_abort_releases_worker() {
        let barrier = Barrier::new(false);
        barrier.block_worker(|| true);
    }
}
