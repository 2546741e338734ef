// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::view::View;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// A bounded FIFO of recently mapped views.
///
/// Requests that fall inside a cached view reuse it; otherwise the oldest
/// view is evicted once the cache is full. Evicting only drops the cache's
/// own refcount, outstanding [`super::Range`]s keep their view alive.
pub struct ViewCache {
    entries: VecDeque<Arc<View>>,
    capacity: usize,
}

impl ViewCache {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "view cache needs room for at least one view");

        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns a cached view spanning the requested file range, if any.
    pub fn find(&self, file_offset: u64, size: u64) -> Option<Arc<View>> {
        self.entries
            .iter()
            .find(|view| view.contains(file_offset, size))
            .cloned()
    }

    /// Enqueues a freshly mapped view, evicting the oldest if necessary.
    pub fn insert(&mut self, view: Arc<View>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(view);
    }

    /// Drops all cached views.
    ///
    /// # Panics
    ///
    /// Panics if any view is still referenced by an outstanding range; the
    /// segment must not remap underneath live pointers.
    pub fn release_all(&mut self) {
        for view in &self.entries {
            assert_eq!(
                1,
                Arc::strong_count(view),
                "segment view still referenced during remap",
            );
        }
        self.entries.clear();
    }

    /// Schedules dirty pages of all cached views for writeback.
    pub fn flush(&self) -> io::Result<()> {
        for view in &self.entries {
            view.flush()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
