// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod find;
pub(crate) mod inner;
pub(crate) mod store;

pub use find::FindResult;

use crate::coding::{Decode, Encode};
use crate::key::TangleKey;
use crate::queue::{pair, Barrier, Pending, Promise};
use inner::{Operation, TangleInner};
use std::sync::atomic::Ordering::Acquire;
use std::sync::Arc;

/// Maximum number of writes in one batch
pub const MAX_BATCH_SIZE: usize = 4_096;

/// Outcome of an update callback, see [`Tangle::add_or_update`]
pub enum Decision<V> {
    /// Replace the stored value
    Replace(V),

    /// Keep the stored value untouched
    Keep,
}

/// A persistent, ordered map of typed byte string keys to values.
///
/// All mutations are funnelled through one background worker; methods
/// return [`Pending`] futures immediately and never block the caller.
/// The counters ([`Tangle::len`], [`Tangle::version`],
/// [`Tangle::wasted_data_bytes`], [`Tangle::node_count`]) are readable from
/// any thread without going through the queue.
///
/// Dropping the tangle disposes it: operations still waiting in the queue
/// fail with [`crate::Error::Disposed`].
pub struct Tangle<V>
where
    V: Encode + Decode + Send + 'static,
{
    inner: Arc<TangleInner<V>>,
}

impl<V> Tangle<V>
where
    V: Encode + Decode + Send + 'static,
{
    pub(crate) fn new(inner: Arc<TangleInner<V>>) -> Self {
        Self { inner }
    }

    /// Reads the value of a key.
    ///
    /// The future fails with [`crate::Error::KeyNotFound`] if the key does
    /// not exist.
    pub fn get<K: Into<TangleKey>>(&self, key: K) -> Pending<V> {
        self.submit(|promise| Operation::Get {
            key: key.into(),
            promise,
        })
    }

    /// Sets a key to a value, overwriting an existing value.
    pub fn set<K: Into<TangleKey>>(&self, key: K, value: V) -> Pending<bool> {
        self.submit(|promise| Operation::Set {
            key: key.into(),
            value,
            overwrite: true,
            promise,
        })
    }

    /// Inserts a key only if it does not exist yet.
    ///
    /// Resolves to `false` (and leaves the stored value untouched) if the
    /// key was already present.
    pub fn add<K: Into<TangleKey>>(&self, key: K, value: V) -> Pending<bool> {
        self.submit(|promise| Operation::Set {
            key: key.into(),
            value,
            overwrite: false,
            promise,
        })
    }

    /// Updates a key through a callback, inserting `default` if absent.
    ///
    /// If the key exists, the callback receives the current value and
    /// decides between [`Decision::Replace`] and [`Decision::Keep`].
    /// Resolves to `true` if the tangle was mutated.
    pub fn add_or_update<K, F>(&self, key: K, default: V, callback: F) -> Pending<bool>
    where
        K: Into<TangleKey>,
        F: FnOnce(V) -> Decision<V> + Send + 'static,
    {
        self.submit(|promise| Operation::Update {
            key: key.into(),
            default,
            callback: Box::new(callback),
            promise,
        })
    }

    /// Locates a key, returning a reusable [`FindResult`].
    ///
    /// The result is invalidated by any subsequent mutation.
    pub fn find<K: Into<TangleKey>>(&self, key: K) -> Pending<FindResult<V>> {
        self.submit(|promise| Operation::Find {
            key: key.into(),
            promise,
        })
    }

    /// Reads many keys at once, in request order.
    ///
    /// Absent keys yield `V::default()` instead of failing.
    pub fn select(&self, keys: Vec<TangleKey>) -> Pending<Vec<(TangleKey, V)>>
    where
        V: Default,
    {
        self.submit(|promise| Operation::Select {
            keys,
            default: Box::new(V::default),
            promise,
        })
    }

    /// Lists all keys in ascending byte order.
    pub fn keys(&self) -> Pending<Vec<TangleKey>> {
        self.submit(|promise| Operation::Keys { promise })
    }

    /// Lists all values in ascending key order.
    pub fn values(&self) -> Pending<Vec<V>> {
        self.submit(|promise| Operation::Values { promise })
    }

    /// Lists all key/value pairs in ascending key order.
    pub fn entries(&self) -> Pending<Vec<(TangleKey, V)>> {
        self.submit(|promise| Operation::Entries { promise })
    }

    /// Starts a batch of writes that will execute as one queue item.
    pub fn batch(&self) -> Batch<'_, V> {
        Batch {
            tangle: self,
            items: vec![],
        }
    }

    /// Enqueues a barrier sentinel.
    ///
    /// The returned future resolves when the worker *reaches* the barrier.
    /// A barrier created closed then pauses the worker, holding back every
    /// later operation until [`Barrier::open`] is called.
    pub fn barrier(&self, open: bool) -> (Barrier, Pending<()>) {
        let barrier = Barrier::new(open);

        let pending = self.submit(|promise| Operation::Barrier {
            barrier: barrier.clone(),
            promise,
        });

        (barrier, pending)
    }

    /// Removes every key, resetting the tangle to its empty state.
    ///
    /// Freed key and data space is abandoned, not compacted.
    pub fn clear(&self) -> Pending<()> {
        self.submit(|promise| Operation::Clear { promise })
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.inner.count.load(Acquire)
    }

    /// Returns `true` if the tangle holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The mutation counter.
    ///
    /// Incremented on every mutation; outstanding [`FindResult`]s are only
    /// valid as long as this does not move.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.inner.version.load(Acquire)
    }

    /// Total bytes of data segment space orphaned by overwrites.
    #[must_use]
    pub fn wasted_data_bytes(&self) -> u64 {
        self.inner.wasted_data_bytes.load(Acquire)
    }

    /// Number of B-tree nodes in the index segment.
    #[must_use]
    pub fn node_count(&self) -> u64 {
        self.inner.node_count.load(Acquire)
    }

    fn submit<T, F>(&self, build: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(Promise<T>) -> Operation<V>,
    {
        let (promise, pending) = pair();
        self.inner.enqueue(build(promise));
        pending
    }
}

impl<V> Drop for Tangle<V>
where
    V: Encode + Decode + Send + 'static,
{
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

/// A bounded grouping of key/value writes executed as a single queue item.
///
/// Writes behave like [`Tangle::set`]; keys existing beforehand are
/// overwritten.
pub struct Batch<'a, V>
where
    V: Encode + Decode + Send + 'static,
{
    tangle: &'a Tangle<V>,
    items: Vec<(TangleKey, V)>,
}

impl<V> Batch<'_, V>
where
    V: Encode + Decode + Send + 'static,
{
    /// Adds a write to the batch.
    ///
    /// # Panics
    ///
    /// Panics if the batch already holds [`MAX_BATCH_SIZE`] writes.
    pub fn insert<K: Into<TangleKey>>(&mut self, key: K, value: V) {
        assert!(
            self.items.len() < MAX_BATCH_SIZE,
            "batches are limited to {MAX_BATCH_SIZE} writes",
        );
        self.items.push((key.into(), value));
    }

    /// Number of writes in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the batch holds no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Submits the batch as one queue item.
    pub fn commit(self) -> Pending<()> {
        self.tangle.submit(|promise| Operation::Batch {
            items: self.items,
            promise,
        })
    }
}
