// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::inner::{Operation, TangleInner};
use crate::coding::{Decode, Encode};
use crate::key::TangleKey;
use crate::queue::{pair, ready, Pending};
use crate::{Error, Slice};
use std::sync::Weak;

/// A reusable reference to a located key.
///
/// A find result captures the tangle's version at lookup time together with
/// the key's slot coordinates. Every accessor enqueues its own work item and
/// revalidates the version: after *any* later mutation of the tangle, the
/// result is stale and its accessors fail with [`Error::Modified`].
///
/// The reference is weak; using it after the tangle was dropped fails with
/// [`Error::Disposed`].
pub struct FindResult<V> {
    inner: Weak<TangleInner<V>>,
    version: u32,
    node_idx: u64,
    slot: usize,
    key: TangleKey,
}

impl<V> FindResult<V>
where
    V: Encode + Decode + Send + 'static,
{
    pub(crate) fn new(
        inner: Weak<TangleInner<V>>,
        version: u32,
        node_idx: u64,
        slot: usize,
        key: TangleKey,
    ) -> Self {
        Self {
            inner,
            version,
            node_idx,
            slot,
            key,
        }
    }

    /// The key this result points at.
    #[must_use]
    pub fn key(&self) -> &TangleKey {
        &self.key
    }

    /// The tangle version this result is valid for.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Reads the value behind this result.
    pub fn value(&self) -> Pending<V> {
        self.submit(|promise| Operation::GetByIndex {
            version: self.version,
            node_idx: self.node_idx,
            slot: self.slot,
            promise,
        })
    }

    /// Replaces the value behind this result.
    ///
    /// Counts as a mutation: the tangle's version moves on, staling this
    /// result (and any other outstanding one).
    pub fn set_value(&self, value: V) -> Pending<()> {
        self.submit(|promise| Operation::SetByIndex {
            version: self.version,
            node_idx: self.node_idx,
            slot: self.slot,
            value,
            promise,
        })
    }

    /// Reads the raw stored bytes behind this result.
    ///
    /// The returned slice spans the whole data region, which may be longer
    /// than the live serialization if the value shrank in place.
    pub fn raw_value(&self) -> Pending<Slice> {
        self.submit(|promise| Operation::RawRead {
            version: self.version,
            node_idx: self.node_idx,
            slot: self.slot,
            promise,
        })
    }

    /// Overwrites the stored bytes behind this result without running a
    /// codec. Counts as a mutation.
    pub fn set_raw_value(&self, bytes: impl Into<Slice>) -> Pending<()> {
        let bytes = bytes.into();
        self.submit(|promise| Operation::RawWrite {
            version: self.version,
            node_idx: self.node_idx,
            slot: self.slot,
            bytes,
            promise,
        })
    }

    fn submit<T, F>(&self, build: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(crate::queue::Promise<T>) -> Operation<V>,
    {
        match self.inner.upgrade() {
            Some(inner) => {
                let (promise, pending) = pair();
                inner.enqueue(build(promise));
                pending
            }
            None => ready(Err(Error::Disposed)),
        }
    }
}

impl<V> std::fmt::Debug for FindResult<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FindResult({:?}@v{}, node={}, slot={})",
            self.key, self.version, self.node_idx, self.slot,
        )
    }
}
