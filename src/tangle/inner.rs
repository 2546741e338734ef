// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::find::FindResult;
use super::store::Store;
use super::Decision;
use crate::btree::{SlotStatus, ValueEntry};
use crate::coding::{Decode, Encode, EncodeError};
use crate::key::TangleKey;
use crate::queue::{Barrier, Enqueue, OpQueue, Promise, Tick};
use crate::{Error, Slice};
use std::sync::atomic::{
    AtomicU32, AtomicU64,
    Ordering::{AcqRel, Acquire, Relaxed, Release},
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub(crate) type UpdateFn<V> = Box<dyn FnOnce(V) -> Decision<V> + Send>;
pub(crate) type DefaultFn<V> = Box<dyn Fn() -> V + Send>;

/// One queued work item.
pub(crate) enum Operation<V> {
    Get {
        key: TangleKey,
        promise: Promise<V>,
    },
    Set {
        key: TangleKey,
        value: V,
        overwrite: bool,
        promise: Promise<bool>,
    },
    Update {
        key: TangleKey,
        default: V,
        callback: UpdateFn<V>,
        promise: Promise<bool>,
    },
    Find {
        key: TangleKey,
        promise: Promise<FindResult<V>>,
    },
    GetByIndex {
        version: u32,
        node_idx: u64,
        slot: usize,
        promise: Promise<V>,
    },
    SetByIndex {
        version: u32,
        node_idx: u64,
        slot: usize,
        value: V,
        promise: Promise<()>,
    },
    RawRead {
        version: u32,
        node_idx: u64,
        slot: usize,
        promise: Promise<Slice>,
    },
    RawWrite {
        version: u32,
        node_idx: u64,
        slot: usize,
        bytes: Slice,
        promise: Promise<()>,
    },
    Select {
        keys: Vec<TangleKey>,
        default: DefaultFn<V>,
        promise: Promise<Vec<(TangleKey, V)>>,
    },
    Keys {
        promise: Promise<Vec<TangleKey>>,
    },
    Values {
        promise: Promise<Vec<V>>,
    },
    Entries {
        promise: Promise<Vec<(TangleKey, V)>>,
    },
    Barrier {
        barrier: Barrier,
        promise: Promise<()>,
    },
    Batch {
        items: Vec<(TangleKey, V)>,
        promise: Promise<()>,
    },
    Clear {
        promise: Promise<()>,
    },
}

impl<V> Operation<V> {
    /// Fails the operation's future with the disposed error.
    fn fail_disposed(self) {
        match self {
            Self::Get { promise, .. } => promise.complete(Err(Error::Disposed)),
            Self::Set { promise, .. } | Self::Update { promise, .. } => {
                promise.complete(Err(Error::Disposed));
            }
            Self::Find { promise, .. } => promise.complete(Err(Error::Disposed)),
            Self::GetByIndex { promise, .. } => promise.complete(Err(Error::Disposed)),
            Self::SetByIndex { promise, .. }
            | Self::RawWrite { promise, .. }
            | Self::Barrier { promise, .. }
            | Self::Batch { promise, .. }
            | Self::Clear { promise } => promise.complete(Err(Error::Disposed)),
            Self::RawRead { promise, .. } => promise.complete(Err(Error::Disposed)),
            Self::Select { promise, .. } => promise.complete(Err(Error::Disposed)),
            Self::Keys { promise } => promise.complete(Err(Error::Disposed)),
            Self::Values { promise } => promise.complete(Err(Error::Disposed)),
            Self::Entries { promise } => promise.complete(Err(Error::Disposed)),
        }
    }
}

/// Shared state behind a [`super::Tangle`] handle.
pub(crate) struct TangleInner<V> {
    pub queue: OpQueue<Operation<V>>,
    pub store: Mutex<Store>,

    pub count: AtomicU64,
    pub version: AtomicU32,
    pub wasted_data_bytes: AtomicU64,
    pub node_count: AtomicU64,

    pub idle_timeout: Duration,
}

impl<V> TangleInner<V>
where
    V: Encode + Decode + Send + 'static,
{
    pub fn new(store: Store, count: u64, wasted: u64, node_count: u64, idle: Duration) -> Self {
        Self {
            queue: OpQueue::new(),
            store: Mutex::new(store),
            count: AtomicU64::new(count),
            version: AtomicU32::new(0),
            wasted_data_bytes: AtomicU64::new(wasted),
            node_count: AtomicU64::new(node_count),
            idle_timeout: idle,
        }
    }

    /// Submits an operation, lazily spawning the worker.
    pub fn enqueue(self: &Arc<Self>, op: Operation<V>) {
        match self.queue.enqueue(op) {
            Enqueue::Disposed(op) => op.fail_disposed(),
            Enqueue::Queued { spawn_worker } => {
                if spawn_worker {
                    let inner = Arc::clone(self);
                    std::thread::spawn(move || worker_loop(&inner));
                }
            }
        }
    }

    /// Tears the tangle down, failing everything still queued.
    pub fn dispose(&self) {
        log::trace!("disposing tangle");
        for op in self.queue.dispose() {
            op.fail_disposed();
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, Store> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let store = self.store.lock().expect("lock poisoned");
        store
    }

    fn check_version(&self, version: u32) -> crate::Result<()> {
        if self.version.load(Acquire) == version {
            Ok(())
        } else {
            Err(Error::Modified)
        }
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, AcqRel);
    }
}

impl<V> Drop for TangleInner<V> {
    fn drop(&mut self) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let store = self.store.get_mut().expect("lock poisoned");

        if let Err(e) = store.flush() {
            log::warn!("failed to flush tangle on drop: {e}");
        }
    }
}

fn worker_loop<V>(inner: &Arc<TangleInner<V>>)
where
    V: Encode + Decode + Send + 'static,
{
    log::trace!("tangle worker spawned");

    loop {
        match inner.queue.next(inner.idle_timeout) {
            Tick::Item(op) => execute(inner, op),
            Tick::IdleTimeout => {
                log::trace!("tangle worker idling out, flushing caches");

                if let Err(e) = inner.lock_store().flush() {
                    log::warn!("failed to flush tangle: {e}");
                }

                return;
            }
            Tick::Disposed(ops) => {
                for op in ops {
                    op.fail_disposed();
                }

                log::trace!("tangle worker exiting, tangle disposed");
                return;
            }
        }
    }
}

fn execute<V>(inner: &Arc<TangleInner<V>>, op: Operation<V>)
where
    V: Encode + Decode + Send + 'static,
{
    match op {
        Operation::Get { key, promise } => {
            if promise.is_cancelled() {
                return;
            }
            promise.complete(get(inner, key));
        }
        Operation::Set {
            key,
            value,
            overwrite,
            promise,
        } => {
            if promise.is_cancelled() {
                return;
            }
            let result = set(inner, &mut inner.lock_store(), key, &value, overwrite);
            refresh_node_count(inner);
            promise.complete(result);
        }
        Operation::Update {
            key,
            default,
            callback,
            promise,
        } => {
            if promise.is_cancelled() {
                return;
            }
            let result = update(inner, key, default, callback);
            refresh_node_count(inner);
            promise.complete(result);
        }
        Operation::Find { key, promise } => {
            if promise.is_cancelled() {
                return;
            }
            promise.complete(find_result(inner, key));
        }
        Operation::GetByIndex {
            version,
            node_idx,
            slot,
            promise,
        } => {
            if promise.is_cancelled() {
                return;
            }
            promise.complete(get_by_index(inner, version, node_idx, slot));
        }
        Operation::SetByIndex {
            version,
            node_idx,
            slot,
            value,
            promise,
        } => {
            if promise.is_cancelled() {
                return;
            }
            let result = serialize(&value)
                .map_err(|e| serialize_error(inner, node_idx, slot, e))
                .and_then(|bytes| write_by_index(inner, version, node_idx, slot, &bytes));
            refresh_node_count(inner);
            promise.complete(result);
        }
        Operation::RawRead {
            version,
            node_idx,
            slot,
            promise,
        } => {
            if promise.is_cancelled() {
                return;
            }
            promise.complete(raw_read(inner, version, node_idx, slot));
        }
        Operation::RawWrite {
            version,
            node_idx,
            slot,
            bytes,
            promise,
        } => {
            if promise.is_cancelled() {
                return;
            }
            let result = write_by_index(inner, version, node_idx, slot, &bytes);
            refresh_node_count(inner);
            promise.complete(result);
        }
        Operation::Select {
            keys,
            default,
            promise,
        } => {
            if promise.is_cancelled() {
                return;
            }
            promise.complete(select(inner, keys, &default));
        }
        Operation::Keys { promise } => {
            if promise.is_cancelled() {
                return;
            }
            promise.complete(keys(inner));
        }
        Operation::Values { promise } => {
            if promise.is_cancelled() {
                return;
            }
            promise.complete(values(inner));
        }
        Operation::Entries { promise } => {
            if promise.is_cancelled() {
                return;
            }
            promise.complete(entries(inner));
        }
        Operation::Barrier { barrier, promise } => {
            // A cancelled barrier neither resolves nor pauses the worker
            if promise.is_cancelled() {
                return;
            }

            promise.complete(Ok(()));
            barrier.block_worker(|| inner.queue.is_disposed());
        }
        Operation::Batch { items, promise } => {
            if promise.is_cancelled() {
                return;
            }
            let result = batch(inner, items);
            refresh_node_count(inner);
            promise.complete(result);
        }
        Operation::Clear { promise } => {
            if promise.is_cancelled() {
                return;
            }
            let result = clear(inner);
            refresh_node_count(inner);
            promise.complete(result);
        }
    }
}

fn refresh_node_count<V>(inner: &Arc<TangleInner<V>>)
where
    V: Encode + Decode + Send + 'static,
{
    let node_count = inner.lock_store().btree.node_count();
    inner.node_count.store(node_count, Release);
}

fn serialize<V: Encode>(value: &V) -> Result<Vec<u8>, EncodeError> {
    let mut buf = vec![];
    value.encode_into(&mut buf)?;
    Ok(buf)
}

/// Reads and deserializes the value of a valid entry.
fn read_value<V: Decode>(store: &mut Store, entry: &ValueEntry) -> crate::Result<V> {
    if entry.status != SlotStatus::Valid {
        return Err(Error::InvalidData);
    }

    let range = store.read_region(entry)?;
    let mut reader = range.as_slice();
    Ok(V::decode_from(&mut reader)?)
}

/// Reconstructs the typed key of an entry.
fn entry_key(store: &mut Store, entry: &ValueEntry) -> crate::Result<TangleKey> {
    let bytes = store.btree.read_key(entry)?;
    Ok(TangleKey::new(entry.key_type, bytes))
}

fn get<V>(inner: &Arc<TangleInner<V>>, key: TangleKey) -> crate::Result<V>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();

    let outcome = store.btree.find(key.bytes())?;
    if !outcome.found {
        return Err(Error::KeyNotFound(key));
    }

    let entry = store.btree.entry_at(outcome.node_idx, outcome.slot)?;
    read_value(&mut store, &entry)
}

fn set<V>(
    inner: &Arc<TangleInner<V>>,
    store: &mut Store,
    key: TangleKey,
    value: &V,
    overwrite: bool,
) -> crate::Result<bool>
where
    V: Encode + Decode + Send + 'static,
{
    let outcome = store.btree.find(key.bytes())?;

    if outcome.found {
        let entry = store.btree.entry_at(outcome.node_idx, outcome.slot)?;
        if entry.status != SlotStatus::Valid {
            return Err(Error::InvalidData);
        }

        if !overwrite {
            return Ok(false);
        }

        let bytes = serialize(value).map_err(|e| Error::Serialize { key, inner: e })?;

        let wasted = store.replace_value(outcome.node_idx, outcome.slot, &bytes)?;
        inner.wasted_data_bytes.fetch_add(wasted, Relaxed);
        inner.bump_version();

        Ok(true)
    } else {
        // The slot is created before the codec runs; a failing codec
        // leaves it behind with zero-length data
        let (node_idx, slot) = store.btree.insert(key.bytes(), key.key_type())?;
        inner.count.fetch_add(1, Release);

        match serialize(value) {
            Ok(bytes) => {
                store.publish_value(node_idx, slot, &bytes)?;
                inner.bump_version();
                Ok(true)
            }
            Err(e) => {
                store.publish_value(node_idx, slot, &[])?;
                inner.bump_version();
                Err(Error::Serialize { key, inner: e })
            }
        }
    }
}

fn update<V>(
    inner: &Arc<TangleInner<V>>,
    key: TangleKey,
    default: V,
    callback: UpdateFn<V>,
) -> crate::Result<bool>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();

    let outcome = store.btree.find(key.bytes())?;

    if outcome.found {
        let entry = store.btree.entry_at(outcome.node_idx, outcome.slot)?;
        let old = read_value(&mut store, &entry)?;

        match callback(old) {
            Decision::Replace(new) => {
                let bytes = serialize(&new).map_err(|e| Error::Serialize { key, inner: e })?;

                let wasted = store.replace_value(outcome.node_idx, outcome.slot, &bytes)?;
                inner.wasted_data_bytes.fetch_add(wasted, Relaxed);
                inner.bump_version();

                Ok(true)
            }
            Decision::Keep => Ok(false),
        }
    } else {
        set(inner, &mut store, key, &default, false)
    }
}

fn find_result<V>(inner: &Arc<TangleInner<V>>, key: TangleKey) -> crate::Result<FindResult<V>>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();

    let outcome = store.btree.find(key.bytes())?;
    if !outcome.found {
        return Err(Error::KeyNotFound(key));
    }

    let entry = store.btree.entry_at(outcome.node_idx, outcome.slot)?;
    if entry.status != SlotStatus::Valid {
        return Err(Error::InvalidData);
    }

    Ok(FindResult::new(
        Arc::downgrade(inner),
        inner.version.load(Acquire),
        outcome.node_idx,
        outcome.slot,
        key,
    ))
}

fn get_by_index<V>(
    inner: &Arc<TangleInner<V>>,
    version: u32,
    node_idx: u64,
    slot: usize,
) -> crate::Result<V>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();
    inner.check_version(version)?;

    let entry = store.btree.entry_at(node_idx, slot)?;
    read_value(&mut store, &entry)
}

fn raw_read<V>(
    inner: &Arc<TangleInner<V>>,
    version: u32,
    node_idx: u64,
    slot: usize,
) -> crate::Result<Slice>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();
    inner.check_version(version)?;

    let entry = store.btree.entry_at(node_idx, slot)?;
    if entry.status != SlotStatus::Valid {
        return Err(Error::InvalidData);
    }

    let range = store.read_region(&entry)?;
    Ok(Slice::new(range.as_slice()))
}

fn write_by_index<V>(
    inner: &Arc<TangleInner<V>>,
    version: u32,
    node_idx: u64,
    slot: usize,
    bytes: &[u8],
) -> crate::Result<()>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();
    inner.check_version(version)?;

    let entry = store.btree.entry_at(node_idx, slot)?;
    if entry.status != SlotStatus::Valid {
        return Err(Error::InvalidData);
    }

    let wasted = store.replace_value(node_idx, slot, bytes)?;
    inner.wasted_data_bytes.fetch_add(wasted, Relaxed);
    inner.bump_version();

    Ok(())
}

/// Turns a codec failure during `SetByIndex` into a serialize error
/// carrying the slot's key.
fn serialize_error<V>(
    inner: &Arc<TangleInner<V>>,
    node_idx: u64,
    slot: usize,
    e: EncodeError,
) -> Error
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();

    match store
        .btree
        .entry_at(node_idx, slot)
        .and_then(|entry| entry_key(&mut store, &entry))
    {
        Ok(key) => Error::Serialize { key, inner: e },
        Err(lookup_error) => lookup_error,
    }
}

fn select<V>(
    inner: &Arc<TangleInner<V>>,
    keys: Vec<TangleKey>,
    default: &DefaultFn<V>,
) -> crate::Result<Vec<(TangleKey, V)>>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();
    let mut result = Vec::with_capacity(keys.len());

    for key in keys {
        let outcome = store.btree.find(key.bytes())?;

        let value = if outcome.found {
            let entry = store.btree.entry_at(outcome.node_idx, outcome.slot)?;
            read_value(&mut store, &entry)?
        } else {
            default()
        };

        result.push((key, value));
    }

    Ok(result)
}

fn keys<V>(inner: &Arc<TangleInner<V>>) -> crate::Result<Vec<TangleKey>>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();

    let entries = store.scan_entries()?;
    entries
        .iter()
        .map(|entry| {
            if entry.status == SlotStatus::Valid {
                entry_key(&mut store, entry)
            } else {
                Err(Error::InvalidData)
            }
        })
        .collect()
}

fn values<V>(inner: &Arc<TangleInner<V>>) -> crate::Result<Vec<V>>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();

    let entries = store.scan_entries()?;
    entries
        .iter()
        .map(|entry| read_value(&mut store, entry))
        .collect()
}

fn entries<V>(inner: &Arc<TangleInner<V>>) -> crate::Result<Vec<(TangleKey, V)>>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();

    let entries = store.scan_entries()?;
    entries
        .iter()
        .map(|entry| {
            let key = entry_key(&mut store, entry)?;
            let value = read_value(&mut store, entry)?;
            Ok((key, value))
        })
        .collect()
}

fn batch<V>(inner: &Arc<TangleInner<V>>, items: Vec<(TangleKey, V)>) -> crate::Result<()>
where
    V: Encode + Decode + Send + 'static,
{
    let mut store = inner.lock_store();

    for (key, value) in items {
        set(inner, &mut store, key, &value, true)?;
    }

    Ok(())
}

fn clear<V>(inner: &Arc<TangleInner<V>>) -> crate::Result<()>
where
    V: Encode + Decode + Send + 'static,
{
    log::debug!("clearing tangle");

    let mut store = inner.lock_store();

    store.btree.clear()?;
    store.data.reset()?;

    inner.count.store(0, Release);
    inner.wasted_data_bytes.store(0, Release);
    inner.bump_version();

    Ok(())
}
