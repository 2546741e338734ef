// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::btree::BTree;
use crate::coding::{Decode, Encode};
use crate::segment::{Segment, DATA_GROWTH_QUANTUM, INDEX_GROWTH_QUANTUM, INITIAL_CAPACITY};
use crate::source::{AnySource, DirectorySource, SidecarSource, StorageSource};
use crate::tangle::inner::TangleInner;
use crate::tangle::store::Store;
use crate::Tangle;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How long the worker lingers on an empty queue before flushing caches
/// and exiting
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

const INDEX_STREAM: &str = "index";
const KEYS_STREAM: &str = "keys";
const DATA_STREAM: &str = "data";

/// Tangle configuration
pub struct Config {
    source: AnySource,
    idle_timeout: Duration,
}

impl Config {
    /// Initializes a config backed by one file per stream under the given
    /// directory.
    pub fn new<P: AsRef<Path>>(folder: P) -> Self {
        Self::with_source(AnySource::from(DirectorySource::new(folder)))
    }

    /// Initializes a config backed by sidecar files next to the given host
    /// file path.
    pub fn sidecar<P: AsRef<Path>>(host: P) -> Self {
        Self::with_source(AnySource::from(SidecarSource::new(host)))
    }

    /// Initializes a config over an explicit storage source.
    #[must_use]
    pub fn with_source(source: AnySource) -> Self {
        Self {
            source,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Sets the worker's idle timeout.
    ///
    /// Default = 30 seconds
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Opens the tangle, creating its streams if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Fails if a stream carries an unsupported format version or holds
    /// data this version cannot make sense of.
    pub fn open<V>(self) -> crate::Result<Tangle<V>>
    where
        V: Encode + Decode + Send + 'static,
    {
        let index = Segment::open(
            "index",
            self.source.open_stream(INDEX_STREAM)?,
            INITIAL_CAPACITY,
            INDEX_GROWTH_QUANTUM,
        )?;
        let keys = Segment::open(
            "keys",
            self.source.open_stream(KEYS_STREAM)?,
            INITIAL_CAPACITY,
            DATA_GROWTH_QUANTUM,
        )?;
        let data = Segment::open(
            "data",
            self.source.open_stream(DATA_STREAM)?,
            INITIAL_CAPACITY,
            DATA_GROWTH_QUANTUM,
        )?;

        let btree = BTree::open(index, keys)?;
        let mut store = Store { btree, data };

        let (count, wasted) = store.recover_counters()?;
        let node_count = store.btree.node_count();

        log::debug!("opened tangle with {count} live entries, {node_count} nodes");

        Ok(Tangle::new(Arc::new(TangleInner::new(
            store,
            count,
            wasted,
            node_count,
            self.idle_timeout,
        ))))
    }
}
