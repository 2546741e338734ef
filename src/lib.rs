// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embedded, persistent, ordered key-value store backed by memory-mapped
//! segments.
//!
//! ##### About
//!
//! This crate exports a [`Tangle`]: a durable map from typed byte string
//! keys to values serialized through caller-supplied codecs (the [`Encode`]
//! and [`Decode`] traits).
//!
//! Each tangle is backed by three append-only, memory-mapped byte streams:
//! a B-tree *index*, the raw *keys*, and the serialized value *data*. Every
//! mutating operation is funnelled through a single background worker via a
//! FIFO queue, so submitters never block, operations execute strictly in
//! order, and the on-disk structures need no cross-thread synchronization.
//! The worker is spawned lazily and exits again after an idle timeout,
//! flushing its caches.
//!
//! Keys are limited to 65534 bytes. Lookups and scans are in lexicographic
//! byte order, regardless of a key's original type.
//!
//! # Example usage
//!
//! ```
//! use tangle::Config;
//! #
//! # let folder = tempfile::tempdir()?;
//!
//! // A tangle is a single persistent keyspace
//! let tangle: tangle::Tangle<String> = Config::new(&folder).open()?;
//!
//! // Operations return futures; wait() blocks until the worker ran them
//! tangle.set("my_key", "my_value".to_string()).wait()?;
//!
//! let item = tangle.get("my_key").wait()?;
//! assert_eq!("my_value", item);
//!
//! // Keys enumerate in byte order, no matter the insertion order
//! for key in tangle.keys().wait()? {
//!     // ...
//! }
//! #
//! # Ok::<(), tangle::Error>(())
//! ```

#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![warn(clippy::multiple_crate_versions)]

mod binary_search;
mod btree;

pub mod coding;

mod config;
mod error;

#[doc(hidden)]
pub mod file;

mod key;
mod queue;
mod segment;
mod slice;
mod source;
mod tangle;
mod version;

pub use {
    coding::{Decode, DecodeError, Encode, EncodeError},
    config::{Config, DEFAULT_IDLE_TIMEOUT},
    error::{Error, Result},
    key::{KeyType, TangleKey, MAX_KEY_SIZE},
    queue::{Barrier, BarrierCollection, Pending},
    slice::Slice,
    source::{AnySource, DirectorySource, SidecarSource, StorageSource},
    tangle::{Batch, Decision, FindResult, Tangle, MAX_BATCH_SIZE},
    version::FormatVersion,
};
