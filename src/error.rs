// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{DecodeError, EncodeError},
    key::TangleKey,
};

/// Represents errors that can occur in the tangle store
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// A caller-supplied value codec failed inside an operation
    ///
    /// For a fresh insert, the key's slot has already been created and is
    /// left with zero-length data; for an in-place replacement, the old
    /// value is preserved.
    Serialize {
        /// Key whose value could not be serialized
        key: TangleKey,

        /// The codec's error
        inner: EncodeError,
    },

    /// The requested key does not exist
    KeyNotFound(TangleKey),

    /// A find result was used after the tangle was mutated
    Modified,

    /// The tangle was torn down while the operation was queued or pending
    Disposed,

    /// Invalid or unsupported on-disk format version
    InvalidVersion(u32),

    /// Read an entry that is not in a valid state
    InvalidData,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TangleError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Tangle result
pub type Result<T> = std::result::Result<T, Error>;
