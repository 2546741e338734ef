// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The value codec contract.
//!
//! Values are serialized into an in-memory scratch buffer before any data
//! segment space is reserved; deserialization receives a reader over the
//! value's stored region.
//!
//! A stored region may be longer than the live serialization when a value
//! was overwritten in place by a smaller one (the tail is zeroed). Codecs
//! should therefore be self-framing, like the [`String`] codec below, or
//! fixed-size, like the integer codecs. The [`Slice`] codec is greedy and
//! returns the whole region.

use crate::Slice;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Error during serialization
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncodeError({})",
            match self {
                Self::Io(e) => e.to_string(),
            }
        )
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
        }
    }
}

/// Error during deserialization
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),

    /// Invalid UTF-8 string payload
    Utf8(std::string::FromUtf8Error),

    /// Invalid enum tag
    InvalidTag((&'static str, u8)),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DecodeError({})",
            match self {
                Self::Io(e) => e.to_string(),
                e => format!("{e:?}"),
            }
        )
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<std::string::FromUtf8Error> for DecodeError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        Self::Utf8(value)
    }
}

impl std::error::Error for DecodeError {}

/// Trait to serialize stuff
pub trait Encode {
    /// Serializes into writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;
}

/// Trait to deserialize stuff
pub trait Decode {
    /// Deserializes from reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

macro_rules! impl_int_codec {
    ($t:ty, $write:ident, $read:ident) => {
        impl Encode for $t {
            fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
                writer.$write::<LittleEndian>(*self)?;
                Ok(())
            }
        }

        impl Decode for $t {
            fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
                Ok(reader.$read::<LittleEndian>()?)
            }
        }
    };
}

impl_int_codec!(u32, write_u32, read_u32);
impl_int_codec!(i32, write_i32, read_i32);
impl_int_codec!(u64, write_u64, read_u64);
impl_int_codec!(i64, write_i64, read_i64);

impl Encode for String {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        // NOTE: Strings are limited to 32-bit length
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<LittleEndian>(self.len() as u32)?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl Decode for String {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let len = reader.read_u32::<LittleEndian>()?;
        let mut buf = vec![0; len as usize];
        reader.read_exact(&mut buf)?;
        Ok(Self::from_utf8(buf)?)
    }
}

impl Encode for Slice {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(self)?;
        Ok(())
    }
}

impl Decode for Slice {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut buf = vec![];
        reader.read_to_end(&mut buf)?;
        Ok(Self::from(buf))
    }
}
