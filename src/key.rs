// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Slice;

/// Maximum length of a tangle key in bytes
pub const MAX_KEY_SIZE: usize = 65_534;

/// Original type of a tangle key
///
/// The tag is stored alongside each entry for round-tripping and is returned
/// with keys during enumeration. It is *not* part of key ordering or
/// equality: two keys with identical byte sequences alias the same slot.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum KeyType {
    /// UTF-8 text
    Text,

    /// Raw byte string
    Bytes,

    /// Unsigned 32-bit integer
    U32,

    /// Signed 32-bit integer
    I32,

    /// Unsigned 64-bit integer
    U64,

    /// Signed 64-bit integer
    I64,
}

impl From<KeyType> for u8 {
    fn from(value: KeyType) -> Self {
        match value {
            KeyType::Text => 0,
            KeyType::Bytes => 1,
            KeyType::U32 => 2,
            KeyType::I32 => 3,
            KeyType::U64 => 4,
            KeyType::I64 => 5,
        }
    }
}

impl TryFrom<u8> for KeyType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Text),
            1 => Ok(Self::Bytes),
            2 => Ok(Self::U32),
            3 => Ok(Self::I32),
            4 => Ok(Self::U64),
            5 => Ok(Self::I64),
            _ => Err(()),
        }
    }
}

/// A typed byte string key
///
/// Keys are compared by their byte sequences using lexicographic unsigned
/// byte order, with a shorter sequence ordered before a longer sequence it
/// is a prefix of. Numeric keys are encoded little-endian.
#[derive(Clone, Eq)]
pub struct TangleKey {
    key_type: KeyType,
    bytes: Slice,
}

impl TangleKey {
    /// Creates a key from a type tag and raw bytes.
    ///
    /// # Panics
    ///
    /// Panics if the byte sequence is longer than [`MAX_KEY_SIZE`].
    #[must_use]
    pub fn new(key_type: KeyType, bytes: Slice) -> Self {
        assert!(
            bytes.len() <= MAX_KEY_SIZE,
            "keys can be {MAX_KEY_SIZE} bytes in length",
        );

        Self { key_type, bytes }
    }

    /// Returns the key's original type.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Returns the key's byte sequence.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the length of the key's byte sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the key's byte sequence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for TangleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.key_type {
            KeyType::Text => write!(f, "{:?}", String::from_utf8_lossy(&self.bytes)),
            _ => write!(f, "{:?}:{:?}", self.key_type, &*self.bytes),
        }
    }
}

impl PartialEq for TangleKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

// Hash agrees with Eq: bytes only
impl std::hash::Hash for TangleKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bytes().hash(state);
    }
}

impl PartialOrd for TangleKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Keys are ordered by bytes only, the type tag is metadata
impl Ord for TangleKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes().cmp(other.bytes())
    }
}

impl From<u32> for TangleKey {
    fn from(value: u32) -> Self {
        Self::new(KeyType::U32, value.to_le_bytes().into())
    }
}

impl From<i32> for TangleKey {
    fn from(value: i32) -> Self {
        Self::new(KeyType::I32, value.to_le_bytes().into())
    }
}

impl From<u64> for TangleKey {
    fn from(value: u64) -> Self {
        Self::new(KeyType::U64, value.to_le_bytes().into())
    }
}

impl From<i64> for TangleKey {
    fn from(value: i64) -> Self {
        Self::new(KeyType::I64, value.to_le_bytes().into())
    }
}

impl From<&str> for TangleKey {
    fn from(value: &str) -> Self {
        Self::new(KeyType::Text, value.into())
    }
}

impl From<String> for TangleKey {
    fn from(value: String) -> Self {
        Self::new(KeyType::Text, value.into())
    }
}

impl From<&[u8]> for TangleKey {
    fn from(value: &[u8]) -> Self {
        Self::new(KeyType::Bytes, value.into())
    }
}

impl From<Vec<u8>> for TangleKey {
    fn from(value: Vec<u8>) -> Self {
        Self::new(KeyType::Bytes, value.into())
    }
}

impl From<Slice> for TangleKey {
    fn from(value: Slice) -> Self {
        Self::new(KeyType::Bytes, value)
    }
}

impl<const N: usize> From<&[u8; N]> for TangleKey {
    fn from(value: &[u8; N]) -> Self {
        Self::new(KeyType::Bytes, value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn key_cmp_bytes_only() {
        let a = TangleKey::from("a");
        let b = TangleKey::new(KeyType::Bytes, Slice::from("a"));
        assert_eq!(a, b);
        assert_eq!(std::cmp::Ordering::Equal, a.cmp(&b));
    }

    #[test]
    fn key_cmp_prefix() {
        let short = TangleKey::from("abc");
        let long = TangleKey::from("abcd");
        assert!(short < long);
    }

    #[test]
    fn key_numeric_le() {
        let key = TangleKey::from(0x0403_0201_u32);
        assert_eq!(&[1, 2, 3, 4], key.bytes());
        assert_eq!(KeyType::U32, key.key_type());
    }

    #[test]
    fn key_type_tag_roundtrip() {
        for ty in [
            KeyType::Text,
            KeyType::Bytes,
            KeyType::U32,
            KeyType::I32,
            KeyType::U64,
            KeyType::I64,
        ] {
            assert_eq!(Ok(ty), KeyType::try_from(u8::from(ty)));
        }
        assert_eq!(Err(()), KeyType::try_from(6));
    }

    #[test]
    #[should_panic = "keys can be"]
    fn key_too_long() {
        let _ = TangleKey::new(KeyType::Bytes, vec![0; MAX_KEY_SIZE + 1].into());
    }
}
