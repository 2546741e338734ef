// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::key::KeyType;
use byteorder::{ByteOrder, LittleEndian};

/// Size of one B-tree node on disk
pub const NODE_SIZE: usize = 4_096;

/// Size of one value entry on disk
pub const ENTRY_SIZE: usize = 16;

const NODE_HEADER_SIZE: usize = 12;
const CHILD_SIZE: usize = 8;

/// Number of value entries a node can hold
pub const MAX_VALUES_PER_NODE: usize =
    (NODE_SIZE - NODE_HEADER_SIZE - CHILD_SIZE) / (ENTRY_SIZE + CHILD_SIZE);

const CHILDREN_OFFSET: usize = NODE_HEADER_SIZE + MAX_VALUES_PER_NODE * ENTRY_SIZE;

/// Lifecycle state of a value entry
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlotStatus {
    /// Unused or deleted slot, not visible to readers
    Empty,

    /// Live entry
    Valid,

    /// A mutation of this entry is underway
    InModification,
}

impl From<SlotStatus> for u8 {
    fn from(value: SlotStatus) -> Self {
        match value {
            SlotStatus::Empty => 0,
            SlotStatus::Valid => 1,
            SlotStatus::InModification => 2,
        }
    }
}

impl TryFrom<u8> for SlotStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Empty),
            1 => Ok(Self::Valid),
            2 => Ok(Self::InModification),
            _ => Err(()),
        }
    }
}

/// One slot in a B-tree node, locating one key's bytes in the key segment
/// and one value's bytes in the data segment.
///
/// `data_length` records the length of the *allocated* data region; an
/// in-place overwrite by a smaller value keeps the region (zero padded).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValueEntry {
    /// Offset of the key bytes in the key segment
    pub key_offset: u32,

    /// Length of the key bytes
    pub key_length: u16,

    /// Offset of the value bytes in the data segment
    pub data_offset: u32,

    /// Length of the value's data region
    pub data_length: u32,

    /// Original type of the key
    pub key_type: KeyType,

    /// Lifecycle state of this slot
    pub status: SlotStatus,
}

impl ValueEntry {
    /// Decodes an entry from its 16-byte on-disk form.
    pub fn read(buf: &[u8]) -> crate::Result<Self> {
        let key_type = buf[14];
        let key_type = KeyType::try_from(key_type).map_err(|()| crate::Error::InvalidData)?;

        let status = buf[15];
        let status = SlotStatus::try_from(status).map_err(|()| crate::Error::InvalidData)?;

        Ok(Self {
            key_offset: LittleEndian::read_u32(buf),
            key_length: LittleEndian::read_u16(&buf[4..]),
            data_offset: LittleEndian::read_u32(&buf[6..]),
            data_length: LittleEndian::read_u32(&buf[10..]),
            key_type,
            status,
        })
    }

    /// Encodes the entry into its 16-byte on-disk form.
    pub fn write(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, self.key_offset);
        LittleEndian::write_u16(&mut buf[4..], self.key_length);
        LittleEndian::write_u32(&mut buf[6..], self.data_offset);
        LittleEndian::write_u32(&mut buf[10..], self.data_length);
        buf[14] = self.key_type.into();
        buf[15] = self.status.into();
    }
}

fn entry_offset(slot: usize) -> usize {
    debug_assert!(slot < MAX_VALUES_PER_NODE);
    NODE_HEADER_SIZE + slot * ENTRY_SIZE
}

/// The raw bytes of entries `[from..to)` of a node.
pub fn entry_bytes(node: &[u8], from: usize, to: usize) -> &[u8] {
    &node[(NODE_HEADER_SIZE + from * ENTRY_SIZE)..(NODE_HEADER_SIZE + to * ENTRY_SIZE)]
}

/// The raw bytes of child pointers `[from..=to_inclusive]` of a node.
pub fn child_bytes(node: &[u8], from: usize, to_inclusive: usize) -> &[u8] {
    &node[(CHILDREN_OFFSET + from * CHILD_SIZE)..(CHILDREN_OFFSET + (to_inclusive + 1) * CHILD_SIZE)]
}

fn child_offset(idx: usize) -> usize {
    debug_assert!(idx <= MAX_VALUES_PER_NODE);
    CHILDREN_OFFSET + idx * CHILD_SIZE
}

/// Read access to one node's bytes.
///
/// Layout: `is_leaf: u8, is_modifying: u8, num_values: u16,
/// parent_index: i64`, then the packed value entries, then
/// `MAX_VALUES_PER_NODE + 1` child node indices.
#[derive(Clone, Copy)]
pub struct Node<'a>(pub &'a [u8]);

impl Node<'_> {
    pub fn is_leaf(&self) -> bool {
        self.0[0] == 1
    }

    #[allow(dead_code)]
    pub fn is_modifying(&self) -> bool {
        self.0[1] == 1
    }

    pub fn num_values(&self) -> usize {
        LittleEndian::read_u16(&self.0[2..]).into()
    }

    pub fn parent(&self) -> i64 {
        LittleEndian::read_i64(&self.0[4..])
    }

    pub fn entry(&self, slot: usize) -> crate::Result<ValueEntry> {
        debug_assert!(slot < self.num_values());
        ValueEntry::read(&self.0[entry_offset(slot)..])
    }

    pub fn child(&self, idx: usize) -> u64 {
        debug_assert!(!self.is_leaf());
        debug_assert!(idx <= self.num_values());

        let child = LittleEndian::read_i64(&self.0[child_offset(idx)..]);
        debug_assert!(child > 0, "child pointers must lead away from the root");

        #[allow(clippy::cast_sign_loss)]
        {
            child as u64
        }
    }
}

/// Write access to one node's bytes.
pub struct NodeMut<'a>(pub &'a mut [u8]);

impl NodeMut<'_> {
    pub fn as_node(&self) -> Node<'_> {
        Node(self.0)
    }

    /// Initializes a zeroed byte region as an empty node.
    pub fn init(&mut self, is_leaf: bool, parent: i64) {
        self.set_is_leaf(is_leaf);
        self.set_num_values(0);
        self.set_parent(parent);
    }

    pub fn set_is_leaf(&mut self, is_leaf: bool) {
        self.0[0] = u8::from(is_leaf);
    }

    pub fn set_modifying(&mut self, modifying: bool) {
        self.0[1] = u8::from(modifying);
    }

    pub fn set_num_values(&mut self, num_values: usize) {
        #[allow(clippy::cast_possible_truncation)]
        LittleEndian::write_u16(&mut self.0[2..], num_values as u16);
    }

    pub fn set_parent(&mut self, parent: i64) {
        LittleEndian::write_i64(&mut self.0[4..], parent);
    }

    pub fn write_entry(&mut self, slot: usize, entry: &ValueEntry) {
        entry.write(&mut self.0[entry_offset(slot)..]);
    }

    pub fn set_child(&mut self, idx: usize, child: u64) {
        #[allow(clippy::cast_possible_wrap)]
        LittleEndian::write_i64(&mut self.0[child_offset(idx)..], child as i64);
    }

    /// Makes room for a new entry at `slot`, shifting trailing entries
    /// right by one. Does not touch `num_values`.
    pub fn shift_entries_right(&mut self, slot: usize) {
        let num_values = self.as_node().num_values();
        debug_assert!(num_values < MAX_VALUES_PER_NODE);

        if slot < num_values {
            let src = entry_offset(slot);
            let end = entry_offset(num_values);
            self.0.copy_within(src..end, src + ENTRY_SIZE);
        }
    }

    /// Makes room for a new child pointer at `idx`, shifting trailing
    /// pointers right by one.
    pub fn shift_children_right(&mut self, idx: usize) {
        let num_children = self.as_node().num_values() + 1;
        debug_assert!(num_children <= MAX_VALUES_PER_NODE);

        if idx < num_children {
            let src = child_offset(idx);
            let end = child_offset(num_children);
            self.0.copy_within(src..end, src + CHILD_SIZE);
        }
    }

    /// Writes raw entry bytes starting at `slot`.
    pub fn paste_entries(&mut self, slot: usize, bytes: &[u8]) {
        debug_assert_eq!(0, bytes.len() % ENTRY_SIZE);
        let start = entry_offset(slot);
        self.0[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Writes raw child pointer bytes starting at `idx`.
    pub fn paste_children(&mut self, idx: usize, bytes: &[u8]) {
        debug_assert_eq!(0, bytes.len() % CHILD_SIZE);
        let start = child_offset(idx);
        self.0[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn node_fanout_is_reasonable() {
        assert!(MAX_VALUES_PER_NODE >= 32);
        assert!(
            NODE_HEADER_SIZE
                + MAX_VALUES_PER_NODE * ENTRY_SIZE
                + (MAX_VALUES_PER_NODE + 1) * CHILD_SIZE
                <= NODE_SIZE,
        );
    }

    #[test]
    fn node_header_roundtrip() {
        let mut buf = vec![0; NODE_SIZE];
        let mut node = NodeMut(&mut buf);

        node.init(true, -1);
        node.set_num_values(3);
        node.set_modifying(true);

        let view = node.as_node();
        assert!(view.is_leaf());
        assert!(view.is_modifying());
        assert_eq!(3, view.num_values());
        assert_eq!(-1, view.parent());
    }

    #[test]
    fn node_entry_roundtrip() {
        let mut buf = vec![0; NODE_SIZE];
        let mut node = NodeMut(&mut buf);
        node.init(true, -1);
        node.set_num_values(1);

        let entry = ValueEntry {
            key_offset: 123,
            key_length: 4,
            data_offset: 456,
            data_length: 789,
            key_type: KeyType::U64,
            status: SlotStatus::Valid,
        };
        node.write_entry(0, &entry);

        assert_eq!(entry, node.as_node().entry(0).expect("should read"));
    }

    #[test]
    fn node_entry_rejects_bad_status() {
        let mut buf = [0; ENTRY_SIZE];
        buf[15] = 99;

        assert!(matches!(
            ValueEntry::read(&buf),
            Err(crate::Error::InvalidData)
        ));
    }

    #[test]
    fn node_shift_entries() {
        let mut buf = vec![0; NODE_SIZE];
        let mut node = NodeMut(&mut buf);
        node.init(true, -1);

        let mut entry = ValueEntry {
            key_offset: 0,
            key_length: 1,
            data_offset: 0,
            data_length: 0,
            key_type: KeyType::Bytes,
            status: SlotStatus::Valid,
        };

        for slot in 0..3 {
            entry.key_offset = slot.try_into().expect("should fit");
            node.set_num_values(slot);
            node.shift_entries_right(slot);
            node.write_entry(slot, &entry);
        }
        node.set_num_values(3);

        // Insert in front, pushing the others right
        node.shift_entries_right(0);
        entry.key_offset = 42;
        node.write_entry(0, &entry);
        node.set_num_values(4);

        let offsets: Vec<u32> = (0..4)
            .map(|slot| {
                node.as_node()
                    .entry(slot)
                    .expect("should read")
                    .key_offset
            })
            .collect();
        assert_eq!(vec![42, 0, 1, 2], offsets);
    }
}
