// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The ordered index.
//!
//! A B-tree laid out as an array of fixed-size nodes in the index segment,
//! with node 0 as the root. Leaf slots reference key bytes in the key
//! segment and value bytes in the data segment; comparisons always go
//! through the key segment, keys are never copied into nodes.

mod node;

pub use node::{SlotStatus, ValueEntry, ENTRY_SIZE, MAX_VALUES_PER_NODE, NODE_SIZE};

use crate::binary_search::partition_point;
use crate::key::KeyType;
use crate::segment::{Range, Segment};
use crate::Slice;
use byteorder::{ByteOrder, LittleEndian};
use node::{Node, NodeMut};
use std::cmp::Ordering;

/// Where a key lives, or where it would have to be inserted.
#[derive(Copy, Clone, Debug)]
pub struct FindOutcome {
    /// Node index
    pub node_idx: u64,

    /// Slot within the node (the insertion slot if not found)
    pub slot: usize,

    /// Whether the key exists
    pub found: bool,
}

/// The B-tree over the index and key segments.
pub struct BTree {
    pub(crate) index: Segment,
    pub(crate) keys: Segment,
}

impl BTree {
    /// Opens the tree, creating an empty root for a fresh index segment.
    pub fn open(index: Segment, keys: Segment) -> crate::Result<Self> {
        let mut tree = Self { index, keys };

        if tree.index.is_empty() {
            tree.init_root()?;
        } else if tree.index.len() % NODE_SIZE as u64 != 0 {
            return Err(crate::Error::InvalidData);
        }

        Ok(tree)
    }

    /// Number of nodes in the index segment.
    #[must_use]
    pub fn node_count(&self) -> u64 {
        self.index.len() / NODE_SIZE as u64
    }

    /// Locates `probe` in the tree.
    ///
    /// Walks down from the root, binary searching each node by comparing
    /// the probe against key bytes in the key segment.
    pub fn find(&mut self, probe: &[u8]) -> crate::Result<FindOutcome> {
        let mut current = 0;

        loop {
            let range = self.node_range(current)?;
            let node = Node(range.as_slice());
            let num_values = node.num_values();
            let is_leaf = node.is_leaf();

            let slot = partition_point(num_values, |slot| {
                let entry = node.entry(slot)?;
                Ok(self.key_cmp(&entry, probe)? == Ordering::Less)
            })?;

            if slot < num_values {
                let entry = node.entry(slot)?;
                if self.key_cmp(&entry, probe)? == Ordering::Equal {
                    return Ok(FindOutcome {
                        node_idx: current,
                        slot,
                        found: true,
                    });
                }
            }

            if is_leaf {
                return Ok(FindOutcome {
                    node_idx: current,
                    slot,
                    found: false,
                });
            }

            current = node.child(slot);
        }
    }

    /// Inserts a slot for a key that is not in the tree yet.
    ///
    /// The key bytes are appended to the key segment; the new entry starts
    /// out in the in-modification state with an empty data region, the
    /// caller publishes it once the value bytes are in place.
    pub fn insert(&mut self, key_bytes: &[u8], key_type: KeyType) -> crate::Result<(u64, usize)> {
        loop {
            let outcome = self.find(key_bytes)?;
            debug_assert!(!outcome.found, "insert of an existing key");

            let num_values = {
                let range = self.node_range(outcome.node_idx)?;
                Node(range.as_slice()).num_values()
            };

            if num_values == MAX_VALUES_PER_NODE {
                self.split(outcome.node_idx)?;
                continue;
            }

            // Reserve the key bytes first, growing the key segment while
            // no range is held
            let key_offset = self.keys.allocate(key_bytes.len() as u64)?;
            if !key_bytes.is_empty() {
                self.keys
                    .access(key_offset, key_bytes.len())?
                    .as_mut_slice()
                    .copy_from_slice(key_bytes);
            }

            #[allow(clippy::cast_possible_truncation)]
            let key_length = key_bytes.len() as u16;

            let entry = ValueEntry {
                key_offset: into_u32(key_offset)?,
                key_length,
                data_offset: 0,
                data_length: 0,
                key_type,
                status: SlotStatus::InModification,
            };

            self.mark_modifying(outcome.node_idx, true)?;
            {
                let mut range = self.node_range(outcome.node_idx)?;
                let mut node = NodeMut(range.as_mut_slice());
                node.shift_entries_right(outcome.slot);
                node.write_entry(outcome.slot, &entry);
                node.set_num_values(num_values + 1);
            }
            self.mark_modifying(outcome.node_idx, false)?;

            return Ok((outcome.node_idx, outcome.slot));
        }
    }

    /// Reads the entry at the given slot coordinates.
    pub fn entry_at(&mut self, node_idx: u64, slot: usize) -> crate::Result<ValueEntry> {
        if node_idx >= self.node_count() {
            return Err(crate::Error::InvalidData);
        }

        let range = self.node_range(node_idx)?;
        let node = Node(range.as_slice());

        if slot >= node.num_values() {
            return Err(crate::Error::InvalidData);
        }

        node.entry(slot)
    }

    /// Overwrites the entry at the given slot coordinates.
    pub fn write_entry_at(
        &mut self,
        node_idx: u64,
        slot: usize,
        entry: &ValueEntry,
    ) -> crate::Result<()> {
        let mut range = self.node_range(node_idx)?;
        let mut node = NodeMut(range.as_mut_slice());

        debug_assert!(slot < node.as_node().num_values());
        node.write_entry(slot, entry);

        Ok(())
    }

    /// Reads an entry's key bytes from the key segment.
    pub fn read_key(&mut self, entry: &ValueEntry) -> crate::Result<Slice> {
        let range = self
            .keys
            .access(entry.key_offset.into(), entry.key_length.into())?;
        Ok(Slice::new(range.as_slice()))
    }

    /// Calls `f` for every entry, in ascending key order.
    pub fn scan<F>(&mut self, f: &mut F) -> crate::Result<()>
    where
        F: FnMut(&ValueEntry) -> crate::Result<()>,
    {
        self.visit(0, f)
    }

    /// Resets the tree to a single empty root.
    pub fn clear(&mut self) -> crate::Result<()> {
        log::debug!("clearing index");
        self.index.reset()?;
        self.keys.reset()?;
        self.init_root()
    }

    fn visit<F>(&mut self, node_idx: u64, f: &mut F) -> crate::Result<()>
    where
        F: FnMut(&ValueEntry) -> crate::Result<()>,
    {
        let range = self.node_range(node_idx)?;
        let node = Node(range.as_slice());
        let num_values = node.num_values();
        let is_leaf = node.is_leaf();

        for slot in 0..num_values {
            if !is_leaf {
                self.visit(node.child(slot), f)?;
            }
            f(&node.entry(slot)?)?;
        }

        if !is_leaf {
            self.visit(node.child(num_values), f)?;
        }

        Ok(())
    }

    fn key_cmp(&mut self, entry: &ValueEntry, probe: &[u8]) -> crate::Result<Ordering> {
        let range = self
            .keys
            .access(entry.key_offset.into(), entry.key_length.into())?;
        Ok(range.as_slice().cmp(probe))
    }

    fn node_range(&mut self, node_idx: u64) -> crate::Result<Range> {
        self.index.access(node_idx * NODE_SIZE as u64, NODE_SIZE)
    }

    fn init_root(&mut self) -> crate::Result<()> {
        let offset = self.index.allocate(NODE_SIZE as u64)?;
        debug_assert_eq!(0, offset, "the root must live at node 0");

        let mut range = self.node_range(0)?;
        NodeMut(range.as_mut_slice()).init(true, -1);

        Ok(())
    }

    fn allocate_node(&mut self) -> crate::Result<u64> {
        let offset = self.index.allocate(NODE_SIZE as u64)?;
        Ok(offset / NODE_SIZE as u64)
    }

    fn mark_modifying(&mut self, node_idx: u64, modifying: bool) -> crate::Result<()> {
        let mut range = self.node_range(node_idx)?;
        NodeMut(range.as_mut_slice()).set_modifying(modifying);
        Ok(())
    }

    fn set_parent(&mut self, node_idx: u64, parent: i64) -> crate::Result<()> {
        let mut range = self.node_range(node_idx)?;
        NodeMut(range.as_mut_slice()).set_parent(parent);
        Ok(())
    }

    fn child_position(&mut self, parent_idx: u64, child_idx: u64) -> crate::Result<usize> {
        let range = self.node_range(parent_idx)?;
        let node = Node(range.as_slice());

        for idx in 0..=node.num_values() {
            if node.child(idx) == child_idx {
                return Ok(idx);
            }
        }

        Err(crate::Error::InvalidData)
    }

    /// Splits a full node, promoting its median into the parent.
    ///
    /// Recurses upward first so the parent is guaranteed to have room; the
    /// root never moves, its contents are pushed into two fresh children.
    fn split(&mut self, node_idx: u64) -> crate::Result<()> {
        if node_idx == 0 {
            return self.split_root();
        }

        loop {
            let parent_idx = self.parent_of(node_idx)?;
            let parent_full = {
                let range = self.node_range(parent_idx)?;
                Node(range.as_slice()).num_values() == MAX_VALUES_PER_NODE
            };
            if !parent_full {
                break;
            }
            self.split(parent_idx)?;
        }

        // Splitting the parent may have moved this node under a new one
        let parent_idx = self.parent_of(node_idx)?;

        // Allocate before any range is taken, growth drops all views
        let sibling_idx = self.allocate_node()?;

        log::trace!("splitting node {node_idx} into {sibling_idx}");

        const MID: usize = MAX_VALUES_PER_NODE / 2;

        self.mark_modifying(node_idx, true)?;
        self.mark_modifying(parent_idx, true)?;

        let (median, upper_entries, upper_children, is_leaf) = {
            let range = self.node_range(node_idx)?;
            let node = Node(range.as_slice());
            let is_leaf = node.is_leaf();

            (
                copy_entries(&range, MID, MID + 1),
                copy_entries(&range, MID + 1, MAX_VALUES_PER_NODE),
                if is_leaf {
                    vec![]
                } else {
                    copy_children(&range, MID + 1, MAX_VALUES_PER_NODE)
                },
                is_leaf,
            )
        };

        {
            let mut range = self.node_range(sibling_idx)?;
            let mut sibling = NodeMut(range.as_mut_slice());

            #[allow(clippy::cast_possible_wrap)]
            sibling.init(is_leaf, parent_idx as i64);
            sibling.paste_entries(0, &upper_entries);
            if !is_leaf {
                sibling.paste_children(0, &upper_children);
            }
            sibling.set_num_values(MAX_VALUES_PER_NODE - MID - 1);
        }

        {
            let mut range = self.node_range(node_idx)?;
            NodeMut(range.as_mut_slice()).set_num_values(MID);
        }

        // The moved children now hang off the sibling
        if !is_leaf {
            #[allow(clippy::cast_possible_wrap)]
            for child in children_of(&upper_children) {
                self.set_parent(child, sibling_idx as i64)?;
            }
        }

        let position = self.child_position(parent_idx, node_idx)?;
        {
            let mut range = self.node_range(parent_idx)?;
            let mut parent = NodeMut(range.as_mut_slice());
            let num_values = parent.as_node().num_values();

            parent.shift_entries_right(position);
            parent.shift_children_right(position + 1);
            parent.paste_entries(position, &median);
            parent.set_child(position + 1, sibling_idx);
            parent.set_num_values(num_values + 1);
        }

        self.mark_modifying(node_idx, false)?;
        self.mark_modifying(parent_idx, false)?;

        Ok(())
    }

    /// Splits the root in place: its halves move into two fresh children,
    /// the root keeps only the median and stays at node 0.
    fn split_root(&mut self) -> crate::Result<()> {
        let left_idx = self.allocate_node()?;
        let right_idx = self.allocate_node()?;

        log::trace!("splitting root into {left_idx} + {right_idx}");

        const MID: usize = MAX_VALUES_PER_NODE / 2;

        self.mark_modifying(0, true)?;

        let (median, halves, is_leaf) = {
            let range = self.node_range(0)?;
            let is_leaf = Node(range.as_slice()).is_leaf();

            let lower = (
                left_idx,
                copy_entries(&range, 0, MID),
                if is_leaf {
                    vec![]
                } else {
                    copy_children(&range, 0, MID)
                },
            );
            let upper = (
                right_idx,
                copy_entries(&range, MID + 1, MAX_VALUES_PER_NODE),
                if is_leaf {
                    vec![]
                } else {
                    copy_children(&range, MID + 1, MAX_VALUES_PER_NODE)
                },
            );

            (copy_entries(&range, MID, MID + 1), [lower, upper], is_leaf)
        };

        for (target, entries, children) in &halves {
            let mut range = self.node_range(*target)?;
            let mut half = NodeMut(range.as_mut_slice());

            half.init(is_leaf, 0);
            half.paste_entries(0, entries);
            if !is_leaf {
                half.paste_children(0, children);
            }
            half.set_num_values(entries.len() / ENTRY_SIZE);
        }

        if !is_leaf {
            for (target, _, children) in &halves {
                #[allow(clippy::cast_possible_wrap)]
                for child in children_of(children) {
                    self.set_parent(child, *target as i64)?;
                }
            }
        }

        {
            let mut range = self.node_range(0)?;
            let mut root = NodeMut(range.as_mut_slice());

            root.set_is_leaf(false);
            root.paste_entries(0, &median);
            root.set_child(0, left_idx);
            root.set_child(1, right_idx);
            root.set_num_values(1);
        }

        self.mark_modifying(0, false)?;

        Ok(())
    }

    fn parent_of(&mut self, node_idx: u64) -> crate::Result<u64> {
        let range = self.node_range(node_idx)?;
        let parent = Node(range.as_slice()).parent();

        if parent < 0 {
            return Err(crate::Error::InvalidData);
        }

        #[allow(clippy::cast_sign_loss)]
        Ok(parent as u64)
    }
}

fn copy_entries(range: &Range, from: usize, to: usize) -> Vec<u8> {
    node::entry_bytes(range.as_slice(), from, to).to_vec()
}

fn copy_children(range: &Range, from: usize, to_inclusive: usize) -> Vec<u8> {
    node::child_bytes(range.as_slice(), from, to_inclusive).to_vec()
}

fn children_of(bytes: &[u8]) -> impl Iterator<Item = u64> + '_ {
    bytes.chunks_exact(8).map(|chunk| {
        let child = LittleEndian::read_i64(chunk);
        debug_assert!(child > 0);

        #[allow(clippy::cast_sign_loss)]
        {
            child as u64
        }
    })
}

fn into_u32(value: u64) -> crate::Result<u32> {
    u32::try_from(value).map_err(|_| crate::Error::InvalidData)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::segment::{INDEX_GROWTH_QUANTUM, INITIAL_CAPACITY};

    use test_log::test;

    fn empty_tree() -> BTree {
        let index = Segment::open(
            "index",
            tempfile::tempfile().expect("should create file"),
            INITIAL_CAPACITY,
            INDEX_GROWTH_QUANTUM,
        )
        .expect("should open");

        let keys = Segment::open(
            "keys",
            tempfile::tempfile().expect("should create file"),
            INITIAL_CAPACITY,
            crate::segment::DATA_GROWTH_QUANTUM,
        )
        .expect("should open");

        BTree::open(index, keys).expect("should open tree")
    }

    fn insert_valid(tree: &mut BTree, key: &[u8]) {
        let (node_idx, slot) = tree.insert(key, KeyType::Bytes).expect("should insert");

        let mut entry = tree.entry_at(node_idx, slot).expect("should read");
        entry.status = SlotStatus::Valid;
        tree.write_entry_at(node_idx, slot, &entry)
            .expect("should write");
    }

    fn collect_keys(tree: &mut BTree) -> Vec<Vec<u8>> {
        let mut entries = vec![];
        tree.scan(&mut |entry| {
            entries.push(entry.clone());
            Ok(())
        })
        .expect("should scan");

        entries
            .iter()
            .map(|entry| tree.read_key(entry).expect("should read key").to_vec())
            .collect()
    }

    #[test]
    fn btree_empty_find() {
        let mut tree = empty_tree();
        let outcome = tree.find(b"missing").expect("should find");

        assert!(!outcome.found);
        assert_eq!(0, outcome.node_idx);
        assert_eq!(0, outcome.slot);
        assert_eq!(1, tree.node_count());
    }

    #[test]
    fn btree_insert_and_find() {
        let mut tree = empty_tree();

        for key in [&b"qa"[..], b"aa", b"za", b"ea"] {
            insert_valid(&mut tree, key);
        }

        for key in [&b"qa"[..], b"aa", b"za", b"ea"] {
            assert!(tree.find(key).expect("should find").found);
        }
        assert!(!tree.find(b"mm").expect("should find").found);

        assert_eq!(
            vec![b"aa".to_vec(), b"ea".to_vec(), b"qa".to_vec(), b"za".to_vec()],
            collect_keys(&mut tree),
        );
    }

    #[test]
    fn btree_split_produces_sorted_scan() {
        let mut tree = empty_tree();

        // Enough keys for several levels of splits
        let count = 2_000u32;
        for i in (0..count).rev() {
            insert_valid(&mut tree, &i.to_be_bytes());
        }

        assert!(tree.node_count() > 1);

        let keys = collect_keys(&mut tree);
        assert_eq!(count as usize, keys.len());

        let expected: Vec<Vec<u8>> = (0..count).map(|i| i.to_be_bytes().to_vec()).collect();
        assert_eq!(expected, keys);

        for i in 0..count {
            assert!(
                tree.find(&i.to_be_bytes()).expect("should find").found,
                "key {i} should be found after splits",
            );
        }
    }

    #[test]
    fn btree_shuffled_inserts_scan_sorted() {
        use rand::seq::SliceRandom;

        let mut tree = empty_tree();

        let mut keys: Vec<u32> = (0..1_000).collect();
        keys.shuffle(&mut rand::rng());

        for key in &keys {
            insert_valid(&mut tree, &key.to_be_bytes());
        }

        let expected: Vec<Vec<u8>> = (0..1_000u32).map(|i| i.to_be_bytes().to_vec()).collect();
        assert_eq!(expected, collect_keys(&mut tree));
    }

    #[test]
    fn btree_clear_resets_to_empty_root() {
        let mut tree = empty_tree();

        for i in 0..500u32 {
            insert_valid(&mut tree, &i.to_be_bytes());
        }
        assert!(tree.node_count() > 1);

        tree.clear().expect("should clear");

        assert_eq!(1, tree.node_count());
        assert!(!tree.find(&1u32.to_be_bytes()).expect("should find").found);
        assert!(collect_keys(&mut tree).is_empty());
    }
}
