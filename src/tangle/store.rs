// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::btree::{BTree, SlotStatus, ValueEntry};
use crate::segment::{Range, Segment};

/// The worker-side state of one tangle: the ordered index plus the data
/// segment holding serialized values.
///
/// All methods deal in raw bytes; codecs run in the worker on top of this.
pub(crate) struct Store {
    pub btree: BTree,
    pub data: Segment,
}

impl Store {
    /// Returns a scoped reference to an entry's data region.
    pub fn read_region(&mut self, entry: &ValueEntry) -> crate::Result<Range> {
        self.data
            .access(entry.data_offset.into(), entry.data_length as usize)
    }

    /// Publishes value bytes into a slot freshly created by
    /// [`BTree::insert`], flipping it to valid.
    pub fn publish_value(
        &mut self,
        node_idx: u64,
        slot: usize,
        bytes: &[u8],
    ) -> crate::Result<()> {
        let mut entry = self.btree.entry_at(node_idx, slot)?;
        debug_assert_eq!(SlotStatus::InModification, entry.status);

        if !bytes.is_empty() {
            let offset = self.data.allocate(bytes.len() as u64)?;
            self.data
                .access(offset, bytes.len())?
                .as_mut_slice()
                .copy_from_slice(bytes);

            entry.data_offset = into_u32(offset)?;

            #[allow(clippy::cast_possible_truncation)]
            {
                entry.data_length = bytes.len() as u32;
            }
        }

        entry.status = SlotStatus::Valid;
        self.btree.write_entry_at(node_idx, slot, &entry)
    }

    /// Replaces an existing entry's value.
    ///
    /// If the new bytes fit the entry's data region, they are written over
    /// it and the tail is zeroed; the region is kept. Otherwise a fresh
    /// region is allocated and the old one is orphaned.
    ///
    /// Returns the number of bytes newly wasted (the orphaned region's
    /// length, or zero for an in-place overwrite).
    pub fn replace_value(
        &mut self,
        node_idx: u64,
        slot: usize,
        bytes: &[u8],
    ) -> crate::Result<u64> {
        let mut entry = self.btree.entry_at(node_idx, slot)?;

        entry.status = SlotStatus::InModification;
        self.btree.write_entry_at(node_idx, slot, &entry)?;

        let region = entry.data_length as usize;
        let wasted = if bytes.len() <= region {
            if region > 0 {
                let mut range = self.data.access(entry.data_offset.into(), region)?;
                let slice = range.as_mut_slice();
                slice[..bytes.len()].copy_from_slice(bytes);
                slice[bytes.len()..].fill(0);
            }
            0
        } else {
            let offset = self.data.allocate(bytes.len() as u64)?;
            self.data
                .access(offset, bytes.len())?
                .as_mut_slice()
                .copy_from_slice(bytes);

            let orphaned = u64::from(entry.data_length);
            entry.data_offset = into_u32(offset)?;

            #[allow(clippy::cast_possible_truncation)]
            {
                entry.data_length = bytes.len() as u32;
            }

            orphaned
        };

        entry.status = SlotStatus::Valid;
        self.btree.write_entry_at(node_idx, slot, &entry)?;

        Ok(wasted)
    }

    /// Collects every entry in key order.
    pub fn scan_entries(&mut self) -> crate::Result<Vec<ValueEntry>> {
        let mut entries = vec![];
        self.btree.scan(&mut |entry| {
            entries.push(entry.clone());
            Ok(())
        })?;
        Ok(entries)
    }

    /// Recomputes the live-entry count and the wasted data bytes.
    ///
    /// Used on open; slots that are not valid are tolerated here (their
    /// regions simply count as wasted) and only fail actual reads.
    pub fn recover_counters(&mut self) -> crate::Result<(u64, u64)> {
        let mut count = 0u64;
        let mut live_bytes = 0u64;

        self.btree.scan(&mut |entry| {
            if entry.status == SlotStatus::Valid {
                count += 1;
                live_bytes += u64::from(entry.data_length);
            }
            Ok(())
        })?;

        Ok((count, self.data.len().saturating_sub(live_bytes)))
    }

    /// Flushes all three segments.
    pub fn flush(&mut self) -> crate::Result<()> {
        self.btree.index.flush()?;
        self.btree.keys.flush()?;
        self.data.flush()
    }
}

fn into_u32(value: u64) -> crate::Result<u32> {
    u32::try_from(value).map_err(|_| crate::Error::InvalidData)
}
