// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Append-only, view-cached mapped segments.
//!
//! A segment is one named byte stream exposed as a growable memory-mapped
//! region: a fixed 12-byte header (`format_version: u32`, `data_length: i64`,
//! both little-endian) followed by payload bytes. Byte ranges are handed out
//! as scoped [`Range`]s backed by a small FIFO cache of mapped views.

mod view;
mod view_cache;

pub use view::{Range, View, VIEW_ALIGNMENT};

use crate::{file, version::FormatVersion};
use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering::AcqRel, Ordering::Acquire, Ordering::Release};
use view::view_granule;
use view_cache::ViewCache;

/// Size of the fixed on-disk segment header
pub const HEADER_SIZE: u64 = 12;

/// Capacity given to a freshly created segment
pub const INITIAL_CAPACITY: u64 = 32 * 1_024;

/// Growth quantum of the index segment
pub const INDEX_GROWTH_QUANTUM: u64 = 4 * 1_024;

/// Growth quantum of the keys and data segments
pub const DATA_GROWTH_QUANTUM: u64 = 64 * 1_024;

const VIEW_CACHE_SIZE: usize = 4;

pub(crate) fn align_up(value: u64, quantum: u64) -> u64 {
    value.div_ceil(quantum) * quantum
}

pub(crate) fn align_down(value: u64, quantum: u64) -> u64 {
    (value / quantum) * quantum
}

/// One mapped byte stream of a tangle.
///
/// All offsets taken and returned by a segment are payload-relative; the
/// header is managed internally and persisted with positional writes.
pub struct Segment {
    name: &'static str,
    file: File,
    format_version: FormatVersion,
    data_length: AtomicU64,
    capacity: u64,
    high_water: u64,
    growth_quantum: u64,
    views: ViewCache,
}

impl Segment {
    /// Opens a segment over the given stream.
    ///
    /// A fresh stream gets its header initialized to the current format
    /// version; a stream with any other nonzero version is refused.
    pub fn open(
        name: &'static str,
        file: File,
        initial_capacity: u64,
        growth_quantum: u64,
    ) -> crate::Result<Self> {
        let file_len = file.metadata()?.len();

        let mut data_length = 0;

        if file_len >= HEADER_SIZE {
            let mut header = [0; HEADER_SIZE as usize];
            file::read_exact_at(&file, &mut header, 0)?;

            let stored_version = LittleEndian::read_u32(&header);
            if stored_version != 0 {
                FormatVersion::try_from(stored_version)
                    .map_err(|()| crate::Error::InvalidVersion(stored_version))?;
            }

            let stored_length = LittleEndian::read_i64(&header[4..]);
            if stored_length < 0 {
                return Err(crate::Error::InvalidData);
            }

            #[allow(clippy::cast_sign_loss)]
            {
                data_length = stored_length as u64;
            }
        }

        // Growth is quantum-aligned, the opening capacity is not
        let capacity = file_len.max(initial_capacity);
        if capacity > file_len {
            file.set_len(capacity)?;
        }

        if HEADER_SIZE + data_length > capacity {
            return Err(crate::Error::InvalidData);
        }

        let segment = Self {
            name,
            file,
            format_version: FormatVersion::V1,
            data_length: AtomicU64::new(data_length),
            capacity,
            high_water: data_length,
            growth_quantum,
            views: ViewCache::with_capacity(VIEW_CACHE_SIZE),
        };

        // Normalizes a fresh (all-zero) header to the current version
        segment.write_header()?;

        log::debug!(
            "opened segment {name:?}, data_length={data_length}, capacity={capacity}",
        );

        Ok(segment)
    }

    /// The segment's on-disk format version.
    #[must_use]
    pub fn format_version(&self) -> FormatVersion {
        self.format_version
    }

    /// Length of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.data_length.load(Acquire)
    }

    /// Returns `true` if no payload bytes were allocated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current mapped capacity, including the header.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Reserves `size` payload bytes, returning their offset.
    ///
    /// The returned range is zero-initialized. Growing past the current
    /// capacity remaps the segment, which requires every previously handed
    /// out [`Range`] to be dropped.
    pub fn allocate(&mut self, size: u64) -> crate::Result<u64> {
        let offset = self.data_length.fetch_add(size, AcqRel);
        let new_length = offset + size;

        if HEADER_SIZE + new_length > self.capacity {
            self.grow(HEADER_SIZE + new_length)?;
        }

        // Space below the high-water mark was used before (the segment was
        // cleared since), so the zero guarantee needs an explicit wipe
        if offset < self.high_water && size > 0 {
            let wipe_end = new_length.min(self.high_water);

            #[allow(clippy::cast_possible_truncation)]
            let mut range = self.access(offset, (wipe_end - offset) as usize)?;
            range.as_mut_slice().fill(0);
        }

        self.high_water = self.high_water.max(new_length);
        self.write_header()?;

        Ok(offset)
    }

    /// Returns a scoped reference to `size` payload bytes at `offset`.
    pub fn access(&mut self, offset: u64, size: usize) -> crate::Result<Range> {
        let file_offset = HEADER_SIZE + offset;

        debug_assert!(
            offset + size as u64 <= self.len(),
            "segment access past data_length",
        );

        if let Some(view) = self.views.find(file_offset, size as u64) {
            return Ok(Range::new(view, file_offset, size));
        }

        let granule = view_granule();
        let start = align_down(file_offset, granule);
        let end = align_up(file_offset + size as u64, granule).min(self.capacity);
        debug_assert!(end >= file_offset + size as u64);

        #[allow(clippy::cast_possible_truncation)]
        let view = std::sync::Arc::new(View::map(&self.file, start, (end - start) as usize)?);
        self.views.insert(view.clone());

        Ok(Range::new(view, file_offset, size))
    }

    /// Truncates the payload to zero length.
    ///
    /// Previously allocated bytes are abandoned in place; the high-water
    /// mark keeps future allocations zero-initialized.
    pub fn reset(&mut self) -> crate::Result<()> {
        self.data_length.store(0, Release);
        self.write_header()?;
        Ok(())
    }

    /// Flushes dirty mapped pages and the header to the backing stream.
    pub fn flush(&mut self) -> crate::Result<()> {
        log::trace!("flushing segment {:?}", self.name);
        self.views.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn grow(&mut self, required: u64) -> crate::Result<()> {
        let new_capacity = align_up(required, self.growth_quantum);

        log::trace!(
            "growing segment {:?} from {} to {new_capacity}",
            self.name,
            self.capacity,
        );

        // All outstanding ranges must be gone before the region moves
        self.views.release_all();

        self.file.set_len(new_capacity)?;
        self.capacity = new_capacity;

        Ok(())
    }

    fn write_header(&self) -> crate::Result<()> {
        let mut header = [0; HEADER_SIZE as usize];
        LittleEndian::write_u32(&mut header, u32::from(self.format_version));

        #[allow(clippy::cast_possible_wrap)]
        LittleEndian::write_i64(&mut header[4..], self.len() as i64);

        file::write_all_at(&self.file, &header, 0)?;
        Ok(())
    }
}
