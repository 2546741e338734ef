// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::io;
use std::marker::PhantomData;
use std::sync::Arc;

/// Smallest alignment and size granule for mapped views
pub const VIEW_ALIGNMENT: u64 = 8 * 1_024;

/// Returns the view granule, honoring the OS page size.
///
/// Mapping offsets must be page aligned, so on systems with pages larger
/// than 8 KiB the page size wins.
pub fn view_granule() -> u64 {
    (page_size::get() as u64).max(VIEW_ALIGNMENT)
}

/// A windowed memory map over a segment's backing file.
///
/// Views are reference counted through [`Arc`]; a view is unmapped when the
/// cache entry and every [`Range`] handed out for it are gone.
pub struct View {
    map: MmapMut,
    file_offset: u64,
}

impl View {
    /// Maps `len` bytes of `file` starting at the aligned `file_offset`.
    pub fn map(file: &File, file_offset: u64, len: usize) -> io::Result<Self> {
        debug_assert_eq!(
            0,
            file_offset % view_granule(),
            "view offset must be aligned",
        );

        // SAFETY: the segment owns the file, never truncates it while the
        // tangle is open, and only grows it after all views were dropped
        #[allow(unsafe_code)]
        let map = unsafe {
            MmapOptions::new()
                .offset(file_offset)
                .len(len)
                .map_mut(file)?
        };

        Ok(Self { map, file_offset })
    }

    /// Offset of the view's first byte within the backing file.
    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// Length of the view in bytes.
    pub fn len(&self) -> u64 {
        self.map.len() as u64
    }

    /// Whether the view spans the given file range.
    pub fn contains(&self, file_offset: u64, size: u64) -> bool {
        file_offset >= self.file_offset && file_offset + size <= self.file_offset + self.len()
    }

    /// Schedules dirty pages of this view for writeback.
    pub fn flush(&self) -> io::Result<()> {
        self.map.flush()
    }

    fn base_ptr(&self) -> *mut u8 {
        self.map.as_ptr().cast_mut()
    }
}

/// A scoped reference to a byte span inside a cached [`View`].
///
/// Holds one view refcount and releases it on drop. Ranges are deliberately
/// not [`Send`]: they must stay on the worker thread and must be dropped
/// before the segment is allowed to grow.
pub struct Range {
    view: Arc<View>,
    start: usize,
    len: usize,

    // Ranges point into shared mappings and never leave the worker
    _not_send: PhantomData<*const u8>,
}

impl Range {
    pub(crate) fn new(view: Arc<View>, file_offset: u64, len: usize) -> Self {
        debug_assert!(view.contains(file_offset, len as u64), "range outside view");

        #[allow(clippy::cast_possible_truncation)]
        let start = (file_offset - view.file_offset()) as usize;

        Self {
            view,
            start,
            len,
            _not_send: PhantomData,
        }
    }

    /// Length of the range in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the range is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The bytes of the range.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the view outlives the slice via the held Arc; writers are
        // serialized on the worker thread, so no mutable alias is live
        #[allow(unsafe_code)]
        unsafe {
            std::slice::from_raw_parts(self.view.base_ptr().add(self.start), self.len)
        }
    }

    /// The bytes of the range, mutable.
    ///
    /// The caller (the worker) must not hold another range overlapping this
    /// one while the returned slice is alive.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: see as_slice; mutation is additionally guarded by the
        // single-worker discipline
        #[allow(unsafe_code)]
        unsafe {
            std::slice::from_raw_parts_mut(self.view.base_ptr().add(self.start), self.len)
        }
    }
}

impl std::ops::Deref for Range {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}
