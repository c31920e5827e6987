//! The page directory: the table of [`Page`] records the allocator works on.
//!
//! The allocator never owns page metadata itself; it borrows it through the
//! [`PageDirectory`] trait. [`MemMap`] is the plain slice-backed
//! implementation used at boot, where the table covers a contiguous range of
//! frames starting at some base frame.

use crate::page::Page;
use core::ops::Range;
use kernel_memory_addresses::PageFrame;

/// Access to per-frame page records.
///
/// Implementors map a contiguous range of frames onto [`Page`] records.
/// Looking up a frame outside [`frames`](Self::frames) is a caller bug and may
/// panic.
pub trait PageDirectory {
    /// The frames this directory has records for.
    fn frames(&self) -> Range<PageFrame>;

    /// Record for `frame`.
    fn page(&self, frame: PageFrame) -> &Page;

    /// Mutable record for `frame`.
    fn page_mut(&mut self, frame: PageFrame) -> &mut Page;

    /// Whether `frame` has a record here.
    #[inline]
    fn contains(&self, frame: PageFrame) -> bool {
        self.frames().contains(&frame)
    }

    /// Whether every frame of `[base, base + pages)` has a record here.
    fn contains_run(&self, base: PageFrame, pages: u64) -> bool {
        let Range { start, end } = self.frames();
        base >= start && base.checked_add(pages).is_some_and(|last| last <= end)
    }
}

/// Slice-backed page directory covering `[base, base + pages.len())`.
pub struct MemMap<'a> {
    base: PageFrame,
    pages: &'a mut [Page],
}

impl<'a> MemMap<'a> {
    /// Wrap the record table for the frames starting at `base`.
    #[must_use]
    pub const fn new(base: PageFrame, pages: &'a mut [Page]) -> Self {
        Self { base, pages }
    }

    /// First frame covered.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> PageFrame {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Mark `[base, base + pages)` reserved; the boot-time classifier calls
    /// this for everything before handing usable ranges to the allocator.
    ///
    /// # Panics
    /// Panics if the range is not covered by this map.
    pub fn reserve(&mut self, base: PageFrame, pages: u64) {
        assert!(
            self.contains_run(base, pages),
            "reserve range {base}+{pages} outside memory map"
        );
        let start = self.index(base);
        for page in &mut self.pages[start..start + to_index(pages)] {
            page.set_reserved(true);
        }
    }

    #[inline]
    fn index(&self, frame: PageFrame) -> usize {
        to_index(frame.pages_since(self.base))
    }
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
const fn to_index(pages: u64) -> usize {
    pages as usize
}

impl PageDirectory for MemMap<'_> {
    fn frames(&self) -> Range<PageFrame> {
        self.base..self.base + self.pages.len() as u64
    }

    #[inline]
    fn page(&self, frame: PageFrame) -> &Page {
        &self.pages[self.index(frame)]
    }

    #[inline]
    fn page_mut(&mut self, frame: PageFrame) -> &mut Page {
        let index = self.index(frame);
        &mut self.pages[index]
    }
}
