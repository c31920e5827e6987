//! Best-fit physical page manager.
//!
//! [`BestFitManager`] owns a page directory and the [`FreeList`] built on top
//! of it. Allocation picks the smallest free run that still fits the request
//! (lowest address wins among equals) and splits off the unused tail; freeing
//! re-links the block in address order and immediately coalesces it with a
//! physically adjacent predecessor and/or successor.
//!
//! ## Example
//! ```rust
//! use kernel_memory_addresses::PageFrame;
//! use kernel_pmm::{BestFitManager, MemMap, Page};
//!
//! let mut pages = [Page::reserved(); 10];
//! let base = PageFrame::new(0x80000);
//! let mut pmm = BestFitManager::new(MemMap::new(base, &mut pages));
//! pmm.init_memmap(base, 10);
//!
//! let a = pmm.alloc_pages(3).unwrap();
//! let b = pmm.alloc_pages(7).unwrap();
//! assert_eq!((a, b), (base, base + 3));
//! assert_eq!(pmm.alloc_pages(1), None);
//!
//! pmm.free_pages(a, 3);
//! pmm.free_pages(b, 7);
//! assert_eq!(pmm.nr_free_pages(), 10);
//! assert_eq!(pmm.free_list().len(), 1);
//! ```
//!
//! ## Fatal conditions
//! Zero-length requests, mapping pages that are not reserved and freeing pages
//! that are reserved or already free panic: the list would otherwise be
//! corrupted. [`BestFitManager::try_init_memmap`] and
//! [`BestFitManager::try_free_pages`] check the same preconditions up front and
//! return a [`PmmError`] without touching anything.

use crate::error::{FreeListError, PmmError};
use crate::free_list::{FreeList, FreeRun, Runs};
use crate::memmap::PageDirectory;
use kernel_memory_addresses::PageFrame;
use log::{debug, trace, warn};

/// Best-fit page allocator over a page directory `D`.
pub struct BestFitManager<D> {
    dir: D,
    free: FreeList,
}

impl<D: PageDirectory> BestFitManager<D> {
    pub const NAME: &'static str = "best_fit_pmm_manager";

    /// Create a manager with an empty free list.
    ///
    /// No page of `dir` is considered free until it is handed over with
    /// [`init_memmap`](Self::init_memmap).
    #[must_use]
    pub const fn new(dir: D) -> Self {
        Self {
            dir,
            free: FreeList::new(),
        }
    }

    /// Empty the free list and zero the free page counter.
    pub fn init(&mut self) {
        self.free.reset();
    }

    #[inline]
    #[must_use]
    pub const fn directory(&self) -> &D {
        &self.dir
    }

    /// Mutable access to the page records, e.g. to take references on
    /// allocated pages.
    #[inline]
    pub const fn directory_mut(&mut self) -> &mut D {
        &mut self.dir
    }

    #[inline]
    #[must_use]
    pub fn into_directory(self) -> D {
        self.dir
    }

    #[inline]
    #[must_use]
    pub const fn free_list(&self) -> &FreeList {
        &self.free
    }

    /// Free runs in ascending address order.
    pub fn runs(&self) -> Runs<'_, D> {
        self.free.runs(&self.dir)
    }

    /// Check all free-list invariants.
    ///
    /// # Errors
    /// Returns the first broken invariant.
    pub fn validate(&self) -> Result<(), FreeListError> {
        self.free.validate(&self.dir)
    }

    /// Number of free pages. O(1).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn nr_free_pages(&self) -> usize {
        self.free.nr_free() as usize
    }

    /// Hand the reserved pages `[base, base + n)` to the allocator as one free run.
    ///
    /// The range is never merged with existing runs, even if adjacent.
    ///
    /// # Panics
    /// Panics if `n` is zero, or any page in the range is outside the directory
    /// or not reserved.
    pub fn init_memmap(&mut self, base: PageFrame, n: usize) {
        if let Err(e) = self.try_init_memmap(base, n) {
            panic!("init_memmap({base}, {n}): {e}");
        }
    }

    /// Fallible form of [`init_memmap`](Self::init_memmap).
    ///
    /// # Errors
    /// Returns the first violated precondition; nothing is modified in that case.
    pub fn try_init_memmap(&mut self, base: PageFrame, n: usize) -> Result<(), PmmError> {
        let pages = self.check_range(base, n)?;
        if let Some(frame) = frames(base, pages).find(|&f| !self.dir.page(f).is_reserved()) {
            return Err(PmmError::NotReserved { frame });
        }

        for frame in frames(base, pages) {
            self.dir.page_mut(frame).clear();
        }
        self.mark_head(base, pages);
        self.free.credit(pages);
        self.free.insert_ordered(&mut self.dir, base);

        debug!("mapped {pages} free page(s) at {base}");
        self.debug_validate();
        Ok(())
    }

    /// Allocate `n` physically contiguous pages, best fit.
    ///
    /// Returns the first frame of the block, or `None` if no single free run
    /// holds `n` pages. The returned pages are unreferenced with cleared flags.
    ///
    /// # Panics
    /// Panics if `n` is zero.
    pub fn alloc_pages(&mut self, n: usize) -> Option<PageFrame> {
        assert!(n > 0, "alloc_pages: {}", PmmError::ZeroLength);
        let pages = n as u64;

        if pages > self.free.nr_free() {
            trace!(
                "alloc_pages({n}): only {} page(s) free",
                self.free.nr_free()
            );
            return None;
        }

        let Some(best) = self.best_fit(pages) else {
            warn!(
                "alloc_pages({n}): no run large enough although {} page(s) are free",
                self.free.nr_free()
            );
            return None;
        };
        trace!("alloc_pages({n}): best fit {} ({} pages)", best.head, best.pages);

        if best.pages > pages {
            let rest = best.head + pages;
            self.mark_head(rest, best.pages - pages);
            self.free.replace(&mut self.dir, best.head, rest);
        } else {
            self.free.unlink(&mut self.dir, best.head);
        }
        self.free.debit(pages);
        self.dir.page_mut(best.head).clear();

        self.debug_validate();
        Some(best.head)
    }

    /// Return the block `[base, base + n)` and coalesce it with its neighbours.
    ///
    /// # Panics
    /// Panics if `n` is zero, or any page of the block is outside the
    /// directory, reserved, or already free.
    pub fn free_pages(&mut self, base: PageFrame, n: usize) {
        if let Err(e) = self.try_free_pages(base, n) {
            panic!("free_pages({base}, {n}): {e}");
        }
    }

    /// Fallible form of [`free_pages`](Self::free_pages).
    ///
    /// # Errors
    /// Returns the first violated precondition; nothing is modified in that case.
    pub fn try_free_pages(&mut self, base: PageFrame, n: usize) -> Result<(), PmmError> {
        let pages = self.check_range(base, n)?;
        for frame in frames(base, pages) {
            let page = self.dir.page(frame);
            if page.is_reserved() {
                return Err(PmmError::Reserved { frame });
            }
            if page.is_run_head() {
                return Err(PmmError::AlreadyFree { frame });
            }
        }
        if let Some(frame) = self.first_free_in(base, pages) {
            return Err(PmmError::AlreadyFree { frame });
        }

        for frame in frames(base, pages) {
            self.dir.page_mut(frame).clear();
        }
        self.mark_head(base, pages);
        self.free.credit(pages);
        self.free.insert_ordered(&mut self.dir, base);

        let head = self.coalesce(base);
        trace!(
            "free_pages({base}, {n}): run at {head} now {} pages",
            self.dir.page(head).run_size()
        );

        self.debug_validate();
        Ok(())
    }

    /// Merge the freshly linked run at `head` with adjacent runs on either side.
    ///
    /// Returns the head of the resulting run.
    fn coalesce(&mut self, mut head: PageFrame) -> PageFrame {
        if let Some(prev) = FreeList::prev_of(&self.dir, head)
            && prev + self.dir.page(prev).run_size() == head
        {
            trace!("coalescing {head} into predecessor {prev}");
            self.free.merge(&mut self.dir, prev, head);
            head = prev;
        }

        if let Some(next) = FreeList::next_of(&self.dir, head)
            && head + self.dir.page(head).run_size() == next
        {
            trace!("coalescing successor {next} into {head}");
            self.free.merge(&mut self.dir, head, next);
        }

        head
    }

    /// First frame of `[base, base + pages)` that already lies inside a free run.
    ///
    /// Catches blocks whose head lost its run-head mark by being merged into a
    /// neighbour.
    fn first_free_in(&self, base: PageFrame, pages: u64) -> Option<PageFrame> {
        let end = base + pages;
        self.runs()
            .take_while(|run| run.head < end)
            .find(|run| run.end() > base)
            .map(|run| run.head.max(base))
    }

    /// Smallest run holding at least `pages`; the lowest address wins ties.
    fn best_fit(&self, pages: u64) -> Option<FreeRun> {
        self.runs()
            .filter(|run| run.pages >= pages)
            .min_by_key(|run| run.pages)
    }

    fn check_range(&self, base: PageFrame, n: usize) -> Result<u64, PmmError> {
        if n == 0 {
            return Err(PmmError::ZeroLength);
        }
        let pages = n as u64;
        if !self.dir.contains_run(base, pages) {
            let frame = frames(base, pages)
                .find(|&f| !self.dir.contains(f))
                .unwrap_or(base);
            return Err(PmmError::OutOfRange { frame });
        }
        Ok(pages)
    }

    fn mark_head(&mut self, head: PageFrame, pages: u64) {
        let page = self.dir.page_mut(head);
        page.set_run_size(pages);
        page.set_run_head(true);
    }

    #[inline]
    fn debug_validate(&self) {
        if !cfg!(any(feature = "validate", debug_assertions)) {
            return;
        }
        if let Err(e) = self.free.validate_links(&self.dir) {
            panic!("free list corrupted: {e}");
        }
    }
}

/// The frames `[base, base + pages)`.
fn frames(base: PageFrame, pages: u64) -> impl Iterator<Item = PageFrame> {
    (0..pages).map(move |i| base + i)
}
