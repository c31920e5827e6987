//! The physical memory manager interface.
//!
//! The kernel talks to "a" physical memory manager through
//! [`PhysicalMemoryManager`] so the placement policy can be swapped without
//! touching callers. [`BestFitManager`] is the implementation shipped here.
//!
//! [`FrameAlloc`] is the narrower single-frame view page-table code wants; any
//! manager provides it for free.

use crate::best_fit::BestFitManager;
use crate::error::CheckError;
use crate::memmap::PageDirectory;
use kernel_memory_addresses::{PageFrame, PhysicalAddress};
use log::info;

/// A physical page manager.
pub trait PhysicalMemoryManager {
    /// Human-readable name of the placement policy.
    fn name(&self) -> &'static str;

    /// Forget all free memory.
    fn init(&mut self);

    /// Hand the reserved pages `[base, base + n)` over as free memory.
    fn init_memmap(&mut self, base: PageFrame, n: usize);

    /// Allocate `n` contiguous pages; `None` when no run is large enough.
    fn alloc_pages(&mut self, n: usize) -> Option<PageFrame>;

    /// Return `[base, base + n)` to the manager.
    fn free_pages(&mut self, base: PageFrame, n: usize);

    /// Number of free pages.
    fn nr_free_pages(&self) -> usize;

    /// Whether `frame` is currently reserved or heads a free run.
    ///
    /// Freshly allocated block heads must answer `false`.
    fn is_tracked(&self, frame: PageFrame) -> bool;

    #[inline]
    fn alloc_page(&mut self) -> Option<PageFrame> {
        self.alloc_pages(1)
    }

    #[inline]
    fn free_page(&mut self, frame: PageFrame) {
        self.free_pages(frame, 1);
    }

    /// Exercise allocation, freeing and coalescing against live state.
    ///
    /// Needs at least three free pages. On success the free page count is
    /// back where it started.
    ///
    /// # Errors
    /// Returns the first misbehaviour observed.
    fn check(&mut self) -> Result<(), CheckError>
    where
        Self: Sized,
    {
        self_check(self)
    }
}

impl<D: PageDirectory> PhysicalMemoryManager for BestFitManager<D> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self) {
        Self::init(self);
    }

    fn init_memmap(&mut self, base: PageFrame, n: usize) {
        Self::init_memmap(self, base, n);
    }

    fn alloc_pages(&mut self, n: usize) -> Option<PageFrame> {
        Self::alloc_pages(self, n)
    }

    fn free_pages(&mut self, base: PageFrame, n: usize) {
        Self::free_pages(self, base, n);
    }

    fn nr_free_pages(&self) -> usize {
        Self::nr_free_pages(self)
    }

    fn is_tracked(&self, frame: PageFrame) -> bool {
        let page = self.directory().page(frame);
        page.is_reserved() || page.is_run_head()
    }

    fn check(&mut self) -> Result<(), CheckError> {
        self_check(self)?;
        self.free_list().validate_links(self.directory())?;
        Ok(())
    }
}

fn self_check<M: PhysicalMemoryManager>(pmm: &mut M) -> Result<(), CheckError> {
    let p1 = pmm.alloc_pages(1).ok_or(CheckError::AllocationFailed(1))?;
    if pmm.is_tracked(p1) {
        return Err(CheckError::BadPageState(p1));
    }

    let p2 = pmm.alloc_pages(2).ok_or(CheckError::AllocationFailed(2))?;
    if pmm.is_tracked(p2) {
        return Err(CheckError::BadPageState(p2));
    }
    if p2 == p1 || (p2 < p1 && p2 + 2 > p1) {
        return Err(CheckError::Overlap(p2));
    }

    let before = pmm.nr_free_pages();
    pmm.free_pages(p1, 1);
    pmm.free_pages(p2, 2);
    expect_free(pmm, before + 3)?;

    let p3 = pmm.alloc_pages(3).ok_or(CheckError::AllocationFailed(3))?;
    pmm.free_pages(p3, 3);
    expect_free(pmm, before + 3)?;

    info!("{}: check succeeded", pmm.name());
    Ok(())
}

fn expect_free<M: PhysicalMemoryManager>(pmm: &M, expected: usize) -> Result<(), CheckError> {
    let actual = pmm.nr_free_pages();
    if actual == expected {
        Ok(())
    } else {
        Err(CheckError::FreeCount { expected, actual })
    }
}

/// Allocator of single 4 KiB physical frames, addressed physically.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame. The returned address is page aligned.
    fn alloc_4k(&mut self) -> Option<PhysicalAddress>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, pa: PhysicalAddress);
}

impl<M: PhysicalMemoryManager> FrameAlloc for M {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        self.alloc_page().map(PageFrame::base)
    }

    /// # Panics
    /// Panics if `pa` is not page aligned.
    fn free_4k(&mut self, pa: PhysicalAddress) {
        let Some(frame) = PageFrame::from_aligned(pa) else {
            panic!("free_4k: {pa} is not page aligned");
        };
        self.free_page(frame);
    }
}
