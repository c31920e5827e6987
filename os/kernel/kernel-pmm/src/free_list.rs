//! The free-run store.
//!
//! Free runs are kept in a doubly linked list threaded through the run-head
//! [`Page`](crate::page::Page) records of the page directory: each head stores
//! the frame numbers of its neighbouring heads in its [`RunLink`]. The list
//! itself only remembers the first and last head and the total number of free
//! pages. Links are frame numbers, not pointers, so the page directory acts as
//! an arena indexed by frame.
//!
//! ```text
//!  head ─► [0x100, 4] ◄─► [0x108, 2] ◄─► [0x120, 16] ◄─ tail
//!          0x100..0x104    0x108..0x10A    0x120..0x130
//! ```
//!
//! # Invariants
//! - Runs are strictly ascending by head frame and never overlap.
//! - Between public allocator operations no two runs are adjacent
//!   (`head + size == next_head` never holds).
//! - `nr_free` equals the sum of all run sizes.
//!
//! The store itself does not coalesce; [`FreeList::merge`] is the primitive the
//! allocator uses after it has decided two runs belong together.

use crate::error::FreeListError;
use crate::memmap::PageDirectory;
use crate::page::RunLink;
use kernel_memory_addresses::PageFrame;

/// A free run as seen from outside the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FreeRun {
    /// First frame of the run.
    pub head: PageFrame,
    /// Length of the run in pages.
    pub pages: u64,
}

impl FreeRun {
    /// One past the last frame of the run.
    #[inline]
    #[must_use]
    pub fn end(&self) -> PageFrame {
        self.head + self.pages
    }
}

/// Address-ordered list of free runs plus the free page counter.
#[derive(Debug, Default)]
pub struct FreeList {
    first: Option<PageFrame>,
    last: Option<PageFrame>,
    runs: usize,
    nr_free: u64,
}

impl FreeList {
    /// An empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            first: None,
            last: None,
            runs: 0,
            nr_free: 0,
        }
    }

    /// Forget every run and zero the counter.
    ///
    /// Page records are left untouched.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Total number of free pages across all runs.
    #[inline]
    #[must_use]
    pub const fn nr_free(&self) -> u64 {
        self.nr_free
    }

    /// Number of runs in the list.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.runs
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    #[inline]
    pub(crate) const fn credit(&mut self, pages: u64) {
        self.nr_free += pages;
    }

    #[inline]
    pub(crate) const fn debit(&mut self, pages: u64) {
        debug_assert!(self.nr_free >= pages);
        self.nr_free -= pages;
    }

    /// Iterate over the runs in ascending address order.
    pub fn runs<'a, D: PageDirectory + ?Sized>(&self, dir: &'a D) -> Runs<'a, D> {
        Runs {
            dir,
            cursor: self.first,
        }
    }

    /// The run head directly below `head` in address order.
    #[inline]
    pub fn prev_of<D: PageDirectory + ?Sized>(dir: &D, head: PageFrame) -> Option<PageFrame> {
        dir.page(head).link().prev
    }

    /// The run head directly above `head` in address order.
    #[inline]
    pub fn next_of<D: PageDirectory + ?Sized>(dir: &D, head: PageFrame) -> Option<PageFrame> {
        dir.page(head).link().next
    }

    /// Link `head` into the list, keeping address order.
    ///
    /// Scans from the low end and inserts before the first run starting
    /// strictly above `head`, or appends. The caller has already marked `head`
    /// as a run head and set its size; no coalescing happens here.
    pub fn insert_ordered<D: PageDirectory + ?Sized>(&mut self, dir: &mut D, head: PageFrame) {
        debug_assert!(dir.page(head).is_run_head());

        let mut cursor = self.first;
        while let Some(frame) = cursor {
            if head < frame {
                self.link_before(dir, frame, head);
                return;
            }
            cursor = Self::next_of(dir, frame);
        }
        self.push_back(dir, head);
    }

    /// Remove `head` from the list. The page keeps its flags and size.
    pub fn unlink<D: PageDirectory + ?Sized>(&mut self, dir: &mut D, head: PageFrame) {
        let RunLink { prev, next } = dir.page(head).link();
        match prev {
            Some(p) => dir.page_mut(p).link_mut().next = next,
            None => self.first = next,
        }
        match next {
            Some(n) => dir.page_mut(n).link_mut().prev = prev,
            None => self.last = prev,
        }
        *dir.page_mut(head).link_mut() = RunLink::NONE;
        self.runs -= 1;
    }

    /// Put `new` into the list slot currently held by `old`, unlinking `old`.
    ///
    /// Used when an allocation consumes the front of a run: the remainder
    /// starts above `old` and below `old`'s successor, so it inherits the same
    /// position.
    pub fn replace<D: PageDirectory + ?Sized>(&mut self, dir: &mut D, old: PageFrame, new: PageFrame) {
        let link = dir.page(old).link();
        debug_assert!(old < new);
        debug_assert!(link.next.is_none_or(|n| new < n));

        match link.prev {
            Some(p) => dir.page_mut(p).link_mut().next = Some(new),
            None => self.first = Some(new),
        }
        match link.next {
            Some(n) => dir.page_mut(n).link_mut().prev = Some(new),
            None => self.last = Some(new),
        }
        *dir.page_mut(new).link_mut() = link;
        *dir.page_mut(old).link_mut() = RunLink::NONE;
    }

    /// Fold the run at `absorbed` into the run at `survivor` directly below it.
    ///
    /// `absorbed` is unlinked and stops being a run head; `survivor` grows by
    /// its size. The free counter is unchanged.
    pub fn merge<D: PageDirectory + ?Sized>(
        &mut self,
        dir: &mut D,
        survivor: PageFrame,
        absorbed: PageFrame,
    ) {
        let absorbed_pages = dir.page(absorbed).run_size();
        debug_assert_eq!(survivor + dir.page(survivor).run_size(), absorbed);

        self.unlink(dir, absorbed);
        let page = dir.page_mut(absorbed);
        page.set_run_head(false);
        page.set_run_size(0);

        let page = dir.page_mut(survivor);
        page.set_run_size(page.run_size() + absorbed_pages);
    }

    /// Check every invariant of the store against the page directory.
    ///
    /// # Errors
    /// Returns the first violated invariant found while walking the list from
    /// the low end.
    pub fn validate<D: PageDirectory + ?Sized>(&self, dir: &D) -> Result<(), FreeListError> {
        self.check(dir, true)
    }

    /// Like [`validate`](Self::validate), but tolerates adjacent runs.
    ///
    /// Separately mapped ranges are never merged, so two runs may touch when
    /// [`init_memmap`](crate::BestFitManager::init_memmap) was handed
    /// neighbouring ranges.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate_links<D: PageDirectory + ?Sized>(&self, dir: &D) -> Result<(), FreeListError> {
        self.check(dir, false)
    }

    fn check<D: PageDirectory + ?Sized>(&self, dir: &D, strict: bool) -> Result<(), FreeListError> {
        let mut summed = 0u64;
        let mut prev: Option<FreeRun> = None;

        let mut cursor = self.first;
        while let Some(frame) = cursor {
            let page = dir.page(frame);
            if !page.is_run_head() {
                return Err(FreeListError::NotRunHead { frame });
            }
            if page.run_size() == 0 {
                return Err(FreeListError::ZeroSizedRun { frame });
            }
            if page.link().prev != prev.map(|p| p.head) {
                return Err(FreeListError::BrokenLink { frame });
            }

            let run = FreeRun {
                head: frame,
                pages: page.run_size(),
            };
            if let Some(p) = prev {
                if run.head <= p.head {
                    return Err(FreeListError::Unordered {
                        prev: p.head,
                        next: run.head,
                    });
                }
                if p.end() > run.head {
                    return Err(FreeListError::Overlapping {
                        prev: p.head,
                        next: run.head,
                    });
                }
                if strict && p.end() == run.head {
                    return Err(FreeListError::Adjacent {
                        prev: p.head,
                        next: run.head,
                    });
                }
            }

            summed += run.pages;
            prev = Some(run);
            cursor = page.link().next;
        }

        if self.last != prev.map(|p| p.head) {
            let frame = self.last.or_else(|| prev.map(|p| p.head)).unwrap_or_default();
            return Err(FreeListError::BrokenLink { frame });
        }
        if summed != self.nr_free {
            return Err(FreeListError::CountMismatch {
                counted: self.nr_free,
                summed,
            });
        }
        Ok(())
    }

    fn link_before<D: PageDirectory + ?Sized>(&mut self, dir: &mut D, at: PageFrame, head: PageFrame) {
        let prev = dir.page(at).link().prev;
        *dir.page_mut(head).link_mut() = RunLink {
            prev,
            next: Some(at),
        };
        dir.page_mut(at).link_mut().prev = Some(head);
        match prev {
            Some(p) => dir.page_mut(p).link_mut().next = Some(head),
            None => self.first = Some(head),
        }
        self.runs += 1;
    }

    fn push_back<D: PageDirectory + ?Sized>(&mut self, dir: &mut D, head: PageFrame) {
        *dir.page_mut(head).link_mut() = RunLink {
            prev: self.last,
            next: None,
        };
        match self.last {
            Some(l) => dir.page_mut(l).link_mut().next = Some(head),
            None => self.first = Some(head),
        }
        self.last = Some(head);
        self.runs += 1;
    }
}

/// Iterator over the runs of a [`FreeList`], lowest address first.
pub struct Runs<'a, D: PageDirectory + ?Sized> {
    dir: &'a D,
    cursor: Option<PageFrame>,
}

impl<D: PageDirectory + ?Sized> Iterator for Runs<'_, D> {
    type Item = FreeRun;

    fn next(&mut self) -> Option<Self::Item> {
        let head = self.cursor?;
        let page = self.dir.page(head);
        self.cursor = page.link().next;
        Some(FreeRun {
            head,
            pages: page.run_size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memmap::MemMap;
    use crate::page::Page;

    fn mark(dir: &mut MemMap<'_>, head: u64, pages: u64) -> PageFrame {
        let frame = PageFrame::new(head);
        let page = dir.page_mut(frame);
        page.set_run_head(true);
        page.set_run_size(pages);
        frame
    }

    fn heads<D: PageDirectory>(list: &FreeList, dir: &D) -> Vec<u64> {
        list.runs(dir).map(|r| r.head.as_u64()).collect()
    }

    #[test]
    fn insert_keeps_address_order() {
        let mut pages = [Page::default(); 32];
        let mut dir = MemMap::new(PageFrame::new(0), &mut pages);
        let mut list = FreeList::new();

        for (head, size) in [(10, 2), (2, 3), (20, 4), (15, 1), (0, 1)] {
            let f = mark(&mut dir, head, size);
            list.insert_ordered(&mut dir, f);
            list.credit(size);
        }

        assert_eq!(heads(&list, &dir), vec![0, 2, 10, 15, 20]);
        assert_eq!(list.len(), 5);
        assert_eq!(list.nr_free(), 11);
        assert_eq!(list.validate(&dir), Ok(()));
    }

    #[test]
    fn unlink_first_middle_last() {
        let mut pages = [Page::default(); 32];
        let mut dir = MemMap::new(PageFrame::new(0), &mut pages);
        let mut list = FreeList::new();
        for head in [0, 4, 8, 12] {
            let f = mark(&mut dir, head, 1);
            list.insert_ordered(&mut dir, f);
        }

        list.unlink(&mut dir, PageFrame::new(4));
        assert_eq!(heads(&list, &dir), vec![0, 8, 12]);
        list.unlink(&mut dir, PageFrame::new(0));
        assert_eq!(heads(&list, &dir), vec![8, 12]);
        list.unlink(&mut dir, PageFrame::new(12));
        assert_eq!(heads(&list, &dir), vec![8]);
        list.unlink(&mut dir, PageFrame::new(8));
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(dir.page(PageFrame::new(8)).link(), RunLink::NONE);
    }

    #[test]
    fn replace_takes_over_position() {
        let mut pages = [Page::default(); 32];
        let mut dir = MemMap::new(PageFrame::new(0), &mut pages);
        let mut list = FreeList::new();
        for (head, size) in [(0, 2), (4, 6), (16, 2)] {
            let f = mark(&mut dir, head, size);
            list.insert_ordered(&mut dir, f);
            list.credit(size);
        }

        let rest = mark(&mut dir, 7, 3);
        list.replace(&mut dir, PageFrame::new(4), rest);
        dir.page_mut(PageFrame::new(4)).clear();
        list.debit(3);

        assert_eq!(heads(&list, &dir), vec![0, 7, 16]);
        assert_eq!(list.validate(&dir), Ok(()));
    }

    #[test]
    fn merge_absorbs_upper_run() {
        let mut pages = [Page::default(); 16];
        let mut dir = MemMap::new(PageFrame::new(0), &mut pages);
        let mut list = FreeList::new();
        for (head, size) in [(2, 3), (5, 4)] {
            let f = mark(&mut dir, head, size);
            list.insert_ordered(&mut dir, f);
            list.credit(size);
        }
        assert!(matches!(
            list.validate(&dir),
            Err(FreeListError::Adjacent { .. })
        ));

        list.merge(&mut dir, PageFrame::new(2), PageFrame::new(5));
        let runs: Vec<_> = list.runs(&dir).collect();
        assert_eq!(
            runs,
            vec![FreeRun {
                head: PageFrame::new(2),
                pages: 7
            }]
        );
        assert!(!dir.page(PageFrame::new(5)).is_run_head());
        assert_eq!(list.validate(&dir), Ok(()));
    }

    #[test]
    fn validate_reports_unordered_runs() {
        let mut pages = [Page::default(); 16];
        let mut dir = MemMap::new(PageFrame::new(0), &mut pages);
        let mut list = FreeList::new();
        for head in [0, 8] {
            let f = mark(&mut dir, head, 2);
            list.insert_ordered(&mut dir, f);
            list.credit(2);
        }

        let (low, high) = (PageFrame::new(0), PageFrame::new(8));
        *dir.page_mut(high).link_mut() = RunLink {
            prev: None,
            next: Some(low),
        };
        *dir.page_mut(low).link_mut() = RunLink {
            prev: Some(high),
            next: None,
        };
        list.first = Some(high);
        list.last = Some(low);

        assert_eq!(
            list.validate_links(&dir),
            Err(FreeListError::Unordered {
                prev: high,
                next: low
            })
        );
    }

    #[test]
    fn validate_reports_overlapping_runs() {
        let mut pages = [Page::default(); 16];
        let mut dir = MemMap::new(PageFrame::new(0), &mut pages);
        let mut list = FreeList::new();
        for (head, size) in [(0, 5), (3, 2)] {
            let f = mark(&mut dir, head, size);
            list.insert_ordered(&mut dir, f);
            list.credit(size);
        }

        assert_eq!(
            list.validate_links(&dir),
            Err(FreeListError::Overlapping {
                prev: PageFrame::new(0),
                next: PageFrame::new(3)
            })
        );
    }

    #[test]
    fn validate_reports_broken_links() {
        let mut pages = [Page::default(); 16];
        let mut dir = MemMap::new(PageFrame::new(0), &mut pages);
        let mut list = FreeList::new();
        for head in [0, 8] {
            let f = mark(&mut dir, head, 2);
            list.insert_ordered(&mut dir, f);
            list.credit(2);
        }

        dir.page_mut(PageFrame::new(8)).link_mut().prev = None;
        assert_eq!(
            list.validate(&dir),
            Err(FreeListError::BrokenLink {
                frame: PageFrame::new(8)
            })
        );

        dir.page_mut(PageFrame::new(8)).link_mut().prev = Some(PageFrame::new(0));
        assert_eq!(list.validate(&dir), Ok(()));
        list.last = Some(PageFrame::new(0));
        assert_eq!(
            list.validate(&dir),
            Err(FreeListError::BrokenLink {
                frame: PageFrame::new(0)
            })
        );
    }

    #[test]
    fn validate_reports_count_mismatch() {
        let mut pages = [Page::default(); 8];
        let mut dir = MemMap::new(PageFrame::new(0), &mut pages);
        let mut list = FreeList::new();
        let f = mark(&mut dir, 1, 3);
        list.insert_ordered(&mut dir, f);
        list.credit(2);
        assert_eq!(
            list.validate(&dir),
            Err(FreeListError::CountMismatch {
                counted: 2,
                summed: 3
            })
        );
    }

    #[test]
    fn validate_reports_demoted_head() {
        let mut pages = [Page::default(); 8];
        let mut dir = MemMap::new(PageFrame::new(0), &mut pages);
        let mut list = FreeList::new();
        let f = mark(&mut dir, 1, 3);
        list.insert_ordered(&mut dir, f);
        list.credit(3);
        dir.page_mut(f).set_run_head(false);
        assert_eq!(
            list.validate(&dir),
            Err(FreeListError::NotRunHead { frame: f })
        );
    }
}
