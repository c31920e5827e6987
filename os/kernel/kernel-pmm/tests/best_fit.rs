use kernel_memory_addresses::PageFrame;
use kernel_pmm::{BestFitManager, FreeRun, MemMap, Page, PageDirectory, PhysicalMemoryManager};

const A: PageFrame = PageFrame::new(0x8_0000);

fn runs<D: PageDirectory>(pmm: &BestFitManager<D>) -> Vec<FreeRun> {
    pmm.runs().collect()
}

fn run(head: PageFrame, pages: u64) -> FreeRun {
    FreeRun { head, pages }
}

#[test]
fn end_to_end_ten_pages() {
    let mut pages = [Page::reserved(); 10];
    let mut pmm = BestFitManager::new(MemMap::new(A, &mut pages));
    pmm.init_memmap(A, 10);
    assert_eq!(runs(&pmm), vec![run(A, 10)]);
    assert_eq!(pmm.nr_free_pages(), 10);

    let first = pmm.alloc_pages(3);
    assert_eq!(first, Some(A));
    assert_eq!(runs(&pmm), vec![run(A + 3, 7)]);
    assert_eq!(pmm.nr_free_pages(), 7);

    let second = pmm.alloc_pages(7);
    assert_eq!(second, Some(A + 3));
    assert!(pmm.free_list().is_empty());
    assert_eq!(pmm.nr_free_pages(), 0);

    assert_eq!(pmm.alloc_pages(1), None);

    pmm.free_pages(A, 3);
    pmm.free_pages(A + 3, 7);
    assert_eq!(runs(&pmm), vec![run(A, 10)]);
    assert_eq!(pmm.nr_free_pages(), 10);
    assert_eq!(pmm.validate(), Ok(()));
}

#[test]
fn freeing_between_two_runs_merges_all_three() {
    let mut pages = [Page::reserved(); 9];
    let mut pmm = BestFitManager::new(MemMap::new(A, &mut pages));
    pmm.init_memmap(A, 9);
    let low = pmm.alloc_pages(3).unwrap();
    let mid = pmm.alloc_pages(3).unwrap();
    let high = pmm.alloc_pages(3).unwrap();

    pmm.free_pages(low, 3);
    pmm.free_pages(high, 3);
    assert_eq!(runs(&pmm), vec![run(A, 3), run(A + 6, 3)]);

    pmm.free_pages(mid, 3);
    assert_eq!(runs(&pmm), vec![run(A, 9)]);
    assert!(!pmm.directory().page(mid).is_run_head());
    assert!(!pmm.directory().page(high).is_run_head());
}

#[test]
fn exhaustion_does_not_mutate() {
    let mut pages = [Page::reserved(); 12];
    let mut pmm = BestFitManager::new(MemMap::new(A, &mut pages));
    pmm.init_memmap(A, 4);
    pmm.init_memmap(A + 6, 4);
    let before = runs(&pmm);

    // More than is free at all, then more than any single run holds.
    assert_eq!(pmm.alloc_pages(9), None);
    assert_eq!(pmm.alloc_pages(5), None);

    assert_eq!(runs(&pmm), before);
    assert_eq!(pmm.nr_free_pages(), 8);
}

#[test]
fn free_count_query_is_stable() {
    let mut pages = [Page::reserved(); 6];
    let mut pmm = BestFitManager::new(MemMap::new(A, &mut pages));
    pmm.init_memmap(A, 6);
    let _ = pmm.alloc_pages(2);
    assert_eq!(pmm.nr_free_pages(), pmm.nr_free_pages());
    assert_eq!(PhysicalMemoryManager::nr_free_pages(&pmm), 4);
}

#[test]
fn allocated_pages_can_be_referenced_and_returned() {
    let mut pages = [Page::reserved(); 8];
    let mut pmm = BestFitManager::new(MemMap::new(A, &mut pages));
    pmm.init_memmap(A, 8);

    let block = pmm.alloc_pages(2).unwrap();
    for i in 0..2 {
        let page = pmm.directory().page(block + i);
        assert_eq!(page.ref_count(), 0);
        assert!(!page.is_reserved() && !page.is_run_head());
    }

    assert_eq!(pmm.directory_mut().page_mut(block).get_ref(), 1);
    assert_eq!(pmm.directory_mut().page_mut(block).put_ref(), 0);
    pmm.free_pages(block, 2);
    assert_eq!(runs(&pmm), vec![run(A, 8)]);
}

/// Tiny deterministic generator so the churn test is reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) % bound
    }
}

#[test]
fn churn_preserves_invariants_and_conserves_pages() {
    const TOTAL: usize = 256;
    let mut pages = vec![Page::reserved(); TOTAL];
    let mut pmm = BestFitManager::new(MemMap::new(A, &mut pages));
    pmm.init_memmap(A, TOTAL);

    let mut rng = Lcg(0x5eed);
    let mut live: Vec<(PageFrame, usize)> = Vec::new();

    for _ in 0..2_000 {
        let free_now = rng.next(3) == 0 && !live.is_empty();
        if free_now {
            let idx = usize::try_from(rng.next(live.len() as u64)).unwrap();
            let (base, n) = live.swap_remove(idx);
            pmm.free_pages(base, n);
        } else {
            let n = usize::try_from(rng.next(8) + 1).unwrap();
            let before = pmm.nr_free_pages();
            match pmm.alloc_pages(n) {
                Some(base) => {
                    assert_eq!(pmm.nr_free_pages(), before - n);
                    for &(other, m) in &live {
                        let disjoint = base + n as u64 <= other || other + m as u64 <= base;
                        assert!(disjoint, "{base:?}+{n} overlaps {other:?}+{m}");
                    }
                    live.push((base, n));
                }
                None => {
                    assert_eq!(pmm.nr_free_pages(), before);
                    assert!(pmm.runs().all(|r| r.pages < n as u64));
                }
            }
        }

        let in_use: usize = live.iter().map(|&(_, n)| n).sum();
        assert_eq!(pmm.nr_free_pages() + in_use, TOTAL);
        assert_eq!(pmm.validate(), Ok(()));
    }

    for (base, n) in live.drain(..) {
        pmm.free_pages(base, n);
    }
    assert_eq!(runs(&pmm), vec![run(A, TOTAL as u64)]);
}
