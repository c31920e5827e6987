//! # Kernel Physical Page Allocator
//!
//! This crate manages the kernel's physical pages: it tracks which pages are
//! free, hands out physically contiguous page runs with a **best-fit** policy,
//! and coalesces freed runs with their physical neighbours to keep
//! fragmentation in check.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │           PhysicalMemoryManager / FrameAlloc        │
//! │    • init_memmap / alloc_pages / free_pages         │
//! │    • single 4 KiB frames by physical address        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                 BestFitManager                      │
//! │    • best-fit scan, split on allocation             │
//! │    • ordered insert + coalescing on free            │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                    FreeList                         │
//! │    • address-ordered run heads, free page counter   │
//! │    • links stored in the run heads' page records    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │           PageDirectory (MemMap)                    │
//! │    • one Page record per frame                      │
//! │    • reserved / run-head flags, refcount, run size  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Page records ([`page`]) and the page directory ([`memmap`])
//!
//! Every frame has a [`Page`] record. The boot-time classifier marks
//! everything reserved and then hands usable ranges to the allocator with
//! [`BestFitManager::init_memmap`]. The allocator reaches the records through
//! the [`PageDirectory`] trait; [`MemMap`] is the slice-backed implementation.
//!
//! ### Free list ([`free_list`])
//!
//! Free runs are identified by their first frame (the *run head*), which
//! carries the run length. Heads are kept in ascending address order, never
//! overlap, and (once coalesced) never touch.
//!
//! ### Best-fit manager ([`best_fit`])
//!
//! * **Allocation** scans every run and takes the smallest one with at least
//!   `n` pages; among equal sizes the lowest address wins. Oversized runs are
//!   split and the tail stays in the list in place of the original run.
//! * **Freeing** links the block back in order and merges it with a directly
//!   adjacent predecessor and then successor.
//! * **Initialization** never merges: every `init_memmap` call yields exactly
//!   one run.
//!
//! ## Concurrency
//!
//! There is no internal locking. A manager is a plain owned value mutated
//! through `&mut self`; kernels that share it wrap it in their own lock.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_memory_addresses::PageFrame;
//! use kernel_pmm::{BestFitManager, FrameAlloc, MemMap, Page, PageDirectory, PhysicalMemoryManager};
//!
//! let mut pages = [Page::reserved(); 64];
//! let base = PageFrame::new(0x100);
//! let mut pmm = BestFitManager::new(MemMap::new(base, &mut pages));
//! pmm.init_memmap(base, 64);
//! pmm.check().expect("allocator self-check");
//!
//! let block = pmm.alloc_pages(4).expect("4 free pages");
//! pmm.directory_mut().page_mut(block).get_ref();
//!
//! let frame = pmm.alloc_4k().expect("a free frame");
//! assert!(frame.is_page_aligned());
//! assert_eq!(pmm.nr_free_pages(), 59);
//! ```
//!
//! ## Validation
//!
//! Debug builds, and builds with the `validate` feature, re-check the list
//! structure after every mutating call and panic on corruption.
//! [`BestFitManager::validate`] runs the full check on demand.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod best_fit;
pub mod error;
pub mod free_list;
pub mod manager;
pub mod memmap;
pub mod page;

pub use best_fit::BestFitManager;
pub use error::{CheckError, FreeListError, PmmError};
pub use free_list::{FreeList, FreeRun};
pub use manager::{FrameAlloc, PhysicalMemoryManager};
pub use memmap::{MemMap, PageDirectory};
pub use page::{Page, PageFlags};
