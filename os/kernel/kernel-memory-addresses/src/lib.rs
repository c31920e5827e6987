//! # Physical Addresses and Page Frames
//!
//! Strongly typed wrappers for physical memory addresses and the page frame
//! numbers the physical page allocator hands out.
//!
//! ## Overview
//!
//! | Concept | Description |
//! |----------|-------------|
//! | [`PhysicalAddress`] | A raw 64-bit physical address (RAM or MMIO). |
//! | [`PageFrame`] | The index of a [`PAGE_SIZE`]-byte physical page (`address >> PAGE_SHIFT`). |
//!
//! Frames are what the allocator reasons about: they are ordered by address,
//! can be offset by a whole number of pages and the distance between two frames
//! is a page count. Conversions to and from [`PhysicalAddress`] are explicit.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0000_0000_8020_0042);
//! let frame = PageFrame::containing(pa);
//! assert_eq!(frame.as_u64(), 0x80200);
//!
//! // Three pages further up.
//! let next = frame + 3;
//! assert_eq!(next.base().as_u64(), 0x8020_3000);
//! assert_eq!(next.pages_since(frame), 3);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`, and
//!   `Hash`, so frames compare by physical address.
//! - Frame arithmetic is `const fn` where possible and zero-cost in release builds.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_frame;
mod physical_address;

pub use page_frame::PageFrame;
pub use physical_address::PhysicalAddress;

/// log2 of the page size.
pub const PAGE_SHIFT: u32 = 12;

/// Size of a single physical page in bytes (4 KiB).
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;
