//! Per-page metadata records.
//!
//! Every physical page the kernel knows about has one [`Page`] record in the
//! page directory. The allocator only cares about three things on it: whether
//! the page is reserved, whether it heads a free run (and how long that run
//! is), and its reference count. Run heads additionally carry the free-list
//! links (see [`RunLink`]).

use bitfield_struct::bitfield;
use kernel_memory_addresses::PageFrame;

/// Page state flags.
///
/// Layout (LSB→MSB):
/// - bit 0: reserved (firmware/kernel image, not manageable)
/// - bit 1: property (this page heads a free run of `Page::run_size` pages)
/// - bits 2..31: unused (must be zero)
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageFlags {
    #[bits(1)]
    pub reserved: bool,
    #[bits(1)]
    pub property: bool,
    #[bits(30)]
    __: u32,
}

/// Links between free-run heads, ordered by address.
///
/// Only meaningful while the owning page heads a free run; cleared otherwise.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RunLink {
    pub prev: Option<PageFrame>,
    pub next: Option<PageFrame>,
}

impl RunLink {
    pub const NONE: Self = Self {
        prev: None,
        next: None,
    };
}

/// Metadata record for one physical page.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Page {
    flags: PageFlags,
    ref_count: u32,
    /// Run length in pages; only meaningful when `flags.property()` is set.
    property: u64,
    link: RunLink,
}

impl Page {
    /// A page reserved at boot, not yet handed to the allocator.
    #[must_use]
    pub const fn reserved() -> Self {
        Self {
            flags: PageFlags::new().with_reserved(true),
            ref_count: 0,
            property: 0,
            link: RunLink::NONE,
        }
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> PageFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        self.flags.reserved()
    }

    #[inline]
    pub const fn set_reserved(&mut self, reserved: bool) {
        self.flags.set_reserved(reserved);
    }

    /// Whether this page heads a free run.
    #[inline]
    #[must_use]
    pub const fn is_run_head(&self) -> bool {
        self.flags.property()
    }

    #[inline]
    pub const fn set_run_head(&mut self, head: bool) {
        self.flags.set_property(head);
    }

    #[inline]
    #[must_use]
    pub const fn ref_count(&self) -> u32 {
        self.ref_count
    }

    #[inline]
    pub const fn set_ref_count(&mut self, count: u32) {
        self.ref_count = count;
    }

    /// Increment the reference count, returning the new value.
    #[inline]
    pub const fn get_ref(&mut self) -> u32 {
        self.ref_count += 1;
        self.ref_count
    }

    /// Decrement the reference count, returning the new value.
    ///
    /// # Panics
    /// Panics if the count is already zero.
    #[inline]
    pub fn put_ref(&mut self) -> u32 {
        assert!(self.ref_count > 0, "page reference count underflow");
        self.ref_count -= 1;
        self.ref_count
    }

    /// Run length in pages.
    #[inline]
    #[must_use]
    pub const fn run_size(&self) -> u64 {
        self.property
    }

    #[inline]
    pub const fn set_run_size(&mut self, pages: u64) {
        self.property = pages;
    }

    #[inline]
    #[must_use]
    pub const fn link(&self) -> RunLink {
        self.link
    }

    #[inline]
    pub const fn link_mut(&mut self) -> &mut RunLink {
        &mut self.link
    }

    /// Reset to a plain, unreferenced page that is neither reserved nor a run head.
    #[inline]
    pub const fn clear(&mut self) {
        self.flags = PageFlags::new();
        self.ref_count = 0;
        self.property = 0;
        self.link = RunLink::NONE;
    }
}
