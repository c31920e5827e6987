use kernel_memory_addresses::PageFrame;

/// Precondition violations on the page allocator's mapping and freeing paths.
///
/// The allocator treats these as fatal; the `try_` entry points surface them
/// instead so callers can decide how to die.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PmmError {
    #[error("page count must be non-zero")]
    ZeroLength,
    #[error("frame {frame} is outside the page directory")]
    OutOfRange { frame: PageFrame },
    #[error("frame {frame} is not reserved")]
    NotReserved { frame: PageFrame },
    #[error("frame {frame} is reserved")]
    Reserved { frame: PageFrame },
    #[error("frame {frame} is already free")]
    AlreadyFree { frame: PageFrame },
}

/// A broken free-list invariant, as reported by
/// [`FreeList::validate`](crate::free_list::FreeList::validate).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreeListError {
    #[error("run at {frame} is listed but not marked as a run head")]
    NotRunHead { frame: PageFrame },
    #[error("run at {frame} has zero length")]
    ZeroSizedRun { frame: PageFrame },
    #[error("run at {next} does not follow run at {prev} in address order")]
    Unordered { prev: PageFrame, next: PageFrame },
    #[error("run at {prev} overlaps run at {next}")]
    Overlapping { prev: PageFrame, next: PageFrame },
    #[error("runs at {prev} and {next} are adjacent and should have been merged")]
    Adjacent { prev: PageFrame, next: PageFrame },
    #[error("back link of run at {frame} is inconsistent")]
    BrokenLink { frame: PageFrame },
    #[error("free counter is {counted} but runs sum to {summed}")]
    CountMismatch { counted: u64, summed: u64 },
}

/// Failure of the allocator self-check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("allocation of {0} page(s) failed")]
    AllocationFailed(usize),
    #[error("allocated frame {0} is reserved or still marked as a run head")]
    BadPageState(PageFrame),
    #[error("allocator returned overlapping blocks at {0}")]
    Overlap(PageFrame),
    #[error("free page count is {actual}, expected {expected}")]
    FreeCount { expected: usize, actual: usize },
    #[error(transparent)]
    Invariant(#[from] FreeListError),
}
