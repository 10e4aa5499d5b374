use crate::mapping::MapError;

/// Failures surfaced by frame allocation and fault resolution.
///
/// Invariant violations (double free, foreign pointer handed to `free`)
/// are not represented here; those panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The free list is empty.
    #[error("out of free frames")]
    NoFreeFrame,
    /// The address does not name a frame in the managed range.
    #[error("address {0:#x} is not a managed frame")]
    InvalidFrame(usize),
    /// The virtual address cannot be mapped at all.
    #[error("address {0:#x} out of mappable range")]
    AddressOutOfRange(usize),
    /// No live user mapping covers the faulting address.
    #[error("no user mapping at {0:#x}")]
    NotMapped(usize),
    /// The mapping exists but is not marked copy-on-write.
    #[error("mapping at {0:#x} is not copy-on-write")]
    NotCopyOnWrite(usize),
    /// The requested size change is impossible.
    #[error("heap of {0} bytes cannot change by {1} bytes")]
    InvalidResize(usize, isize),
    /// The address space could not install a mapping.
    #[error(transparent)]
    Map(#[from] MapError),
}
