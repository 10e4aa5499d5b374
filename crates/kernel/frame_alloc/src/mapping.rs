use core::ptr::NonNull;

use bitflags::bitflags;

bitflags! {
    /// User mapping flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: usize {
        /// Valid Bit of the mapping.
        ///
        /// If set, a mapping for this virtual address exists.
        const V = 1 << 0;

        /// Read Bit of the mapping.
        ///
        /// If set, the CPU can read from this virtual address.
        const R = 1 << 1;

        /// Write Bit of the mapping.
        ///
        /// If set, the CPU can write to this virtual address.
        const W = 1 << 2;

        /// Executable Bit of the mapping.
        ///
        /// If set, the CPU can execute the instructions at this virtual address.
        const X = 1 << 3;

        /// UserMode Bit of the mapping.
        ///
        /// If set, userspace can access this virtual address.
        const U = 1 << 4;

        /// Global Mapping Bit of the mapping.
        ///
        /// If set, this virtual address exists in all address spaces.
        const G = 1 << 5;

        /// Access Bit of the mapping.
        ///
        /// If set, this virtual address has been accessed.
        const A = 1 << 6;

        /// Dirty Bit of the mapping.
        ///
        /// If set, this virtual address has been written.
        const D = 1 << 7;

        /// Copy-on-write Bit of the mapping.
        ///
        /// Held in the first software-reserved entry bit. If set, the
        /// frame is shared and write-protected; a write fault copies it.
        const COW = 1 << 8;

        const RW = Self::R.bits() | Self::W.bits();
        const RX = Self::R.bits() | Self::X.bits();
        const RWX = Self::R.bits() | Self::W.bits() | Self::X.bits();
        const UR = Self::U.bits() | Self::R.bits();
        const UW = Self::U.bits() | Self::W.bits();
        const URW = Self::U.bits() | Self::RW.bits();
        const URX = Self::U.bits() | Self::RX.bits();
        const URWX = Self::U.bits() | Self::RWX.bits();
    }
}

/// Snapshot of one live mapping: the backing frame and its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEntry {
    frame: NonNull<u8>,
    flags: MapFlags,
}

impl MappingEntry {
    #[must_use]
    pub fn new(frame: NonNull<u8>, flags: MapFlags) -> Self {
        Self { frame, flags }
    }

    /// Returns the physical frame backing the mapping.
    #[must_use]
    pub fn frame(&self) -> NonNull<u8> {
        self.frame
    }

    /// Returns the flags of the mapping.
    #[must_use]
    pub fn flags(&self) -> MapFlags {
        self.flags
    }
}

/// The address space ran out of memory for page-table nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("page-table allocation failed")]
pub struct MapError;

/// A user address space as seen by the frame subsystem.
///
/// Implementations map page-aligned virtual addresses to physical frames.
/// The write-fault resolver and the address-space helpers on
/// [`FrameManager`](crate::FrameManager) drive this trait; they pass
/// page-aligned `va` values below [`MAX_VA`](Self::MAX_VA) and frames of
/// the manager's page size.
///
/// # Safety
///
/// The fault and clone paths copy frame memory and adjust reference
/// counts based on what [`translate`](Self::translate) reports.
/// Implementations must report mappings truthfully: a returned entry
/// must name the frame that actually backs `va`, with its current
/// flags, and that frame must stay alive for as long as the mapping is
/// in place.
pub unsafe trait AddressSpace {
    /// One past the highest mappable virtual address.
    const MAX_VA: usize;

    /// Looks up the mapping covering `va`.
    ///
    /// Returns `None` when no valid mapping exists. Must not create
    /// page-table nodes on the way down.
    fn translate(&self, va: usize) -> Option<MappingEntry>;

    /// Removes `pages` consecutive mappings starting at `va`.
    ///
    /// When `free_frames` is set, implementations also release the backing
    /// frames. The fault and resize paths always pass `false` and manage
    /// frame lifetime through the allocator.
    fn unmap(&mut self, va: usize, pages: usize, free_frames: bool);

    /// Maps `pages` consecutive pages starting at `va` to the physically
    /// consecutive frames starting at `frame`.
    ///
    /// Implementations mark the installed mappings valid themselves;
    /// `flags` need not include [`MapFlags::V`]. Fails only when a
    /// page-table node cannot be allocated.
    fn install(
        &mut self,
        va: usize,
        pages: usize,
        frame: NonNull<u8>,
        flags: MapFlags,
    ) -> Result<(), MapError>;
}
