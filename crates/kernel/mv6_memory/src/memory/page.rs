//! Physical memory allocator, for user processes,
//! kernel stacks, page-table pages,
//! and pipe buffers.
//!
//! Allocates whole 4096-byte pages.

use core::{ops::Range, ptr::NonNull};

use frame_alloc::{FrameFreeList, FrameManager, RefCountTable};
use mv6_syscall::MemoryInfo;
use once_init::OnceInit;

use super::{PAGE_SIZE, PageRound as _, layout::MAX_PHYS_FRAMES};
use crate::{error::KernelError, sync::SpinLock};

/// Frame manager instantiated with the kernel's page geometry and locks.
pub type KernelFrameManager = FrameManager<
    SpinLock<FrameFreeList<PAGE_SIZE, MAX_PHYS_FRAMES>>,
    SpinLock<RefCountTable<MAX_PHYS_FRAMES>>,
    PAGE_SIZE,
    MAX_PHYS_FRAMES,
>;

static FRAME_MANAGER: OnceInit<KernelFrameManager> = OnceInit::new();

/// Hands the boot-time page allocation area to the allocator.
///
/// The range is rounded inward to page boundaries.
///
/// # Safety
///
/// The caller must ensure that:
///
/// - The memory in `heap` is unused by the rest of the kernel.
/// - The memory in `heap` stays reserved for the allocator for the rest
///   of the kernel's lifetime.
///
/// # Panics
///
/// Panics if called more than once.
pub unsafe fn init(heap: Range<NonNull<u8>>) {
    let start = heap.start.map_addr(|a| a.get().page_roundup().try_into().unwrap());
    let end = heap.end.map_addr(|a| a.get().page_rounddown().try_into().unwrap());

    FRAME_MANAGER.init(unsafe { KernelFrameManager::new(start..end) });
}

pub(crate) fn manager() -> &'static KernelFrameManager {
    FRAME_MANAGER.get()
}

/// Allocates one 4096-byte page of physical memory.
///
/// Returns a pointer that the kernel can use.
/// The page is filled with junk to catch reads of uninitialized memory.
pub fn alloc_page() -> Result<NonNull<u8>, KernelError> {
    Ok(manager().alloc()?)
}

/// Allocates one 4096-byte zeroed page of physical memory.
pub fn alloc_zeroed_page() -> Result<NonNull<u8>, KernelError> {
    Ok(manager().alloc_zeroed()?)
}

/// Drops one reference to the page of physical memory pointed at by
/// `pa`, which normally should have been returned by a call to
/// [`alloc_page`].
///
/// The page returns to the free list when the last reference goes.
///
/// # Safety
///
/// The caller must ensure that:
///
/// - The page was previously allocated by [`alloc_page`] or
///   [`alloc_zeroed_page`].
/// - The page is not accessed through this reference after being freed.
/// - Each reference is freed at most once.
pub unsafe fn free_page(pa: NonNull<u8>) {
    unsafe { manager().free(pa) }
}

/// Adds a reference to the page of physical memory pointed at by `pa`.
///
/// Addresses outside the allocation area are ignored.
///
/// # Safety
///
/// The caller must already hold a reference to the page.
pub unsafe fn add_page_ref(pa: NonNull<u8>) {
    unsafe { manager().add_reference(pa) }
}

/// Retrieves memory information, including the number of free and total
/// pages.
#[must_use]
pub fn info() -> MemoryInfo {
    let manager = manager();
    MemoryInfo {
        free_pages: manager.free_frames(),
        total_pages: manager.total_frames(),
        page_size: PAGE_SIZE,
    }
}

#[cfg(test)]
pub(crate) const TEST_HEAP_FRAMES: usize = 64;

/// Initializes the global allocator with a leaked, page-aligned heap.
///
/// All tests in this crate share the one allocator instance, so each
/// test must restrict its assertions to pages it holds itself.
#[cfg(test)]
pub(crate) fn ensure_test_heap() {
    use std::{alloc, sync::Once};

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let layout =
            alloc::Layout::from_size_align(TEST_HEAP_FRAMES * PAGE_SIZE, PAGE_SIZE).unwrap();
        let start = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).unwrap();
        let end = unsafe { start.byte_add(TEST_HEAP_FRAMES * PAGE_SIZE) };
        unsafe { init(start..end) }
    });
}
