//! Address-space operations built on the frame allocator: write-fault
//! resolution for copy-on-write mappings, address-space duplication, and
//! heap resizing.

use mutex_api::Mutex;

use crate::{
    FrameError,
    free_list::FrameFreeList,
    manager::FrameManager,
    mapping::{AddressSpace, MapFlags},
    ref_count::RefCountTable,
};

impl<FreeListMutex, RefCountMutex, const PAGE_SIZE: usize, const CAPACITY: usize>
    FrameManager<FreeListMutex, RefCountMutex, PAGE_SIZE, CAPACITY>
where
    FreeListMutex: Mutex<Data = FrameFreeList<PAGE_SIZE, CAPACITY>>,
    RefCountMutex: Mutex<Data = RefCountTable<CAPACITY>>,
{
    /// Resolves a write fault at `va` caused by a copy-on-write mapping.
    ///
    /// The faulting page must be mapped, user-accessible, and marked
    /// [`MapFlags::COW`]; any other fault stays unresolved and the
    /// address space is left untouched, so the caller can kill the
    /// faulting process. On success the page is remapped writable, to a
    /// private copy of the frame when other owners remain.
    ///
    /// # Panics
    ///
    /// Panics if the resolved mapping cannot be reinstalled. The old
    /// mapping is already gone at that point.
    pub fn resolve_write_fault<A>(&self, space: &mut A, va: usize) -> Result<(), FrameError>
    where
        A: AddressSpace,
    {
        if va == 0 || va >= A::MAX_VA {
            return Err(FrameError::AddressOutOfRange(va));
        }
        let page = va & !(PAGE_SIZE - 1);

        let entry = space.translate(page).ok_or(FrameError::NotMapped(page))?;
        let flags = entry.flags();
        if !flags.contains(MapFlags::V | MapFlags::U) {
            return Err(FrameError::NotMapped(page));
        }
        if !flags.contains(MapFlags::COW) {
            return Err(FrameError::NotCopyOnWrite(page));
        }

        let frame = unsafe { self.unshare(entry.frame()) }?;
        let flags = (flags | MapFlags::W) & !MapFlags::COW;

        space.unmap(page, 1, false);
        if space.install(page, 1, frame, flags).is_err() {
            panic!("failed to reinstall resolved mapping at va {page:#x}");
        }
        Ok(())
    }

    /// Shares the first `size` bytes of `src` into `dst`.
    ///
    /// Every page becomes an additional reference to the frame already
    /// backing `src`. Writable mappings are downgraded to copy-on-write
    /// in both spaces, so the first write in either space faults and
    /// copies. Read-only mappings are shared unchanged.
    ///
    /// On failure the pages already shared into `dst` are unmapped and
    /// released again. Source mappings keep any copy-on-write downgrade;
    /// they resolve back to writable on the next write fault.
    ///
    /// # Panics
    ///
    /// Panics if a page below `size` is unmapped in `src` or if the
    /// source downgrade cannot be reinstalled.
    pub fn share_into<A>(&self, src: &mut A, dst: &mut A, size: usize) -> Result<(), FrameError>
    where
        A: AddressSpace,
    {
        for va in (0..size).step_by(PAGE_SIZE) {
            let Some(entry) = src.translate(va) else {
                panic!("unmapped page at va {va:#x}");
            };
            let flags = entry.flags();
            assert!(flags.contains(MapFlags::V), "invalid mapping at va {va:#x}");

            let shared = if flags.contains(MapFlags::W) {
                (flags | MapFlags::COW) & !MapFlags::W
            } else {
                flags
            };
            if shared != flags {
                // Downgrade the source first so neither space can write
                // the shared frame.
                src.unmap(va, 1, false);
                if src.install(va, 1, entry.frame(), shared).is_err() {
                    panic!("failed to downgrade mapping at va {va:#x}");
                }
            }

            if let Err(err) = dst.install(va, 1, entry.frame(), shared) {
                self.release_pages(dst, 0, va / PAGE_SIZE);
                return Err(err.into());
            }
            unsafe {
                self.add_reference(entry.frame());
            }
        }
        Ok(())
    }

    /// Grows an address space from `old_size` to `new_size` bytes by
    /// mapping zeroed frames with the given permissions.
    ///
    /// Returns the new size. On failure every page mapped by this call
    /// is released again and the space is back at `old_size`.
    pub fn grow_to<A>(
        &self,
        space: &mut A,
        old_size: usize,
        new_size: usize,
        perm: MapFlags,
    ) -> Result<usize, FrameError>
    where
        A: AddressSpace,
    {
        if new_size < old_size {
            return Ok(old_size);
        }
        if new_size > A::MAX_VA {
            return Err(FrameError::AddressOutOfRange(new_size));
        }

        let start = old_size.next_multiple_of(PAGE_SIZE);
        let mut va = start;
        while va < new_size {
            let frame = match self.alloc_zeroed() {
                Ok(frame) => frame,
                Err(err) => {
                    self.release_pages(space, start, (va - start) / PAGE_SIZE);
                    return Err(err);
                }
            };
            if let Err(err) = space.install(va, 1, frame, perm) {
                unsafe {
                    self.free(frame);
                }
                self.release_pages(space, start, (va - start) / PAGE_SIZE);
                return Err(err.into());
            }
            va += PAGE_SIZE;
        }
        Ok(new_size)
    }

    /// Shrinks an address space from `old_size` to `new_size` bytes and
    /// returns the new size.
    ///
    /// Frames of the released pages lose one reference each; a frame
    /// still shared with another space survives.
    pub fn shrink_to<A>(&self, space: &mut A, old_size: usize, new_size: usize) -> usize
    where
        A: AddressSpace,
    {
        if new_size >= old_size {
            return old_size;
        }

        let old_top = old_size.next_multiple_of(PAGE_SIZE);
        let new_top = new_size.next_multiple_of(PAGE_SIZE);
        if new_top < old_top {
            self.release_pages(space, new_top, (old_top - new_top) / PAGE_SIZE);
        }
        new_size
    }

    /// Grows or shrinks a heap of `size` bytes by `delta` bytes and
    /// returns the new size.
    ///
    /// New heap pages are mapped user-readable and writable. A `delta`
    /// that would shrink the heap below zero fails without changing
    /// anything.
    pub fn resize_by<A>(
        &self,
        space: &mut A,
        size: usize,
        delta: isize,
    ) -> Result<usize, FrameError>
    where
        A: AddressSpace,
    {
        let new_size = size
            .checked_add_signed(delta)
            .ok_or(FrameError::InvalidResize(size, delta))?;

        if new_size > size {
            self.grow_to(space, size, new_size, MapFlags::URW)
        } else {
            Ok(self.shrink_to(space, size, new_size))
        }
    }

    /// Unmaps `pages` consecutive pages starting at `va` and releases
    /// one reference to each backing frame.
    ///
    /// Frames outside the managed range are unmapped but not released,
    /// mirroring [`add_reference`](Self::add_reference).
    fn release_pages<A>(&self, space: &mut A, va: usize, pages: usize)
    where
        A: AddressSpace,
    {
        for page in 0..pages {
            let va = va + page * PAGE_SIZE;
            let Some(entry) = space.translate(va) else {
                panic!("no mapping at va {va:#x}");
            };
            space.unmap(va, 1, false);
            if self.contains(entry.frame()) {
                unsafe {
                    self.free(entry.frame());
                }
            }
        }
    }
}
