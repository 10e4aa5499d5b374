//! User address-space operations: write-fault resolution, fork-style
//! sharing, and heap resizing.

use frame_alloc::{AddressSpace, MapFlags};

use super::{VirtAddr, page};
use crate::error::KernelError;

/// Resolves a store page fault at `va`.
///
/// When `va` lies in a user copy-on-write mapping, the backing page is
/// unshared and remapped writable, and the faulting instruction can be
/// retried. Any other fault address is an error; the caller kills the
/// process.
pub fn handle_page_fault<A>(space: &mut A, va: VirtAddr) -> Result<(), KernelError>
where
    A: AddressSpace,
{
    page::manager().resolve_write_fault(space, va.addr())?;
    Ok(())
}

/// Shares the first `size` bytes of `src` into `dst`, as fork does.
///
/// Writable pages become copy-on-write in both spaces; the first write
/// to either side is resolved by [`handle_page_fault`].
pub fn clone_shared<A>(src: &mut A, dst: &mut A, size: usize) -> Result<(), KernelError>
where
    A: AddressSpace,
{
    page::manager().share_into(src, dst, size)?;
    Ok(())
}

/// Allocates physical memory to grow a process from `old_size` to
/// `new_size`, which need not be page aligned.
///
/// New pages are zeroed and mapped with `perm`. Returns the new size.
pub fn grow_to<A>(
    space: &mut A,
    old_size: usize,
    new_size: usize,
    perm: MapFlags,
) -> Result<usize, KernelError>
where
    A: AddressSpace,
{
    Ok(page::manager().grow_to(space, old_size, new_size, perm)?)
}

/// Deallocates user pages to bring the process size to `new_size`.
///
/// `new_size` need not be page-aligned.
/// `new_size` need not to be less than current size.
/// Returns the new size.
pub fn shrink_to<A>(space: &mut A, old_size: usize, new_size: usize) -> usize
where
    A: AddressSpace,
{
    page::manager().shrink_to(space, old_size, new_size)
}

/// Grows or shrinks a process heap of `size` bytes by `delta` bytes, as
/// sbrk does.
///
/// Returns the new size.
pub fn resize_by<A>(space: &mut A, size: usize, delta: isize) -> Result<usize, KernelError>
where
    A: AddressSpace,
{
    Ok(page::manager().resize_by(space, size, delta)?)
}

#[cfg(test)]
mod tests {
    use core::ptr::NonNull;
    use std::collections::BTreeMap;

    use frame_alloc::{MapError, MappingEntry};

    use super::*;
    use crate::memory::{PAGE_SIZE, page::ensure_test_heap};

    #[derive(Default)]
    struct TestSpace {
        pages: BTreeMap<usize, MappingEntry>,
    }

    unsafe impl AddressSpace for TestSpace {
        const MAX_VA: usize = VirtAddr::MAX.addr();

        fn translate(&self, va: usize) -> Option<MappingEntry> {
            self.pages.get(&(va & !(PAGE_SIZE - 1))).copied()
        }

        fn unmap(&mut self, va: usize, pages: usize, free_frames: bool) {
            assert!(!free_frames);
            for i in 0..pages {
                self.pages.remove(&(va + i * PAGE_SIZE));
            }
        }

        fn install(
            &mut self,
            va: usize,
            pages: usize,
            frame: NonNull<u8>,
            flags: MapFlags,
        ) -> Result<(), MapError> {
            for i in 0..pages {
                let frame = unsafe { frame.byte_add(i * PAGE_SIZE) };
                let entry = MappingEntry::new(frame, flags | MapFlags::V);
                self.pages.insert(va + i * PAGE_SIZE, entry);
            }
            Ok(())
        }
    }

    #[test]
    fn test_fault_resolves_cloned_writable_page() {
        ensure_test_heap();

        let mut parent = TestSpace::default();
        let mut child = TestSpace::default();
        let size = grow_to(&mut parent, 0, 2 * PAGE_SIZE, MapFlags::URW).unwrap();
        let parent_frame = parent.translate(0).unwrap().frame();
        unsafe { parent_frame.write(0x5a) }

        clone_shared(&mut parent, &mut child, size).unwrap();
        let entry = child.translate(0).unwrap();
        assert!(entry.flags().contains(MapFlags::COW));
        assert!(!entry.flags().contains(MapFlags::W));

        handle_page_fault(&mut child, VirtAddr::new(5).unwrap()).unwrap();
        let entry = child.translate(0).unwrap();
        assert!(entry.flags().contains(MapFlags::W));
        assert!(!entry.flags().contains(MapFlags::COW));
        assert_ne!(entry.frame(), parent_frame);
        assert_eq!(unsafe { entry.frame().read() }, 0x5a);
        assert!(parent.translate(0).unwrap().flags().contains(MapFlags::COW));

        shrink_to(&mut child, size, 0);
        shrink_to(&mut parent, size, 0);
    }

    #[test]
    fn test_fault_rejects_unresolvable_addresses() {
        ensure_test_heap();

        let mut space = TestSpace::default();
        let size = grow_to(&mut space, 0, PAGE_SIZE, MapFlags::URW).unwrap();

        assert_eq!(
            handle_page_fault(&mut space, VirtAddr::ZERO),
            Err(KernelError::AddressOutOfRange(0)),
        );
        assert_eq!(
            handle_page_fault(&mut space, VirtAddr::MAX),
            Err(KernelError::AddressOutOfRange(VirtAddr::MAX.addr())),
        );
        assert_eq!(
            handle_page_fault(&mut space, VirtAddr::new(7).unwrap()),
            Err(KernelError::NotCopyOnWrite(0)),
        );
        assert_eq!(
            handle_page_fault(&mut space, VirtAddr::new(PAGE_SIZE).unwrap()),
            Err(KernelError::AddressNotMapped(PAGE_SIZE)),
        );

        shrink_to(&mut space, size, 0);
    }

    #[test]
    fn test_resize_by_round_trips_the_heap() {
        ensure_test_heap();

        let mut space = TestSpace::default();
        let size = resize_by(&mut space, 0, (2 * PAGE_SIZE).cast_signed()).unwrap();
        assert_eq!(size, 2 * PAGE_SIZE);
        let frame = space.translate(PAGE_SIZE).unwrap().frame();
        assert_eq!(unsafe { frame.read() }, 0);

        let size = resize_by(&mut space, size, -PAGE_SIZE.cast_signed()).unwrap();
        assert_eq!(size, PAGE_SIZE);
        assert!(space.translate(PAGE_SIZE).is_none());
        assert!(space.translate(0).is_some());

        assert_eq!(
            resize_by(&mut space, size, -(2 * PAGE_SIZE).cast_signed()),
            Err(KernelError::InvalidResize),
        );

        shrink_to(&mut space, size, 0);
    }
}
