use core::{ops::Range, ptr::NonNull};

use mutex_api::Mutex;

use crate::{FrameError, free_list::FrameFreeList, ref_count::RefCountTable};

/// Byte written over a frame when it is handed to its first owner.
const ALLOC_FILL_BYTE: u8 = 5;
/// Byte written over a frame when its last reference is released.
const FREE_FILL_BYTE: u8 = 1;

/// Allocator for the physical frames of a fixed memory range, with
/// reference-counted sharing.
///
/// A [`FrameFreeList`] tracks which frames are available and a
/// [`RefCountTable`] tracks how many owners each allocated frame has.
/// Frames with more than one owner back copy-on-write mappings; a frame
/// returns to the free list only when its last reference is released.
///
/// Each container sits behind its own mutex. The count lock is the outer
/// lock: paths that need both take it first and acquire the free-list
/// lock while holding it, never the other way around. Allocation sets
/// the new frame's count under the count lock, so no frame is ever
/// visible with a stale count.
pub struct FrameManager<
    FreeListMutex,
    RefCountMutex,
    const PAGE_SIZE: usize,
    const CAPACITY: usize,
> where
    FreeListMutex: Mutex<Data = FrameFreeList<PAGE_SIZE, CAPACITY>>,
    RefCountMutex: Mutex<Data = RefCountTable<CAPACITY>>,
{
    /// The range of physical memory managed by the allocator.
    heap: Range<NonNull<u8>>,
    /// Free-frame list. Inner lock.
    free_list: FreeListMutex,
    /// Per-frame reference counts. Outer lock.
    counts: RefCountMutex,
}

impl<FreeListMutex, RefCountMutex, const PAGE_SIZE: usize, const CAPACITY: usize>
    FrameManager<FreeListMutex, RefCountMutex, PAGE_SIZE, CAPACITY>
where
    FreeListMutex: Mutex<Data = FrameFreeList<PAGE_SIZE, CAPACITY>>,
    RefCountMutex: Mutex<Data = RefCountTable<CAPACITY>>,
{
    /// Creates a new `FrameManager` over the given range of physical
    /// memory and puts every frame into circulation.
    ///
    /// Each frame is released through the ordinary free path, so the
    /// whole range starts free and poisoned.
    ///
    /// # Safety
    ///
    /// The given range of physical memory must be valid and not overlap
    /// with other memory regions.
    ///
    /// # Panics
    ///
    /// This function will panic if:
    ///
    /// - The start or end address of the heap is not page-aligned.
    /// - The range holds more than `CAPACITY` frames.
    #[must_use]
    pub unsafe fn new(heap: Range<NonNull<u8>>) -> Self {
        let this = Self {
            heap: heap.clone(),
            free_list: FreeListMutex::new(unsafe { FrameFreeList::new(heap.clone()) }),
            counts: RefCountMutex::new(RefCountTable::new()),
        };

        // Frames enter circulation through the ordinary free path: give
        // each one owner, then release that owner.
        let mut frame = heap.start;
        while frame < heap.end {
            this.counts.lock().set(this.index_of(frame), 1);
            unsafe {
                this.free(frame);
                frame = frame.byte_add(PAGE_SIZE);
            }
        }

        this
    }

    /// Returns the total number of frames managed by the allocator.
    ///
    /// This includes both allocated and free frames.
    #[must_use]
    pub fn total_frames(&self) -> usize {
        self.free_list.lock().total_frames()
    }

    /// Returns the number of frames currently available for allocation.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.free_list.lock().free_frames()
    }

    /// Checks if the given pointer names a frame managed by this
    /// allocator.
    ///
    /// The pointer must be page-aligned to be considered valid.
    #[must_use]
    pub fn contains(&self, frame: NonNull<u8>) -> bool {
        frame.addr().get() % PAGE_SIZE == 0 && self.heap.contains(&frame)
    }

    /// Returns the reference count of a managed frame, or `None` when
    /// the address does not name a managed frame.
    #[must_use]
    pub fn reference_count(&self, frame: NonNull<u8>) -> Option<u32> {
        self.contains(frame)
            .then(|| self.counts.lock().get(self.index_of(frame)))
    }

    /// Allocates a frame of physical memory for a single owner.
    ///
    /// The frame starts with a reference count of one and is filled with
    /// junk bytes.
    pub fn alloc(&self) -> Result<NonNull<u8>, FrameError> {
        let mut counts = self.counts.lock();
        self.alloc_with(&mut counts)
    }

    /// Allocates a frame of physical memory for a single owner and
    /// zeroes it.
    pub fn alloc_zeroed(&self) -> Result<NonNull<u8>, FrameError> {
        let frame = self.alloc()?;
        unsafe {
            frame.write_bytes(0, PAGE_SIZE);
        }
        Ok(frame)
    }

    /// Allocates while the caller already holds the count lock.
    fn alloc_with(
        &self,
        counts: &mut RefCountTable<CAPACITY>,
    ) -> Result<NonNull<u8>, FrameError> {
        let frame = self
            .free_list
            .lock()
            .alloc()
            .ok_or(FrameError::NoFreeFrame)?;
        // Fill with junk to catch reads of uninitialized memory.
        unsafe {
            frame.write_bytes(ALLOC_FILL_BYTE, PAGE_SIZE);
        }
        counts.set(self.index_of(frame), 1);
        Ok(frame)
    }

    /// Releases one reference to `frame`.
    ///
    /// When the last reference is gone, the frame is poisoned and
    /// returned to the free list.
    ///
    /// # Safety
    ///
    /// The caller must own one reference to `frame` and must not access
    /// the frame through that reference after the call.
    ///
    /// # Panics
    ///
    /// This function will panic if:
    ///
    /// - The frame does not name a frame of the managed heap range.
    /// - The frame has no outstanding references, which means a double
    ///   free.
    pub unsafe fn free(&self, frame: NonNull<u8>) {
        assert!(self.heap.contains(&frame));
        assert_eq!(frame.addr().get() % PAGE_SIZE, 0);

        let mut counts = self.counts.lock();
        if counts.decrement_and_fetch(self.index_of(frame)) > 0 {
            return;
        }

        // Fill with junk to catch dangling refs.
        unsafe {
            frame.write_bytes(FREE_FILL_BYTE, PAGE_SIZE);
            self.free_list.lock().free(frame);
        }
    }

    /// Adds one reference to an allocated frame.
    ///
    /// Addresses that do not name a managed frame are ignored, so
    /// callers can pass every physical address a cloned address space
    /// maps without filtering.
    ///
    /// # Safety
    ///
    /// If `frame` names a managed frame, it must have at least one
    /// outstanding reference.
    pub unsafe fn add_reference(&self, frame: NonNull<u8>) {
        if !self.contains(frame) {
            return;
        }
        self.counts.lock().increment(self.index_of(frame));
    }

    /// Turns one reference to a possibly shared frame into exclusive
    /// ownership of a frame holding the same bytes.
    ///
    /// With a single reference the frame itself is returned. Otherwise
    /// the caller's reference moves to a fresh copy and the remaining
    /// owners keep the original.
    ///
    /// Fails with [`FrameError::InvalidFrame`] when `frame` does not
    /// name a managed frame and [`FrameError::NoFreeFrame`] when no
    /// frame is available for the copy. The caller's reference is
    /// untouched on failure.
    ///
    /// # Safety
    ///
    /// The caller must own one reference to `frame`. On success that
    /// reference is gone and the caller owns the returned frame instead.
    pub unsafe fn unshare(&self, frame: NonNull<u8>) -> Result<NonNull<u8>, FrameError> {
        if !self.contains(frame) {
            return Err(FrameError::InvalidFrame(frame.addr().get()));
        }
        let index = self.index_of(frame);

        let mut counts = self.counts.lock();
        if counts.get(index) <= 1 {
            // Sole owner, write in place.
            return Ok(frame);
        }

        counts.decrement_and_fetch(index);
        let copy = match self.alloc_with(&mut counts) {
            Ok(copy) => copy,
            Err(err) => {
                // Put the caller's reference back.
                counts.increment(index);
                return Err(err);
            }
        };

        // Copy before the count lock drops. The remaining owners may
        // free the original the moment it is released.
        unsafe {
            copy.copy_from_nonoverlapping(frame, PAGE_SIZE);
        }
        Ok(copy)
    }

    /// Returns the frame index of an address known to lie in the
    /// managed range.
    fn index_of(&self, frame: NonNull<u8>) -> usize {
        debug_assert!(self.contains(frame));
        (frame.addr().get() - self.heap.start.addr().get()) / PAGE_SIZE
    }
}

unsafe impl<FreeListMutex, RefCountMutex, const PAGE_SIZE: usize, const CAPACITY: usize> Send
    for FrameManager<FreeListMutex, RefCountMutex, PAGE_SIZE, CAPACITY>
where
    FreeListMutex: Mutex<Data = FrameFreeList<PAGE_SIZE, CAPACITY>> + Send,
    RefCountMutex: Mutex<Data = RefCountTable<CAPACITY>> + Send,
{
}

unsafe impl<FreeListMutex, RefCountMutex, const PAGE_SIZE: usize, const CAPACITY: usize> Sync
    for FrameManager<FreeListMutex, RefCountMutex, PAGE_SIZE, CAPACITY>
where
    FreeListMutex: Mutex<Data = FrameFreeList<PAGE_SIZE, CAPACITY>> + Sync,
    RefCountMutex: Mutex<Data = RefCountTable<CAPACITY>> + Sync,
{
}

#[cfg(test)]
mod tests {
    use core::cell::UnsafeCell;
    use std::{collections::HashSet, sync::Mutex, thread};

    use super::*;

    const PAGE_SIZE: usize = 64;
    const CAPACITY: usize = 100;

    #[repr(align(64))]
    struct Heap(UnsafeCell<[u8; PAGE_SIZE * CAPACITY]>);
    unsafe impl Sync for Heap {}

    impl Heap {
        fn range(&self) -> Range<NonNull<u8>> {
            let heap_range = unsafe { (*self.0.get()).as_mut_ptr_range() };
            NonNull::new(heap_range.start).unwrap()..NonNull::new(heap_range.end).unwrap()
        }
    }

    type Manager = FrameManager<Mutex<FreeList>, Mutex<Counts>, PAGE_SIZE, CAPACITY>;
    type FreeList = FrameFreeList<PAGE_SIZE, CAPACITY>;
    type Counts = RefCountTable<CAPACITY>;

    /// Lets tests move frame pointers into worker threads.
    #[derive(Clone, Copy)]
    struct SendFrame(NonNull<u8>);
    unsafe impl Send for SendFrame {}

    fn frame_bytes(frame: NonNull<u8>) -> &'static [u8] {
        unsafe { core::slice::from_raw_parts(frame.as_ptr(), PAGE_SIZE) }
    }

    #[test]
    fn test_new_manager_starts_all_free_and_poisoned() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        assert_eq!(manager.total_frames(), 100);
        assert_eq!(manager.free_frames(), 100);
        let bytes = unsafe { &*heap.0.get() };
        assert!(bytes.iter().all(|&b| b == 1));
    }

    #[test]
    fn test_alloc_fills_junk_and_counts_one_owner() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let frame = manager.alloc().unwrap();
        assert_eq!(frame.addr().get() % PAGE_SIZE, 0);
        assert!(frame_bytes(frame).iter().all(|&b| b == 5));
        assert_eq!(manager.reference_count(frame), Some(1));
        assert_eq!(manager.free_frames(), 99);

        unsafe {
            manager.free(frame);
        }
        assert_eq!(manager.free_frames(), 100);
    }

    #[test]
    fn test_alloc_zeroed_fills_zero() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let frame = manager.alloc_zeroed().unwrap();
        assert!(frame_bytes(frame).iter().all(|&b| b == 0));
        unsafe {
            manager.free(frame);
        }
    }

    #[test]
    fn test_all_frames_are_unique_until_exhaustion() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let mut frames = vec![];
        let mut addrs = HashSet::new();

        // allocate all frames
        for _ in 0..100 {
            let frame = manager.alloc().unwrap();
            assert!(addrs.insert(frame.addr()), "frame is duplicated");
            frames.push(frame);
        }

        // fail to allocate one more frame
        assert_eq!(manager.alloc(), Err(FrameError::NoFreeFrame));
        assert_eq!(manager.free_frames(), 0);

        // free one frame and allocate it again
        let frame = frames.pop().unwrap();
        unsafe {
            manager.free(frame);
        }
        assert_eq!(manager.free_frames(), 1);
        frames.push(manager.alloc().unwrap());
        assert_eq!(manager.free_frames(), 0);

        for frame in frames {
            unsafe {
                manager.free(frame);
            }
        }
        assert_eq!(manager.free_frames(), 100);
    }

    #[test]
    fn test_three_frame_heap_accounting() {
        #[repr(align(64))]
        struct SmallHeap(UnsafeCell<[u8; PAGE_SIZE * 3]>);
        type SmallManager =
            FrameManager<Mutex<FrameFreeList<PAGE_SIZE, 3>>, Mutex<RefCountTable<3>>, PAGE_SIZE, 3>;

        let heap = SmallHeap(UnsafeCell::new([0; PAGE_SIZE * 3]));
        let range = unsafe { (*heap.0.get()).as_mut_ptr_range() };
        let range = NonNull::new(range.start).unwrap()..NonNull::new(range.end).unwrap();
        let manager = unsafe { SmallManager::new(range) };
        assert_eq!(manager.free_frames(), 3);

        let a = manager.alloc().unwrap();
        let b = manager.alloc().unwrap();
        let c = manager.alloc().unwrap();
        assert_eq!(manager.alloc(), Err(FrameError::NoFreeFrame));

        unsafe {
            manager.free(b);
        }
        assert_eq!(manager.free_frames(), 1);

        unsafe {
            manager.free(a);
            manager.free(c);
        }
        assert_eq!(manager.free_frames(), 3);
    }

    #[test]
    fn test_frame_is_poisoned_when_last_reference_goes() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let frame = manager.alloc().unwrap();
        let offset = frame.addr().get() - heap.range().start.addr().get();
        unsafe {
            frame.write_bytes(0xab, PAGE_SIZE);
            manager.free(frame);
        }

        let bytes = unsafe { &*heap.0.get() };
        assert!(bytes[offset..offset + PAGE_SIZE].iter().all(|&b| b == 1));
    }

    #[test]
    fn test_shared_frame_survives_all_but_last_free() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let frame = manager.alloc().unwrap();
        unsafe {
            manager.add_reference(frame);
            manager.add_reference(frame);
        }
        assert_eq!(manager.reference_count(frame), Some(3));

        unsafe {
            manager.free(frame);
        }
        assert_eq!(manager.reference_count(frame), Some(2));
        assert_eq!(manager.free_frames(), 99);

        unsafe {
            manager.free(frame);
            manager.free(frame);
        }
        assert_eq!(manager.free_frames(), 100);
    }

    #[test]
    fn test_add_reference_ignores_unmanaged_address() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let other = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        unsafe {
            manager.add_reference(other.range().start);
        }
        assert_eq!(manager.reference_count(other.range().start), None);
        assert_eq!(manager.free_frames(), 100);
    }

    #[test]
    fn test_unshare_sole_owner_keeps_frame() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let frame = manager.alloc().unwrap();
        let unshared = unsafe { manager.unshare(frame) }.unwrap();
        assert_eq!(unshared, frame);
        assert_eq!(manager.reference_count(frame), Some(1));
        assert_eq!(manager.free_frames(), 99);

        unsafe {
            manager.free(frame);
        }
    }

    #[test]
    fn test_unshare_copies_shared_frame() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let frame = manager.alloc().unwrap();
        unsafe {
            frame.write_bytes(0xc3, PAGE_SIZE);
            manager.add_reference(frame);
        }

        let copy = unsafe { manager.unshare(frame) }.unwrap();
        assert_ne!(copy, frame);
        assert!(frame_bytes(copy).iter().all(|&b| b == 0xc3));
        assert!(frame_bytes(frame).iter().all(|&b| b == 0xc3));
        assert_eq!(manager.reference_count(frame), Some(1));
        assert_eq!(manager.reference_count(copy), Some(1));

        unsafe {
            manager.free(frame);
            manager.free(copy);
        }
        assert_eq!(manager.free_frames(), 100);
    }

    #[test]
    fn test_unshare_without_free_frames_keeps_count() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let mut frames = vec![];
        for _ in 0..100 {
            frames.push(manager.alloc().unwrap());
        }
        let shared = frames[0];
        unsafe {
            manager.add_reference(shared);
        }

        let result = unsafe { manager.unshare(shared) };
        assert_eq!(result, Err(FrameError::NoFreeFrame));
        assert_eq!(manager.reference_count(shared), Some(2));

        unsafe {
            manager.free(shared);
        }
        for frame in frames {
            unsafe {
                manager.free(frame);
            }
        }
        assert_eq!(manager.free_frames(), 100);
    }

    #[test]
    fn test_unshare_rejects_unmanaged_address() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let other = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let foreign = other.range().start;
        let result = unsafe { manager.unshare(foreign) };
        assert_eq!(
            result,
            Err(FrameError::InvalidFrame(foreign.addr().get()))
        );
    }

    #[test]
    #[should_panic(expected = "frame already freed")]
    fn test_double_free_panics() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let frame = manager.alloc().unwrap();
        unsafe {
            manager.free(frame);
            manager.free(frame);
        }
    }

    #[test]
    #[should_panic]
    fn test_free_rejects_foreign_frame() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let other = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        unsafe {
            manager.free(other.range().start);
        }
    }

    #[test]
    #[should_panic]
    fn test_free_rejects_misaligned_frame() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let misaligned = unsafe { heap.range().start.byte_add(1) };
        unsafe {
            manager.free(misaligned);
        }
    }

    #[test]
    fn test_concurrent_allocs_return_unique_frames() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let frames = thread::scope(|s| {
            let handles = (0..4)
                .map(|_| {
                    let manager = &manager;
                    s.spawn(move || {
                        (0..25)
                            .map(|_| SendFrame(manager.alloc().unwrap()))
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        let addrs = frames.iter().map(|f| f.0.addr()).collect::<HashSet<_>>();
        assert_eq!(addrs.len(), 100);
        assert_eq!(manager.free_frames(), 0);

        for frame in frames {
            unsafe {
                manager.free(frame.0);
            }
        }
        assert_eq!(manager.free_frames(), 100);
    }

    #[test]
    fn test_concurrent_frees_return_shared_frame_once() {
        let heap = Heap(UnsafeCell::new([0; PAGE_SIZE * CAPACITY]));
        let manager = unsafe { Manager::new(heap.range()) };

        let frame = SendFrame(manager.alloc().unwrap());
        for _ in 0..3 {
            unsafe {
                manager.add_reference(frame.0);
            }
        }
        assert_eq!(manager.reference_count(frame.0), Some(4));

        thread::scope(|s| {
            for _ in 0..4 {
                let manager = &manager;
                s.spawn(move || {
                    // Capture the whole `SendFrame`, not merely `frame.0`,
                    // so the closure stays `Send`.
                    let frame = frame;
                    unsafe {
                        manager.free(frame.0);
                    }
                });
            }
        });

        assert_eq!(manager.reference_count(frame.0), Some(0));
        assert_eq!(manager.free_frames(), 100);
    }
}
