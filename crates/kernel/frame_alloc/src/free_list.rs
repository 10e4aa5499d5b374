use core::{ops::Range, ptr::NonNull};

use arrayvec::ArrayVec;

/// A free list of physical page frames, tracked by frame index.
///
/// The list manages a fixed range of physical memory and records which of
/// its frames are free as indices into that range. Frame memory itself is
/// never read or written here, so frames can be poisoned or shared while
/// they sit on the list.
///
/// A new list starts with every frame unavailable. Frames become
/// allocatable through [`free`](Self::free), which is how the owner puts
/// the whole range into circulation at startup.
#[derive(Debug)]
pub struct FrameFreeList<const PAGE_SIZE: usize, const CAPACITY: usize> {
    /// The range of physical memory managed by the free list.
    heap: Range<NonNull<u8>>,
    /// Indices of free frames. The most recently freed frame is allocated
    /// first.
    free: ArrayVec<usize, CAPACITY>,
    /// The total number of frames in the managed range.
    total_frames: usize,
}

impl<const PAGE_SIZE: usize, const CAPACITY: usize> FrameFreeList<PAGE_SIZE, CAPACITY> {
    /// Creates a new `FrameFreeList` that manages the given range of
    /// physical memory.
    ///
    /// The given range of physical memory must be page-aligned.
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
        const {
            assert!(PAGE_SIZE.is_power_of_two());
        }

        assert_eq!(heap.start.addr().get() % PAGE_SIZE, 0);
        assert_eq!(heap.end.addr().get() % PAGE_SIZE, 0);

        let total_frames = (heap.end.addr().get() - heap.start.addr().get()) / PAGE_SIZE;
        assert!(total_frames <= CAPACITY);

        Self {
            heap,
            free: ArrayVec::new(),
            total_frames,
        }
    }

    /// Returns the total number of frames managed by the free list.
    ///
    /// This includes both allocated and free frames.
    #[must_use]
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Returns the number of frames currently available for allocation.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.free.len()
    }

    /// Checks if the given pointer names a frame managed by this list.
    ///
    /// The pointer must be page-aligned to be considered valid.
    #[must_use]
    pub fn contains(&self, frame: NonNull<u8>) -> bool {
        frame.addr().get() % PAGE_SIZE == 0 && self.heap.contains(&frame)
    }

    /// Allocates a frame of physical memory.
    ///
    /// Returns `Some` with a pointer to the allocated frame, or `None` if
    /// no frames are available.
    pub fn alloc(&mut self) -> Option<NonNull<u8>> {
        let index = self.free.pop()?;
        Some(self.frame_at(index))
    }

    /// Frees a frame of physical memory.
    ///
    /// # Safety
    ///
    /// The given frame must belong to the range managed by this list and
    /// must not already be on the list.
    ///
    /// # Panics
    ///
    /// This function will panic if:
    ///
    /// - The given frame is not within the managed heap range.
    /// - The given frame is not page-aligned.
    pub unsafe fn free(&mut self, frame: NonNull<u8>) {
        assert!(self.heap.contains(&frame));
        assert_eq!(frame.addr().get() % PAGE_SIZE, 0);

        self.free.push(self.index_of(frame));
    }

    /// Returns the index of a frame known to lie in the managed range.
    fn index_of(&self, frame: NonNull<u8>) -> usize {
        (frame.addr().get() - self.heap.start.addr().get()) / PAGE_SIZE
    }

    /// Returns the frame at the given index.
    fn frame_at(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.total_frames);
        unsafe { self.heap.start.byte_add(index * PAGE_SIZE) }
    }
}

unsafe impl<const PAGE_SIZE: usize, const CAPACITY: usize> Send
    for FrameFreeList<PAGE_SIZE, CAPACITY>
{
}
