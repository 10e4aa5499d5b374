/// Reference counts for the frames of a managed physical range, indexed
/// by frame index.
///
/// The table is plain data with no interior synchronization; the owner
/// wraps it in a mutex and holds the lock across any decide-then-act
/// sequence, such as inspecting a count before copying a shared frame.
///
/// Counts mean:
///
/// - `0`: the frame is free (or still outside circulation at startup).
/// - `1`: exactly one owner; writes need no copy.
/// - `n > 1`: shared by `n` owners; a write must copy first.
#[derive(Debug)]
pub struct RefCountTable<const CAPACITY: usize> {
    counts: [u32; CAPACITY],
}

impl<const CAPACITY: usize> RefCountTable<CAPACITY> {
    /// Creates a table with every count zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: [0; CAPACITY],
        }
    }

    /// Returns the reference count of the frame at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> u32 {
        self.counts[index]
    }

    /// Sets the reference count of the frame at `index` outright.
    ///
    /// Used when a frame leaves the free list for its first owner.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn set(&mut self, index: usize, count: u32) {
        self.counts[index] = count;
    }

    /// Adds one reference to the frame at `index` and returns the
    /// previous count.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the count would overflow.
    pub fn increment(&mut self, index: usize) -> u32 {
        let count = &mut self.counts[index];
        let prev = *count;
        assert_ne!(prev, u32::MAX, "reference count overflow");
        *count = prev + 1;
        prev
    }

    /// Drops one reference from the frame at `index` and returns the
    /// remaining count.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the count is already zero,
    /// which means a double free.
    pub fn decrement_and_fetch(&mut self, index: usize) -> u32 {
        let count = &mut self.counts[index];
        assert!(*count > 0, "frame already freed");
        *count -= 1;
        *count
    }
}

impl<const CAPACITY: usize> Default for RefCountTable<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
