use mv6_syscall::MemoryInfo;

pub use self::addr::{PageRound, VirtAddr};

/// Bytes per page
pub const PAGE_SIZE: usize = 4096;

/// Bits of offset within a page
pub const PAGE_SHIFT: usize = 12;

pub mod addr;
pub mod layout;
pub mod page;
pub mod vm_user;

#[must_use]
pub fn info() -> MemoryInfo {
    page::info()
}
