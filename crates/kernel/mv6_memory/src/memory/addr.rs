use core::{fmt, ptr};

use super::{PAGE_SHIFT, PAGE_SIZE};
use crate::error::KernelError;

const fn page_roundup(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

const fn page_rounddown(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

const fn is_page_aligned(addr: usize) -> bool {
    addr % PAGE_SIZE == 0
}

pub trait PageRound {
    fn as_addr(&self) -> usize;
    fn from_addr(addr: usize) -> Self;

    fn page_roundup(&self) -> Self
    where
        Self: Sized,
    {
        Self::from_addr(page_roundup(self.as_addr()))
    }

    fn page_rounddown(&self) -> Self
    where
        Self: Sized,
    {
        Self::from_addr(page_rounddown(self.as_addr()))
    }

    fn is_page_aligned(&self) -> bool {
        is_page_aligned(self.as_addr())
    }
}

impl PageRound for usize {
    fn as_addr(&self) -> usize {
        *self
    }

    fn from_addr(addr: usize) -> Self {
        addr
    }
}

impl PageRound for VirtAddr {
    fn as_addr(&self) -> usize {
        self.0
    }

    fn from_addr(addr: usize) -> Self {
        Self::new(addr).unwrap()
    }
}

struct Hex(usize);
impl fmt::Debug for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

macro_rules! impl_fmt {
    ($ty:ident) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.debug_tuple(stringify!($ty)).field(&Hex(self.0)).finish()
            }
        }
        impl fmt::LowerHex for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }
        impl fmt::UpperHex for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::UpperHex::fmt(&self.0, f)
            }
        }
        impl fmt::Pointer for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                let ptr = ptr::without_provenance::<u8>(self.0);
                fmt::Pointer::fmt(&ptr, f)
            }
        }
    };
}

/// Virtual address
///
/// The RISC-V Sv39 schema has three levels of page-table
/// pages. A page-table page contains 512 64-bit PTEs.
/// A 64-bit virtual address is split into five fields:
/// ```text
///     39..=63 -- must be zero.
///     30..=38 -- 9 bits of level-2 index.
///     21..=29 -- 9 bits of level-1 index.
///     12..=20 -- 9 bits of level-0 index.
///      0..=11 -- 12 bits byte offset with the page.
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtAddr(usize);
impl_fmt!(VirtAddr);

impl VirtAddr {
    /// One beyond the highest possible virtual address.
    ///
    /// [`VirtAddr::MAX`] is actually one bit less than the max allowed by
    /// Sv39, to avoid having to sign-extend virtual addresses
    /// that have the high bit set.
    pub const MAX: Self = Self(1 << (9 * 3 + PAGE_SHIFT - 1));
    pub const ZERO: Self = Self(0);

    pub const fn new(addr: usize) -> Result<Self, KernelError> {
        if addr > Self::MAX.0 {
            return Err(KernelError::TooLargeVirtualAddress(addr));
        }
        Ok(Self(addr))
    }

    pub const fn addr(self) -> usize {
        self.0
    }

    pub const fn byte_add(self, offset: usize) -> Result<Self, KernelError> {
        let Some(addr) = self.0.checked_add(offset) else {
            return Err(KernelError::TooLargeVirtualAddress(usize::MAX));
        };
        Self::new(addr)
    }
}
