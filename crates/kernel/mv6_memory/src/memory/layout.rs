//! Physical memory layout
//!
//! the kernel uses physical memory thus:
//!
//! ```text
//! 0x8000_0000 -- KERNEL_BASE. start of kernel text
//! KERNEL_END  -- start of kernel page allocation area
//! PHYS_TOP    -- end RAM used by the kernel
//! ```
//!
//! `KERNEL_END` is known only to the boot code, which hands the
//! `KERNEL_END..PHYS_TOP` region to [`page::init`].
//!
//! [`page::init`]: super::page::init

use super::PAGE_SIZE;

/// Start of RAM. The boot ROM jumps here in machine mode.
pub const KERNEL_BASE: usize = 0x8000_0000;

/// End of RAM used by the kernel.
pub const PHYS_TOP: usize = KERNEL_BASE + 128 * 1024 * 1024;

/// Upper bound on the number of page frames the allocator can manage.
pub const MAX_PHYS_FRAMES: usize = (PHYS_TOP - KERNEL_BASE) / PAGE_SIZE;
