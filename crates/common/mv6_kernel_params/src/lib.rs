#![no_std]

/// Maximum number of processes.
pub const NPROC: usize = 64;

/// Maximum number of CPUs.
pub const NCPU: usize = 8;

/// User stack pages
pub const USER_STACK_PAGES: usize = 2;

/// Highest static scheduling priority a process can be assigned.
pub const MAX_PRIORITY: u8 = 100;

/// Static priority given to every process at creation.
pub const DEFAULT_PRIORITY: u8 = 60;

/// Lottery tickets given to every process at creation.
pub const DEFAULT_TICKETS: u64 = 1;
