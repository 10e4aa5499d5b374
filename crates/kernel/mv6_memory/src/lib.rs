//! Memory management core of the mv6 kernel.
//!
//! This crate dresses the generic [`frame_alloc`] subsystem in kernel
//! types: the frame manager instantiated with spin locks, held in a
//! process-wide static, and wrapped in the page, fault, and heap
//! operations the rest of the kernel calls.

#![cfg_attr(not(test), no_std)]

pub mod error;
pub mod memory;
pub mod sync;
