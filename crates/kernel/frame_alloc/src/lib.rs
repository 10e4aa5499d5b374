//! Physical page frame management with copy-on-write sharing.
//!
//! Frames in a fixed physical range are handed out by [`FrameManager`],
//! which combines an index-based free list with per-frame reference
//! counts. A frame is returned to the free list only when its last
//! reference is released, so address spaces can share frames and defer
//! the copy until one of them actually writes.
//!
//! The manager is generic over [`mutex_api::Mutex`] so the same code runs
//! under a kernel spin lock or, in tests, `std::sync::Mutex`. Page-table
//! specifics stay behind the [`AddressSpace`] trait; the write-fault
//! resolver and the address-space helpers in this crate drive any
//! implementation of it.

#![cfg_attr(not(test), no_std)]

mod error;
mod free_list;
mod manager;
mod mapping;
mod ref_count;
mod vm;

pub use self::{
    error::FrameError,
    free_list::FrameFreeList,
    manager::FrameManager,
    mapping::{AddressSpace, MapError, MapFlags, MappingEntry},
    ref_count::RefCountTable,
};
