//! A minimal lock abstraction.
//!
//! Kernel code that needs a lock but must not care which one (a spin lock
//! on the metal, [`std::sync::Mutex`] in host tests) is written against
//! the [`Mutex`] trait and picks the implementation at the type level.
#![cfg_attr(any(not(feature = "std"), target_os = "none"), no_std)]

use core::ops::DerefMut;

/// A mutual-exclusion primitive protecting a value of type `Data`.
pub trait Mutex {
    /// The type of the data that the mutex protects.
    type Data;

    /// The type of the guard that the `lock` method returns.
    type Guard<'a>: DerefMut<Target = Self::Data>
    where
        Self: 'a;

    /// Creates a new mutex.
    fn new(data: Self::Data) -> Self;

    /// Locks the mutex, blocking until it is acquired.
    fn lock(&self) -> Self::Guard<'_>;
}

/// Host-side implementation for tests.
///
/// Panics if the mutex is poisoned.
#[cfg(all(feature = "std", not(target_os = "none")))]
impl<T> Mutex for std::sync::Mutex<T> {
    type Data = T;
    type Guard<'a>
        = std::sync::MutexGuard<'a, T>
    where
        T: 'a;

    fn new(data: Self::Data) -> Self {
        Self::new(data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.lock().unwrap()
    }
}
