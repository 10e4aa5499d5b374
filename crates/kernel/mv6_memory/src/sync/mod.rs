mod spin_lock;

pub use self::spin_lock::{RawSpinLock, SpinLock, SpinLockGuard};
