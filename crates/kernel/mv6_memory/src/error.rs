use frame_alloc::FrameError;
use mv6_syscall::error::SyscallError;

/// Kernel-internal errors of the memory subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error("no free page")]
    NoFreePage,
    #[error("too large virtual address: {0:#x}")]
    TooLargeVirtualAddress(usize),
    #[error("address out of mappable range: {0:#x}")]
    AddressOutOfRange(usize),
    #[error("address is not mapped: {0:#x}")]
    AddressNotMapped(usize),
    #[error("mapping is not copy-on-write: {0:#x}")]
    NotCopyOnWrite(usize),
    #[error("address is not a managed page: {0:#x}")]
    InvalidPageAddress(usize),
    #[error("invalid heap resize")]
    InvalidResize,
}

impl From<FrameError> for KernelError {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::NoFreeFrame | FrameError::Map(_) => Self::NoFreePage,
            FrameError::InvalidFrame(addr) => Self::InvalidPageAddress(addr),
            FrameError::AddressOutOfRange(addr) => Self::AddressOutOfRange(addr),
            FrameError::NotMapped(addr) => Self::AddressNotMapped(addr),
            FrameError::NotCopyOnWrite(addr) => Self::NotCopyOnWrite(addr),
            FrameError::InvalidResize(..) => Self::InvalidResize,
        }
    }
}

impl From<KernelError> for SyscallError {
    fn from(error: KernelError) -> Self {
        match error {
            KernelError::NoFreePage => Self::OutOfMemory,
            KernelError::TooLargeVirtualAddress(_)
            | KernelError::AddressOutOfRange(_)
            | KernelError::AddressNotMapped(_)
            | KernelError::NotCopyOnWrite(_)
            | KernelError::InvalidPageAddress(_) => Self::BadAddress,
            KernelError::InvalidResize => Self::InvalidInput,
        }
    }
}
