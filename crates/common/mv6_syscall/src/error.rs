use strum::FromRepr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, thiserror::Error)]
#[repr(isize)]
pub enum SyscallError {
    // EPERM
    #[error("operation not permitted")]
    NotPermitted = 1,
    // ESRCH
    #[error("no such process")]
    ProcessNotFound = 3,
    // ECHILD
    #[error("no child process")]
    NoChildProcess = 10,
    // ENOMEM
    #[error("cannot allocate memory")]
    OutOfMemory = 12,
    // EACCESS
    #[error("permission denied")]
    PermissionDenied = 13,
    // EFAULT
    #[error("bad address")]
    BadAddress = 14,
    // EINVAL
    #[error("invalid argument")]
    InvalidInput = 22,
    #[error("unknown error")]
    Unknown = -1,
}
