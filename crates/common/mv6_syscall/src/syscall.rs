use core::convert::Infallible;

use mv6_types::process::{Priority, ProcId};

use crate::{ProcTimes, Syscall, SyscallCode, UserMutRef, WaitTarget, error::SyscallError};

macro_rules! syscall {
    ($( $(#[$attr:meta])* struct $name:ident (fn($($arg:ty),* $(,)?) -> $ret:ty ) ;) *) => {
        $(
            $(#[$attr])*
            pub struct $name {}

            impl Syscall for $name {
                type Arg = ( $($arg ,)* );
                type Return = $ret;

                const CODE: SyscallCode = SyscallCode::$name;
            }
        )*
    };
}

syscall! {
    /// Creates a child process; the parent gets `Some(child)`, the child
    /// gets `None`.
    struct Fork(fn() -> Result<Option<ProcId>, SyscallError>);
    struct Exit(fn(i32) -> Infallible);
    struct Wait(fn(WaitTarget, UserMutRef<i32>) -> Result<ProcId, SyscallError>);
    struct Getpid(fn() -> ProcId);
    /// Grows (or shrinks) the process heap by the given signed amount of
    /// bytes and returns the heap size before the call.
    struct Sbrk(fn(isize) -> Result<usize, SyscallError>);
    /// Sleeps for the given number of clock ticks; fails if the process
    /// is killed while sleeping.
    struct Sleep(fn(u64) -> Result<(), SyscallError>);
    struct Kill(fn(ProcId) -> Result<(), SyscallError>);
    /// Clock ticks since boot.
    struct Uptime(fn() -> u64);
    /// Enables syscall tracing for this process; bit `i` of the mask
    /// selects the syscall with code `i`.
    struct Trace(fn(u64) -> ());
    /// Arms a CPU-time alarm: after every `ticks` ticks of CPU time the
    /// handler at the given user address is invoked. `(0, 0)` disarms.
    struct Sigalarm(fn(u64, usize) -> Result<(), SyscallError>);
    /// Returns from an alarm handler, restoring the interrupted user
    /// context; yields the restored `a0` so the interrupted computation
    /// resumes unchanged.
    struct Sigreturn(fn() -> usize);
    /// Sets this process's lottery ticket count; rejects non-positive
    /// counts.
    struct SetTickets(fn(i64) -> Result<(), SyscallError>);
    /// Sets the static scheduling priority of the given process and
    /// returns the previous one.
    struct SetPriority(fn(Priority, ProcId) -> Result<Priority, SyscallError>);
    /// `Wait`, additionally reporting the child's wait/run tick counts.
    struct WaitExtended(fn(WaitTarget, UserMutRef<i32>, UserMutRef<ProcTimes>) -> Result<ProcId, SyscallError>);
}
