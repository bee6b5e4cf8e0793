//! Controller status vocabulary and its translation onto [`Errno`].
//!
//! The MC reports failures with a small fixed set of status words placed
//! directly after the response header. [`translate`] is total: anything the
//! table does not know becomes [`Errno::Proto`].

use crate::Errno;

/// Success.
pub const OK: u32 = 0;
/// Operation not permitted.
pub const EPERM: u32 = 1;
/// Entity not found.
pub const ENOENT: u32 = 2;
/// Interrupted.
pub const EINTR: u32 = 4;
/// Retry.
pub const EAGAIN: u32 = 11;
/// Access denied.
pub const EACCES: u32 = 13;
/// Busy.
pub const EBUSY: u32 = 16;
/// Invalid argument.
pub const EINVAL: u32 = 22;
/// Out of space.
pub const ENOSPC: u32 = 28;
/// Deadlock.
pub const EDEADLK: u32 = 35;
/// Not implemented.
pub const ENOSYS: u32 = 38;
/// Timed out on the controller.
pub const ETIME: u32 = 62;
/// Already done.
pub const EALREADY: u32 = 114;
/// MC-internal allocation failed.
pub const ALLOC_FAIL: u32 = 0x1000;
/// MAC address already exists.
pub const MAC_EXIST: u32 = 0x1001;

/// Maps a controller status word onto the client error taxonomy.
///
/// Returns `Ok(())` for [`OK`]. Safe to call from any context.
pub const fn translate(status: u32) -> Result<(), Errno> {
    let errno = match status {
        OK => return Ok(()),
        EPERM => Errno::Perm,
        ENOENT => Errno::NoEnt,
        EINTR => Errno::Intr,
        EAGAIN => Errno::Again,
        EACCES => Errno::Access,
        EBUSY => Errno::Busy,
        EINVAL => Errno::Inval,
        ENOSPC => Errno::NoSpc,
        EDEADLK => Errno::Deadlock,
        ENOSYS => Errno::NoSys,
        ETIME => Errno::Time,
        EALREADY => Errno::Already,
        ALLOC_FAIL => Errno::NoBufs,
        MAC_EXIST => Errno::AddrInUse,
        _ => Errno::Proto,
    };
    Err(errno)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_known_vocabulary() {
        let table = [
            (EPERM, Errno::Perm),
            (ENOENT, Errno::NoEnt),
            (EINTR, Errno::Intr),
            (EAGAIN, Errno::Again),
            (EACCES, Errno::Access),
            (EBUSY, Errno::Busy),
            (EINVAL, Errno::Inval),
            (EDEADLK, Errno::Deadlock),
            (ENOSYS, Errno::NoSys),
            (ETIME, Errno::Time),
            (EALREADY, Errno::Already),
            (ENOSPC, Errno::NoSpc),
            (ALLOC_FAIL, Errno::NoBufs),
            (MAC_EXIST, Errno::AddrInUse),
        ];
        for (status, expected) in table {
            assert_eq!(translate(status), Err(expected), "status {status:#x}");
        }
    }

    #[test]
    fn success_is_ok() {
        assert_eq!(translate(OK), Ok(()));
    }

    #[test]
    fn unknown_codes_become_protocol_errors() {
        for status in [3, 5, 0x0fff, 0x1002, u32::MAX] {
            assert_eq!(translate(status), Err(Errno::Proto), "status {status:#x}");
        }
    }

    #[test]
    fn translated_values_keep_linux_numbering() {
        for status in [EPERM, ENOENT, EINTR, EAGAIN, EACCES, EBUSY, EINVAL, ENOSPC] {
            let errno = translate(status).unwrap_err();
            assert_eq!(errno.raw() as u32, status);
        }
    }
}
