use thiserror::Error;

/// Convenience result alias for codec operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while validating or decoding MCDI headers.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The command code cannot be addressed with the negotiated header version.
    #[error("command {cmd:#x} is not addressable with MCDI v{version}")]
    CommandOutOfRange {
        /// Rejected command code.
        cmd: u32,
        /// Header version the command was checked against.
        version: u8,
    },

    /// The payload exceeds the negotiated version's maximum SDU length.
    #[error("payload of {len} bytes exceeds the MCDI v{version} limit of {max} bytes")]
    PayloadTooLarge {
        /// Requested payload length.
        len: usize,
        /// Maximum payload length for `version`.
        max: usize,
        /// Header version the payload was checked against.
        version: u8,
    },

    /// Fewer bytes were available than the header layout requires.
    #[error("header truncated: needed {needed} bytes, got {got}")]
    Truncated {
        /// Bytes required by the layout.
        needed: usize,
        /// Bytes actually supplied.
        got: usize,
    },

    /// The device does not speak any supported MCDI version.
    #[error("MCDI v{0} is not supported")]
    UnsupportedVersion(u8),
}

impl WireError {
    /// Numeric errno equivalent used when the error crosses into the
    /// standard taxonomy.
    pub fn errno(&self) -> Errno {
        match self {
            WireError::CommandOutOfRange { .. } | WireError::UnsupportedVersion(_) => Errno::Inval,
            WireError::PayloadTooLarge { .. } => Errno::MsgSize,
            WireError::Truncated { .. } => Errno::Proto,
        }
    }
}

/// Standard error taxonomy returned to MCDI clients.
///
/// Raw values follow the Linux errno numbering so callers bridging into
/// kernel-style interfaces can forward them unchanged.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum Errno {
    /// Operation not permitted.
    #[error("operation not permitted")]
    Perm,
    /// No such entity.
    #[error("no such entity")]
    NoEnt,
    /// Interrupted, e.g. by an MC assertion.
    #[error("interrupted")]
    Intr,
    /// Input/output failure, e.g. an MC reboot.
    #[error("I/O error")]
    Io,
    /// Resource temporarily unavailable; retry.
    #[error("resource temporarily unavailable")]
    Again,
    /// Permission denied.
    #[error("permission denied")]
    Access,
    /// Device or resource busy.
    #[error("device or resource busy")]
    Busy,
    /// Invalid argument.
    #[error("invalid argument")]
    Inval,
    /// No space left.
    #[error("no space left")]
    NoSpc,
    /// Resource deadlock would occur.
    #[error("resource deadlock avoided")]
    Deadlock,
    /// Function not implemented.
    #[error("function not implemented")]
    NoSys,
    /// Timer expired on the controller side.
    #[error("timer expired")]
    Time,
    /// Protocol error.
    #[error("protocol error")]
    Proto,
    /// Message too long.
    #[error("message too long")]
    MsgSize,
    /// Address already in use.
    #[error("address already in use")]
    AddrInUse,
    /// No buffer space available.
    #[error("no buffer space available")]
    NoBufs,
    /// The host gave up waiting for a response.
    #[error("timed out")]
    TimedOut,
    /// Operation already in progress.
    #[error("operation already in progress")]
    Already,
}

impl Errno {
    /// Linux errno value for this error.
    pub const fn raw(self) -> i32 {
        match self {
            Errno::Perm => 1,
            Errno::NoEnt => 2,
            Errno::Intr => 4,
            Errno::Io => 5,
            Errno::Again => 11,
            Errno::Access => 13,
            Errno::Busy => 16,
            Errno::Inval => 22,
            Errno::NoSpc => 28,
            Errno::Deadlock => 35,
            Errno::NoSys => 38,
            Errno::Time => 62,
            Errno::Proto => 71,
            Errno::MsgSize => 90,
            Errno::AddrInUse => 98,
            Errno::NoBufs => 105,
            Errno::TimedOut => 110,
            Errno::Already => 114,
        }
    }

    /// Returns true for the failure class that indicates controller
    /// instability (reboot or assertion).
    pub const fn is_fatal(self) -> bool {
        matches!(self, Errno::Io | Errno::Intr)
    }
}
