use mcdi_wire::{Errno, WireError};
use thiserror::Error;

/// Convenience result alias for engine operations.
pub type McdiResult<T> = Result<T, McdiError>;

/// Errors surfaced by the request/response engine.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum McdiError {
    /// The request could not be framed for the negotiated header version.
    #[error("request rejected: {0}")]
    Wire(#[from] WireError),

    /// The controller (or the engine on its behalf) reported a failure.
    #[error("MC request failed: {0}")]
    Errno(#[from] Errno),

    /// The device does not implement MCDI at all.
    #[error("device does not support MCDI")]
    Unsupported,

    /// Engine configuration rejected by the builder.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(&'static str),
}

impl McdiError {
    /// Collapses the error into the standard errno taxonomy.
    pub fn errno(&self) -> Errno {
        match self {
            McdiError::Wire(err) => err.errno(),
            McdiError::Errno(errno) => *errno,
            McdiError::Unsupported => Errno::NoSys,
            McdiError::InvalidConfig(_) => Errno::Inval,
        }
    }

    /// True when the host gave up waiting for the controller.
    pub fn is_timeout(&self) -> bool {
        matches!(self, McdiError::Errno(Errno::TimedOut))
    }

    /// True for reboot or assertion failures, after which the device
    /// owner is expected to reset the function.
    pub fn is_fatal(&self) -> bool {
        matches!(self, McdiError::Errno(errno) if errno.is_fatal())
    }
}
