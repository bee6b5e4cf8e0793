#![deny(missing_docs)]
//! Wire-level primitives for the MCDI (Management Controller to Driver
//! Interface) protocol.
//!
//! This crate is purely a codec: it has no notion of in-flight requests,
//! timeouts or delivery modes. It exposes:
//! * [`RequestHeader`] / [`EncodedHeader`] – outgoing command headers in the
//!   4-byte (v1) and 8-byte (v2) layouts.
//! * [`ResponseHeader`] – response header decoding that resolves the header
//!   length before any status word is located.
//! * [`translate`] – the controller status vocabulary mapped onto [`Errno`].
//! * [`McdiEvent`] – decoding of asynchronous event words raised by the MC.

mod error;
mod event;
mod header;
pub mod status;

pub use error::{Errno, WireError, WireResult};
pub use event::{event_code, McdiEvent};
pub use header::{
    check_request, decode_request_header, decode_response_header, decode_response_slice,
    decode_status_word, encode_response, EncodedHeader, RequestHeader, ResponseHeader,
    WireVersion, CMD_V2_EXTN, HEADER_LEN_V1, HEADER_LEN_V2, MAX_CMD_V1, MAX_CMD_V2,
    MAX_HEADER_LEN, SDU_LEN_MAX_V1, SDU_LEN_MAX_V2, SEQ_MASK, SEQ_WINDOW, XFLAG_EVREQ,
};
pub use status::translate;

/// Command code of the MC reboot request. An I/O failure in reply to this
/// command is the expected outcome and never warrants recovery.
pub const CMD_REBOOT: u32 = 0x3d;
