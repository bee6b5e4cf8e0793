//! MCDI request and response header layouts.
//!
//! Every header starts with one little-endian dword:
//!
//! ```text
//!  31       24 23 22 21 20 19  16 15      8 7  6      0
//! +----------+--+--+--+--+------+---------+--+--------+
//! |  XFLAGS  |RS|ER|NE|  | SEQ  | DATALEN |RY|  CODE  |
//! +----------+--+--+--+--+------+---------+--+--------+
//! ```
//!
//! `RS` marks a response, `ER` an error response, `NE` the not-epoch bit and
//! `RY` the resync bit. When `CODE` holds [`CMD_V2_EXTN`] a second dword
//! carries the real command code (bits 0..15) and the actual payload length
//! (bits 16..32), and `DATALEN` in the first dword is zero.

use crate::error::{WireError, WireResult};

/// Length of a version-1 header.
pub const HEADER_LEN_V1: usize = 4;
/// Length of a version-2 header (outer dword plus extension dword).
pub const HEADER_LEN_V2: usize = 8;
/// Largest header any version produces.
pub const MAX_HEADER_LEN: usize = HEADER_LEN_V2;

/// Maximum payload carried by a version-1 request.
pub const SDU_LEN_MAX_V1: usize = 0xfc;
/// Maximum payload carried by a version-2 request.
pub const SDU_LEN_MAX_V2: usize = 0x400;

/// Sentinel command code announcing a version-2 extension dword.
pub const CMD_V2_EXTN: u32 = 0x7f;
/// Highest command code addressable by a version-1 header.
pub const MAX_CMD_V1: u32 = 0x77;
/// Highest command code addressable by a version-2 header.
pub const MAX_CMD_V2: u32 = 0x7fff;

/// Mask applied to sequence numbers before they hit the wire.
pub const SEQ_MASK: u32 = 0xf;
/// Number of distinct sequence values; a counter aliases after this many bumps.
pub const SEQ_WINDOW: u32 = SEQ_MASK + 1;

/// Transport extension flag requesting a completion event.
pub const XFLAG_EVREQ: u8 = 0x01;

const CODE_MASK: u32 = 0x7f;
const RESYNC_BIT: u32 = 1 << 7;
const DATALEN_SHIFT: u32 = 8;
const DATALEN_MASK: u32 = 0xff;
const SEQ_SHIFT: u32 = 16;
const NOT_EPOCH_BIT: u32 = 1 << 21;
const ERROR_BIT: u32 = 1 << 22;
const RESPONSE_BIT: u32 = 1 << 23;
const XFLAGS_SHIFT: u32 = 24;

const EXT_CMD_MASK: u32 = 0x7fff;
const EXT_LEN_SHIFT: u32 = 16;
const EXT_LEN_MASK: u32 = 0xffff;

/// Header layout version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WireVersion {
    /// Single-dword header, 7-bit command space.
    V1 = 1,
    /// Extended header with a wide command code and length.
    V2 = 2,
}

impl WireVersion {
    /// Parses a negotiated version number.
    pub fn from_raw(raw: u8) -> WireResult<Self> {
        match raw {
            1 => Ok(WireVersion::V1),
            2 => Ok(WireVersion::V2),
            other => Err(WireError::UnsupportedVersion(other)),
        }
    }

    /// Numeric version.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Header length produced by this version.
    pub const fn header_len(self) -> usize {
        match self {
            WireVersion::V1 => HEADER_LEN_V1,
            WireVersion::V2 => HEADER_LEN_V2,
        }
    }

    /// Largest payload this version can describe.
    pub const fn max_payload(self) -> usize {
        match self {
            WireVersion::V1 => SDU_LEN_MAX_V1,
            WireVersion::V2 => SDU_LEN_MAX_V2,
        }
    }

    /// Highest addressable command code.
    pub const fn max_cmd(self) -> u32 {
        match self {
            WireVersion::V1 => MAX_CMD_V1,
            WireVersion::V2 => MAX_CMD_V2,
        }
    }
}

/// Validates a request against the negotiated maximum version and returns
/// the header version that will carry it.
///
/// Version 1 is preferred whenever both the command and the payload fit it.
pub fn check_request(cmd: u32, payload_len: usize, max: WireVersion) -> WireResult<WireVersion> {
    if cmd <= MAX_CMD_V1 && payload_len <= SDU_LEN_MAX_V1 {
        return Ok(WireVersion::V1);
    }
    if cmd > max.max_cmd() {
        return Err(WireError::CommandOutOfRange {
            cmd,
            version: max.as_u8(),
        });
    }
    if payload_len > max.max_payload() {
        return Err(WireError::PayloadTooLarge {
            len: payload_len,
            max: max.max_payload(),
            version: max.as_u8(),
        });
    }
    Ok(max)
}

/// Encoded header bytes, 4 or 8 long depending on the version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodedHeader {
    bytes: [u8; MAX_HEADER_LEN],
    len: usize,
}

impl EncodedHeader {
    fn v1(dword0: u32) -> Self {
        let mut bytes = [0u8; MAX_HEADER_LEN];
        bytes[..4].copy_from_slice(&dword0.to_le_bytes());
        Self {
            bytes,
            len: HEADER_LEN_V1,
        }
    }

    fn v2(dword0: u32, dword1: u32) -> Self {
        let mut bytes = [0u8; MAX_HEADER_LEN];
        bytes[..4].copy_from_slice(&dword0.to_le_bytes());
        bytes[4..].copy_from_slice(&dword1.to_le_bytes());
        Self {
            bytes,
            len: HEADER_LEN_V2,
        }
    }

    /// Wire bytes of the header.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Header length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; headers carry at least one dword.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Version implied by the header length.
    pub fn version(&self) -> WireVersion {
        if self.len == HEADER_LEN_V2 {
            WireVersion::V2
        } else {
            WireVersion::V1
        }
    }
}

/// Fields of an outgoing command header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestHeader {
    /// Command code.
    pub cmd: u32,
    /// Payload length in bytes.
    pub payload_len: usize,
    /// Sequence counter; only the low bits travel.
    pub seq: u32,
    /// Transport extension flags, e.g. [`XFLAG_EVREQ`].
    pub xflags: u8,
    /// Clear on the first request of a new epoch.
    pub not_epoch: bool,
}

impl RequestHeader {
    /// Encodes the header, failing before anything is sent if the request
    /// does not fit the negotiated version.
    pub fn encode(&self, max: WireVersion) -> WireResult<EncodedHeader> {
        let version = check_request(self.cmd, self.payload_len, max)?;
        let flags = RESYNC_BIT
            | ((self.seq & SEQ_MASK) << SEQ_SHIFT)
            | if self.not_epoch { NOT_EPOCH_BIT } else { 0 }
            | (u32::from(self.xflags) << XFLAGS_SHIFT);
        let encoded = match version {
            WireVersion::V1 => EncodedHeader::v1(
                flags | (self.cmd & CODE_MASK) | ((self.payload_len as u32) << DATALEN_SHIFT),
            ),
            WireVersion::V2 => EncodedHeader::v2(
                flags | CMD_V2_EXTN,
                (self.cmd & EXT_CMD_MASK) | ((self.payload_len as u32) << EXT_LEN_SHIFT),
            ),
        };
        Ok(encoded)
    }
}

/// Decodes a request header as the controller sees it.
pub fn decode_request_header(raw: &[u8]) -> WireResult<RequestHeader> {
    let dword0 = read_dword(raw, 0)?;
    let code = dword0 & CODE_MASK;
    let (cmd, payload_len) = if code == CMD_V2_EXTN {
        let dword1 = read_dword(raw, 4)?;
        (
            dword1 & EXT_CMD_MASK,
            ((dword1 >> EXT_LEN_SHIFT) & EXT_LEN_MASK) as usize,
        )
    } else {
        (code, ((dword0 >> DATALEN_SHIFT) & DATALEN_MASK) as usize)
    };
    Ok(RequestHeader {
        cmd,
        payload_len,
        seq: (dword0 >> SEQ_SHIFT) & SEQ_MASK,
        xflags: (dword0 >> XFLAGS_SHIFT) as u8,
        not_epoch: dword0 & NOT_EPOCH_BIT != 0,
    })
}

/// Decoded response header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Sequence number echoed by the controller (low bits only).
    pub seq: u32,
    /// Command code the response belongs to.
    pub cmd: u32,
    /// Error flag; the status word follows the header when set.
    pub error: bool,
    /// Header length: 4 for v1, 8 for v2. Also the offset of the payload and
    /// of the status word.
    pub hdr_len: usize,
    /// Payload length in bytes.
    pub data_len: usize,
}

impl ResponseHeader {
    /// True when the error flag is set without any payload, which the
    /// controller uses to report that it rebooted under the request.
    pub fn is_reboot_marker(&self) -> bool {
        self.error && self.data_len == 0
    }
}

/// Decodes a response header through a windowed reader.
///
/// `read(offset, buf)` must fill `buf` from the response buffer at `offset`.
/// The first dword is always read; the extension dword is read only when the
/// command code is the v2 sentinel, so `hdr_len` is settled before the caller
/// goes looking for a status word.
pub fn decode_response_header<F>(mut read: F) -> ResponseHeader
where
    F: FnMut(usize, &mut [u8]),
{
    let mut word = [0u8; 4];
    read(0, &mut word);
    let dword0 = u32::from_le_bytes(word);
    let code = dword0 & CODE_MASK;
    let seq = (dword0 >> SEQ_SHIFT) & SEQ_MASK;
    let error = dword0 & ERROR_BIT != 0;

    if code != CMD_V2_EXTN {
        return ResponseHeader {
            seq,
            cmd: code,
            error,
            hdr_len: HEADER_LEN_V1,
            data_len: ((dword0 >> DATALEN_SHIFT) & DATALEN_MASK) as usize,
        };
    }

    read(HEADER_LEN_V1, &mut word);
    let dword1 = u32::from_le_bytes(word);
    ResponseHeader {
        seq,
        cmd: dword1 & EXT_CMD_MASK,
        error,
        hdr_len: HEADER_LEN_V2,
        data_len: ((dword1 >> EXT_LEN_SHIFT) & EXT_LEN_MASK) as usize,
    }
}

/// Decodes a response header from a contiguous byte slice.
pub fn decode_response_slice(raw: &[u8]) -> WireResult<ResponseHeader> {
    let dword0 = read_dword(raw, 0)?;
    if dword0 & CODE_MASK == CMD_V2_EXTN {
        read_dword(raw, HEADER_LEN_V1)?;
    }
    Ok(decode_response_header(|offset, buf| {
        buf.copy_from_slice(&raw[offset..offset + buf.len()]);
    }))
}

/// Interprets the status dword that follows an error response header.
pub fn decode_status_word(raw: [u8; 4]) -> u32 {
    u32::from_le_bytes(raw)
}

/// Encodes a response header as the controller would write it.
///
/// Used by simulated controllers; the caller is responsible for choosing a
/// version that can describe `cmd` and `data_len`.
pub fn encode_response(
    seq: u32,
    cmd: u32,
    error: bool,
    data_len: usize,
    version: WireVersion,
) -> EncodedHeader {
    let flags = RESPONSE_BIT
        | ((seq & SEQ_MASK) << SEQ_SHIFT)
        | if error { ERROR_BIT } else { 0 };
    match version {
        WireVersion::V1 => EncodedHeader::v1(
            flags | (cmd & CODE_MASK) | (((data_len as u32) & DATALEN_MASK) << DATALEN_SHIFT),
        ),
        WireVersion::V2 => EncodedHeader::v2(
            flags | CMD_V2_EXTN,
            (cmd & EXT_CMD_MASK) | (((data_len as u32) & EXT_LEN_MASK) << EXT_LEN_SHIFT),
        ),
    }
}

fn read_dword(raw: &[u8], offset: usize) -> WireResult<u32> {
    let end = offset + 4;
    let bytes = raw.get(offset..end).ok_or(WireError::Truncated {
        needed: end,
        got: raw.len(),
    })?;
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(word))
}
