//! Asynchronous MCDI event words.
//!
//! The MC raises events as a `(code, data)` pair. Command completions pack
//! the echoed sequence, payload length and status into the data word; the
//! remaining codes are notifications the engine either acts on (assertion,
//! reboot) or forwards to the device owner.

/// Event codes raised by the management controller.
pub mod event_code {
    /// Watchdog or assertion failure; data holds the faulting address.
    pub const BADASSERT: u8 = 0x01;
    /// Power-management notice.
    pub const PMNOTICE: u8 = 0x02;
    /// Command completed.
    pub const CMDDONE: u8 = 0x03;
    /// Link state changed.
    pub const LINKCHANGE: u8 = 0x04;
    /// Sensor crossed a threshold.
    pub const SENSOREVT: u8 = 0x05;
    /// Scheduler error; data holds the address.
    pub const SCHEDERR: u8 = 0x06;
    /// Controller rebooted.
    pub const REBOOT: u8 = 0x07;
    /// MAC statistics DMA finished.
    pub const MAC_STATS_DMA: u8 = 0x08;
    /// Firmware alert.
    pub const FWALERT: u8 = 0x09;
    /// Function-level reset of a virtual function.
    pub const FLR: u8 = 0x0a;
}

const CMDDONE_SEQ_MASK: u32 = 0xff;
const CMDDONE_DATALEN_SHIFT: u32 = 8;
const CMDDONE_DATALEN_MASK: u32 = 0xff;
const CMDDONE_ERRNO_SHIFT: u32 = 16;
const CMDDONE_ERRNO_MASK: u32 = 0xff;
const FLR_VF_MASK: u32 = 0xff;

/// Decoded MCDI event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum McdiEvent {
    /// Completion of the request carrying `seq`.
    CmdDone {
        /// Sequence echoed by the controller.
        seq: u32,
        /// Response payload length.
        datalen: usize,
        /// Controller status code.
        status: u32,
    },
    /// Controller assertion or watchdog at `addr`.
    BadAssert {
        /// Faulting address.
        addr: u32,
    },
    /// Controller rebooted.
    Reboot,
    /// Power-management notice.
    PmNotice,
    /// Link state change, raw data word.
    LinkChange(u32),
    /// Sensor event, raw data word.
    SensorEvt(u32),
    /// Scheduler error at `addr`.
    SchedErr {
        /// Reported address.
        addr: u32,
    },
    /// MAC statistics DMA completion.
    MacStatsDma,
    /// Firmware alert, raw data word.
    FwAlert(u32),
    /// Function-level reset of virtual function `vf`.
    Flr {
        /// Virtual function index.
        vf: u32,
    },
    /// Code this crate does not know.
    Unknown {
        /// Raw event code.
        code: u8,
        /// Raw data word.
        data: u32,
    },
}

impl McdiEvent {
    /// Decodes an event from its code and data word.
    pub fn decode(code: u8, data: u32) -> Self {
        match code {
            event_code::CMDDONE => McdiEvent::CmdDone {
                seq: data & CMDDONE_SEQ_MASK,
                datalen: ((data >> CMDDONE_DATALEN_SHIFT) & CMDDONE_DATALEN_MASK) as usize,
                status: (data >> CMDDONE_ERRNO_SHIFT) & CMDDONE_ERRNO_MASK,
            },
            event_code::BADASSERT => McdiEvent::BadAssert { addr: data },
            event_code::REBOOT => McdiEvent::Reboot,
            event_code::PMNOTICE => McdiEvent::PmNotice,
            event_code::LINKCHANGE => McdiEvent::LinkChange(data),
            event_code::SENSOREVT => McdiEvent::SensorEvt(data),
            event_code::SCHEDERR => McdiEvent::SchedErr { addr: data },
            event_code::MAC_STATS_DMA => McdiEvent::MacStatsDma,
            event_code::FWALERT => McdiEvent::FwAlert(data),
            event_code::FLR => McdiEvent::Flr {
                vf: data & FLR_VF_MASK,
            },
            code => McdiEvent::Unknown { code, data },
        }
    }

    /// Encodes the event back into its `(code, data)` pair.
    pub fn encode(&self) -> (u8, u32) {
        match *self {
            McdiEvent::CmdDone {
                seq,
                datalen,
                status,
            } => (
                event_code::CMDDONE,
                (seq & CMDDONE_SEQ_MASK)
                    | (((datalen as u32) & CMDDONE_DATALEN_MASK) << CMDDONE_DATALEN_SHIFT)
                    | ((status & CMDDONE_ERRNO_MASK) << CMDDONE_ERRNO_SHIFT),
            ),
            McdiEvent::BadAssert { addr } => (event_code::BADASSERT, addr),
            McdiEvent::Reboot => (event_code::REBOOT, 0),
            McdiEvent::PmNotice => (event_code::PMNOTICE, 0),
            McdiEvent::LinkChange(data) => (event_code::LINKCHANGE, data),
            McdiEvent::SensorEvt(data) => (event_code::SENSOREVT, data),
            McdiEvent::SchedErr { addr } => (event_code::SCHEDERR, addr),
            McdiEvent::MacStatsDma => (event_code::MAC_STATS_DMA, 0),
            McdiEvent::FwAlert(data) => (event_code::FWALERT, data),
            McdiEvent::Flr { vf } => (event_code::FLR, vf & FLR_VF_MASK),
            McdiEvent::Unknown { code, data } => (code, data),
        }
    }
}
