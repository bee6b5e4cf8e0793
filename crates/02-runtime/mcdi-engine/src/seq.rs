//! Sequence numbering and stale-response credits.
//!
//! The host counter is wide but only its low [`SEQ_MASK`] bits go on the
//! wire. Each request that times out leaves a response the controller may
//! still deliver; a credit is banked for it so that one mismatching
//! completion can later be discarded quietly. A mismatch with no credits
//! left is an anomaly.
//!
//! Matching compares the low bits only, so a stale response that arrives
//! after exactly [`SEQ_WINDOW`] newer requests is indistinguishable from
//! the current one.
//!
//! [`SEQ_WINDOW`]: mcdi_wire::SEQ_WINDOW

use mcdi_wire::SEQ_MASK;

/// Verdict on a response sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeqCheck {
    /// Matches the outstanding request.
    Match,
    /// Mismatch absorbed by a credit; discard the response.
    Stale,
    /// Mismatch with no credit to absorb it.
    Anomaly,
}

/// Host-side sequence counter and credit balance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeqTracker {
    seqno: u64,
    credits: u32,
}

impl SeqTracker {
    /// Creates a tracker at sequence zero with no credits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full host counter.
    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    /// Outstanding stale-response credits.
    pub fn credits(&self) -> u32 {
        self.credits
    }

    /// Sequence bits as they appear on the wire.
    pub fn wire_seq(&self) -> u32 {
        (self.seqno & u64::from(SEQ_MASK)) as u32
    }

    /// Advances to the next request and returns its wire sequence.
    pub fn next(&mut self) -> u32 {
        self.seqno += 1;
        self.wire_seq()
    }

    /// Abandons the outstanding request after a timeout: the counter moves on
    /// and a credit is banked for the response that may still arrive.
    pub fn abandon(&mut self) {
        self.seqno += 1;
        self.grant_credit();
    }

    /// Banks one credit.
    pub fn grant_credit(&mut self) {
        self.credits = self.credits.saturating_add(1);
    }

    /// Compares a response sequence with the outstanding request, spending a
    /// credit when the mismatch can be absorbed.
    pub fn check(&mut self, resp_seq: u32) -> SeqCheck {
        if (resp_seq ^ self.wire_seq()) & SEQ_MASK == 0 {
            return SeqCheck::Match;
        }
        if self.credits > 0 {
            self.credits -= 1;
            SeqCheck::Stale
        } else {
            SeqCheck::Anomaly
        }
    }
}
