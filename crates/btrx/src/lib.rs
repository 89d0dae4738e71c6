// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # BTRX - GSM BTS layer 1 in pure Rust
//!
//! The software half of a GSM base transceiver station: everything of
//! layer 1 that can be done once an I/Q front-end (the "modem",
//! typically osmo-trx or a compatible SDR transceiver) demodulates
//! bursts into bits.
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------------+
//! |                 RSL / LAPDm layer (out of scope)                 |
//! +---------------------------- L1-SAP ------------------------------+
//! |  scheduler: multiframe dispatch, RTS lookahead, burst buffers    |
//! |  coding: GSM 05.03 codecs | cipher: A5/1..3 | loops: power/TA    |
//! +------------------------------------------------------------------+
//! |  trx: TRXC command queue | TRXD burst PDUs | frame clock | FSM   |
//! +--------------------------- UDP sockets ---------------------------+
//! |                      radio modem (external)                       |
//! +------------------------------------------------------------------+
//! ```
//!
//! The whole stack is single-threaded: [`engine::PhyLink`] owns the
//! sockets, timers and all state, and runs a mio-based reactor. There
//! are no locks and no worker threads.
//!
//! ## Key types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`engine::PhyLink`] | The reactor: one modem link with its carriers |
//! | [`sched::Scheduler`] | Per-carrier TDMA multiframe scheduler |
//! | [`bts::Bts`] | The BTS object model (carriers, timeslots, channels) |
//! | [`config::Config`] | Runtime configuration with `BTRX_*` env overrides |
//! | [`l1sap::L1Up`] / [`l1sap::L1Down`] | Primitives across the L1-SAP |

/// The BTS/TRX/timeslot/lchan object model.
pub mod bts;
/// A5 air-interface ciphering.
pub mod cipher;
/// GSM 05.03 channel coding.
pub mod coding;
/// Protocol constants and runtime configuration.
pub mod config;
/// The single-threaded reactor over clock/TRXC/TRXD sockets.
pub mod engine;
/// TDMA time and radio-frequency helpers.
pub mod gsm;
/// The L1-SAP primitive boundary.
pub mod l1sap;
/// Logging setup for binaries.
pub mod logging;
/// MS power, timing advance and AMR adaptation loops.
pub mod loops;
/// Downlink power ramping.
pub mod power;
/// The multiframe scheduler.
pub mod sched;
/// TRX wire protocol: TRXC, TRXD, frame clock, provisioning.
pub mod trx;

pub use bts::{Bts, TrxId};
pub use config::Config;
pub use engine::PhyLink;

/// Errors surfaced by the reactor and configuration paths. Decode and
/// per-burst errors never reach this level; they are recovered where
/// they happen.
#[derive(Debug)]
pub enum Error {
    /// Socket-level failure.
    Io(std::io::Error),
    /// Invalid or unsupported configuration.
    BadConfig(String),
    /// The modem NACKed a critical control command; operator
    /// intervention is required.
    CriticalNack { cmd: String, status: i32 },
    /// Malformed wire data that indicates a broken peer.
    Proto(ProtoError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::BadConfig(msg) => write!(f, "configuration error: {}", msg),
            Error::CriticalNack { cmd, status } => {
                write!(f, "transceiver rejected critical command {} with status {}", cmd, status)
            }
            Error::Proto(e) => write!(f, "protocol error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Wire-level parse failures of the TRXD protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoError {
    /// Datagram shorter than its header.
    ShortPdu,
    /// PDU version does not match the negotiated one.
    BadVersion { got: u8, want: u8 },
    /// Burst length fits no known modulation.
    BadBurstLen(usize),
    /// Frame number beyond the hyperframe.
    BadFn(u32),
    /// Unknown modulation/TSC-set combination.
    BadModulation(u8),
}

impl std::fmt::Display for ProtoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtoError::ShortPdu => write!(f, "PDU too short"),
            ProtoError::BadVersion { got, want } => {
                write!(f, "unexpected PDU version {} (expected {})", got, want)
            }
            ProtoError::BadBurstLen(n) => write!(f, "odd burst length {}", n),
            ProtoError::BadFn(fnr) => write!(f, "illegal TDMA fn={}", fnr),
            ProtoError::BadModulation(mts) => write!(f, "unsupported modulation (MTS={:#04x})", mts),
        }
    }
}

/// Convenience result alias for fallible BTRX operations.
pub type Result<T> = std::result::Result<T, Error>;
