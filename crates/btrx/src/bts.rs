// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The BTS object model: BTS -> TRX -> timeslot -> logical channel.
//!
//! Containers form an ownership tree; upward references are arena
//! indices ([`TrxId`]), never pointers. The scheduler and provisioning
//! code borrow into this tree through the owning [`Bts`].

use crate::gsm::Band;

/// Number of timeslots per TRX.
pub const TRX_NR_TS: usize = 8;

/// Stable index of a TRX within its BTS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrxId(pub usize);

/// Physical channel combination of a timeslot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pchan {
    #[default]
    None,
    Ccch,
    CcchSdcch4,
    CcchSdcch4Cbch,
    Sdcch8,
    Sdcch8Cbch,
    TchF,
    TchH,
    Pdch,
    /// IPA-style dynamic TCH/F <-> PDCH.
    TchFPdch,
    /// Osmocom-style dynamic TCH/F / TCH/H / PDCH.
    TchFTchHPdch,
    Unknown,
}

impl Pchan {
    /// The numeric type code of the SETSLOT command.
    pub fn slot_type(self) -> Option<u8> {
        match self {
            Pchan::None => Some(0),
            Pchan::TchF | Pchan::TchFPdch | Pchan::TchFTchHPdch => Some(1),
            Pchan::TchH => Some(3),
            Pchan::Ccch => Some(4),
            Pchan::CcchSdcch4 | Pchan::CcchSdcch4Cbch => Some(5),
            Pchan::Sdcch8 | Pchan::Sdcch8Cbch => Some(7),
            Pchan::Pdch => Some(13),
            Pchan::Unknown => None,
        }
    }

    /// Map a SETSLOT type code back to a pchan.
    pub fn from_slot_type(code: u8) -> Pchan {
        match code {
            0 => Pchan::None,
            1 => Pchan::TchF,
            3 => Pchan::TchH,
            4 => Pchan::Ccch,
            5 => Pchan::CcchSdcch4,
            7 => Pchan::Sdcch8,
            13 => Pchan::Pdch,
            _ => Pchan::Unknown,
        }
    }

    /// Whether this combination runs the PDCH multiframe.
    pub fn is_pdch(self) -> bool {
        matches!(self, Pchan::Pdch)
    }
}

/// Administrative lifecycle of a logical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LchanState {
    #[default]
    None,
    ActReq,
    Active,
    RelReq,
    /// Deactivation failed at the protocol level.
    RelErr,
}

/// Ciphering handshake progress; advances monotonically per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherState {
    #[default]
    None,
    RxReq,
    RxConf,
    RxTxReq,
    RxTxConf,
}

/// RSL channel rate/mode class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RslCmode {
    #[default]
    Signalling,
    Speech,
    Data,
}

/// Speech codec on a traffic channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TchMode {
    #[default]
    Signalling,
    SpeechV1,
    SpeechEfr,
    SpeechAmr,
}

/// One entry of the AMR active codec set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmrMode {
    /// AMR frame type 0..=7.
    pub mode: u8,
    /// BER threshold for downgrading out of this mode (scaled by 100).
    pub threshold: u8,
    /// Hysteresis below the threshold for upgrading (scaled by 100).
    pub hysteresis: u8,
}

/// AMR multirate configuration of a logical channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmrConfig {
    pub modes: [AmrMode; 4],
    pub num_modes: u8,
    /// Initial codec set index after activation.
    pub initial_idx: u8,
}

impl AmrConfig {
    pub fn active_fts(&self) -> &[AmrMode] {
        &self.modes[..self.num_modes as usize]
    }
}

/// Ciphering material of one direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CipherKey {
    pub algo: u8,
    pub key: [u8; 8],
}

/// A logical channel: one subslot of a timeslot.
#[derive(Debug, Clone, Default)]
pub struct Lchan {
    pub state: LchanState,
    pub ciph_state: CipherState,
    pub cipher: CipherKey,
    pub rsl_cmode: RslCmode,
    pub tch_mode: TchMode,
    pub amr: AmrConfig,
    /// Handover access-burst detection active on this subslot.
    pub ho_rach_detect: bool,
    /// MS power control: currently ordered level.
    pub ms_power_level: u8,
    /// Currently ordered timing advance.
    pub ta: u8,
    /// Control loops frozen by the operator.
    pub fixed: bool,
}

/// One timeslot of a TRX.
#[derive(Debug, Clone, Default)]
pub struct Timeslot {
    /// The combination currently in effect on the modem.
    pub pchan: Pchan,
    /// Target combination during a dynamic switch; equals `pchan` when
    /// no reconfiguration is pending.
    pub pchan_wanted: Pchan,
    pub lchans: [Lchan; 8],
}

/// One carrier.
#[derive(Debug, Clone)]
pub struct Trx {
    pub num: u8,
    pub arfcn: u16,
    /// Nominal output power in dBm (configured or from NOMTXPOWER).
    pub nominal_power_dbm: Option<i32>,
    /// OML-sourced maximum power reduction in dB.
    pub max_power_red_db: u8,
    pub ts: [Timeslot; TRX_NR_TS],
}

impl Trx {
    pub fn new(num: u8, arfcn: u16) -> Self {
        Self {
            num,
            arfcn,
            nominal_power_dbm: None,
            max_power_red_db: 0,
            ts: Default::default(),
        }
    }
}

/// The base station: all process-wide state lives here, passed
/// explicitly instead of through globals.
#[derive(Debug, Clone)]
pub struct Bts {
    pub bsic: u8,
    pub band: Band,
    pub trx: Vec<Trx>,
}

impl Bts {
    pub fn new(band: Band, bsic: u8) -> Self {
        Self { bsic, band, trx: Vec::new() }
    }

    /// Training sequence code: the BCC part of the BSIC.
    pub fn tsc(&self) -> u8 {
        self.bsic & 0x07
    }

    pub fn add_trx(&mut self, arfcn: u16) -> TrxId {
        let id = TrxId(self.trx.len());
        self.trx.push(Trx::new(id.0 as u8, arfcn));
        id
    }

    /// The BCCH-carrying carrier is always TRX 0.
    pub fn is_c0(&self, id: TrxId) -> bool {
        id.0 == 0
    }
}
