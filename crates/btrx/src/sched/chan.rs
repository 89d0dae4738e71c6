// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scheduler channel types and per-channel state.
//!
//! Every logical channel a multiframe can carry is one [`ChanType`];
//! the scheduler keeps one [`ChanState`] per type per timeslot. Dispatch
//! to the transmit/receive routines is a `match` on the type, not a
//! function-pointer table.

use crate::bts::{CipherKey, RslCmode, TchMode};

/// All channels that can appear in a multiframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChanType {
    Idle = 0,
    Fcch,
    Sch,
    Bcch,
    Rach,
    Ccch,
    TchF,
    TchH0,
    TchH1,
    Sdcch4_0,
    Sdcch4_1,
    Sdcch4_2,
    Sdcch4_3,
    Sdcch8_0,
    Sdcch8_1,
    Sdcch8_2,
    Sdcch8_3,
    Sdcch8_4,
    Sdcch8_5,
    Sdcch8_6,
    Sdcch8_7,
    SacchTf,
    SacchTh0,
    SacchTh1,
    Sacch4_0,
    Sacch4_1,
    Sacch4_2,
    Sacch4_3,
    Sacch8_0,
    Sacch8_1,
    Sacch8_2,
    Sacch8_3,
    Sacch8_4,
    Sacch8_5,
    Sacch8_6,
    Sacch8_7,
    Pdtch,
    Ptcch,
}

/// Number of channel types (size of the per-timeslot state array).
pub const CHAN_MAX: usize = 38;

/// Static per-type properties.
#[derive(Debug, Clone, Copy)]
pub struct ChanDesc {
    /// RSL chan_nr cbits with tn zeroed; 0 for channels without one.
    pub chan_nr: u8,
    /// Link id (0x00 main, 0x40 SACCH).
    pub link_id: u8,
    /// Lives on the PDCH multiframe instead of the circuit ones.
    pub pdch: bool,
    /// Scheduled without explicit activation (C0 broadcast machinery).
    pub auto_active: bool,
    pub name: &'static str,
}

const fn d(chan_nr: u8, link_id: u8, pdch: bool, auto: bool, name: &'static str) -> ChanDesc {
    ChanDesc { chan_nr, link_id, pdch, auto_active: auto, name }
}

/// Indexed by `ChanType as usize`.
pub const CHAN_DESC: [ChanDesc; CHAN_MAX] = [
    d(0x00, 0x00, false, true, "IDLE"),
    d(0x00, 0x00, false, true, "FCCH"),
    d(0x00, 0x00, false, true, "SCH"),
    d(0x80, 0x00, false, true, "BCCH"),
    d(0x88, 0x00, false, true, "RACH"),
    d(0x90, 0x00, false, true, "CCCH"),
    d(0x08, 0x00, false, false, "TCH/F"),
    d(0x10, 0x00, false, false, "TCH/H(0)"),
    d(0x18, 0x00, false, false, "TCH/H(1)"),
    d(0x20, 0x00, false, false, "SDCCH/4(0)"),
    d(0x28, 0x00, false, false, "SDCCH/4(1)"),
    d(0x30, 0x00, false, false, "SDCCH/4(2)"),
    d(0x38, 0x00, false, false, "SDCCH/4(3)"),
    d(0x40, 0x00, false, false, "SDCCH/8(0)"),
    d(0x48, 0x00, false, false, "SDCCH/8(1)"),
    d(0x50, 0x00, false, false, "SDCCH/8(2)"),
    d(0x58, 0x00, false, false, "SDCCH/8(3)"),
    d(0x60, 0x00, false, false, "SDCCH/8(4)"),
    d(0x68, 0x00, false, false, "SDCCH/8(5)"),
    d(0x70, 0x00, false, false, "SDCCH/8(6)"),
    d(0x78, 0x00, false, false, "SDCCH/8(7)"),
    d(0x08, 0x40, false, false, "SACCH/TF"),
    d(0x10, 0x40, false, false, "SACCH/TH(0)"),
    d(0x18, 0x40, false, false, "SACCH/TH(1)"),
    d(0x20, 0x40, false, false, "SACCH/4(0)"),
    d(0x28, 0x40, false, false, "SACCH/4(1)"),
    d(0x30, 0x40, false, false, "SACCH/4(2)"),
    d(0x38, 0x40, false, false, "SACCH/4(3)"),
    d(0x40, 0x40, false, false, "SACCH/8(0)"),
    d(0x48, 0x40, false, false, "SACCH/8(1)"),
    d(0x50, 0x40, false, false, "SACCH/8(2)"),
    d(0x58, 0x40, false, false, "SACCH/8(3)"),
    d(0x60, 0x40, false, false, "SACCH/8(4)"),
    d(0x68, 0x40, false, false, "SACCH/8(5)"),
    d(0x70, 0x40, false, false, "SACCH/8(6)"),
    d(0x78, 0x40, false, false, "SACCH/8(7)"),
    d(0x08, 0x00, true, false, "PDTCH"),
    d(0x08, 0x00, true, false, "PTCCH"),
];

impl ChanType {
    pub fn desc(self) -> &'static ChanDesc {
        &CHAN_DESC[self as usize]
    }

    /// RSL chan_nr for this channel on timeslot `tn`.
    pub fn chan_nr(self, tn: u8) -> u8 {
        self.desc().chan_nr | tn
    }

    /// Subslot within the timeslot (TCH/H and SDCCH subchannels).
    pub fn subslot(self) -> u8 {
        match self {
            ChanType::TchH1 | ChanType::SacchTh1 => 1,
            ChanType::Sdcch4_0 | ChanType::Sdcch4_1 | ChanType::Sdcch4_2 | ChanType::Sdcch4_3 => {
                self as u8 - ChanType::Sdcch4_0 as u8
            }
            ChanType::Sacch4_0 | ChanType::Sacch4_1 | ChanType::Sacch4_2 | ChanType::Sacch4_3 => {
                self as u8 - ChanType::Sacch4_0 as u8
            }
            c if (ChanType::Sdcch8_0 as u8..=ChanType::Sdcch8_7 as u8).contains(&(c as u8)) => {
                c as u8 - ChanType::Sdcch8_0 as u8
            }
            c if (ChanType::Sacch8_0 as u8..=ChanType::Sacch8_7 as u8).contains(&(c as u8)) => {
                c as u8 - ChanType::Sacch8_0 as u8
            }
            _ => 0,
        }
    }
}

/// Measurement accumulation across one reporting period.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasState {
    pub rssi_sum: i32,
    pub rssi_num: u32,
    pub toa256_sum: i32,
    pub toa_num: u32,
    pub ber10k_sum: u32,
    pub ber_num: u32,
    pub ci_cb_sum: i32,
    pub ci_num: u32,
}

impl MeasState {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn avg_rssi(&self) -> i8 {
        if self.rssi_num == 0 {
            return -128;
        }
        (self.rssi_sum / self.rssi_num as i32) as i8
    }

    pub fn avg_toa256(&self) -> i16 {
        if self.toa_num == 0 {
            return 0;
        }
        (self.toa256_sum / self.toa_num as i32) as i16
    }

    pub fn avg_ber10k(&self) -> u16 {
        if self.ber_num == 0 {
            return 0;
        }
        (self.ber10k_sum / self.ber_num) as u16
    }

    pub fn avg_ci_cb(&self) -> i16 {
        if self.ci_num == 0 {
            return 0;
        }
        (self.ci_cb_sum / self.ci_num as i32) as i16
    }
}

/// Scheduler state of one channel on one timeslot.
#[derive(Debug, Clone, Default)]
pub struct ChanState {
    pub active: bool,

    /// Downlink burst buffer, 116 bits per burst; allocated on first use
    /// and sized by channel kind (4, 6 or 8 bursts).
    pub dl_bursts: Option<Vec<u8>>,
    /// Uplink soft-bit accumulator, same stride.
    pub ul_bursts: Option<Vec<i8>>,
    /// Frame number of the first burst in the current uplink block.
    pub ul_first_fn: u32,
    /// Bitset of uplink bursts received in the current block.
    pub ul_mask: u8,

    /// Per-block averaging of the radio measurements.
    pub rssi_sum: i32,
    pub rssi_num: u32,
    pub toa256_sum: i32,
    pub toa_num: u32,
    pub ci_cb_sum: i32,
    pub ci_num: u32,

    /// Block-loss counter driving BFI generation.
    pub lost: u8,

    pub rsl_cmode: RslCmode,
    pub tch_mode: TchMode,

    pub dl_encr: CipherKey,
    pub ul_encr: CipherKey,

    /// AMR active codec set (frame types) and mode indices.
    pub codec: [u8; 4],
    /// Per-mode (threshold, hysteresis) of the adaptation loop,
    /// in BER x100.
    pub codec_thr: [(u8, u8); 4],
    pub codecs: u8,
    pub ul_ft: u8,
    pub ul_cmr: u8,
    pub dl_ft: u8,
    pub dl_cmr: u8,

    /// AMR link adaptation loop.
    pub amr_loop: bool,
    pub ber10k_acc: u32,
    pub ber_frames: u32,

    /// Handover access-burst detection.
    pub ho_rach_detect: bool,

    /// FACCH/H spans two speech frames; these flags skip the second.
    pub dl_ongoing_facch: bool,
    pub ul_ongoing_facch: bool,

    /// Downlink DTX enabled for this channel.
    pub dtx_dl: bool,
    /// Downlink DTX: last SID frame payload and the fn it was last sent.
    pub dtx_payload: Option<Vec<u8>>,
    pub dtx_last_fn: Option<u32>,
    /// In the repeat phase (8-frame cadence) rather than the 3-frame
    /// hangover after the last real frame.
    pub dtx_repeating: bool,

    /// MS power control and timing advance ordered by the loops.
    pub ms_power_level: u8,
    pub ta: u8,
    /// Control loops frozen for this channel.
    pub loops_fixed: bool,

    /// SACCH-period measurement reporting.
    pub meas: MeasState,
}

impl ChanState {
    /// Reset everything but keep the activation flag untouched.
    pub fn reset(&mut self) {
        let active = self.active;
        *self = ChanState::default();
        self.active = active;
    }

    pub fn accumulate_burst_meas(&mut self, rssi: i8, toa256: i16, ci_cb: Option<i16>) {
        self.rssi_sum += i32::from(rssi);
        self.rssi_num += 1;
        self.toa256_sum += i32::from(toa256);
        self.toa_num += 1;
        if let Some(ci) = ci_cb {
            self.ci_cb_sum += i32::from(ci);
            self.ci_num += 1;
        }
    }

    pub fn clear_block_meas(&mut self) {
        self.rssi_sum = 0;
        self.rssi_num = 0;
        self.toa256_sum = 0;
        self.toa_num = 0;
        self.ci_cb_sum = 0;
        self.ci_num = 0;
    }

    pub fn block_rssi(&self) -> i8 {
        if self.rssi_num == 0 {
            return -128;
        }
        (self.rssi_sum / self.rssi_num as i32) as i8
    }

    pub fn block_toa256(&self) -> i16 {
        if self.toa_num == 0 {
            return 0;
        }
        (self.toa256_sum / self.toa_num as i32) as i16
    }
}

/// All channel types, for iteration.
pub const ALL_CHANS: [ChanType; CHAN_MAX] = [
    ChanType::Idle,
    ChanType::Fcch,
    ChanType::Sch,
    ChanType::Bcch,
    ChanType::Rach,
    ChanType::Ccch,
    ChanType::TchF,
    ChanType::TchH0,
    ChanType::TchH1,
    ChanType::Sdcch4_0,
    ChanType::Sdcch4_1,
    ChanType::Sdcch4_2,
    ChanType::Sdcch4_3,
    ChanType::Sdcch8_0,
    ChanType::Sdcch8_1,
    ChanType::Sdcch8_2,
    ChanType::Sdcch8_3,
    ChanType::Sdcch8_4,
    ChanType::Sdcch8_5,
    ChanType::Sdcch8_6,
    ChanType::Sdcch8_7,
    ChanType::SacchTf,
    ChanType::SacchTh0,
    ChanType::SacchTh1,
    ChanType::Sacch4_0,
    ChanType::Sacch4_1,
    ChanType::Sacch4_2,
    ChanType::Sacch4_3,
    ChanType::Sacch8_0,
    ChanType::Sacch8_1,
    ChanType::Sacch8_2,
    ChanType::Sacch8_3,
    ChanType::Sacch8_4,
    ChanType::Sacch8_5,
    ChanType::Sacch8_6,
    ChanType::Sacch8_7,
    ChanType::Pdtch,
    ChanType::Ptcch,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desc_table_matches_enum() {
        assert_eq!(ALL_CHANS.len(), CHAN_MAX);
        for (i, c) in ALL_CHANS.iter().enumerate() {
            assert_eq!(*c as usize, i);
        }
        assert_eq!(ChanType::Pdtch.desc().name, "PDTCH");
        assert!(ChanType::Pdtch.desc().pdch);
        assert!(!ChanType::TchF.desc().pdch);
    }

    #[test]
    fn test_chan_nr_encoding() {
        assert_eq!(ChanType::TchF.chan_nr(3), 0x0b);
        assert_eq!(ChanType::Rach.chan_nr(0), 0x88);
        assert_eq!(ChanType::Sdcch8_5.chan_nr(2), 0x6a);
        assert_eq!(ChanType::SacchTf.desc().link_id, 0x40);
    }

    #[test]
    fn test_subslots() {
        assert_eq!(ChanType::TchH0.subslot(), 0);
        assert_eq!(ChanType::TchH1.subslot(), 1);
        assert_eq!(ChanType::Sdcch4_2.subslot(), 2);
        assert_eq!(ChanType::Sdcch8_7.subslot(), 7);
        assert_eq!(ChanType::Sacch8_4.subslot(), 4);
        assert_eq!(ChanType::TchF.subslot(), 0);
    }
}
