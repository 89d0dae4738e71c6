// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Uplink control loops: MS power, timing advance and AMR link
//! adaptation.
//!
//! The power and TA loops run once per SACCH period on the averaged
//! measurements; the AMR loop accumulates BER over 48 speech frames and
//! walks the codec mode request up or down through the active set's
//! threshold/hysteresis table.

use crate::l1sap::{L1Up, L1sapUp, MphInfo};
use crate::sched::chan::ChanState;
use crate::sched::LoopConfig;

/// RSSI dead-band of the MS power loop, in dB.
const MS_POWER_DEADBAND_DB: i32 = 2;
/// ToA dead-band of the TA loop: one symbol in 1/256 units.
const TA_DEADBAND_TOA256: i32 = 256;
/// AMR loop averaging window, in frames.
const AMR_WINDOW_FRAMES: u32 = 48;

/// Enable or disable the AMR adaptation loop; enabling resets the BER
/// window.
pub fn amr_loop_set(st: &mut ChanState, on: bool) {
    if st.amr_loop && !on {
        st.amr_loop = false;
        return;
    }
    if !st.amr_loop && on {
        st.amr_loop = true;
        st.ber10k_acc = 0;
        st.ber_frames = 0;
    }
}

/// Feed one decoded AMR block's BER into the adaptation loop.
/// Half-rate channels count double, as in a full-rate window.
pub fn amr_input(st: &mut ChanState, ber10k: u16, half_rate: bool) {
    if !st.amr_loop {
        return;
    }
    // Wait until the MS actually uses the requested codec.
    if st.ul_ft != st.dl_cmr {
        return;
    }
    let w = if half_rate { 2 } else { 1 };
    st.ber_frames += w;
    st.ber10k_acc += u32::from(ber10k) * w;
    if st.ber_frames < AMR_WINDOW_FRAMES {
        return;
    }
    let avg = st.ber10k_acc / st.ber_frames;
    st.ber_frames = 0;
    st.ber10k_acc = 0;

    log::debug!("[LOOP] AMR avg BER {}e-4 at codec id {}", avg, st.dl_cmr);

    if st.dl_cmr > 0 {
        // Thresholds are BER x100; ours is x10000.
        let thr = u32::from(st.codec_thr[st.dl_cmr as usize - 1].0) * 100;
        if avg > thr {
            log::debug!("[LOOP] degrading codec id {} -> {}", st.dl_cmr, st.dl_cmr - 1);
            st.dl_cmr -= 1;
        }
    } else if st.dl_cmr < st.codecs.saturating_sub(1) {
        let (thr, hyst) = st.codec_thr[st.dl_cmr as usize];
        let limit = (u32::from(thr) * 100).saturating_sub(u32::from(hyst) * 100);
        if avg < limit {
            log::debug!("[LOOP] upgrading codec id {} -> {}", st.dl_cmr, st.dl_cmr + 1);
            st.dl_cmr += 1;
        }
    }
}

/// One SACCH period completed on an lchan's main channel: report the
/// averaged measurements upward and drive the MS power / TA loops.
pub fn sacch_period(st: &mut ChanState, chan_nr: u8, cfg: &LoopConfig, up: &mut dyn L1sapUp) {
    let rssi = st.meas.avg_rssi();
    let toa256 = st.meas.avg_toa256();
    let ber10k = st.meas.avg_ber10k();
    let ci_cb = st.meas.avg_ci_cb();
    st.meas.clear();

    up.l1sap_up(L1Up::MphInfoInd(MphInfo::Meas {
        chan_nr,
        ta_offs_qbits: toa256 / 64,
        ber10k,
        inv_rssi: rssi.unsigned_abs(),
        ci_cb,
    }));

    if st.loops_fixed {
        return;
    }

    if cfg.ms_power_loop && rssi != -128 {
        let diff = i32::from(rssi) - i32::from(cfg.ms_power_target_dbm);
        let mut level = st.ms_power_level;
        if diff > MS_POWER_DEADBAND_DB {
            // Too loud: higher level number means less output power.
            level = level.saturating_add(1).min(cfg.ms_power_max);
        } else if -diff > MS_POWER_DEADBAND_DB {
            level = level.saturating_sub(1).max(cfg.ms_power_min);
        }
        if level != st.ms_power_level {
            log::info!(
                "[LOOP] MS power chan_nr={:#04x}: rssi {} target {} -> level {}",
                chan_nr,
                rssi,
                cfg.ms_power_target_dbm,
                level
            );
            st.ms_power_level = level;
            up.l1sap_up(L1Up::MphInfoInd(MphInfo::MsPowerCtrl { chan_nr, level }));
        }
    }

    if cfg.ta_loop {
        let mut ta = st.ta;
        if i32::from(toa256) > TA_DEADBAND_TOA256 {
            ta = ta.saturating_add(1).min(63);
        } else if i32::from(toa256) < -TA_DEADBAND_TOA256 {
            ta = ta.saturating_sub(1);
        }
        if ta != st.ta {
            log::info!(
                "[LOOP] TA chan_nr={:#04x}: toa256 {} -> ta {}",
                chan_nr,
                toa256,
                ta
            );
            st.ta = ta;
            up.l1sap_up(L1Up::MphInfoInd(MphInfo::TimingAdvance { chan_nr, ta }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::l1sap::PrimSink;

    fn meas_chan(rssi: i8, toa256: i16) -> ChanState {
        let mut st = ChanState::default();
        st.meas.rssi_sum = i32::from(rssi) * 4;
        st.meas.rssi_num = 4;
        st.meas.toa256_sum = i32::from(toa256) * 4;
        st.meas.toa_num = 4;
        st.meas.ber_num = 4;
        st
    }

    fn cfg() -> LoopConfig {
        LoopConfig {
            ms_power_loop: true,
            ms_power_target_dbm: -75,
            ta_loop: true,
            ms_power_min: 0,
            ms_power_max: 30,
        }
    }

    #[test]
    fn test_ms_power_dead_band() {
        let mut sink = PrimSink::default();
        // Within the dead band: no command.
        let mut st = meas_chan(-74, 0);
        st.ms_power_level = 10;
        sacch_period(&mut st, 0x09, &cfg(), &mut sink);
        assert_eq!(st.ms_power_level, 10);

        // Too strong: back off one step.
        let mut st = meas_chan(-60, 0);
        st.ms_power_level = 10;
        sacch_period(&mut st, 0x09, &cfg(), &mut sink);
        assert_eq!(st.ms_power_level, 11);

        // Too weak: one step up.
        let mut st = meas_chan(-100, 0);
        st.ms_power_level = 10;
        sacch_period(&mut st, 0x09, &cfg(), &mut sink);
        assert_eq!(st.ms_power_level, 9);
        assert!(sink
            .prims
            .iter()
            .any(|p| matches!(p, L1Up::MphInfoInd(MphInfo::MsPowerCtrl { level: 9, .. }))));
    }

    #[test]
    fn test_ta_loop_clamps() {
        let mut sink = PrimSink::default();
        let mut st = meas_chan(-75, 1000);
        st.ta = 63;
        sacch_period(&mut st, 0x09, &cfg(), &mut sink);
        assert_eq!(st.ta, 63); // clamped at the top

        let mut st = meas_chan(-75, -1000);
        st.ta = 0;
        sacch_period(&mut st, 0x09, &cfg(), &mut sink);
        assert_eq!(st.ta, 0); // clamped at the bottom

        let mut st = meas_chan(-75, 500);
        st.ta = 5;
        sacch_period(&mut st, 0x09, &cfg(), &mut sink);
        assert_eq!(st.ta, 6);
    }

    #[test]
    fn test_fixed_lchan_freezes_loops() {
        let mut sink = PrimSink::default();
        let mut st = meas_chan(-50, 1000);
        st.ms_power_level = 10;
        st.ta = 5;
        st.loops_fixed = true;
        sacch_period(&mut st, 0x09, &cfg(), &mut sink);
        assert_eq!(st.ms_power_level, 10);
        assert_eq!(st.ta, 5);
    }

    #[test]
    fn test_amr_loop_walks_modes() {
        let mut st = ChanState::default();
        st.codec = [0, 2, 5, 7];
        st.codecs = 4;
        st.codec_thr = [(20, 10), (30, 10), (40, 10), (0, 0)];
        st.dl_cmr = 1;
        st.ul_ft = 1;
        amr_loop_set(&mut st, true);

        // High BER for a whole window: degrade.
        for _ in 0..48 {
            amr_input(&mut st, 5000, false);
        }
        assert_eq!(st.dl_cmr, 0);

        // Clean channel: upgrade again (below threshold - hysteresis).
        st.ul_ft = 0;
        for _ in 0..48 {
            amr_input(&mut st, 100, false);
        }
        assert_eq!(st.dl_cmr, 1);
    }

    #[test]
    fn test_amr_loop_waits_for_ms() {
        let mut st = ChanState::default();
        st.codec = [0, 2, 5, 7];
        st.codecs = 4;
        st.codec_thr = [(20, 10); 4];
        st.dl_cmr = 1;
        st.ul_ft = 0; // MS not yet on the requested codec
        amr_loop_set(&mut st, true);
        for _ in 0..96 {
            amr_input(&mut st, 5000, false);
        }
        assert_eq!(st.dl_cmr, 1);
    }
}
