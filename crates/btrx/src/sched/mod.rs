// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The multiframe TDMA scheduler.
//!
//! One [`Scheduler`] per TRX. On every frame tick it walks the eight
//! timeslots, looks up the owning channel in the timeslot's multiframe,
//! emits ready-to-send indications ahead of time, pulls queued downlink
//! primitives through the channel codecs into 148-bit bursts, and feeds
//! received uplink bursts into the per-channel accumulators until a
//! block completes and decodes.
//!
//! Everything here is single-threaded; the reactor owns the scheduler
//! exclusively (no locks, no interior mutability).

pub mod chan;
pub mod mframe;

mod dl;
mod ul;

use crate::bts::{CipherKey, Pchan, RslCmode, TchMode};
use crate::cipher::a5_keystream;
use crate::coding::tables::TSC;
use crate::config::{HYPERFRAME, PRIM_FN_AHEAD_MAX};
use crate::gsm::{fn_delta, fn_sub};
use crate::l1sap::{link_is_sacch, L1Up, L1sapUp, MphInfo};
use chan::{ChanState, ChanType, ALL_CHANS, CHAN_MAX};
use mframe::Mframe;
use std::collections::VecDeque;

/// A queued downlink primitive.
#[derive(Debug, Clone)]
pub enum DlPrim {
    PhData { chan_nr: u8, link_id: u8, fnr: u32, payload: Vec<u8> },
    Tch { chan_nr: u8, fnr: u32, payload: Vec<u8> },
}

impl DlPrim {
    fn fnr(&self) -> u32 {
        match self {
            DlPrim::PhData { fnr, .. } | DlPrim::Tch { fnr, .. } => *fnr,
        }
    }

    fn chan_nr(&self) -> u8 {
        match self {
            DlPrim::PhData { chan_nr, .. } | DlPrim::Tch { chan_nr, .. } => *chan_nr,
        }
    }

    fn link_id(&self) -> u8 {
        match self {
            DlPrim::PhData { link_id, .. } => *link_id,
            DlPrim::Tch { .. } => 0,
        }
    }
}

/// Scheduler state of one timeslot.
pub struct SchedTs {
    /// Selected multiframe, `None` until a pchan is configured.
    pub mf: Option<&'static Mframe>,
    /// Last uplink frame number processed (catch-up anchor).
    pub mf_last_fn: u32,
    /// Downlink primitive queue.
    pub dl_prims: VecDeque<DlPrim>,
    /// Per-channel state, indexed by `ChanType as usize`.
    pub chan_state: [ChanState; CHAN_MAX],
}

impl Default for SchedTs {
    fn default() -> Self {
        Self {
            mf: None,
            mf_last_fn: 0,
            dl_prims: VecDeque::new(),
            chan_state: std::array::from_fn(|_| ChanState::default()),
        }
    }
}

impl SchedTs {
    fn is_pdch(&self) -> bool {
        self.mf.map(|mf| mf.pchan == Pchan::Pdch).unwrap_or(false)
    }

    /// Pull the primitive due at `fnr` for `chan`, dropping stale and
    /// mismatched entries on the way (mirror of the C dequeue policy).
    fn dequeue_prim(&mut self, tn: u8, fnr: u32, chan: ChanType) -> Option<DlPrim> {
        let mut i = 0;
        while i < self.dl_prims.len() {
            let prim = &self.dl_prims[i];
            let prim_fn = fn_delta(prim.fnr(), fnr);
            if prim_fn > PRIM_FN_AHEAD_MAX {
                log::warn!(
                    "[SCHED] prim for ts={} at fn={} out of range (current fn={}); \
                     if this persists, increase rts-advance",
                    tn,
                    prim.fnr(),
                    fnr
                );
                self.dl_prims.remove(i);
                continue;
            }
            if prim_fn != 0 {
                i += 1;
                continue;
            }
            let prim = &self.dl_prims[i];
            let want_nr = chan.chan_nr(tn);
            let want_link = chan.desc().link_id;
            if prim.chan_nr() != want_nr || (prim.link_id() & 0xc0) != want_link {
                log::error!(
                    "[SCHED] prim for ts={} fn={} has chan_nr={:#04x} link_id={:#04x}, \
                     expecting chan_nr={:#04x} link_id={:#04x}",
                    tn,
                    fnr,
                    prim.chan_nr(),
                    prim.link_id(),
                    want_nr,
                    want_link
                );
                self.dl_prims.remove(i);
                return None;
            }
            return self.dl_prims.remove(i);
        }
        None
    }
}

/// An uplink burst handed in by the TRXD receiver.
#[derive(Debug, Clone)]
pub struct UlBurst {
    pub tn: u8,
    pub fnr: u32,
    pub rssi: i8,
    pub toa256: i16,
    pub ci_cb: Option<i16>,
    /// 148 soft bits; empty for a NOPE indication.
    pub bits: Vec<i8>,
}

/// Radio-control side effects requested by scheduler operations; the
/// caller turns these into TRXC commands.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedActions {
    pub set_handover: Vec<(u8, u8, bool)>, // (tn, ss, enable)
}

/// Loop configuration shared by all channels of a TRX.
#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    pub ms_power_loop: bool,
    pub ms_power_target_dbm: i8,
    pub ta_loop: bool,
    pub ms_power_min: u8,
    pub ms_power_max: u8,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            ms_power_loop: false,
            ms_power_target_dbm: -75,
            ta_loop: true,
            ms_power_min: 0,
            ms_power_max: 30,
        }
    }
}

/// The per-TRX layer-1 scheduler.
pub struct Scheduler {
    pub trx_num: u8,
    /// The BCCH carrier substitutes dummy bursts to keep RF continuous.
    pub is_c0: bool,
    pub bsic: u8,
    /// Default training sequence (BCC of the BSIC).
    pub tsc: u8,
    pub loop_cfg: LoopConfig,
    pub ts: [SchedTs; 8],
}

impl Scheduler {
    pub fn new(trx_num: u8, is_c0: bool, bsic: u8) -> Self {
        Self {
            trx_num,
            is_c0,
            bsic,
            tsc: bsic & 7,
            loop_cfg: LoopConfig::default(),
            ts: Default::default(),
        }
    }

    /// Select the multiframe for a timeslot. Fails for combinations the
    /// scheduler has no layout for.
    pub fn set_pchan(&mut self, tn: u8, pchan: Pchan) -> Result<(), crate::Error> {
        let ts = &mut self.ts[tn as usize];
        match mframe::lookup(pchan, tn) {
            Some(mf) => {
                ts.mf = Some(mf);
                log::info!(
                    "[SCHED] configuring multiframe {} trx={} ts={}",
                    mf.name,
                    self.trx_num,
                    tn
                );
                Ok(())
            }
            None => {
                log::warn!(
                    "[SCHED] no multiframe for {:?} trx={} ts={}",
                    pchan,
                    self.trx_num,
                    tn
                );
                Err(crate::Error::BadConfig(format!("unsupported pchan {:?}", pchan)))
            }
        }
    }

    /// Activate or deactivate all scheduler channels matching a chan_nr
    /// and link id. Burst buffers are dropped so a reactivated channel
    /// starts cleanly at burst 0.
    pub fn set_lchan(
        &mut self,
        chan_nr: u8,
        link_id: u8,
        active: bool,
        actions: &mut SchedActions,
    ) -> Result<(), crate::Error> {
        let tn = chan_nr & 7;
        let ts = &mut self.ts[tn as usize];
        let is_pdch_ts = ts.is_pdch();
        let mut hit = false;
        for chan in ALL_CHANS {
            let desc = chan.desc();
            if desc.pdch != is_pdch_ts {
                continue;
            }
            if desc.chan_nr == (chan_nr & 0xf8) && desc.link_id == link_id {
                hit = true;
                let st = &mut ts.chan_state[chan as usize];
                if st.active == active {
                    continue;
                }
                log::info!(
                    "[SCHED] {} {} on trx={} ts={}",
                    if active { "activating" } else { "deactivating" },
                    desc.name,
                    self.trx_num,
                    tn
                );
                *st = ChanState::default();
                st.active = active;
            }
        }
        if !active {
            actions
                .set_handover
                .push((tn, crate::l1sap::chan_nr_ss(chan_nr), false));
        }
        if hit {
            Ok(())
        } else {
            Err(crate::Error::BadConfig(format!("no channel for chan_nr {:#04x}", chan_nr)))
        }
    }

    /// Set channel mode (and the AMR codec set) on all main-link
    /// channels matching the chan_nr.
    pub fn set_mode(
        &mut self,
        chan_nr: u8,
        rsl_cmode: RslCmode,
        tch_mode: TchMode,
        amr: &crate::bts::AmrConfig,
        handover: bool,
        actions: &mut SchedActions,
    ) -> Result<(), crate::Error> {
        let tn = chan_nr & 7;
        let ts = &mut self.ts[tn as usize];
        if ts.is_pdch() {
            return Ok(());
        }
        let mut hit = false;
        for chan in ALL_CHANS {
            let desc = chan.desc();
            if desc.chan_nr == (chan_nr & 0xf8) && desc.link_id == 0x00 && !desc.pdch {
                hit = true;
                let st = &mut ts.chan_state[chan as usize];
                log::info!(
                    "[SCHED] set mode {:?}/{:?} handover={} on {} trx={} ts={}",
                    rsl_cmode,
                    tch_mode,
                    handover,
                    desc.name,
                    self.trx_num,
                    tn
                );
                st.rsl_cmode = rsl_cmode;
                st.tch_mode = tch_mode;
                st.ho_rach_detect = handover;
                if rsl_cmode == RslCmode::Speech && tch_mode == TchMode::SpeechAmr {
                    for (i, m) in amr.modes.iter().enumerate() {
                        st.codec[i] = m.mode;
                        st.codec_thr[i] = (m.threshold, m.hysteresis);
                    }
                    st.codecs = amr.num_modes;
                    st.ul_ft = amr.initial_idx;
                    st.dl_ft = amr.initial_idx;
                    st.ul_cmr = amr.initial_idx;
                    st.dl_cmr = amr.initial_idx;
                    st.ber10k_acc = 0;
                    st.ber_frames = 0;
                }
                // The SACCH of this lchan shares the modes for BFI logic.
                if let Some(sacch) = main_to_sacch(chan) {
                    let sst = &mut ts.chan_state[sacch as usize];
                    sst.rsl_cmode = rsl_cmode;
                    sst.tch_mode = tch_mode;
                }
            }
        }
        actions
            .set_handover
            .push((tn, crate::l1sap::chan_nr_ss(chan_nr), handover));
        if hit {
            Ok(())
        } else {
            Err(crate::Error::BadConfig(format!("no channel for chan_nr {:#04x}", chan_nr)))
        }
    }

    /// Install a cipher key for one direction on all channels of an
    /// lchan (PDCH carries no cipher).
    pub fn set_cipher(
        &mut self,
        chan_nr: u8,
        downlink: bool,
        algo: u8,
        key: [u8; 8],
    ) -> Result<(), crate::Error> {
        let tn = chan_nr & 7;
        let ts = &mut self.ts[tn as usize];
        if ts.is_pdch() {
            return Ok(());
        }
        let mut hit = false;
        for chan in ALL_CHANS {
            let desc = chan.desc();
            if desc.pdch {
                continue;
            }
            if desc.chan_nr == (chan_nr & 0xf8) {
                hit = true;
                let st = &mut ts.chan_state[chan as usize];
                let slot = if downlink { &mut st.dl_encr } else { &mut st.ul_encr };
                *slot = CipherKey { algo, key };
                log::info!(
                    "[SCHED] set A5/{} {} for {} trx={} ts={}",
                    algo,
                    if downlink { "downlink" } else { "uplink" },
                    desc.name,
                    self.trx_num,
                    tn
                );
            }
        }
        if hit {
            Ok(())
        } else {
            Err(crate::Error::BadConfig(format!("no channel for chan_nr {:#04x}", chan_nr)))
        }
    }

    /// Enable or disable downlink DTX on a traffic channel.
    pub fn set_dtx(&mut self, chan_nr: u8, enabled: bool) {
        let tn = chan_nr & 7;
        let ts = &mut self.ts[tn as usize];
        for chan in [ChanType::TchF, ChanType::TchH0, ChanType::TchH1] {
            if chan.desc().chan_nr == (chan_nr & 0xf8) {
                let st = &mut ts.chan_state[chan as usize];
                st.dtx_dl = enabled;
                if !enabled {
                    st.dtx_payload = None;
                    st.dtx_last_fn = None;
                }
            }
        }
    }

    /// Enqueue a PH-DATA.req; empty payloads are ignored.
    pub fn ph_data_req(&mut self, chan_nr: u8, link_id: u8, fnr: u32, payload: Vec<u8>) {
        if payload.is_empty() {
            return;
        }
        let tn = chan_nr & 7;
        log::debug!(
            "[SCHED] PH-DATA.req chan_nr={:#04x} link_id={:#04x} fn={} ts={} trx={}",
            chan_nr,
            link_id,
            fnr,
            tn,
            self.trx_num
        );
        self.ts[tn as usize].dl_prims.push_back(DlPrim::PhData { chan_nr, link_id, fnr, payload });
    }

    /// Enqueue a TCH.req; empty payloads are ignored.
    pub fn tch_req(&mut self, chan_nr: u8, fnr: u32, payload: Vec<u8>) {
        if payload.is_empty() {
            return;
        }
        let tn = chan_nr & 7;
        log::debug!(
            "[SCHED] TCH.req chan_nr={:#04x} fn={} ts={} trx={}",
            chan_nr,
            fnr,
            tn,
            self.trx_num
        );
        self.ts[tn as usize].dl_prims.push_back(DlPrim::Tch { chan_nr, fnr, payload });
    }

    /// Drop all queued primitives and per-channel state; lchan
    /// activation flags survive (the C equivalent re-reads them from
    /// the lchan layer on re-init).
    pub fn reset(&mut self) {
        log::info!("[SCHED] reset scheduler trx={}", self.trx_num);
        for ts in &mut self.ts {
            ts.dl_prims.clear();
            ts.mf_last_fn = 0;
            for st in &mut ts.chan_state {
                st.reset();
            }
        }
    }

    /// Emit ready-to-send indications for one timeslot at `fnr` (already
    /// advanced by rts-advance).
    pub fn rts(&mut self, tn: u8, fnr: u32, up: &mut dyn L1sapUp) {
        let Some(mf) = self.ts[tn as usize].mf else { return };
        if mf.period == 0 {
            return;
        }
        let frame = &mf.frames[(fnr % u32::from(mf.period)) as usize];
        if frame.dl_bid != 0 {
            return;
        }
        let chan = frame.dl_chan;
        let desc = chan.desc();
        if !desc.auto_active && !self.ts[tn as usize].chan_state[chan as usize].active {
            return;
        }
        dl::rts_fn(self, tn, fnr, chan, up);
    }

    /// Produce the downlink burst for one timeslot at `fnr` (already
    /// advanced by clock-advance). `None` means no RF output; on C0 the
    /// caller receives the dummy burst instead.
    pub fn dl_burst(&mut self, tn: u8, fnr: u32, up: &mut dyn L1sapUp) -> Option<[u8; 148]> {
        let bits = self.dl_burst_inner(tn, fnr, up);
        if bits.is_none() && self.is_c0 {
            return Some(crate::coding::tables::DUMMY_BURST);
        }
        bits
    }

    fn dl_burst_inner(&mut self, tn: u8, fnr: u32, up: &mut dyn L1sapUp) -> Option<[u8; 148]> {
        let mf = self.ts[tn as usize].mf?;
        if mf.period == 0 {
            return None;
        }
        let frame = &mf.frames[(fnr % u32::from(mf.period)) as usize];
        let chan = frame.dl_chan;
        let bid = frame.dl_bid;
        let desc = chan.desc();
        if !desc.auto_active && !self.ts[tn as usize].chan_state[chan as usize].active {
            return None;
        }

        let mut bits = dl::tx_fn(self, tn, fnr, chan, bid, up)?;

        // Cipher the 2x57 information positions; tails, flags and the
        // training sequence stay clear.
        let encr = self.ts[tn as usize].chan_state[chan as usize].dl_encr;
        if encr.algo != 0 {
            let (ks_dl, _) = a5_keystream(encr.algo, &encr.key, fnr);
            for i in 0..57 {
                bits[i + 3] ^= ks_dl[i];
                bits[i + 88] ^= ks_dl[i + 57];
            }
        }
        Some(bits)
    }

    /// Feed one received uplink burst (or NOPE) into the scheduler,
    /// catching up over missed frame numbers.
    pub fn ul_burst(&mut self, burst: &UlBurst, up: &mut dyn L1sapUp) {
        let tn = burst.tn as usize;
        if self.ts[tn].mf.is_none() {
            return;
        }

        // Walk from the last processed fn, feeding spare fill-ins so
        // multi-burst accumulators never stall on a gap.
        let elapsed = fn_delta(burst.fnr, self.ts[tn].mf_last_fn);
        let mut fnr = if elapsed < 10 && elapsed > 0 {
            (self.ts[tn].mf_last_fn + 1) % HYPERFRAME
        } else {
            burst.fnr
        };

        loop {
            let mf = self.ts[tn].mf.expect("checked above");
            if mf.period != 0 {
                let frame = &mf.frames[(fnr % u32::from(mf.period)) as usize];
                let chan = frame.ul_chan;
                let bid = frame.ul_bid;
                let desc = chan.desc();
                let st = &self.ts[tn].chan_state[chan as usize];
                let usable = (desc.auto_active || st.active) && chan != ChanType::Idle;
                if usable {
                    if fnr == burst.fnr {
                        let mut bits = burst.bits.clone();
                        let encr = self.ts[tn].chan_state[chan as usize].ul_encr;
                        if !bits.is_empty() && encr.algo != 0 {
                            let (_, ks_ul) = a5_keystream(encr.algo, &encr.key, fnr);
                            for i in 0..57 {
                                if ks_ul[i] != 0 {
                                    bits[i + 3] = -bits[i + 3];
                                }
                                if ks_ul[i + 57] != 0 {
                                    bits[i + 88] = -bits[i + 88];
                                }
                            }
                        }
                        let filled;
                        let slice: &[i8] = if bits.is_empty() {
                            filled = [0i8; 148];
                            &filled[..]
                        } else {
                            &bits[..]
                        };
                        ul::rx_fn(self, burst.tn, fnr, chan, bid, slice, burst.rssi, burst.toa256, burst.ci_cb, up);
                    } else if chan != ChanType::Rach
                        && !self.ts[tn].chan_state[chan as usize].ho_rach_detect
                    {
                        let spare = [0i8; 148];
                        ul::rx_fn(self, burst.tn, fnr, chan, bid, &spare, -128, 0, None, up);
                    }
                }
            }
            if fnr == burst.fnr {
                break;
            }
            fnr = (fnr + 1) % HYPERFRAME;
        }

        self.ts[tn].mf_last_fn = burst.fnr;
    }

    /// One frame tick: RTS lookahead plus downlink bursts for all
    /// timeslots. `fnr` is the real-time frame number; advances are
    /// applied here. Emits the TIME indication first.
    pub fn fn_tick(
        &mut self,
        fnr: u32,
        clock_advance: u32,
        rts_advance: u32,
        up: &mut dyn L1sapUp,
        mut out: impl FnMut(u8, u32, [u8; 148]),
    ) {
        crate::trace_fn!("Scheduler::fn_tick");
        if self.is_c0 {
            up.l1sap_up(L1Up::MphInfoInd(MphInfo::Time { fnr }));
        }
        let fnr = (fnr + clock_advance) % HYPERFRAME;
        for tn in 0..8u8 {
            self.rts(tn, (fnr + rts_advance) % HYPERFRAME, up);
            if let Some(bits) = self.dl_burst(tn, fnr, up) {
                out(tn, fnr, bits);
            }
        }
    }

    /// Training sequence bits for this TRX.
    pub(crate) fn tsc_bits(&self) -> &'static [u8; 26] {
        &TSC[self.tsc as usize]
    }
}

/// The SACCH companion of a main channel, if it has one.
fn main_to_sacch(chan: ChanType) -> Option<ChanType> {
    use ChanType::*;
    Some(match chan {
        TchF => SacchTf,
        TchH0 => SacchTh0,
        TchH1 => SacchTh1,
        Sdcch4_0 => Sacch4_0,
        Sdcch4_1 => Sacch4_1,
        Sdcch4_2 => Sacch4_2,
        Sdcch4_3 => Sacch4_3,
        Sdcch8_0 => Sacch8_0,
        Sdcch8_1 => Sacch8_1,
        Sdcch8_2 => Sacch8_2,
        Sdcch8_3 => Sacch8_3,
        Sdcch8_4 => Sacch8_4,
        Sdcch8_5 => Sacch8_5,
        Sdcch8_6 => Sacch8_6,
        Sdcch8_7 => Sacch8_7,
        _ => return None,
    })
}

/// The main channel a SACCH reports measurements for.
pub(crate) fn sacch_to_main(chan: ChanType) -> Option<ChanType> {
    use ChanType::*;
    Some(match chan {
        SacchTf => TchF,
        SacchTh0 => TchH0,
        SacchTh1 => TchH1,
        Sacch4_0 => Sdcch4_0,
        Sacch4_1 => Sdcch4_1,
        Sacch4_2 => Sdcch4_2,
        Sacch4_3 => Sdcch4_3,
        Sacch8_0 => Sdcch8_0,
        Sacch8_1 => Sdcch8_1,
        Sacch8_2 => Sdcch8_2,
        Sacch8_3 => Sdcch8_3,
        Sacch8_4 => Sdcch8_4,
        Sacch8_5 => Sdcch8_5,
        Sacch8_6 => Sdcch8_6,
        Sacch8_7 => Sdcch8_7,
        _ => return None,
    })
}

/// Compose and deliver a PH-DATA.ind; clears the SACCH loss counter.
pub(crate) fn compose_ph_data_ind(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    payload: Vec<u8>,
    rssi: i8,
    ber10k: u16,
    up: &mut dyn L1sapUp,
) {
    let desc = chan.desc();
    if link_is_sacch(desc.link_id) {
        sched.ts[tn as usize].chan_state[chan as usize].lost = 0;
    }
    up.l1sap_up(L1Up::PhDataInd {
        chan_nr: chan.chan_nr(tn),
        link_id: desc.link_id,
        fnr,
        rssi,
        ber10k,
        payload,
    });
}

/// Compose and deliver a TCH.ind; decrements the loss counter.
pub(crate) fn compose_tch_ind(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    payload: Vec<u8>,
    up: &mut dyn L1sapUp,
) {
    let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
    if st.lost > 0 {
        st.lost -= 1;
    }
    up.l1sap_up(L1Up::TchInd { chan_nr: chan.chan_nr(tn), fnr, payload });
}

/// Frame number `n` frames in the past.
pub(crate) fn fn_past(fnr: u32, n: u32) -> u32 {
    fn_sub(fnr, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::l1sap::PrimSink;

    #[test]
    fn test_set_pchan() {
        let mut s = Scheduler::new(0, true, 63);
        assert!(s.set_pchan(0, Pchan::Ccch).is_ok());
        assert!(s.set_pchan(1, Pchan::TchF).is_ok());
        assert!(s.set_pchan(2, Pchan::Unknown).is_err());
    }

    #[test]
    fn test_lchan_activation_respects_pdch_flag() {
        let mut s = Scheduler::new(0, false, 0);
        s.set_pchan(4, Pchan::Pdch).unwrap();
        let mut acts = SchedActions::default();
        // PDTCH activates on a PDCH timeslot...
        assert!(s.set_lchan(0x0c, 0x00, true, &mut acts).is_ok());
        assert!(s.ts[4].chan_state[ChanType::Pdtch as usize].active);
        // ...but the circuit TCH/F channel with the same cbits does not.
        assert!(!s.ts[4].chan_state[ChanType::TchF as usize].active);
    }

    #[test]
    fn test_stale_prim_dropped() {
        let mut s = Scheduler::new(0, true, 63);
        s.set_pchan(0, Pchan::Ccch).unwrap();
        let mut sink = PrimSink::default();
        // BCCH prim far in the future is discarded on dequeue.
        s.ph_data_req(0x80, 0x00, 5000, vec![0x2b; 23]);
        let burst = s.dl_burst(0, 2, &mut sink); // fn 2 = BCCH bid 0
        // C0 substitutes a dummy burst when the queue yields nothing.
        assert_eq!(burst.unwrap(), crate::coding::tables::DUMMY_BURST);
        assert!(s.ts[0].dl_prims.is_empty());
    }

    #[test]
    fn test_dummy_fill_only_on_c0() {
        let mut s0 = Scheduler::new(0, true, 63);
        let mut s1 = Scheduler::new(1, false, 63);
        for s in [&mut s0, &mut s1] {
            s.set_pchan(1, Pchan::TchF).unwrap();
        }
        let mut sink = PrimSink::default();
        assert!(s0.dl_burst(1, 0, &mut sink).is_some());
        assert!(s1.dl_burst(1, 0, &mut sink).is_none());
    }
}
