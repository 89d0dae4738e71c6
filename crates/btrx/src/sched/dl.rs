// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Downlink: per-channel ready-to-send and transmit routines.
//!
//! A transmit routine is called once per frame with the burst id from
//! the multiframe. At burst id 0 it pulls the next primitive from the
//! queue and encodes a fresh block into the channel's burst buffer; all
//! ids then emit the mapped 148-bit burst. Traffic channels shift their
//! buffer diagonally so consecutive blocks share bursts.

use super::chan::{ChanState, ChanType};
use super::{compose_ph_data_ind, DlPrim, Scheduler};
use crate::bts::{RslCmode, TchMode};
use crate::coding::map::compose_burst;
use crate::coding::tables::FCCH_BURST;
use crate::coding::{amr, pdtch, sch, tch, xcch};
use crate::gsm::{fn_delta, GsmTime};
use crate::l1sap::{L1Up, L1sapUp, MphInfo};

/// Ready-to-send dispatch (burst id 0 only, checked by the caller).
pub(super) fn rts_fn(sched: &mut Scheduler, tn: u8, fnr: u32, chan: ChanType, up: &mut dyn L1sapUp) {
    use ChanType::*;
    match chan {
        Idle | Fcch | Sch | Rach => {}
        TchF => rts_tch_common(sched, tn, fnr, chan, true, up),
        TchH0 | TchH1 => {
            // FACCH/H may only start on frames where fn mod 26 is 4, 5,
            // 13, 14, 21 or 22.
            let facch = ((fnr % 26) >> 2) & 1 == 1;
            rts_tch_common(sched, tn, fnr, chan, facch, up);
        }
        _ => {
            let desc = chan.desc();
            log::debug!(
                "[SCHED] PH-RTS.ind chan={} fn={} ts={} trx={}",
                desc.name,
                fnr,
                tn,
                sched.trx_num
            );
            up.l1sap_up(L1Up::PhRtsInd {
                chan_nr: chan.chan_nr(tn),
                link_id: desc.link_id,
                fnr,
            });
        }
    }
}

fn rts_tch_common(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    facch: bool,
    up: &mut dyn L1sapUp,
) {
    let desc = chan.desc();
    let chan_nr = chan.chan_nr(tn);
    if facch {
        up.l1sap_up(L1Up::PhRtsInd { chan_nr, link_id: desc.link_id, fnr });
    }
    if sched.ts[tn as usize].chan_state[chan as usize].rsl_cmode != RslCmode::Signalling {
        up.l1sap_up(L1Up::TchRtsInd { chan_nr, fnr });
    }
}

/// Transmit dispatch; returns 148 hard bits or `None` for no RF output.
pub(super) fn tx_fn(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    bid: u8,
    up: &mut dyn L1sapUp,
) -> Option<[u8; 148]> {
    use ChanType::*;
    match chan {
        Idle | Rach => None,
        Fcch => Some(FCCH_BURST),
        Sch => Some(tx_sch(sched, fnr)),
        Pdtch => tx_pdtch(sched, tn, fnr, bid),
        TchF => tx_tchf(sched, tn, fnr, chan, bid, up),
        TchH0 | TchH1 => tx_tchh(sched, tn, fnr, chan, bid, up),
        _ => tx_data(sched, tn, fnr, chan, bid, up),
    }
}

/// SCH: BSIC and reduced frame number, fresh every occurrence.
fn tx_sch(sched: &Scheduler, fnr: u32) -> [u8; 148] {
    let info = sch::sb_info(sched.bsic, GsmTime::from_fn(fnr));
    let coded = sch::encode(&info);
    sch::compose_burst(&coded)
}

/// Common xCCH transmit: BCCH, CCCH, SDCCH, SACCH and PTCCH.
fn tx_data(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    bid: u8,
    up: &mut dyn L1sapUp,
) -> Option<[u8; 148]> {
    let tsc = *sched.tsc_bits();
    let desc = chan.desc();
    let sacch = crate::l1sap::link_is_sacch(desc.link_id);

    if bid == 0 {
        let prim = sched.ts[tn as usize].dequeue_prim(tn, fnr, chan);
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        match prim {
            Some(DlPrim::PhData { payload, .. }) if payload.len() == 23 => {
                // Uplink SACCH silence shows up as DL periods with no
                // decoded UL block in between; tell L2 about it.
                if sacch {
                    st.lost = st.lost.saturating_add(1);
                    if st.lost > 1 {
                        let chan_nr = chan.chan_nr(tn);
                        up.l1sap_up(L1Up::MphInfoInd(MphInfo::Meas {
                            chan_nr,
                            ta_offs_qbits: 0,
                            ber10k: 10_000,
                            inv_rssi: 110,
                            ci_cb: 0,
                        }));
                        compose_ph_data_ind(sched, tn, 0, chan, Vec::new(), -110, 10_000, up);
                    }
                }
                let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
                let buf = st.dl_bursts.get_or_insert_with(|| vec![0u8; 4 * 116]);
                buf.fill(0);
                xcch::encode(buf, &payload);
            }
            Some(other) => {
                log::error!(
                    "[SCHED] {} prim has invalid payload ({:?}), dropping",
                    desc.name,
                    other.chan_nr()
                );
                st.dl_bursts = None;
                return None;
            }
            None => {
                log::info!(
                    "[SCHED] {} has not been served, no prim for trx={} ts={} fn={}",
                    desc.name,
                    sched.trx_num,
                    tn,
                    fnr
                );
                st.dl_bursts = None;
                return None;
            }
        }
    }

    let st = &sched.ts[tn as usize].chan_state[chan as usize];
    let buf = st.dl_bursts.as_ref()?;
    Some(compose_burst(&buf[bid as usize * 116..(bid as usize + 1) * 116], &tsc))
}

fn tx_pdtch(sched: &mut Scheduler, tn: u8, fnr: u32, bid: u8) -> Option<[u8; 148]> {
    let tsc = *sched.tsc_bits();
    let chan = ChanType::Pdtch;

    if bid == 0 {
        let prim = sched.ts[tn as usize].dequeue_prim(tn, fnr, chan);
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        match prim {
            Some(DlPrim::PhData { payload, .. }) => {
                let buf = st.dl_bursts.get_or_insert_with(|| vec![0u8; 4 * 116]);
                buf.fill(0);
                if let Err(e) = pdtch::encode(buf, &payload) {
                    log::error!("[SCHED] PDTCH block rejected: {}", e);
                    st.dl_bursts = None;
                    return None;
                }
            }
            _ => {
                log::info!(
                    "[SCHED] PDTCH has not been served, no prim for trx={} ts={} fn={}",
                    sched.trx_num,
                    tn,
                    fnr
                );
                st.dl_bursts = None;
                return None;
            }
        }
    }

    let st = &sched.ts[tn as usize].chan_state[chan as usize];
    let buf = st.dl_bursts.as_ref()?;
    Some(compose_burst(&buf[bid as usize * 116..(bid as usize + 1) * 116], &tsc))
}

/// What the common TCH dequeue produced for this block.
struct TchDl {
    speech: Option<Vec<u8>>,
    facch: Option<Vec<u8>>,
}

/// Dequeue and validate the TCH and/or FACCH primitive for one block.
/// `cmr_block` is the AMR phase flag: blocks carrying a CMR cannot also
/// switch the codec mode.
fn tx_tch_common(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    cmr_block: bool,
    up: &mut dyn L1sapUp,
) -> TchDl {
    // Missing uplink speech: send BFI substitutes after 5 lost blocks.
    let (rsl_cmode, tch_mode) = {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        let modes = (st.rsl_cmode, st.tch_mode);
        if modes.0 == RslCmode::Speech {
            st.lost = st.lost.saturating_add(1);
        }
        modes
    };
    if rsl_cmode == RslCmode::Speech && sched.ts[tn as usize].chan_state[chan as usize].lost > 5 {
        let st = &sched.ts[tn as usize].chan_state[chan as usize];
        let bfi = match tch_mode {
            TchMode::SpeechV1 if chan == ChanType::TchF => Some(tch::bfi_fr()),
            TchMode::SpeechV1 => Some(tch::bfi_hr()),
            TchMode::SpeechEfr if chan == ChanType::TchF => Some(tch::bfi_efr()),
            TchMode::SpeechAmr => {
                Some(amr::compose_payload(st.dl_cmr, st.codec[st.dl_ft as usize], true))
            }
            _ => None,
        };
        if let Some(payload) = bfi {
            log::warn!(
                "[SCHED] missing TCH bursts detected, sending BFI for {}",
                chan.desc().name
            );
            super::compose_tch_ind(sched, tn, 0, chan, payload, up);
        }
    }

    let msg1 = sched.ts[tn as usize].dequeue_prim(tn, fnr, chan);
    let msg2 = sched.ts[tn as usize].dequeue_prim(tn, fnr, chan);
    let mut speech = None;
    let mut facch = None;
    for msg in [msg1, msg2].into_iter().flatten() {
        match msg {
            DlPrim::Tch { payload, .. } => {
                if speech.is_some() {
                    log::error!("[SCHED] TCH twice for one block, dropping");
                } else {
                    speech = Some(payload);
                }
            }
            DlPrim::PhData { payload, .. } => {
                if facch.is_some() {
                    log::error!("[SCHED] FACCH twice for one block, dropping");
                } else {
                    facch = Some(payload);
                }
            }
        }
    }

    if let Some(f) = &facch {
        if f.len() != tch::MACBLOCK_LEN {
            log::error!("[SCHED] FACCH prim not 23 bytes (len={})", f.len());
            facch = None;
        }
    }

    // Validate the speech frame against the channel mode; FACCH takes
    // priority so a bad speech frame only costs itself.
    if facch.is_none() {
        if let Some(frame) = speech.take() {
            speech = validate_speech(sched, tn, fnr, chan, cmr_block, frame, rsl_cmode, tch_mode);
        }
    } else {
        speech = None;
    }

    TchDl { speech, facch }
}

#[allow(clippy::too_many_arguments)]
fn validate_speech(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    cmr_block: bool,
    frame: Vec<u8>,
    rsl_cmode: RslCmode,
    tch_mode: TchMode,
) -> Option<Vec<u8>> {
    let name = chan.desc().name;
    if rsl_cmode != RslCmode::Speech {
        log::warn!("[SCHED] {} dropping speech frame, not in speech mode (fn={})", name, fnr);
        return None;
    }
    match tch_mode {
        TchMode::SpeechV1 if chan == ChanType::TchF => {
            if frame.len() != tch::GSM_FR_BYTES || frame[0] >> 4 != 0xd {
                log::warn!("[SCHED] {} dropping bad FR frame (fn={})", name, fnr);
                return None;
            }
            Some(frame)
        }
        TchMode::SpeechV1 => {
            if frame.len() != tch::GSM_HR_BYTES || frame[0] & 0xf0 != 0 {
                log::warn!("[SCHED] {} dropping bad HR frame (fn={})", name, fnr);
                return None;
            }
            Some(frame)
        }
        TchMode::SpeechEfr if chan == ChanType::TchF => {
            if frame.len() != tch::GSM_EFR_BYTES || frame[0] >> 4 != 0xc {
                log::warn!("[SCHED] {} dropping bad EFR frame (fn={})", name, fnr);
                return None;
            }
            Some(frame)
        }
        TchMode::SpeechAmr => {
            let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
            let (cmr_codec, ft_codec, q, _) = match amr::decompose_payload(&frame) {
                Ok(parts) => parts,
                Err(e) => {
                    log::error!("[SCHED] {} invalid AMR payload: {}", name, e);
                    return None;
                }
            };
            if ft_codec == amr::FT_SID {
                // Remember the SID for DTX repetition.
                st.dtx_payload = Some(frame[2..].to_vec());
            } else {
                let set = &st.codec[..st.codecs as usize];
                let cmr = set.iter().position(|&c| c == cmr_codec);
                let ft = set.iter().position(|&c| c == ft_codec);
                match cmr {
                    Some(idx) if cmr_codec != 0x0f => {
                        st.dl_cmr = idx as u8;
                        crate::loops::amr_loop_set(st, false);
                    }
                    _ => crate::loops::amr_loop_set(st, true),
                }
                let Some(ft) = ft else {
                    log::error!(
                        "[SCHED] {} codec FT={} of RTP frame not in active set",
                        name,
                        ft_codec
                    );
                    return None;
                };
                if cmr_block && st.dl_ft != ft as u8 {
                    log::warn!(
                        "[SCHED] {} codec change to FT={} deferred to next frame",
                        name,
                        ft_codec
                    );
                    return None;
                }
                st.dl_ft = ft as u8;
            }
            if !q {
                log::warn!("[SCHED] {} dropping bad AMR frame (fn={})", name, fnr);
                return None;
            }
            Some(frame)
        }
        _ => {
            log::error!("[SCHED] {} invalid TCH mode", name);
            None
        }
    }
}

/// AMR downlink DTX per 26.093: repeat the buffered SID every 8 frames
/// starting 3 after the last real frame, NO_DATA when nothing buffered.
fn dtx_payload(st: &mut ChanState, fnr: u32) -> Option<(Vec<u8>, u8)> {
    if !st.dtx_dl {
        return None;
    }
    let due = match st.dtx_last_fn {
        None => true,
        Some(last) => {
            let threshold = if st.dtx_repeating { 8 } else { 3 };
            fn_delta(fnr, last) >= threshold
        }
    };
    if !due {
        return None;
    }
    st.dtx_repeating = true;
    st.dtx_last_fn = Some(fnr);
    match &st.dtx_payload {
        Some(sid) => Some((sid.clone(), amr::FT_SID)),
        None => Some((Vec::new(), amr::FT_NO_DATA)),
    }
}

fn tx_tchf(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    bid: u8,
    up: &mut dyn L1sapUp,
) -> Option<[u8; 148]> {
    let tsc = *sched.tsc_bits();

    if bid == 0 {
        let cmr_block = ((fnr + 4) % 26 >> 2) & 1 == 1;
        let dl = tx_tch_common(sched, tn, fnr, chan, cmr_block, up);
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        let tch_mode = st.tch_mode;

        // Shift the diagonal window by one block.
        if st.dl_bursts.is_none() {
            st.dl_bursts = Some(vec![0u8; 8 * 116]);
        } else {
            let buf = st.dl_bursts.as_mut().expect("checked");
            buf.copy_within(4 * 116.., 0);
            buf[4 * 116..].fill(0);
        }
        let amr_id = if cmr_block { st.dl_cmr } else { st.dl_ft };

        if let Some(mac) = dl.facch {
            let buf = st.dl_bursts.as_mut().expect("allocated above");
            if tch::tch_fr_encode(buf, &mac, true).is_err() {
                log::error!("[SCHED] FACCH encode failed");
            }
        } else if let Some(frame) = dl.speech {
            let buf_mode = tch_mode;
            match buf_mode {
                TchMode::SpeechAmr => {
                    let (_, ft, _, speech) =
                        amr::decompose_payload(&frame).expect("validated");
                    let (data, ft) = if ft == amr::FT_SID {
                        (speech.to_vec(), amr::FT_SID)
                    } else {
                        (speech.to_vec(), st.codec[st.dl_ft as usize])
                    };
                    st.dtx_repeating = false;
                    st.dtx_last_fn = Some(fnr);
                    let buf = st.dl_bursts.as_mut().expect("allocated above");
                    if let Err(e) = amr::afs_encode(buf, &data, ft, amr_id) {
                        log::error!("[SCHED] AFS encode failed: {}", e);
                    }
                }
                _ => {
                    let buf = st.dl_bursts.as_mut().expect("allocated above");
                    if let Err(e) = tch::tch_fr_encode(buf, &frame, true) {
                        log::error!("[SCHED] TCH/F encode failed: {}", e);
                    }
                }
            }
        } else if tch_mode == TchMode::SpeechAmr {
            if let Some((data, ft)) = dtx_payload(st, fnr) {
                let buf = st.dl_bursts.as_mut().expect("allocated above");
                if let Err(e) = amr::afs_encode(buf, &data, ft, amr_id) {
                    log::error!("[SCHED] AFS DTX encode failed: {}", e);
                }
            } else {
                log::info!(
                    "[SCHED] TCH/F has not been served, no prim for trx={} ts={} fn={}",
                    sched.trx_num,
                    tn,
                    fnr
                );
            }
        } else {
            log::info!(
                "[SCHED] TCH/F has not been served, no prim for trx={} ts={} fn={}",
                sched.trx_num,
                tn,
                fnr
            );
        }
    }

    let st = &sched.ts[tn as usize].chan_state[chan as usize];
    let buf = st.dl_bursts.as_ref()?;
    Some(compose_burst(&buf[bid as usize * 116..(bid as usize + 1) * 116], &tsc))
}

fn tx_tchh(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    bid: u8,
    up: &mut dyn L1sapUp,
) -> Option<[u8; 148]> {
    let tsc = *sched.tsc_bits();

    if bid == 0 {
        let cmr_block = ((fnr + 4) % 26 >> 2) & 1 == 1;
        let mut dl = tx_tch_common(sched, tn, fnr, chan, cmr_block, up);

        // FACCH/H must start on an even-aligned frame.
        if dl.facch.is_some() && cmr_block {
            log::error!(
                "[SCHED] {} cannot transmit FACCH starting on odd frames, fix RTS handling",
                chan.desc().name
            );
            dl.facch = None;
        }

        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        let tch_mode = st.tch_mode;

        // Shift the 6-burst window by one half-rate block (2 bursts).
        if st.dl_bursts.is_none() {
            st.dl_bursts = Some(vec![0u8; 6 * 116]);
        } else {
            let ongoing = st.dl_ongoing_facch;
            let buf = st.dl_bursts.as_mut().expect("checked");
            buf.copy_within(2 * 116.., 0);
            if ongoing {
                // Keep the second half of the spread FACCH in place.
                buf[4 * 116..].fill(0);
            } else {
                buf[2 * 116..4 * 116].fill(0);
                buf[4 * 116..].fill(0);
            }
        }
        let amr_id = if cmr_block { st.dl_cmr } else { st.dl_ft };

        if let Some(mac) = dl.facch {
            let buf = st.dl_bursts.as_mut().expect("allocated above");
            if tch::tch_hr_encode(buf, &mac).is_err() {
                log::error!("[SCHED] FACCH/H encode failed");
            }
            st.dl_ongoing_facch = true;
        } else if st.dl_ongoing_facch {
            // Second half of the FACCH is already in the buffer.
            st.dl_ongoing_facch = false;
        } else if let Some(frame) = dl.speech {
            match tch_mode {
                TchMode::SpeechAmr => {
                    let (_, ft, _, speech) =
                        amr::decompose_payload(&frame).expect("validated");
                    let (data, ft) = if ft == amr::FT_SID {
                        (speech.to_vec(), amr::FT_SID)
                    } else {
                        (speech.to_vec(), st.codec[st.dl_ft as usize])
                    };
                    st.dtx_repeating = false;
                    st.dtx_last_fn = Some(fnr);
                    let buf = st.dl_bursts.as_mut().expect("allocated above");
                    if let Err(e) = amr::ahs_encode(buf, &data, ft, amr_id) {
                        log::error!("[SCHED] AHS encode failed: {}", e);
                    }
                }
                _ => {
                    let buf = st.dl_bursts.as_mut().expect("allocated above");
                    if let Err(e) = tch::tch_hr_encode(buf, &frame) {
                        log::error!("[SCHED] TCH/H encode failed: {}", e);
                    }
                }
            }
        } else if tch_mode == TchMode::SpeechAmr {
            if let Some((data, ft)) = dtx_payload(st, fnr) {
                let buf = st.dl_bursts.as_mut().expect("allocated above");
                if let Err(e) = amr::ahs_encode(buf, &data, ft, amr_id) {
                    log::error!("[SCHED] AHS DTX encode failed: {}", e);
                }
            }
        } else {
            log::info!(
                "[SCHED] {} has not been served, no prim for trx={} ts={} fn={}",
                chan.desc().name,
                sched.trx_num,
                tn,
                fnr
            );
        }
    }

    let st = &sched.ts[tn as usize].chan_state[chan as usize];
    let buf = st.dl_bursts.as_ref()?;
    Some(compose_burst(&buf[bid as usize * 116..(bid as usize + 1) * 116], &tsc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bts::Pchan;
    use crate::coding::tables::SCH_TRAIN;
    use crate::l1sap::PrimSink;
    use crate::sched::Scheduler;

    #[test]
    fn test_fcch_and_sch() {
        let mut s = Scheduler::new(0, true, 0x3f);
        s.set_pchan(0, Pchan::Ccch).unwrap();
        let mut sink = PrimSink::default();
        let fcch = s.dl_burst(0, 0, &mut sink).unwrap();
        assert_eq!(fcch, FCCH_BURST);
        let sch_burst = s.dl_burst(0, 1, &mut sink).unwrap();
        assert_eq!(&sch_burst[42..106], &SCH_TRAIN[..]);
    }

    #[test]
    fn test_bcch_block_emission() {
        let mut s = Scheduler::new(0, true, 63);
        s.set_pchan(0, Pchan::Ccch).unwrap();
        let mut sink = PrimSink::default();
        let si1: Vec<u8> = (0..23).map(|i| if i == 0 { 0x55 } else { 0x2b }).collect();
        s.ph_data_req(0x80, 0x00, 2, si1.clone());

        // BCCH occupies fn 2..=5 of the 51-multiframe.
        let mut bursts = Vec::new();
        for fnr in 2..=5u32 {
            bursts.push(s.dl_burst(0, fnr, &mut sink).unwrap());
        }
        // All four bursts must carry the stealing flags of a control
        // block and decode back to SI1.
        let mut payloads = vec![0i8; 4 * 116];
        for (i, b) in bursts.iter().enumerate() {
            let split = crate::coding::map::split_burst(
                &b.iter().map(|&x| crate::coding::ubit_to_sbit(x)).collect::<Vec<_>>(),
            );
            payloads[i * 116..(i + 1) * 116].copy_from_slice(&split);
        }
        let (res, _) = crate::coding::xcch::decode(&payloads);
        assert_eq!(res.unwrap().to_vec(), si1);
    }

    #[test]
    fn test_rts_only_on_bid0() {
        let mut s = Scheduler::new(0, true, 63);
        s.set_pchan(0, Pchan::Ccch).unwrap();
        let mut sink = PrimSink::default();
        s.rts(0, 2, &mut sink); // BCCH bid 0
        assert_eq!(sink.prims.len(), 1);
        s.rts(0, 3, &mut sink); // BCCH bid 1
        assert_eq!(sink.prims.len(), 1);
    }
}
