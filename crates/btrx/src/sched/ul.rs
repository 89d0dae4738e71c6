// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Uplink: per-channel receive routines.
//!
//! Bursts accumulate in the channel's soft-bit buffer keyed by burst id;
//! once the block's mask is complete it is decoded and delivered upward.
//! A block with missing bursts is discarded, but when its first burst
//! was seen the anchored frame number stays correct for reporting.

use super::chan::ChanType;
use super::{compose_ph_data_ind, compose_tch_ind, fn_past, sacch_to_main, Scheduler};
use crate::bts::{RslCmode, TchMode};
use crate::coding::map::split_burst;
use crate::coding::tch::TchDecoded;
use crate::coding::{amr, pdtch, rach, tch, xcch, BitCounts};
use crate::l1sap::{L1Up, L1sapUp};

/// Receive dispatch for one burst.
#[allow(clippy::too_many_arguments)]
pub(super) fn rx_fn(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    bid: u8,
    bits: &[i8],
    rssi: i8,
    toa256: i16,
    ci_cb: Option<i16>,
    up: &mut dyn L1sapUp,
) {
    use ChanType::*;

    // Handover access bursts replace the normal uplink once armed.
    if sched.ts[tn as usize].chan_state[chan as usize].ho_rach_detect {
        rx_rach(sched, tn, fnr, chan, bits, toa256, up);
        return;
    }

    match chan {
        Rach => rx_rach(sched, tn, fnr, chan, bits, toa256, up),
        Pdtch => rx_pdtch(sched, tn, fnr, bid, bits, rssi, toa256, ci_cb, up),
        TchF => rx_tchf(sched, tn, fnr, chan, bid, bits, rssi, toa256, ci_cb, up),
        TchH0 | TchH1 => rx_tchh(sched, tn, fnr, chan, bid, bits, rssi, toa256, ci_cb, up),
        Idle | Fcch | Sch | Bcch | Ccch => {}
        _ => rx_data(sched, tn, fnr, chan, bid, bits, rssi, toa256, ci_cb, up),
    }
}

fn rx_rach(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    bits: &[i8],
    toa256: i16,
    up: &mut dyn L1sapUp,
) {
    if bits.len() < rach::DATA_OFFSET + 36 {
        return;
    }
    log::info!("[SCHED] access burst on {} fn={} toa256={}", chan.desc().name, fnr, toa256);
    let (res, _) = rach::decode(&bits[rach::DATA_OFFSET..], sched.bsic);
    let ra = match res {
        Ok(ra) => ra,
        Err(_) => {
            log::info!("[SCHED] bad access burst at fn={} ({}/51)", fnr, fnr % 51);
            return;
        }
    };
    let acc_delay = (toa256.max(0) / 256) as u8;
    up.l1sap_up(L1Up::PhRachInd { chan_nr: chan.chan_nr(tn), ra, fnr, acc_delay });
}

/// Accumulate a burst into the channel's soft buffer at `slot` bursts
/// from its start; returns false until the block is complete.
#[allow(clippy::too_many_arguments)]
fn collect_burst(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    bid: u8,
    bits: &[i8],
    rssi: i8,
    toa256: i16,
    ci_cb: Option<i16>,
    bufsize: usize,
    slot_base: usize,
    last_bid: u8,
) -> bool {
    let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
    if bid == 0 {
        st.ul_mask = 0;
        st.ul_first_fn = fnr;
        st.clear_block_meas();
    }
    st.ul_mask |= 1 << bid;
    st.accumulate_burst_meas(rssi, toa256, ci_cb);

    let payload = split_burst(bits);
    let buf = st.ul_bursts.get_or_insert_with(|| vec![0i8; bufsize]);
    if bid == 0 {
        // Clear only the incoming block's part of the diagonal window.
        buf[slot_base * 116..].fill(0);
    }
    let off = (slot_base + bid as usize) * 116;
    buf[off..off + 116].copy_from_slice(&payload);

    bid == last_bid
}

/// Common meas bookkeeping once a block decoded (or failed).
fn meas_block(sched: &mut Scheduler, tn: u8, chan: ChanType, counts: &BitCounts) {
    let main = sacch_to_main(chan).unwrap_or(chan);
    let (rssi, toa, ci, ci_n) = {
        let st = &sched.ts[tn as usize].chan_state[chan as usize];
        (st.block_rssi(), st.block_toa256(), st.ci_cb_sum, st.ci_num)
    };
    let mst = &mut sched.ts[tn as usize].chan_state[main as usize];
    mst.meas.rssi_sum += i32::from(rssi);
    mst.meas.rssi_num += 1;
    mst.meas.toa256_sum += i32::from(toa);
    mst.meas.toa_num += 1;
    mst.meas.ber10k_sum += u32::from(counts.ber10k());
    mst.meas.ber_num += 1;
    if ci_n > 0 {
        mst.meas.ci_cb_sum += ci / ci_n as i32;
        mst.meas.ci_num += 1;
    }
}

/// A SACCH block closed: summarize the period and run the control loops.
fn sacch_period_done(sched: &mut Scheduler, tn: u8, chan: ChanType, up: &mut dyn L1sapUp) {
    let Some(main) = sacch_to_main(chan) else { return };
    let chan_nr = main.chan_nr(tn);
    let loop_cfg = sched.loop_cfg;
    let st = &mut sched.ts[tn as usize].chan_state[main as usize];
    crate::loops::sacch_period(st, chan_nr, &loop_cfg, up);
}

#[allow(clippy::too_many_arguments)]
fn rx_data(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    bid: u8,
    bits: &[i8],
    rssi: i8,
    toa256: i16,
    ci_cb: Option<i16>,
    up: &mut dyn L1sapUp,
) {
    log::debug!(
        "[SCHED] data received {} fn={} ts={} trx={} bid={}",
        chan.desc().name,
        fnr,
        tn,
        sched.trx_num,
        bid
    );
    if !collect_burst(sched, tn, fnr, chan, bid, bits, rssi, toa256, ci_cb, 4 * 116, 0, 3) {
        return;
    }

    let (mask, first_fn) = {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        let r = (st.ul_mask, st.ul_first_fn);
        st.ul_mask = 0;
        r
    };
    if mask & 0xf != 0xf {
        log::warn!(
            "[SCHED] incomplete data frame at fn={} for {}",
            first_fn,
            chan.desc().name
        );
        // Only blocks anchored by their first burst may decode short.
        if mask & 0x1 == 0 {
            return;
        }
    }

    let (res, counts) = {
        let st = &sched.ts[tn as usize].chan_state[chan as usize];
        xcch::decode(st.ul_bursts.as_ref().expect("buffer allocated"))
    };
    meas_block(sched, tn, chan, &counts);

    let (payload, len_ok) = match res {
        Ok(l2) => (l2.to_vec(), true),
        Err(_) => {
            log::warn!(
                "[SCHED] bad data frame at fn={} for {}",
                first_fn,
                chan.desc().name
            );
            (Vec::new(), false)
        }
    };
    if !len_ok {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        st.lost = st.lost.saturating_add(1);
    }

    let rssi_avg = sched.ts[tn as usize].chan_state[chan as usize].block_rssi();
    compose_ph_data_ind(sched, tn, first_fn, chan, payload, rssi_avg, counts.ber10k(), up);

    if crate::l1sap::link_is_sacch(chan.desc().link_id) {
        sacch_period_done(sched, tn, chan, up);
    }
}

#[allow(clippy::too_many_arguments)]
fn rx_pdtch(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    bid: u8,
    bits: &[i8],
    rssi: i8,
    toa256: i16,
    ci_cb: Option<i16>,
    up: &mut dyn L1sapUp,
) {
    let chan = ChanType::Pdtch;
    if !collect_burst(sched, tn, fnr, chan, bid, bits, rssi, toa256, ci_cb, 4 * 116, 0, 3) {
        return;
    }
    let mask = {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        let m = st.ul_mask;
        st.ul_mask = 0;
        m
    };
    if mask & 0xf != 0xf {
        log::warn!("[SCHED] incomplete PDTCH block ending at fn={}", fnr);
    }

    let (res, counts) = {
        let st = &sched.ts[tn as usize].chan_state[chan as usize];
        pdtch::decode(st.ul_bursts.as_ref().expect("buffer allocated"))
    };
    meas_block(sched, tn, chan, &counts);

    match res {
        Ok(block) => {
            // Leading validity octet for the PCU, block start fn.
            let mut l2 = Vec::with_capacity(block.l2.len() + 1);
            l2.push(7u8);
            l2.extend_from_slice(&block.l2);
            let rssi_avg = sched.ts[tn as usize].chan_state[chan as usize].block_rssi();
            compose_ph_data_ind(sched, tn, fn_past(fnr, 3), chan, l2, rssi_avg, counts.ber10k(), up);
        }
        Err(_) => {
            log::warn!("[SCHED] bad PDTCH block ending at fn={}", fnr);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn rx_tchf(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    bid: u8,
    bits: &[i8],
    rssi: i8,
    toa256: i16,
    ci_cb: Option<i16>,
    up: &mut dyn L1sapUp,
) {
    // Bursts land in the upper half of the 8-burst diagonal window.
    if !collect_burst(sched, tn, fnr, chan, bid, bits, rssi, toa256, ci_cb, 8 * 116, 4, 3) {
        return;
    }
    let mask = {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        let m = st.ul_mask;
        st.ul_mask = 0;
        m
    };
    if mask & 0xf != 0xf {
        log::warn!("[SCHED] incomplete TCH frame ending at fn={}", fnr);
    }

    let (rsl_cmode, tch_mode, cmi_block) = {
        let st = &sched.ts[tn as usize].chan_state[chan as usize];
        (st.rsl_cmode, st.tch_mode, ((fnr + 26 - 7) % 26 >> 2) & 1 == 1)
    };

    enum Out {
        Speech(Vec<u8>),
        Facch(Vec<u8>),
        Bad,
    }

    let (out, counts) = {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        let buf = st.ul_bursts.as_mut().expect("buffer allocated");
        let effective = if rsl_cmode != RslCmode::Speech { TchMode::SpeechV1 } else { tch_mode };
        let (decoded, counts) = match effective {
            TchMode::SpeechAmr => {
                let mut ft = st.ul_ft;
                let mut cmr = st.ul_cmr;
                let codecs: Vec<u8> = st.codec[..st.codecs as usize].to_vec();
                let (res, counts) = amr::afs_decode(buf, cmi_block, &codecs, &mut ft, &mut cmr);
                st.ul_ft = ft;
                // A request outside the active set degrades to mode 0.
                st.ul_cmr = if (cmr as usize) < codecs.len() { cmr } else { 0 };
                let mapped = res.map(|d| match d {
                    amr::AmrDecoded::Speech(data) => {
                        let mut payload =
                            amr::compose_payload(st.ul_cmr, codecs[st.ul_ft as usize], false);
                        let hdr = payload.len() - data.len();
                        payload[hdr..].copy_from_slice(&data);
                        TchDecoded::Speech(payload)
                    }
                    amr::AmrDecoded::Facch(mac) => TchDecoded::Facch(mac),
                });
                (mapped, counts)
            }
            TchMode::SpeechEfr => tch::tch_fr_decode(buf, true, true),
            _ => tch::tch_fr_decode(buf, true, false),
        };
        // Shift the window for the next diagonal block.
        let buf = st.ul_bursts.as_mut().expect("buffer allocated");
        buf.copy_within(4 * 116.., 0);

        let out = match decoded {
            Ok(TchDecoded::Speech(f)) => Out::Speech(f),
            Ok(TchDecoded::Facch(mac)) => Out::Facch(mac.to_vec()),
            Err(_) => Out::Bad,
        };
        (out, counts)
    };
    if tch_mode == TchMode::SpeechAmr {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        crate::loops::amr_input(st, counts.ber10k(), false);
    }
    meas_block(sched, tn, chan, &counts);

    let rssi_avg = sched.ts[tn as usize].chan_state[chan as usize].block_rssi();
    let block_fn = fn_past(fnr, 7);
    match out {
        Out::Facch(mac) => {
            compose_ph_data_ind(sched, tn, block_fn, chan, mac, rssi_avg, counts.ber10k(), up);
            if rsl_cmode == RslCmode::Speech {
                let bfi = bfi_payload(sched, tn, chan, tch_mode);
                if let Some(p) = bfi {
                    compose_tch_ind(sched, tn, block_fn, chan, p, up);
                }
            }
        }
        Out::Speech(frame) => {
            if rsl_cmode == RslCmode::Speech {
                compose_tch_ind(sched, tn, block_fn, chan, frame, up);
            }
        }
        Out::Bad => {
            log::warn!("[SCHED] bad TCH frame ending at fn={} for {}", fnr, chan.desc().name);
            if rsl_cmode == RslCmode::Speech {
                if let Some(p) = bfi_payload(sched, tn, chan, tch_mode) {
                    compose_tch_ind(sched, tn, block_fn, chan, p, up);
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn rx_tchh(
    sched: &mut Scheduler,
    tn: u8,
    fnr: u32,
    chan: ChanType,
    bid: u8,
    bits: &[i8],
    rssi: i8,
    toa256: i16,
    ci_cb: Option<i16>,
    up: &mut dyn L1sapUp,
) {
    // Bursts land in the top third of the 6-burst window.
    if !collect_burst(sched, tn, fnr, chan, bid, bits, rssi, toa256, ci_cb, 6 * 116, 4, 1) {
        return;
    }
    let mask = {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        let m = st.ul_mask;
        st.ul_mask = 0;
        m
    };
    if mask & 0x3 != 0x3 {
        log::warn!("[SCHED] incomplete TCH/H frame ending at fn={}", fnr);
    }

    let (rsl_cmode, tch_mode) = {
        let st = &sched.ts[tn as usize].chan_state[chan as usize];
        (st.rsl_cmode, st.tch_mode)
    };

    // Skip the second half of a detected FACCH/H.
    {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        if st.ul_ongoing_facch {
            st.ul_ongoing_facch = false;
            let buf = st.ul_bursts.as_mut().expect("buffer allocated");
            buf.copy_within(2 * 116.., 0);
            if rsl_cmode == RslCmode::Speech {
                if let Some(p) = bfi_payload(sched, tn, chan, tch_mode) {
                    let block_fn = fn_past(fnr, 10 + u32::from(fnr % 26 == 19) + u32::from(fnr % 26 == 20));
                    compose_tch_ind(sched, tn, block_fn, chan, p, up);
                }
            }
            return;
        }
    }

    enum Out {
        Speech(Vec<u8>),
        Facch(Vec<u8>),
        Bad,
    }

    let cmi_block = ((fnr + 26 - 10) % 26 >> 2) & 1 == 1;
    let (out, counts) = {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        let buf = st.ul_bursts.as_mut().expect("buffer allocated");
        let effective = if rsl_cmode != RslCmode::Speech { TchMode::SpeechV1 } else { tch_mode };
        let (decoded, counts) = match effective {
            TchMode::SpeechAmr => {
                let mut ft = st.ul_ft;
                let mut cmr = st.ul_cmr;
                let codecs: Vec<u8> = st.codec[..st.codecs as usize].to_vec();
                let (res, counts) = amr::ahs_decode(buf, cmi_block, &codecs, &mut ft, &mut cmr);
                st.ul_ft = ft;
                st.ul_cmr = if (cmr as usize) < codecs.len() { cmr } else { 0 };
                let mapped = res.map(|d| match d {
                    amr::AmrDecoded::Speech(data) => {
                        let mut payload =
                            amr::compose_payload(st.ul_cmr, codecs[st.ul_ft as usize], false);
                        let hdr = payload.len() - data.len();
                        payload[hdr..].copy_from_slice(&data);
                        TchDecoded::Speech(payload)
                    }
                    amr::AmrDecoded::Facch(mac) => TchDecoded::Facch(mac),
                });
                (mapped, counts)
            }
            _ => tch::tch_hr_decode(buf),
        };
        let buf = st.ul_bursts.as_mut().expect("buffer allocated");
        buf.copy_within(2 * 116.., 0);

        let out = match decoded {
            Ok(TchDecoded::Speech(f)) => Out::Speech(f),
            Ok(TchDecoded::Facch(mac)) => Out::Facch(mac.to_vec()),
            Err(_) => Out::Bad,
        };
        (out, counts)
    };
    if tch_mode == TchMode::SpeechAmr {
        let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
        crate::loops::amr_input(st, counts.ber10k(), true);
    }
    meas_block(sched, tn, chan, &counts);

    let rssi_avg = sched.ts[tn as usize].chan_state[chan as usize].block_rssi();
    // The frame that just completed started 10 frames back; when its
    // last burst overlaps the SACCH position an extra frame applies.
    let facch_fn = fn_past(fnr, 10 + u32::from(fnr % 26 >= 19));
    let tch_fn = fn_past(fnr, 10 + u32::from(fnr % 26 == 19) + u32::from(fnr % 26 == 20));
    match out {
        Out::Facch(mac) => {
            {
                let st = &mut sched.ts[tn as usize].chan_state[chan as usize];
                st.ul_ongoing_facch = true;
            }
            compose_ph_data_ind(sched, tn, facch_fn, chan, mac, rssi_avg, counts.ber10k(), up);
            if rsl_cmode == RslCmode::Speech {
                if let Some(p) = bfi_payload(sched, tn, chan, tch_mode) {
                    compose_tch_ind(sched, tn, tch_fn, chan, p, up);
                }
            }
        }
        Out::Speech(frame) => {
            if rsl_cmode == RslCmode::Speech {
                compose_tch_ind(sched, tn, tch_fn, chan, frame, up);
            }
        }
        Out::Bad => {
            log::warn!("[SCHED] bad TCH/H frame ending at fn={} for {}", fnr, chan.desc().name);
            if rsl_cmode == RslCmode::Speech {
                if let Some(p) = bfi_payload(sched, tn, chan, tch_mode) {
                    compose_tch_ind(sched, tn, tch_fn, chan, p, up);
                }
            }
        }
    }
}

/// The mode-specific bad-frame substitute.
fn bfi_payload(sched: &Scheduler, tn: u8, chan: ChanType, tch_mode: TchMode) -> Option<Vec<u8>> {
    let st = &sched.ts[tn as usize].chan_state[chan as usize];
    match tch_mode {
        TchMode::SpeechV1 if chan == ChanType::TchF => Some(tch::bfi_fr()),
        TchMode::SpeechV1 => Some(tch::bfi_hr()),
        TchMode::SpeechEfr => Some(tch::bfi_efr()),
        TchMode::SpeechAmr => {
            Some(amr::compose_payload(st.dl_cmr, st.codec[st.dl_ft as usize], true))
        }
        TchMode::Signalling => None,
    }
}
