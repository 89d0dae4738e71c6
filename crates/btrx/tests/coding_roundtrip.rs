// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel-coding conformance: every codec must survive the full
//! encode -> burst-map -> burst-unmap -> decode path bit-exactly, and
//! the stolen-block (FACCH) paths must win over speech.

use btrx::coding::map::{compose_burst, split_burst};
use btrx::coding::tch::{self, TchDecoded};
use btrx::coding::{amr, pdtch, rach, sch, ubit_to_sbit, xcch};
use btrx::coding::tables::TSC;
use btrx::gsm::GsmTime;

/// Wrap burst payloads through real 148-bit bursts (tail + TSC) and
/// back into soft payloads, as the scheduler does on both ends.
fn through_the_air(payloads: &[u8], n: usize, tsc: u8) -> Vec<i8> {
    let mut soft = vec![0i8; n * 116];
    for i in 0..n {
        let burst = compose_burst(&payloads[i * 116..(i + 1) * 116], &TSC[tsc as usize]);
        let rx: Vec<i8> = burst.iter().map(|&b| ubit_to_sbit(b)).collect();
        soft[i * 116..(i + 1) * 116].copy_from_slice(&split_burst(&rx));
    }
    soft
}

#[test]
fn xcch_round_trip_through_bursts() {
    fastrand::seed(0x05030401);
    for _ in 0..50 {
        let mut l2 = [0u8; 23];
        fastrand::fill(&mut l2);
        let mut bursts = [0u8; 4 * 116];
        xcch::encode(&mut bursts, &l2);
        let soft = through_the_air(&bursts, 4, 7);
        let (res, counts) = xcch::decode(&soft);
        assert_eq!(res.unwrap(), l2);
        assert_eq!(counts.n_errors, 0);
    }
}

#[test]
fn rach_round_trip_all_ra_and_bsic_corners() {
    for &bsic in &[0u8, 0x07, 0x2a, 0x3f] {
        for ra in (0u8..=255).step_by(17) {
            let burst = rach::encode(ra, bsic);
            let soft: Vec<i8> = burst.iter().map(|&b| ubit_to_sbit(b)).collect();
            let (res, _) = rach::decode(&soft, bsic);
            assert_eq!(res.unwrap(), ra, "ra={:#x} bsic={:#x}", ra, bsic);
        }
    }
}

#[test]
fn sch_round_trip_over_gsm_time() {
    for fnr in [0u32, 51, 1024, 26 * 51 * 2048 - 1, 2_715_647] {
        let info = sch::sb_info(0x3f, GsmTime::from_fn(fnr));
        let coded = sch::encode(&info);
        let soft: Vec<i8> = coded.iter().map(|&b| ubit_to_sbit(b)).collect();
        let (res, _) = sch::decode(&soft);
        assert_eq!(res.unwrap(), info, "fn={}", fnr);
    }
}

#[test]
fn pdtch_all_cs_round_trip_through_bursts() {
    for (len, cs) in [(23usize, 1u8), (34, 2), (40, 3), (54, 4)] {
        fastrand::seed(len as u64);
        let mut l2 = vec![0u8; len];
        fastrand::fill(&mut l2);
        l2[0] = (l2[0] & !0x07) | 0x03;
        let mut bursts = [0u8; 4 * 116];
        pdtch::encode(&mut bursts, &l2).unwrap();
        let soft = through_the_air(&bursts, 4, 0);
        let (res, _) = pdtch::decode(&soft);
        let block = res.unwrap();
        assert_eq!(block.cs, cs);
        assert_eq!(block.l2, l2);
    }
}

#[test]
fn tch_fr_round_trip_and_facch_steals() {
    fastrand::seed(0x0610);
    // Speech in both bit orders.
    for net_order in [false, true] {
        let mut frame = vec![0u8; tch::GSM_FR_BYTES];
        fastrand::fill(&mut frame);
        frame[0] = 0xd0 | (frame[0] & 0x0f);
        let mut bursts = [0u8; 8 * 116];
        tch::tch_fr_encode(&mut bursts, &frame, net_order).unwrap();
        let soft = through_the_air(&bursts, 8, 3);
        let (res, _) = tch::tch_fr_decode(&soft, net_order, false);
        assert_eq!(res.unwrap(), TchDecoded::Speech(frame));
    }

    // A stolen block must decode as FACCH even when the decoder expects
    // speech.
    let mac: Vec<u8> = (0..23u8).map(|i| i.wrapping_mul(11)).collect();
    let mut bursts = [0u8; 8 * 116];
    tch::tch_fr_encode(&mut bursts, &mac, false).unwrap();
    let soft = through_the_air(&bursts, 8, 3);
    match tch::tch_fr_decode(&soft, false, false).0.unwrap() {
        TchDecoded::Facch(got) => assert_eq!(&got[..], &mac[..]),
        other => panic!("expected FACCH, got {:?}", other),
    }
}

#[test]
fn tch_efr_round_trip() {
    fastrand::seed(0x0660);
    let mut frame = vec![0u8; tch::GSM_EFR_BYTES];
    fastrand::fill(&mut frame);
    frame[0] = 0xc0 | (frame[0] & 0x0f);
    let mut bursts = [0u8; 8 * 116];
    tch::tch_fr_encode(&mut bursts, &frame, true).unwrap();
    let soft = through_the_air(&bursts, 8, 5);
    let (res, _) = tch::tch_fr_decode(&soft, true, true);
    assert_eq!(res.unwrap(), TchDecoded::Speech(frame));
}

#[test]
fn tch_hr_round_trip_and_facch() {
    fastrand::seed(0x0520);
    let mut frame = vec![0u8; tch::GSM_HR_BYTES];
    fastrand::fill(&mut frame);
    frame[0] &= 0x0f;
    let mut bursts = [0u8; 6 * 116];
    tch::tch_hr_encode(&mut bursts, &frame).unwrap();
    let soft = through_the_air(&bursts, 6, 1);
    assert_eq!(tch::tch_hr_decode(&soft).0.unwrap(), TchDecoded::Speech(frame));

    let mac = [0x6bu8; 23];
    let mut bursts = [0u8; 6 * 116];
    tch::tch_hr_encode(&mut bursts, &mac).unwrap();
    let soft = through_the_air(&bursts, 6, 1);
    assert_eq!(tch::tch_hr_decode(&soft).0.unwrap(), TchDecoded::Facch(mac));
}

#[test]
fn amr_afs_round_trip_active_set() {
    // The S4 codec set: 4.75, 5.9, 7.4, 12.2.
    let codecs = [0u8, 2, 4, 7];
    for (idx, &mode) in codecs.iter().enumerate() {
        fastrand::seed(0xa3 + mode as u64);
        let nbits = amr::frame_bits(mode).unwrap();
        let mut speech = vec![0u8; nbits.div_ceil(8)];
        fastrand::fill(&mut speech);
        if nbits % 8 != 0 {
            let last = speech.len() - 1;
            speech[last] &= 0xffu8 << (8 - nbits % 8);
        }
        let mut bursts = [0u8; 8 * 116];
        amr::afs_encode(&mut bursts, &speech, mode, idx as u8).unwrap();
        let soft = through_the_air(&bursts, 8, 2);
        let mut ft = 0u8;
        let mut cmr = 0u8;
        let (res, _) = amr::afs_decode(&soft, true, &codecs, &mut ft, &mut cmr);
        assert_eq!(ft, idx as u8);
        assert_eq!(res.unwrap(), amr::AmrDecoded::Speech(speech));
    }
}

#[test]
fn decode_failure_is_an_error_not_a_panic() {
    let noise: Vec<i8> = (0..8 * 116).map(|i| if (i * 13) % 7 < 3 { 90 } else { -90 }).collect();
    assert!(tch::tch_fr_decode(&noise, false, false).0.is_err());
    let noise4 = &noise[..4 * 116];
    assert!(xcch::decode(noise4).0.is_err());
}
