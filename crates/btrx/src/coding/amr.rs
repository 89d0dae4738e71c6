// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AMR speech coding on full-rate (AFS) and half-rate (AHS) channels.
//!
//! Every block carries a 2-bit in-band identification word: blocks
//! alternate between CMI (the codec mode this frame is coded with) and
//! CMR (the mode the sender requests from its peer); the alternation
//! phase is derived from the frame number by the scheduler. The id is an
//! index into the active codec set (at most 4 modes).
//!
//! Per mode, the speech bits plus a 6-bit parity run through the K=5
//! rate-1/2 code and are fitted to the 448-bit (AFS) or 224-bit (AHS)
//! budget: punctured evenly when too long, cyclically repeated when too
//! short, so the low modes trade bit rate for redundancy.
//!
//! The payload format towards the upper layer is a two-octet header
//! (CMR in the high nibble of the first, frame type and quality bit in
//! the second) followed by the packed speech bits.

use super::conv::ConvCode;
use super::crc::AMR_CRC6;
use super::interleave::{tch_fr_deinterleave, tch_fr_interleave, tch_hr_deinterleave, tch_hr_interleave};
use super::map::{tch_burst_map, tch_burst_unmap};
use super::tables::{AFS_IC, AHS_IC};
use super::{count_errors, BitCounts, CodingError};

/// Speech bits per AMR frame type 0..=7 (4.75 .. 12.2 kbit/s).
pub const MODE_BITS: [usize; 8] = [95, 103, 118, 134, 148, 159, 204, 244];
/// Frame type of a SID (comfort noise) frame.
pub const FT_SID: u8 = 8;
/// SID frames carry 39 bits.
pub const SID_BITS: usize = 39;
/// Frame type marking an empty DTX gap.
pub const FT_NO_DATA: u8 = 15;

/// Coded-bit budget of an AFS block (456 minus the 8 in-band bits).
const AFS_BUDGET: usize = 448;
/// Coded-bit budget of an AHS block (228 minus the 4 in-band bits).
const AHS_BUDGET: usize = 224;

/// Speech bit count for a frame type. NO_DATA is codable with zero
/// bits (the block still carries the in-band word and parity).
pub fn frame_bits(ft: u8) -> Option<usize> {
    match ft {
        0..=7 => Some(MODE_BITS[ft as usize]),
        FT_SID => Some(SID_BITS),
        FT_NO_DATA => Some(0),
        _ => None,
    }
}

/// Upper-layer payload length for a frame type (header + packed bits).
pub fn payload_len(ft: u8) -> usize {
    match frame_bits(ft) {
        Some(bits) => 2 + bits.div_ceil(8),
        None => 2,
    }
}

/// Build a payload header (+ zeroed speech for BFI/NO_DATA payloads).
pub fn compose_payload(cmr: u8, ft: u8, bfi: bool) -> Vec<u8> {
    let mut p = vec![0u8; payload_len(ft)];
    p[0] = cmr << 4;
    p[1] = (ft << 3) | if bfi { 0 } else { 0x04 };
    p
}

/// Split a payload into (cmr, ft, good-quality, speech bytes).
pub fn decompose_payload(p: &[u8]) -> Result<(u8, u8, bool, &[u8]), CodingError> {
    if p.len() < 2 {
        return Err(CodingError::BadLength(p.len()));
    }
    let cmr = p[0] >> 4;
    let ft = (p[1] >> 3) & 0x0f;
    let q = p[1] & 0x04 != 0;
    if p.len() != payload_len(ft) {
        return Err(CodingError::BadLength(p.len()));
    }
    Ok((cmr, ft, q, &p[2..]))
}

// ===== mode coder =====

/// Positions dropped when the coded length exceeds the budget.
fn puncture_positions(coded: usize, target: usize) -> Vec<usize> {
    let drop = coded - target;
    (0..drop).map(|i| i * coded / drop).collect()
}

/// Code `bits` speech bits into exactly `target` output bits.
fn mode_encode(bits: &[u8], target: usize, out: &mut [u8]) {
    let code = ConvCode::k5_rate2(bits.len() + 6);
    let mut u = vec![0u8; bits.len() + 6];
    u[..bits.len()].copy_from_slice(bits);
    {
        let (data, parity) = u.split_at_mut(bits.len());
        AMR_CRC6.set_bits(data, parity);
    }
    let mut coded = vec![0u8; code.out_len()];
    code.encode(&u, &mut coded);

    if coded.len() > target {
        let punct = puncture_positions(coded.len(), target);
        let mut next = punct.iter().copied().peekable();
        let mut o = 0;
        for (i, &b) in coded.iter().enumerate() {
            if next.peek() == Some(&i) {
                next.next();
                continue;
            }
            out[o] = b;
            o += 1;
        }
        debug_assert_eq!(o, target);
    } else {
        for i in 0..target {
            out[i] = coded[i % coded.len()];
        }
    }
}

/// Inverse of [`mode_encode`] on soft bits.
fn mode_decode(soft: &[i8], nbits: usize) -> (Result<Vec<u8>, CodingError>, BitCounts) {
    let code = ConvCode::k5_rate2(nbits + 6);
    let coded_len = code.out_len();
    let target = soft.len();

    let mut full = vec![0i8; coded_len];
    if coded_len > target {
        let punct = puncture_positions(coded_len, target);
        let mut next = punct.iter().copied().peekable();
        let mut j = 0;
        for i in 0..coded_len {
            if next.peek() == Some(&i) {
                next.next();
                full[i] = 0;
            } else {
                full[i] = soft[j];
                j += 1;
            }
        }
    } else {
        // Fold the cyclic repetitions into one soft value per position.
        let mut acc = vec![0i32; coded_len];
        for (i, &s) in soft.iter().enumerate() {
            acc[i % coded_len] += i32::from(s);
        }
        for (i, &a) in acc.iter().enumerate() {
            full[i] = a.clamp(-127, 127) as i8;
        }
    }

    let mut u = vec![0u8; code.len];
    code.decode(&full, &mut u);
    let mut reenc = vec![0u8; coded_len];
    code.encode(&u, &mut reenc);
    let counts = count_errors(&reenc, &full);

    if AMR_CRC6.check_bits(&u[..nbits], &u[nbits..]).is_err() {
        return (Err(CodingError::Crc), counts);
    }
    (Ok(u[..nbits].to_vec()), counts)
}

fn match_ic<const W: usize>(table: &[[u8; W]; 4], soft: &[i8]) -> u8 {
    let mut best = 0u8;
    let mut best_dist = i64::MAX;
    for (idx, word) in table.iter().enumerate() {
        let mut dist = 0i64;
        for (i, &w) in word.iter().enumerate() {
            let expected = if w == 0 { 127i64 } else { -127i64 };
            dist += (expected - i64::from(soft[i])).abs();
        }
        if dist < best_dist {
            best_dist = dist;
            best = idx as u8;
        }
    }
    best
}

fn unpack_speech(bits: &mut [u8], bytes: &[u8]) {
    for i in 0..bits.len() {
        bits[i] = (bytes[i >> 3] >> (7 - (i & 7))) & 1;
    }
}

fn pack_speech(bits: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &b) in bits.iter().enumerate() {
        bytes[i >> 3] |= (b & 1) << (7 - (i & 7));
    }
    bytes
}

/// Outcome of an AFS/AHS block decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmrDecoded {
    /// Packed speech bits of the frame type given by the current CMI.
    Speech(Vec<u8>),
    /// The block was stolen by signalling.
    Facch([u8; 23]),
}

// ===== AFS (full rate) =====

/// Encode one AMR frame onto the 8-burst full-rate window.
/// `ft` selects the speech coding, `id` is the in-band word (CMI or CMR
/// index, depending on the block phase).
pub fn afs_encode(bursts: &mut [u8], speech: &[u8], ft: u8, id: u8) -> Result<(), CodingError> {
    debug_assert!(bursts.len() >= 8 * 116);
    let nbits = frame_bits(ft).ok_or(CodingError::BadMode(ft))?;
    if speech.len() != nbits.div_ceil(8) {
        return Err(CodingError::BadLength(speech.len()));
    }
    let mut bits = vec![0u8; nbits];
    unpack_speech(&mut bits, speech);

    let mut cb = [0u8; 456];
    cb[..8].copy_from_slice(&AFS_IC[(id & 3) as usize]);
    mode_encode(&bits, AFS_BUDGET, &mut cb[8..]);

    let mut i_b = [0u8; 8 * 114];
    tch_fr_interleave(&cb, &mut i_b);
    for i in 0..8 {
        tch_burst_map(&i_b[i * 114..(i + 1) * 114], &mut bursts[i * 116..(i + 1) * 116], 0, i >= 4);
    }
    Ok(())
}

/// Decode the 8-burst window. `cmi_block` tells whether the in-band word
/// is a CMI (updates `ft_idx`) or a CMR (updates `cmr_idx`); both are
/// indices into `codecs`, the active mode set.
pub fn afs_decode(
    bursts: &[i8],
    cmi_block: bool,
    codecs: &[u8],
    ft_idx: &mut u8,
    cmr_idx: &mut u8,
) -> (Result<AmrDecoded, CodingError>, BitCounts) {
    debug_assert!(bursts.len() >= 8 * 116);
    let mut i_b = [0i8; 8 * 114];
    let mut steal = 0i32;
    for i in 0..8 {
        let h = tch_burst_unmap(&mut i_b[i * 114..(i + 1) * 114], &bursts[i * 116..(i + 1) * 116], i >= 4);
        steal -= i32::from(h);
    }
    let mut cb = [0i8; 456];
    tch_fr_deinterleave(&mut cb, &i_b);

    if steal > 0 {
        let (res, counts) = super::xcch::decode_cb(&cb);
        return (res.map(AmrDecoded::Facch), counts);
    }

    let id = match_ic(&AFS_IC, &cb[..8]);
    if cmi_block {
        *ft_idx = id;
    } else {
        *cmr_idx = id;
    }
    let Some(&mode) = codecs.get(*ft_idx as usize) else {
        return (Err(CodingError::BadMode(*ft_idx)), BitCounts::default());
    };
    let nbits = match frame_bits(mode) {
        Some(n) => n,
        None => return (Err(CodingError::BadMode(mode)), BitCounts::default()),
    };

    let (res, counts) = mode_decode(&cb[8..], nbits);
    (res.map(|bits| AmrDecoded::Speech(pack_speech(&bits))), counts)
}

// ===== AHS (half rate) =====

/// Encode one AMR frame onto the 4-burst half-rate window.
pub fn ahs_encode(bursts: &mut [u8], speech: &[u8], ft: u8, id: u8) -> Result<(), CodingError> {
    debug_assert!(bursts.len() >= 4 * 116);
    let nbits = frame_bits(ft).ok_or(CodingError::BadMode(ft))?;
    if speech.len() != nbits.div_ceil(8) {
        return Err(CodingError::BadLength(speech.len()));
    }
    let mut bits = vec![0u8; nbits];
    unpack_speech(&mut bits, speech);

    let mut cb = [0u8; 228];
    cb[..4].copy_from_slice(&AHS_IC[(id & 3) as usize]);
    mode_encode(&bits, AHS_BUDGET, &mut cb[4..]);

    let mut i_b = [0u8; 4 * 114];
    tch_hr_interleave(&cb, &mut i_b);
    for i in 0..4 {
        tch_burst_map(&i_b[i * 114..(i + 1) * 114], &mut bursts[i * 116..(i + 1) * 116], 0, i >= 2);
    }
    Ok(())
}

/// Decode from the 6-burst half-rate uplink window (speech in the first
/// four bursts, FACCH/H across all six).
pub fn ahs_decode(
    bursts: &[i8],
    cmi_block: bool,
    codecs: &[u8],
    ft_idx: &mut u8,
    cmr_idx: &mut u8,
) -> (Result<AmrDecoded, CodingError>, BitCounts) {
    debug_assert!(bursts.len() >= 6 * 116);
    let mut i_b = [0i8; 4 * 114];
    let mut steal = 0i32;
    for i in 0..4 {
        let h = tch_burst_unmap(&mut i_b[i * 114..(i + 1) * 114], &bursts[i * 116..(i + 1) * 116], i >= 2);
        steal -= i32::from(h);
    }

    if steal > 0 {
        // Stolen blocks use the FACCH/H spread; delegate to the HR path.
        let (res, counts) = super::tch::tch_hr_decode(bursts);
        return match res {
            Ok(super::tch::TchDecoded::Facch(mac)) => (Ok(AmrDecoded::Facch(mac)), counts),
            Ok(_) => (Err(CodingError::Crc), counts),
            Err(e) => (Err(e), counts),
        };
    }

    let mut cb = [0i8; 228];
    tch_hr_deinterleave(&mut cb, &i_b);

    let id = match_ic(&AHS_IC, &cb[..4]);
    if cmi_block {
        *ft_idx = id;
    } else {
        *cmr_idx = id;
    }
    let Some(&mode) = codecs.get(*ft_idx as usize) else {
        return (Err(CodingError::BadMode(*ft_idx)), BitCounts::default());
    };
    let nbits = match frame_bits(mode) {
        Some(n) => n,
        None => return (Err(CodingError::BadMode(mode)), BitCounts::default()),
    };

    let (res, counts) = mode_decode(&cb[4..], nbits);
    (res.map(|bits| AmrDecoded::Speech(pack_speech(&bits))), counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::ubit_to_sbit;

    fn soft(bursts: &[u8]) -> Vec<i8> {
        bursts.iter().map(|&b| ubit_to_sbit(b)).collect()
    }

    #[test]
    fn test_payload_header() {
        let p = compose_payload(2, FT_SID, false);
        assert_eq!(p.len(), 2 + 5);
        let (cmr, ft, q, speech) = decompose_payload(&p).unwrap();
        assert_eq!((cmr, ft, q), (2, FT_SID, true));
        assert!(speech.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_afs_roundtrip_all_modes() {
        let codecs = [0u8, 2, 5, 7]; // 4.75, 5.9, 7.95, 12.2
        for (idx, &mode) in codecs.iter().enumerate() {
            fastrand::seed(mode as u64);
            let nbits = frame_bits(mode).unwrap();
            let mut speech = vec![0u8; nbits.div_ceil(8)];
            fastrand::fill(&mut speech);
            if nbits % 8 != 0 {
                let last = speech.len() - 1;
                speech[last] &= 0xffu8 << (8 - nbits % 8);
            }

            let mut bursts = [0u8; 8 * 116];
            afs_encode(&mut bursts, &speech, mode, idx as u8).unwrap();

            let mut ft_idx = 0u8;
            let mut cmr_idx = 0u8;
            // CMI block: the in-band id selects the mode to decode with.
            let (res, counts) =
                afs_decode(&soft(&bursts), true, &codecs, &mut ft_idx, &mut cmr_idx);
            assert_eq!(ft_idx, idx as u8);
            assert_eq!(res.unwrap(), AmrDecoded::Speech(speech));
            assert_eq!(counts.n_errors, 0);
        }
    }

    #[test]
    fn test_afs_sid_roundtrip() {
        let codecs = [FT_SID];
        // 39 bits: the last byte only uses its top 7 bits.
        let speech = vec![0x5a, 0xa5, 0x3c, 0xc3, 0x80];
        let mut bursts = [0u8; 8 * 116];
        afs_encode(&mut bursts, &speech, FT_SID, 0).unwrap();
        let mut ft_idx = 0u8;
        let mut cmr_idx = 0u8;
        let (res, _) = afs_decode(&soft(&bursts), true, &codecs, &mut ft_idx, &mut cmr_idx);
        assert_eq!(res.unwrap(), AmrDecoded::Speech(speech));
    }

    #[test]
    fn test_ahs_roundtrip() {
        let codecs = [0u8, 1, 2, 3];
        for (idx, &mode) in codecs.iter().enumerate() {
            fastrand::seed(100 + mode as u64);
            let nbits = frame_bits(mode).unwrap();
            let mut speech = vec![0u8; nbits.div_ceil(8)];
            fastrand::fill(&mut speech);
            if nbits % 8 != 0 {
                let last = speech.len() - 1;
                speech[last] &= 0xffu8 << (8 - nbits % 8);
            }

            let mut bursts = [0u8; 6 * 116];
            ahs_encode(&mut bursts, &speech, mode, idx as u8).unwrap();
            let mut ft_idx = 0u8;
            let mut cmr_idx = 0u8;
            let (res, _) = ahs_decode(&soft(&bursts), true, &codecs, &mut ft_idx, &mut cmr_idx);
            assert_eq!(ft_idx, idx as u8);
            assert_eq!(res.unwrap(), AmrDecoded::Speech(speech));
        }
    }

    #[test]
    fn test_cmr_block_updates_request_only() {
        let codecs = [0u8, 2, 5, 7];
        let nbits = frame_bits(7).unwrap();
        let speech = vec![0x11u8; nbits.div_ceil(8)];
        let mut bursts = [0u8; 8 * 116];
        // Coded with mode index 3, in-band word carries CMR index 1.
        afs_encode(&mut bursts, &speech, 7, 1).unwrap();
        let mut ft_idx = 3u8;
        let mut cmr_idx = 0u8;
        let (res, _) = afs_decode(&soft(&bursts), false, &codecs, &mut ft_idx, &mut cmr_idx);
        assert_eq!(ft_idx, 3);
        assert_eq!(cmr_idx, 1);
        assert!(matches!(res.unwrap(), AmrDecoded::Speech(_)));
    }

    #[test]
    fn test_afs_facch_stealing() {
        let mac = [0x42u8; 23];
        let mut bursts = [0u8; 8 * 116];
        super::super::tch::tch_fr_encode(&mut bursts, &mac, false).unwrap();
        let mut ft_idx = 0u8;
        let mut cmr_idx = 0u8;
        let (res, _) = afs_decode(&soft(&bursts), true, &[7], &mut ft_idx, &mut cmr_idx);
        assert_eq!(res.unwrap(), AmrDecoded::Facch(mac));
    }
}
