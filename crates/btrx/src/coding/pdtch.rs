// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PDTCH block coding, CS-1..CS-4 (05.03 Section 5.1).
//!
//! The coding scheme is not signalled: the downlink chooses it by block
//! length (23/34/40/54 bytes), the uplink detects it from the stealing
//! flag pattern across the four bursts. CS-1 is the plain xCCH code;
//! CS-2/CS-3 puncture the rate-1/2 code; CS-4 is parity only.
//!
//! The 3-bit USF is the low bits of the first MAC octet. For CS-2..4 the
//! input positions holding it are overwritten with the tail of a block
//! codeword so the modem side can recover the USF without a full decode;
//! the receiver restores them from the matched codeword before the parity
//! check.

use super::conv::{ConvCode, CONV_CS2, CONV_CS3, CONV_XCCH};
use super::crc::{CS234_CRC16, FIRE_CRC40};
use super::interleave::{xcch_deinterleave, xcch_interleave};
use super::map::{xcch_burst_map, xcch_burst_unmap};
use super::tables::{PDTCH_HL_HN, PUNCTURE_CS2, PUNCTURE_CS3, USF2SIX, USF2TWELVE};
use super::{count_errors, pbit_to_ubit_lsb, ubit_to_pbit_lsb, BitCounts, CodingError};

/// Block lengths per coding scheme, in bytes.
pub const CS_BLOCK_LEN: [usize; 4] = [23, 34, 40, 54];

/// Result of a successful uplink PDTCH decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdtchBlock {
    /// RLC/MAC block, 23/34/40/54 bytes depending on the detected CS.
    pub l2: Vec<u8>,
    /// Detected coding scheme, 1..=4.
    pub cs: u8,
    /// Uplink state flag recovered from the block code (0 for CS-1).
    pub usf: u8,
}

fn encode_cs23(code: &ConvCode, punct: &[bool], l2: &[u8], data_bits: usize, cb: &mut [u8; 456]) {
    let mut u = vec![0u8; code.len];
    pbit_to_ubit_lsb(&mut u[3..], l2, data_bits);
    let usf = (l2[0] & 0x07) as usize;
    let (data, parity) = u[3..].split_at_mut(data_bits);
    CS234_CRC16.set_bits(data, parity);
    u[..6].copy_from_slice(&USF2SIX[usf]);

    let mut full = vec![0u8; code.out_len()];
    code.encode(&u, &mut full);
    let mut o = 0;
    for (i, &p) in punct.iter().enumerate() {
        if !p {
            cb[o] = full[i];
            o += 1;
        }
    }
    debug_assert_eq!(o, 456);
}

/// Encode one RLC/MAC block into 4 x 116-bit burst payloads.
/// The scheme is selected by `l2.len()`; the USF is `l2[0] & 7`.
pub fn encode(bursts: &mut [u8], l2: &[u8]) -> Result<(), CodingError> {
    debug_assert!(bursts.len() >= 4 * 116);
    let mut cb = [0u8; 456];
    let hl_hn: &[u8; 8] = match l2.len() {
        23 => {
            let mut u = [0u8; 224];
            pbit_to_ubit_lsb(&mut u, l2, 184);
            let (info, parity) = u.split_at_mut(184);
            FIRE_CRC40.set_bits(info, parity);
            CONV_XCCH.encode(&u, &mut cb);
            &PDTCH_HL_HN[0]
        }
        34 => {
            encode_cs23(&CONV_CS2, &PUNCTURE_CS2, l2, 271, &mut cb);
            &PDTCH_HL_HN[1]
        }
        40 => {
            encode_cs23(&CONV_CS3, &PUNCTURE_CS3, l2, 315, &mut cb);
            &PDTCH_HL_HN[2]
        }
        54 => {
            pbit_to_ubit_lsb(&mut cb[9..], l2, 431);
            let usf = (l2[0] & 0x07) as usize;
            let (data, parity) = cb[9..].split_at_mut(431);
            CS234_CRC16.set_bits(data, parity);
            cb[..12].copy_from_slice(&USF2TWELVE[usf]);
            &PDTCH_HL_HN[3]
        }
        n => return Err(CodingError::BadLength(n)),
    };

    let mut i_b = [0u8; 456];
    xcch_interleave(&cb, &mut i_b);
    for i in 0..4 {
        xcch_burst_map(
            &i_b[i * 114..(i + 1) * 114],
            &mut bursts[i * 116..(i + 1) * 116],
            hl_hn[i * 2],
            hl_hn[i * 2 + 1],
        );
    }
    Ok(())
}

/// Minimum Hamming distance match of decoded hard bits against a USF
/// codeword table.
fn match_usf_hard<const W: usize>(table: &[[u8; W]; 8], bits: &[u8]) -> u8 {
    let mut best = 0u8;
    let mut best_dist = usize::MAX;
    for (idx, word) in table.iter().enumerate() {
        let dist = word.iter().zip(bits).filter(|(w, b)| *w != *b).count();
        if dist < best_dist {
            best_dist = dist;
            best = idx as u8;
        }
    }
    best
}

/// Minimum soft distance match against a codeword table.
fn match_soft<const R: usize, const W: usize>(table: &[[u8; W]; R], soft: &[i8]) -> usize {
    let mut best = 0usize;
    let mut best_dist = i64::MAX;
    for (idx, word) in table.iter().enumerate() {
        let mut dist = 0i64;
        for (i, &w) in word.iter().enumerate() {
            let expected = if w == 0 { 127i64 } else { -127i64 };
            dist += (expected - i64::from(soft[i])).abs();
        }
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    best
}

fn decode_cs23(
    code: &ConvCode,
    punct: &[bool],
    cb: &[i8; 456],
    data_bits: usize,
    cs: u8,
) -> (Result<PdtchBlock, CodingError>, BitCounts) {
    let mut full = vec![0i8; code.out_len()];
    let mut j = 0;
    for (i, &p) in punct.iter().enumerate() {
        full[i] = if p { 0 } else { let v = cb[j]; j += 1; v };
    }
    let mut u = vec![0u8; code.len];
    code.decode(&full, &mut u);

    // Error counting against the stream as transmitted (codeword intact).
    let mut reenc = vec![0u8; code.out_len()];
    code.encode(&u, &mut reenc);
    let counts = count_errors(&reenc, &full);

    // Restore the data bits the USF codeword tail overwrote.
    let usf = match_usf_hard(&USF2SIX, &u[..6]);
    u[3] = usf & 1;
    u[4] = (usf >> 1) & 1;
    u[5] = (usf >> 2) & 1;

    if CS234_CRC16.check_bits(&u[3..3 + data_bits], &u[3 + data_bits..3 + data_bits + 16]).is_err() {
        return (Err(CodingError::Crc), counts);
    }
    let mut l2 = vec![0u8; data_bits / 8 + usize::from(data_bits % 8 != 0)];
    ubit_to_pbit_lsb(&mut l2, &u[3..], data_bits);
    (Ok(PdtchBlock { l2, cs, usf }), counts)
}

/// Decode 4 x 116-bit soft burst payloads; the CS is detected from the
/// stealing-flag pattern, the USF by minimum-distance match.
pub fn decode(bursts: &[i8]) -> (Result<PdtchBlock, CodingError>, BitCounts) {
    debug_assert!(bursts.len() >= 4 * 116);
    let mut i_b = [0i8; 456];
    let mut hl_hn = [0i8; 8];
    for i in 0..4 {
        let (hl, hn) =
            xcch_burst_unmap(&mut i_b[i * 114..(i + 1) * 114], &bursts[i * 116..(i + 1) * 116]);
        hl_hn[i * 2] = hl;
        hl_hn[i * 2 + 1] = hn;
    }
    let cs = match_soft(&PDTCH_HL_HN, &hl_hn) as u8 + 1;

    let mut cb = [0i8; 456];
    xcch_deinterleave(&mut cb, &i_b);

    match cs {
        1 => {
            let (res, counts) = super::xcch::decode_cb(&cb);
            (
                res.map(|l2| PdtchBlock { l2: l2.to_vec(), cs: 1, usf: 0 }),
                counts,
            )
        }
        2 => decode_cs23(&CONV_CS2, &PUNCTURE_CS2, &cb, 271, 2),
        3 => decode_cs23(&CONV_CS3, &PUNCTURE_CS3, &cb, 315, 3),
        _ => {
            let usf = match_soft(&USF2TWELVE, &cb[..12]) as u8;
            let mut u = [0u8; 456];
            for i in 12..456 {
                u[i] = super::sbit_to_ubit(cb[i]);
            }
            u[..12].copy_from_slice(&USF2TWELVE[usf as usize]);
            u[9] = usf & 1;
            u[10] = (usf >> 1) & 1;
            u[11] = (usf >> 2) & 1;
            let counts = count_errors(&USF2TWELVE[usf as usize], &cb[..12]);
            if CS234_CRC16.check_bits(&u[9..440], &u[440..456]).is_err() {
                return (Err(CodingError::Crc), counts);
            }
            let mut l2 = vec![0u8; 54];
            ubit_to_pbit_lsb(&mut l2, &u[9..], 431);
            (Ok(PdtchBlock { l2, cs: 4, usf }), counts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::ubit_to_sbit;

    fn roundtrip(len: usize, cs: u8) {
        fastrand::seed(len as u64);
        let mut l2 = vec![0u8; len];
        fastrand::fill(&mut l2);
        l2[0] = (l2[0] & !0x07) | 0x05; // USF 5
        let mut bursts = [0u8; 4 * 116];
        encode(&mut bursts, &l2).unwrap();
        let soft: Vec<i8> = bursts.iter().map(|&b| ubit_to_sbit(b)).collect();
        let (res, counts) = decode(&soft);
        let block = res.unwrap();
        assert_eq!(block.cs, cs);
        assert_eq!(block.l2, l2);
        if cs > 1 {
            assert_eq!(block.usf, 5);
        }
        assert_eq!(counts.n_errors, 0);
    }

    #[test]
    fn test_cs1_roundtrip() {
        roundtrip(23, 1);
    }

    #[test]
    fn test_cs2_roundtrip() {
        roundtrip(34, 2);
    }

    #[test]
    fn test_cs3_roundtrip() {
        roundtrip(40, 3);
    }

    #[test]
    fn test_cs4_roundtrip() {
        roundtrip(54, 4);
    }

    #[test]
    fn test_all_usf_values() {
        for usf in 0..8u8 {
            let mut l2 = vec![0x11u8; 34];
            l2[0] = 0xa8 | usf;
            let mut bursts = [0u8; 4 * 116];
            encode(&mut bursts, &l2).unwrap();
            let soft: Vec<i8> = bursts.iter().map(|&b| ubit_to_sbit(b)).collect();
            let (res, _) = decode(&soft);
            let block = res.unwrap();
            assert_eq!(block.usf, usf);
            assert_eq!(block.l2, l2);
        }
    }

    #[test]
    fn test_bad_length_rejected() {
        let mut bursts = [0u8; 4 * 116];
        assert_eq!(encode(&mut bursts, &[0u8; 30]), Err(CodingError::BadLength(30)));
    }
}
