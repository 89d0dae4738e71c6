// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! xCCH block coding: 23-byte MAC block to 4 bursts and back
//! (05.03 Section 4.1). Used by BCCH, CCCH, SDCCH, SACCH and FACCH.

use super::conv::CONV_XCCH;
use super::crc::FIRE_CRC40;
use super::interleave::{xcch_deinterleave, xcch_interleave};
use super::map::{xcch_burst_map, xcch_burst_unmap};
use super::{count_errors, pbit_to_ubit_lsb, ubit_to_pbit_lsb, BitCounts, CodingError};

/// Coded block: CRC-protected 184 info bits through the rate-1/2 code.
/// MAC block bits go out LSB-first per byte, the Um transmission order.
pub(crate) fn encode_cb(l2: &[u8]) -> [u8; 456] {
    let mut u = [0u8; 224];
    pbit_to_ubit_lsb(&mut u, l2, 184);
    let (info, parity) = u.split_at_mut(184);
    FIRE_CRC40.set_bits(info, parity);
    let mut c = [0u8; 456];
    CONV_XCCH.encode(&u, &mut c);
    c
}

/// Inverse of [`encode_cb`]; checks the FIRE parity.
pub(crate) fn decode_cb(c: &[i8]) -> (Result<[u8; 23], CodingError>, BitCounts) {
    let mut u = [0u8; 224];
    CONV_XCCH.decode(c, &mut u);
    let mut reenc = [0u8; 456];
    CONV_XCCH.encode(&u, &mut reenc);
    let counts = count_errors(&reenc, c);

    if FIRE_CRC40.check_bits(&u[..184], &u[184..]).is_err() {
        return (Err(CodingError::Crc), counts);
    }
    let mut l2 = [0u8; 23];
    ubit_to_pbit_lsb(&mut l2, &u, 184);
    (Ok(l2), counts)
}

/// Encode a 23-byte MAC block into 4 x 116-bit burst payloads.
/// Stealing flags are set (1, 1): this *is* the stolen format on TCH.
pub fn encode(bursts: &mut [u8], l2: &[u8]) {
    debug_assert!(l2.len() == 23 && bursts.len() >= 4 * 116);
    let c = encode_cb(l2);
    let mut i_b = [0u8; 456];
    xcch_interleave(&c, &mut i_b);
    for i in 0..4 {
        xcch_burst_map(&i_b[i * 114..(i + 1) * 114], &mut bursts[i * 116..(i + 1) * 116], 1, 1);
    }
}

/// Decode 4 x 116-bit soft burst payloads into a 23-byte MAC block.
pub fn decode(bursts: &[i8]) -> (Result<[u8; 23], CodingError>, BitCounts) {
    debug_assert!(bursts.len() >= 4 * 116);
    let mut i_b = [0i8; 456];
    for i in 0..4 {
        xcch_burst_unmap(&mut i_b[i * 114..(i + 1) * 114], &bursts[i * 116..(i + 1) * 116]);
    }
    let mut c = [0i8; 456];
    xcch_deinterleave(&mut c, &i_b);
    decode_cb(&c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::ubit_to_sbit;

    #[test]
    fn test_roundtrip() {
        let l2: [u8; 23] = [
            0x55, 0x06, 0x19, 0x8e, 0x45, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2b, 0x2b,
        ];
        let mut bursts = [0u8; 4 * 116];
        encode(&mut bursts, &l2);
        let soft: Vec<i8> = bursts.iter().map(|&b| ubit_to_sbit(b)).collect();
        let (res, counts) = decode(&soft);
        assert_eq!(res.unwrap(), l2);
        assert_eq!(counts.n_errors, 0);
        assert_eq!(counts.n_bits_total, 456);
    }

    #[test]
    fn test_random_roundtrips() {
        fastrand::seed(0x1905);
        for _ in 0..32 {
            let mut l2 = [0u8; 23];
            fastrand::fill(&mut l2);
            let mut bursts = [0u8; 4 * 116];
            encode(&mut bursts, &l2);
            let soft: Vec<i8> = bursts.iter().map(|&b| ubit_to_sbit(b)).collect();
            let (res, _) = decode(&soft);
            assert_eq!(res.unwrap(), l2);
        }
    }

    #[test]
    fn test_crc_failure_on_garbage() {
        let soft: Vec<i8> = (0..4 * 116).map(|i| if i % 3 == 0 { 90 } else { -80 }).collect();
        let (res, counts) = decode(&soft);
        assert_eq!(res.unwrap_err(), CodingError::Crc);
        assert!(counts.n_errors > 0);
    }

    #[test]
    fn test_stealing_flags_set() {
        let l2 = [0u8; 23];
        let mut bursts = [0u8; 4 * 116];
        encode(&mut bursts, &l2);
        for i in 0..4 {
            assert_eq!(bursts[i * 116 + 57], 1);
            assert_eq!(bursts[i * 116 + 58], 1);
        }
    }

    #[test]
    fn test_corrects_channel_errors() {
        let l2 = [0xa7u8; 23];
        let mut bursts = [0u8; 4 * 116];
        encode(&mut bursts, &l2);
        let mut soft: Vec<i8> = bursts.iter().map(|&b| ubit_to_sbit(b)).collect();
        for &i in &[7usize, 130, 250, 399] {
            soft[i] = -soft[i];
        }
        let (res, counts) = decode(&soft);
        assert_eq!(res.unwrap(), l2);
        assert!(counts.n_errors >= 3);
    }
}
