// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SCH synchronisation burst coding (05.03 Section 4.7).
//!
//! 25 information bits (BSIC + reduced frame number), 10-bit parity,
//! rate-1/2 coded to 78 bits placed around the 64-bit extended training
//! sequence.

use super::conv::CONV_SCH;
use super::crc::SCH_CRC10;
use super::{count_errors, pbit_to_ubit_lsb, ubit_to_pbit_lsb, BitCounts, CodingError};
use crate::gsm::GsmTime;

/// Pack BSIC and reduced GSM time into the 4-byte SB info block
/// (04.08 Section 9.1.30 layout, as transmitted MSB-first).
pub fn sb_info(bsic: u8, time: GsmTime) -> [u8; 4] {
    let t3p = time.t3 / 10;
    [
        ((bsic & 0x3f) << 2) | ((time.t1 >> 9) & 0x03) as u8,
        ((time.t1 >> 1) & 0xff) as u8,
        (((time.t1 & 0x01) as u8) << 7) | ((time.t2 & 0x1f) << 2) | ((t3p & 0x06) >> 1),
        t3p & 0x01,
    ]
}

/// Encode the 25-bit SB info into 78 burst bits.
pub fn encode(info: &[u8; 4]) -> [u8; 78] {
    let mut u = [0u8; 35];
    pbit_to_ubit_lsb(&mut u, info, 25);
    let (data, parity) = u.split_at_mut(25);
    SCH_CRC10.set_bits(data, parity);
    let mut burst = [0u8; 78];
    CONV_SCH.encode(&u, &mut burst);
    burst
}

/// Decode 78 soft bits back into the 4-byte SB info block.
pub fn decode(soft: &[i8]) -> (Result<[u8; 4], CodingError>, BitCounts) {
    debug_assert!(soft.len() >= 78);
    let mut u = [0u8; 35];
    CONV_SCH.decode(&soft[..78], &mut u);

    let mut reenc = [0u8; 78];
    CONV_SCH.encode(&u, &mut reenc);
    let counts = count_errors(&reenc, &soft[..78]);

    if SCH_CRC10.check_bits(&u[..25], &u[25..]).is_err() {
        return (Err(CodingError::Crc), counts);
    }
    let mut info = [0u8; 4];
    ubit_to_pbit_lsb(&mut info, &u, 25);
    (Ok(info), counts)
}

/// Compose the full 148-bit synchronisation burst.
pub fn compose_burst(coded: &[u8; 78]) -> [u8; 148] {
    let mut bits = [0u8; 148];
    bits[3..42].copy_from_slice(&coded[..39]);
    bits[42..106].copy_from_slice(&super::tables::SCH_TRAIN);
    bits[106..145].copy_from_slice(&coded[39..]);
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::ubit_to_sbit;

    #[test]
    fn test_roundtrip() {
        let info = sb_info(0x3f, GsmTime { t1: 0x5a5, t2: 17, t3: 42 });
        let burst = encode(&info);
        let soft: Vec<i8> = burst.iter().map(|&b| ubit_to_sbit(b)).collect();
        let (res, counts) = decode(&soft);
        assert_eq!(res.unwrap(), info);
        assert_eq!(counts.n_errors, 0);
    }

    #[test]
    fn test_random_sb_info_roundtrip() {
        fastrand::seed(7);
        for _ in 0..64 {
            // 25 significant bits: upper 7 bits of the last byte are spare.
            let info = [fastrand::u8(..), fastrand::u8(..), fastrand::u8(..), fastrand::u8(..) & 0x01];
            let burst = encode(&info);
            let soft: Vec<i8> = burst.iter().map(|&b| ubit_to_sbit(b)).collect();
            let (res, _) = decode(&soft);
            assert_eq!(res.unwrap(), info);
        }
    }

    #[test]
    fn test_burst_layout() {
        let info = sb_info(0, GsmTime { t1: 0, t2: 0, t3: 0 });
        let burst = compose_burst(&encode(&info));
        assert_eq!(&burst[42..106], &super::super::tables::SCH_TRAIN[..]);
        assert_eq!(&burst[..3], &[0, 0, 0]);
        assert_eq!(&burst[145..], &[0, 0, 0]);
    }
}
