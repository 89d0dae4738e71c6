// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A5 air-interface ciphering.
//!
//! A burst's 114 information bits are XORed with a per-frame keystream.
//! One call produces 228 bits: the first 114 cipher the downlink burst of
//! the frame, the last 114 the uplink burst. The scheduler applies the
//! downlink half to hard bits and the uplink half as a sign flip on soft
//! bits before decoding.

mod a5;
mod kasumi;

pub use kasumi::kasumi_block;

use crate::gsm::GsmTime;

/// A5 keystream for one TDMA frame. `algo` is the A5/x number (1..=3);
/// anything else yields an all-zero keystream (A5/0).
pub fn a5_keystream(algo: u8, key: &[u8; 8], fnr: u32) -> ([u8; 114], [u8; 114]) {
    let count = fn_count(fnr);
    let bits = match algo {
        1 => a5::a5_1(key, count),
        2 => a5::a5_2(key, count),
        3 => a5::a5_3(key, count),
        _ => [0u8; 228],
    };
    let mut dl = [0u8; 114];
    let mut ul = [0u8; 114];
    dl.copy_from_slice(&bits[..114]);
    ul.copy_from_slice(&bits[114..]);
    (dl, ul)
}

/// The 22-bit COUNT input of A5: T1 in the high bits, then T3, then T2.
pub fn fn_count(fnr: u32) -> u32 {
    let t = GsmTime::from_fn(fnr);
    (u32::from(t.t1) << 11) | (u32::from(t.t3) << 5) | u32::from(t.t2)
}
