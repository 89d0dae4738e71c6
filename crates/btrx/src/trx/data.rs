// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TRXD: the binary burst datagram protocol, PDU versions 0, 1 and 2.
//!
//! Uplink datagrams carry one PDU (v0/v1) or a batch (v2, BATCH.ind
//! chained). All multi-byte integers are big-endian. Soft bits travel as
//! one unsigned byte per bit, `0x00..0xfe`, decoding as `127 - v`, with
//! `0xff` meaning -127.

use crate::config::HYPERFRAME;
use crate::ProtoError;

/// Burst modulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modulation {
    #[default]
    Gmsk,
    Psk8,
    Aqpsk,
}

impl Modulation {
    /// Burst length in (symbol) bits.
    pub fn burst_len(self) -> usize {
        match self {
            Modulation::Gmsk => 148,
            Modulation::Psk8 => 444,
            Modulation::Aqpsk => 148,
        }
    }

    /// The MTS field value of this modulation (bits 6..3).
    fn mts_val(self) -> u8 {
        match self {
            Modulation::Gmsk => 0x00,
            Modulation::Psk8 => 0x20,
            Modulation::Aqpsk => 0x60,
        }
    }
}

/// One parsed uplink PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UlPdu {
    pub tn: u8,
    pub fnr: u32,
    /// v2 only: which carrier of the link this burst belongs to.
    pub trx_num: Option<u8>,
    pub rssi: i8,
    pub toa256: i16,
    /// v1/v2 only: carrier-to-interference in centibels.
    pub ci_cb: Option<i16>,
    pub modulation: Modulation,
    pub tsc_set: Option<u8>,
    pub tsc: Option<u8>,
    /// There was nothing on the air; no burst bits follow.
    pub nope: bool,
    /// VAMOS shadow channel indication.
    pub shadow: bool,
    /// Soft bits, empty for NOPE indications.
    pub bits: Vec<i8>,
}

const UL_V0_HDR: usize = 1 + 4 + 1 + 2;
const UL_V1_HDR: usize = UL_V0_HDR + 1 + 2;
const UL_V2_HDR: usize = 1 + 1 + 1 + 1 + 2 + 2;

#[inline]
fn soft(v: u8) -> i8 {
    if v == 0xff {
        -127
    } else {
        (127i16 - i16::from(v)) as i8
    }
}

fn parse_mts(pdu: &mut UlPdu, mts: u8) -> Result<(), ProtoError> {
    if mts & 0x80 != 0 {
        pdu.nope = true;
        return Ok(());
    }
    // | . 0 0 X X . . . |  GMSK, TSC sets 0..3
    // | . 0 1 0 X . . . |  8-PSK, TSC sets 0..1
    if mts >> 5 == 0x00 {
        pdu.modulation = Modulation::Gmsk;
        pdu.tsc_set = Some((mts >> 3) & 0x03);
    } else if mts >> 4 == 0x02 {
        pdu.modulation = Modulation::Psk8;
        pdu.tsc_set = Some((mts >> 3) & 0x01);
    } else {
        return Err(ProtoError::BadModulation(mts));
    }
    pdu.tsc = Some(mts & 0x07);
    Ok(())
}

fn parse_burst(pdu: &mut UlPdu, buf: &[u8], exact: bool) -> Result<usize, ProtoError> {
    if pdu.nope {
        return Ok(0);
    }
    let want = pdu.modulation.burst_len();
    // Legacy transceivers may append two garbage bytes.
    if buf.len() < want || (exact && buf.len() != want && buf.len() != want + 2) {
        return Err(ProtoError::BadBurstLen(buf.len()));
    }
    pdu.bits = buf[..want].iter().map(|&v| soft(v)).collect();
    Ok(want)
}

/// Parse one uplink datagram into its PDUs. The version is pinned to
/// the negotiated one; anything else is a protocol error.
pub fn parse_ul(buf: &[u8], expected_ver: u8) -> Result<Vec<UlPdu>, ProtoError> {
    if buf.is_empty() {
        return Err(ProtoError::ShortPdu);
    }
    let ver = buf[0] >> 4;
    if ver != expected_ver {
        return Err(ProtoError::BadVersion { got: ver, want: expected_ver });
    }

    let mut pdus: Vec<UlPdu> = Vec::new();
    let mut rest = buf;
    loop {
        let first = pdus.is_empty();
        let mut pdu = UlPdu {
            tn: 0,
            fnr: 0,
            trx_num: None,
            rssi: 0,
            toa256: 0,
            ci_cb: None,
            modulation: Modulation::Gmsk,
            tsc_set: None,
            tsc: None,
            nope: false,
            shadow: false,
            bits: Vec::new(),
        };
        let mut batch = false;

        let hdr = match ver {
            0 => {
                if rest.len() < UL_V0_HDR {
                    return Err(ProtoError::ShortPdu);
                }
                pdu.tn = rest[0] & 0x07;
                pdu.fnr = u32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]);
                pdu.rssi = (rest[5] as i8).wrapping_neg();
                pdu.toa256 = i16::from_be_bytes([rest[6], rest[7]]);
                // v0 has no MTS; guess the burst length (the whole
                // datagram is one PDU).
                let body = rest.len() - UL_V0_HDR;
                pdu.modulation = match body {
                    444 | 446 => Modulation::Psk8,
                    148 | 150 => Modulation::Gmsk,
                    n => return Err(ProtoError::BadBurstLen(n)),
                };
                UL_V0_HDR
            }
            1 => {
                if rest.len() < UL_V1_HDR {
                    return Err(ProtoError::ShortPdu);
                }
                pdu.tn = rest[0] & 0x07;
                pdu.fnr = u32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]);
                pdu.rssi = (rest[5] as i8).wrapping_neg();
                pdu.toa256 = i16::from_be_bytes([rest[6], rest[7]]);
                parse_mts(&mut pdu, rest[8])?;
                pdu.ci_cb = Some(i16::from_be_bytes([rest[9], rest[10]]));
                UL_V1_HDR
            }
            2 => {
                if rest.len() < UL_V2_HDR {
                    return Err(ProtoError::ShortPdu);
                }
                pdu.tn = rest[0] & 0x07;
                batch = rest[1] & 0x80 != 0;
                pdu.shadow = rest[1] & 0x40 != 0;
                pdu.trx_num = Some(rest[1] & 0x3f);
                parse_mts(&mut pdu, rest[2])?;
                pdu.rssi = (rest[3] as i8).wrapping_neg();
                pdu.toa256 = i16::from_be_bytes([rest[4], rest[5]]);
                pdu.ci_cb = Some(i16::from_be_bytes([rest[6], rest[7]]));
                if first {
                    if rest.len() < UL_V2_HDR + 4 {
                        return Err(ProtoError::ShortPdu);
                    }
                    pdu.fnr = u32::from_be_bytes([rest[8], rest[9], rest[10], rest[11]]);
                    UL_V2_HDR + 4
                } else {
                    // Batched PDUs inherit the frame number.
                    pdu.fnr = pdus[0].fnr;
                    UL_V2_HDR
                }
            }
            v => return Err(ProtoError::BadVersion { got: v, want: expected_ver }),
        };

        if pdu.fnr >= HYPERFRAME {
            return Err(ProtoError::BadFn(pdu.fnr));
        }

        rest = &rest[hdr..];
        let used = parse_burst(&mut pdu, rest, ver == 0)?;
        rest = &rest[used.min(rest.len())..];
        pdus.push(pdu);

        if !batch {
            break;
        }
    }
    Ok(pdus)
}

/// One downlink burst request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlPdu {
    pub tn: u8,
    pub fnr: u32,
    pub trx_num: u8,
    /// Attenuation below nominal power, dB.
    pub att: u8,
    pub modulation: Modulation,
    pub tsc_set: u8,
    pub tsc: u8,
    /// AQPSK subchannel power ratio.
    pub scpir: i8,
    /// Hard bits (one byte per bit).
    pub bits: Vec<u8>,
}

/// Encode downlink PDUs into one datagram. v0/v1 take exactly one PDU;
/// v2 batches, with the frame number only in the first PDU and
/// BATCH.ind cleared on the last.
pub fn build_dl(pdus: &[DlPdu], ver: u8, out: &mut Vec<u8>) {
    out.clear();
    match ver {
        0 | 1 => {
            let pdu = &pdus[0];
            out.push((ver << 4) | pdu.tn);
            out.extend_from_slice(&pdu.fnr.to_be_bytes());
            out.push(pdu.att);
            out.extend_from_slice(&pdu.bits);
        }
        _ => {
            for (i, pdu) in pdus.iter().enumerate() {
                let last = i + 1 == pdus.len();
                let mut b0 = pdu.tn;
                if i == 0 {
                    b0 |= ver << 4;
                }
                out.push(b0);
                out.push((pdu.trx_num & 0x3f) | if last { 0 } else { 0x80 });
                out.push(pdu.modulation.mts_val() | (pdu.tsc_set << 3) | (pdu.tsc & 0x07));
                out.push(pdu.att);
                out.push(pdu.scpir as u8);
                out.extend_from_slice(&[0, 0, 0]);
                if i == 0 {
                    out.extend_from_slice(&pdu.fnr.to_be_bytes());
                }
                out.extend_from_slice(&pdu.bits);
            }
        }
    }
}
