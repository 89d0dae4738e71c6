// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! btrx-phymock: a mock radio modem for integration testing.
//!
//! Binds the modem side of the TRX port scheme, acknowledges every TRXC
//! command (negotiating the TRXD version down to `BTRX_MOCK_VER_MAX`
//! when asked for more), emits `IND CLOCK` at the TDMA frame rate while
//! powered on, and optionally loops every downlink burst back as a
//! clean uplink burst (`--loopback`).
//!
//! ```text
//! btrx-phymock [--loopback]    # modem side of 127.0.0.1:5700..5702
//! ```

use btrx::config::{FRAME_DURATION_US, HYPERFRAME};
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

struct Mock {
    clock: UdpSocket,
    ctrl: UdpSocket,
    data: UdpSocket,
    /// Where clock indications go (the BTS clock socket).
    clock_dst: SocketAddr,
    powered: bool,
    ver: u8,
    ver_max: u8,
    loopback: bool,
    fnr: u32,
}

impl Mock {
    fn reply(&self, rsp: String, dst: SocketAddr) {
        log::debug!("[MOCK] -> {}", rsp);
        let mut wire = rsp.into_bytes();
        wire.push(0);
        let _ = self.ctrl.send_to(&wire, dst);
    }

    fn handle_cmd(&mut self, line: &str, src: SocketAddr) {
        let line = line.trim_end_matches('\0');
        let Some(rest) = line.strip_prefix("CMD ") else {
            log::warn!("[MOCK] unexpected control message '{}'", line);
            return;
        };
        let (cmd, params) = rest.split_once(' ').unwrap_or((rest, ""));
        log::info!("[MOCK] <- CMD {} {}", cmd, params);
        match cmd {
            "POWERON" => {
                self.powered = true;
                self.reply("RSP POWERON 0".into(), src);
            }
            "POWEROFF" => {
                self.powered = false;
                self.reply("RSP POWEROFF 0".into(), src);
            }
            "SETFORMAT" => {
                let req: u8 = params.parse().unwrap_or(0);
                let granted = req.min(self.ver_max);
                self.ver = granted;
                self.reply(format!("RSP SETFORMAT {} {}", granted, params), src);
            }
            "NOMTXPOWER" => self.reply("RSP NOMTXPOWER 0 23".into(), src),
            other => {
                if params.is_empty() {
                    self.reply(format!("RSP {} 0", other), src);
                } else {
                    self.reply(format!("RSP {} 0 {}", other, params), src);
                }
            }
        }
    }

    /// Convert a downlink datagram back into an uplink one: strong soft
    /// bits, flat RSSI, zero timing offset.
    fn loop_back(&self, buf: &[u8], src: SocketAddr) {
        // Downlink v0/v1 layout: [ver|tn][fn:4][att][bits].
        if buf.len() < 6 + 148 {
            return;
        }
        let tn = buf[0] & 0x07;
        let fnr = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        let bits = &buf[6..6 + 148];

        let mut ul = vec![(self.ver << 4) | tn];
        ul.extend_from_slice(&fnr.to_be_bytes());
        ul.push(60); // reported as -60 dBm
        ul.extend_from_slice(&0i16.to_be_bytes());
        if self.ver >= 1 {
            ul.push(0x00); // GMSK, TSC set 0, TSC 0
            ul.extend_from_slice(&200i16.to_be_bytes());
        }
        // Hard bit -> saturated soft bit: 0 -> 0x00 (+127), 1 -> 0xfe.
        ul.extend(bits.iter().map(|&b| if b != 0 { 0xfeu8 } else { 0x00 }));
        let _ = self.data.send_to(&ul, src);
    }

    fn run(&mut self) {
        let frame = Duration::from_micros(FRAME_DURATION_US);
        let mut next_clock = Instant::now();
        let mut buf = [0u8; 4096];
        log::info!("[MOCK] modem mock up, loopback={}", self.loopback);
        loop {
            if self.powered {
                let now = Instant::now();
                while now >= next_clock {
                    let msg = format!("IND CLOCK {}", self.fnr);
                    let _ = self.clock.send_to(msg.as_bytes(), self.clock_dst);
                    self.fnr = (self.fnr + 1) % HYPERFRAME;
                    next_clock += frame;
                }
            } else {
                next_clock = Instant::now() + frame;
            }

            if let Ok((len, src)) = self.ctrl.recv_from(&mut buf) {
                let line = String::from_utf8_lossy(&buf[..len]).into_owned();
                self.handle_cmd(&line, src);
            }
            if let Ok((len, src)) = self.data.recv_from(&mut buf) {
                if self.loopback && self.powered {
                    self.loop_back(&buf[..len], src);
                }
            }
        }
    }
}

fn main() {
    btrx::logging::init();
    let bts_ip: String = env_or("BTRX_MOCK_BTS_IP", "127.0.0.1".to_string());
    let bind: String = env_or("BTRX_MOCK_BIND_IP", "127.0.0.1".to_string());
    let base: u16 = env_or("BTRX_MOCK_BASE_PORT", 5700u16);
    let bts_base: u16 = env_or("BTRX_MOCK_BTS_BASE_PORT", 5800u16);
    let loopback = std::env::args().any(|a| a == "--loopback");

    let clock = UdpSocket::bind(format!("{}:{}", bind, base)).expect("bind clock socket");
    let ctrl = UdpSocket::bind(format!("{}:{}", bind, base + 1)).expect("bind ctrl socket");
    let data = UdpSocket::bind(format!("{}:{}", bind, base + 2)).expect("bind data socket");
    for s in [&ctrl, &data] {
        s.set_read_timeout(Some(Duration::from_millis(1))).expect("socket timeout");
    }

    let mut mock = Mock {
        clock,
        ctrl,
        data,
        clock_dst: format!("{}:{}", bts_ip, bts_base).parse().expect("clock destination"),
        powered: false,
        ver: 0,
        ver_max: env_or("BTRX_MOCK_VER_MAX", 1u8),
        loopback,
        fnr: 0,
    };
    mock.run();
}
