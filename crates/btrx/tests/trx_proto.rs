// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire-protocol conformance against a scripted modem: provisioning to
//! POWERON, SETFORMAT version negotiation, burst flow after the first
//! clock, and link teardown + recovery on clock loss.
//!
//! The modem side lives on plain std sockets in the same thread; the
//! reactor is driven by [`PhyLink::step`].

use btrx::bts::Pchan;
use btrx::gsm::Band;
use btrx::l1sap::{L1Up, L1sapUp, MphInfo};
use btrx::{Bts, Config, PhyLink, TrxId};
use mio::Events;
use std::cell::RefCell;
use std::net::UdpSocket;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Collects upward primitives through the reactor's boxed sink.
#[derive(Default)]
struct SharedSink(Rc<RefCell<Vec<L1Up>>>);

impl L1sapUp for SharedSink {
    fn l1sap_up(&mut self, prim: L1Up) {
        self.0.borrow_mut().push(prim);
    }
}

/// The modem side: clock/ctrl/data sockets bound on the remote ports.
struct MockModem {
    clock: UdpSocket,
    ctrl: UdpSocket,
    data: UdpSocket,
    bts_clock_port: u16,
    ver_max: u8,
    powered: bool,
    cmds_seen: Vec<String>,
    data_seen: Vec<Vec<u8>>,
    fnr: u32,
}

impl MockModem {
    fn new(base_remote: u16, bts_clock_port: u16, ver_max: u8) -> Self {
        let bind = |port: u16| {
            let s = UdpSocket::bind(("127.0.0.1", port)).expect("bind mock socket");
            s.set_nonblocking(true).expect("nonblocking");
            s
        };
        Self {
            clock: bind(base_remote),
            ctrl: bind(base_remote + 1),
            data: bind(base_remote + 2),
            bts_clock_port,
            ver_max,
            powered: false,
            cmds_seen: Vec::new(),
            data_seen: Vec::new(),
            fnr: 100,
        }
    }

    /// Answer every pending control command, swallow data datagrams.
    fn pump(&mut self) {
        let mut buf = [0u8; 2048];
        while let Ok((len, src)) = self.ctrl.recv_from(&mut buf) {
            let line = String::from_utf8_lossy(&buf[..len]).trim_end_matches('\0').to_string();
            let Some(rest) = line.strip_prefix("CMD ") else { continue };
            let (cmd, params) = rest.split_once(' ').unwrap_or((rest, ""));
            self.cmds_seen.push(rest.to_string());
            let rsp = match cmd {
                "POWERON" => {
                    self.powered = true;
                    "RSP POWERON 0".to_string()
                }
                "POWEROFF" => {
                    self.powered = false;
                    "RSP POWEROFF 0".to_string()
                }
                "SETFORMAT" => {
                    let req: u8 = params.parse().unwrap_or(0);
                    format!("RSP SETFORMAT {} {}", req.min(self.ver_max), params)
                }
                "NOMTXPOWER" => "RSP NOMTXPOWER 0 23".to_string(),
                _ if params.is_empty() => format!("RSP {} 0", cmd),
                _ => format!("RSP {} 0 {}", cmd, params),
            };
            let mut wire = rsp.into_bytes();
            wire.push(0);
            self.ctrl.send_to(&wire, src).expect("mock ctrl send");
        }
        while let Ok((len, _)) = self.data.recv_from(&mut buf) {
            self.data_seen.push(buf[..len].to_vec());
        }
    }

    fn send_clock(&mut self) {
        let msg = format!("IND CLOCK {}", self.fnr);
        self.fnr += 1;
        self.clock
            .send_to(msg.as_bytes(), ("127.0.0.1", self.bts_clock_port))
            .expect("mock clock send");
    }

    fn saw(&self, prefix: &str) -> bool {
        self.cmds_seen.iter().any(|c| c.starts_with(prefix))
    }
}

fn make_link(base_local: u16, base_remote: u16, ver_max: u8) -> (PhyLink, Rc<RefCell<Vec<L1Up>>>) {
    let prims = Rc::new(RefCell::new(Vec::new()));
    let mut bts = Bts::new(Band::Gsm900, 63);
    bts.add_trx(10);
    let cfg = Config {
        base_port_local: base_local,
        base_port_remote: base_remote,
        trxd_pdu_ver_max: ver_max,
        ..Config::default()
    };
    let mut link =
        PhyLink::new(cfg, bts, Box::new(SharedSink(prims.clone()))).expect("phy link");
    link.ts_config(TrxId(0), 0, Pchan::Ccch).expect("BCCH combination");
    (link, prims)
}

fn drive(link: &mut PhyLink, modem: &mut MockModem, events: &mut Events, for_ms: u64) {
    let until = Instant::now() + Duration::from_millis(for_ms);
    while Instant::now() < until {
        modem.pump();
        link.step_with(events, Duration::from_millis(2)).expect("reactor step");
    }
}

/// Step the reactor while the modem stays silent (clock-loss phases).
fn drive_silent(link: &mut PhyLink, events: &mut Events, for_ms: u64) {
    let until = Instant::now() + Duration::from_millis(for_ms);
    while Instant::now() < until {
        link.step_with(events, Duration::from_millis(2)).expect("reactor step");
    }
}

#[test]
fn provisioning_reaches_poweron_and_bursts_flow() {
    let mut modem = MockModem::new(28700, 28800, 1);
    let (mut link, prims) = make_link(28800, 28700, 1);
    link.ts_config(TrxId(0), 1, Pchan::TchF).expect("TCH/F combination");
    let mut events = Events::with_capacity(64);

    link.open();
    drive(&mut link, &mut modem, &mut events, 300);

    // The whole provisioning sequence went out in order of dependency.
    assert!(modem.saw("POWEROFF"), "pre-emptive POWEROFF first");
    assert!(modem.saw("RXTUNE 892000"));
    assert!(modem.saw("TXTUNE 937000"));
    assert!(modem.saw("SETTSC 7"));
    assert!(modem.saw("SETFORMAT 1"));
    assert!(modem.saw("NOMTXPOWER"));
    assert!(modem.saw("POWERON"), "POWERON after full configuration");
    assert!(link.powered());
    assert_eq!(link.trxd_ver(TrxId(0)), 1);
    assert!(modem.saw("SETSLOT 0 4"), "BCCH timeslot programmed");

    // Clock indications make the scheduler emit C0 bursts.
    for _ in 0..12 {
        modem.send_clock();
        drive(&mut link, &mut modem, &mut events, 8);
    }
    assert!(!modem.data_seen.is_empty(), "TRXD datagrams after clock");
    let d = &modem.data_seen[0];
    assert_eq!(d[0] >> 4, 1, "negotiated v1 on the wire");
    assert_eq!(d.len(), 6 + 148);

    // Dynamic switch of the traffic timeslot to PDCH: the modem gets
    // the new slot type and the packet channel comes up.
    link.ts_mode_modify(TrxId(0), 1, Pchan::Pdch).expect("dynamic switch");
    drive(&mut link, &mut modem, &mut events, 100);
    assert!(modem.saw("SETSLOT 1 13"), "PDCH slot type programmed");
    assert!(prims.borrow().iter().any(|p| matches!(
        p,
        L1Up::MphInfoInd(MphInfo::ChanActCnf { chan_nr: 0x09, deactivated: false, .. })
    )));
}

#[test]
fn setformat_negotiates_down_to_modem_version() {
    let mut modem = MockModem::new(28710, 28810, 0);
    let (mut link, _prims) = make_link(28810, 28710, 2);
    let mut events = Events::with_capacity(64);

    link.open();
    drive(&mut link, &mut modem, &mut events, 400);

    // 2 was requested, the modem granted 0, the BTS re-requested and
    // settled on 0.
    assert!(modem.saw("SETFORMAT 2"));
    assert!(modem.saw("SETFORMAT 0"));
    assert_eq!(link.trxd_ver(TrxId(0)), 0);
    assert!(link.powered());
}

#[test]
fn clock_loss_tears_down_and_recovers() {
    let mut modem = MockModem::new(28720, 28820, 1);
    let (mut link, prims) = make_link(28820, 28720, 1);
    let mut events = Events::with_capacity(64);

    link.open();
    drive(&mut link, &mut modem, &mut events, 300);
    assert!(link.powered());

    modem.send_clock();
    drive(&mut link, &mut modem, &mut events, 50);
    modem.cmds_seen.clear();

    // Silence from the modem: after the loss window (400 frames) the
    // BTS powers the carrier off and reports the link down.
    drive_silent(&mut link, &mut events, 2200);
    assert!(!link.powered());
    assert!(prims
        .borrow()
        .iter()
        .any(|p| matches!(p, L1Up::MphInfoInd(MphInfo::LinkState { connected: false }))));

    // The modem comes back: POWEROFF is answered, the provisioning
    // machine renegotiates and POWERON is re-issued.
    drive(&mut link, &mut modem, &mut events, 500);
    assert!(modem.saw("POWEROFF"), "POWEROFF on clock loss");
    assert!(modem.saw("SETFORMAT 1"), "format renegotiated after loss");
    assert!(modem.saw("POWERON"), "POWERON re-issued");
    assert!(link.powered());
}
