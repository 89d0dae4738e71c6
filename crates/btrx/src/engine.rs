// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The reactor: one phy link to a radio modem.
//!
//! A [`PhyLink`] owns the shared clock socket, the per-carrier
//! TRXC/TRXD socket pairs, the frame clock, the provisioning machines
//! and the schedulers. One mio `Poll` drives everything on a single
//! thread; timers are absolute deadlines folded into the poll timeout.
//!
//! ```text
//! IND CLOCK --> FrameClock --> fn_tick --> Scheduler --> TRXD out
//! TRXD in   --> parse_ul  --> Scheduler --> L1-SAP up
//! TRXC in   --> CtrlQueue --> Provision --> TRXC out
//! ```

use crate::bts::{Bts, CipherState, LchanState, Pchan, TrxId};
use crate::config::{Config, HYPERFRAME, POWERON_RETRY, TRXC_RETRANS};
use crate::gsm::Band;
use crate::l1sap::{chan_nr_ss, chan_nr_tn, L1Down, L1Up, L1sapUp, MphInfo, MphReq};
use crate::power::PowerRamp;
use crate::sched::{SchedActions, Scheduler, UlBurst};
use crate::trx::clock::{parse_clock_ind, ClockOut, FrameClock};
use crate::trx::ctrl::{CtrlMsg, CtrlOutcome, CtrlQueue};
use crate::trx::data::{build_dl, parse_ul, DlPdu, Modulation};
use crate::trx::provision::{LinkEvent, ProvConfig, ProvEvent, ProvOutput, ProvState, Provision};
use crate::trx::udp_connected;
use crate::{Error, Result};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const CLOCK_TOKEN: Token = Token(0);
const MAX_DGRAM: usize = 4096;

/// Per-carrier runtime state.
struct TrxState {
    ctrl: UdpSocket,
    data: UdpSocket,
    queue: CtrlQueue,
    prov: Provision,
    sched: Scheduler,
    ramp: PowerRamp,
    /// TRXC retransmission deadline while a command is outstanding.
    retrans_at: Option<Instant>,
    /// POWERON retry deadline after a NACK.
    poweron_retry_at: Option<Instant>,
}

/// One modem link and all its carriers.
pub struct PhyLink {
    pub cfg: Config,
    pub bts: Bts,
    clock_sock: UdpSocket,
    clock: FrameClock,
    frame_timer_at: Option<Instant>,
    trxs: Vec<TrxState>,
    poll: Poll,
    up: Box<dyn L1sapUp>,
    /// POWERON confirmed; bursts flow only while set.
    powered: bool,
    fatal: Option<Error>,
    shutdown: bool,
    buf: Vec<u8>,
}

impl PhyLink {
    /// Bind all sockets of the link and register them with the poll.
    pub fn new(cfg: Config, bts: Bts, up: Box<dyn L1sapUp>) -> Result<Self> {
        let poll = Poll::new()?;
        let clock_local: SocketAddr = (cfg.local_ip, cfg.base_port_local).into();
        let clock_remote: SocketAddr = (cfg.remote_ip, cfg.base_port_remote).into();
        let mut clock_sock = UdpSocket::from_std(udp_connected(clock_local, clock_remote)?);
        poll.registry().register(&mut clock_sock, CLOCK_TOKEN, Interest::READABLE)?;

        let mut trxs = Vec::new();
        for trx in &bts.trx {
            let n = trx.num;
            let ctrl = udp_connected(
                (cfg.local_ip, cfg.ctrl_port_local(n)).into(),
                (cfg.remote_ip, cfg.ctrl_port_remote(n)).into(),
            )?;
            let data = udp_connected(
                (cfg.local_ip, cfg.data_port_local(n)).into(),
                (cfg.remote_ip, cfg.data_port_remote(n)).into(),
            )?;
            let mut ctrl = UdpSocket::from_std(ctrl);
            let mut data = UdpSocket::from_std(data);
            poll.registry().register(&mut ctrl, Token(1 + 2 * n as usize), Interest::READABLE)?;
            poll.registry().register(&mut data, Token(2 + 2 * n as usize), Interest::READABLE)?;

            let band = if cfg.auto_band {
                Band::from_arfcn(trx.arfcn).unwrap_or(bts.band)
            } else {
                bts.band
            };
            let prov = Provision::new(ProvConfig {
                trx_num: n,
                band,
                auto_band: cfg.auto_band,
                use_legacy_setbsic: cfg.use_legacy_setbsic,
                trxd_ver_max: cfg.trxd_pdu_ver_max,
                nominal_power_fixed: cfg.nominal_tx_power_dbm.is_some(),
                rxgain: cfg.rxgain_db,
                maxdly: cfg.maxdly,
                maxdlynb: cfg.maxdlynb,
                rf_locked: false,
            });
            let mut sched = Scheduler::new(n, n == 0, bts.bsic);
            sched.loop_cfg.ms_power_loop = cfg.ms_power_loop;
            sched.loop_cfg.ms_power_target_dbm = cfg.ms_power_target_dbm;
            sched.loop_cfg.ta_loop = cfg.ta_loop;
            let (lo, hi) = band.ms_power_range();
            sched.loop_cfg.ms_power_min = lo;
            sched.loop_cfg.ms_power_max = hi;

            trxs.push(TrxState {
                ctrl,
                data,
                queue: CtrlQueue::default(),
                prov,
                sched,
                ramp: PowerRamp::new(trx.max_power_red_db),
                retrans_at: None,
                poweron_retry_at: None,
            });
        }

        if trxs.len() > 1 {
            trxs[0].prov.set_others_ready(false);
        }

        Ok(Self {
            cfg,
            bts,
            clock_sock,
            clock: FrameClock::new(),
            frame_timer_at: None,
            trxs,
            poll,
            up,
            powered: false,
            fatal: None,
            shutdown: false,
            buf: vec![0u8; MAX_DGRAM],
        })
    }

    /// Open the link: walk every provisioning machine through OPEN and
    /// feed it the configured identity (BSIC, ARFCN, timeslot types).
    pub fn open(&mut self) {
        log::info!("[TRX] opening phy link ({} carriers)", self.trxs.len());
        for i in 0..self.trxs.len() {
            let arfcn = self.bts.trx[i].arfcn;
            let bsic = self.bts.bsic;
            let slots: Vec<(u8, u8)> = self.bts.trx[i]
                .ts
                .iter()
                .enumerate()
                .filter_map(|(tn, ts)| ts.pchan.slot_type().map(|t| (tn as u8, t)))
                .collect();
            self.prov_dispatch(i, ProvEvent::Open);
            self.prov_dispatch(i, ProvEvent::CfgEnable(true));
            self.prov_dispatch(i, ProvEvent::CfgBsic(bsic));
            self.prov_dispatch(i, ProvEvent::CfgArfcn(arfcn));
            for (tn, slottype) in slots {
                self.prov_dispatch(i, ProvEvent::CfgTs { tn, slottype, tsc: None });
            }
        }
    }

    /// Configure a timeslot before the link comes up.
    pub fn ts_config(&mut self, trx: TrxId, tn: u8, pchan: Pchan) -> Result<()> {
        self.bts.trx[trx.0].ts[tn as usize].pchan = pchan;
        self.bts.trx[trx.0].ts[tn as usize].pchan_wanted = pchan;
        self.trxs[trx.0].sched.set_pchan(tn, pchan)
    }

    /// Dynamic reconfiguration of a timeslot (TCH <-> PDCH): deactivate
    /// whatever is running, drain the queue, reprogram the modem and
    /// bring up the packet channels.
    pub fn ts_mode_modify(&mut self, trx: TrxId, tn: u8, pchan: Pchan) -> Result<()> {
        let Some(slottype) = pchan.slot_type() else {
            return Err(Error::BadConfig(format!("unsupported pchan {:?}", pchan)));
        };
        log::info!("[TRX] trx={} ts={} mode modify -> {:?}", trx.0, tn, pchan);
        self.bts.trx[trx.0].ts[tn as usize].pchan_wanted = pchan;

        // Deactivate every running lchan of the old configuration.
        let mut actions = SchedActions::default();
        let t = &mut self.trxs[trx.0];
        for chan in crate::sched::chan::ALL_CHANS {
            let desc = chan.desc();
            let st = &t.sched.ts[tn as usize].chan_state[chan as usize];
            if !st.active || desc.auto_active {
                continue;
            }
            let chan_nr = chan.chan_nr(tn);
            let _ = t.sched.set_lchan(chan_nr, desc.link_id, false, &mut actions);
            if desc.link_id == 0 {
                self.up.l1sap_up(L1Up::MphInfoInd(MphInfo::ChanActCnf {
                    chan_nr,
                    deactivated: true,
                    cause: 0,
                }));
            }
        }

        // Any pending traffic is stale after the switch.
        let dropped = t.sched.ts[tn as usize].dl_prims.len();
        if dropped > 0 {
            log::warn!("[TRX] dropping {} queued prims on ts={} mode switch", dropped, tn);
            t.sched.ts[tn as usize].dl_prims.clear();
        }

        self.bts.trx[trx.0].ts[tn as usize].pchan = pchan;
        self.trxs[trx.0].sched.set_pchan(tn, pchan)?;
        self.apply_sched_actions(trx.0, actions);
        self.prov_dispatch(trx.0, ProvEvent::CfgTs { tn, slottype, tsc: None });

        if pchan.is_pdch() {
            // PDTCH and PTCCH in both directions, PRACH is implicit.
            let mut actions = SchedActions::default();
            let chan_nr = 0x08 | tn;
            let t = &mut self.trxs[trx.0];
            let _ = t.sched.set_lchan(chan_nr, 0x00, true, &mut actions);
            self.up.l1sap_up(L1Up::MphInfoInd(MphInfo::ChanActCnf {
                chan_nr,
                deactivated: false,
                cause: 0,
            }));
            self.apply_sched_actions(trx.0, actions);
        }
        Ok(())
    }

    /// Primitive from the layer above.
    pub fn l1sap_down(&mut self, trx: TrxId, prim: L1Down) {
        let i = trx.0;
        match prim {
            L1Down::PhDataReq { chan_nr, link_id, fnr, payload } => {
                self.trxs[i].sched.ph_data_req(chan_nr, link_id, fnr, payload);
            }
            L1Down::TchReq { chan_nr, fnr, payload } => {
                self.trxs[i].sched.tch_req(chan_nr, fnr, payload);
            }
            L1Down::MphInfoReq(req) => self.mph_info_req(i, req),
        }
    }

    fn mph_info_req(&mut self, i: usize, req: MphReq) {
        match req {
            MphReq::ActCiph { chan_nr, downlink, uplink, algo, key } => {
                let tn = chan_nr_tn(chan_nr) as usize;
                let ss = chan_nr_ss(chan_nr) as usize;
                let t = &mut self.trxs[i];
                if uplink {
                    let _ = t.sched.set_cipher(chan_nr, false, algo, key);
                    self.bts.trx[i].ts[tn].lchans[ss].ciph_state = CipherState::RxConf;
                }
                if downlink {
                    if self.bts.trx[i].ts[tn].lchans[ss].ciph_state != CipherState::RxConf {
                        let _ = t.sched.set_cipher(chan_nr, false, algo, key);
                    }
                    let _ = t.sched.set_cipher(chan_nr, true, algo, key);
                    self.bts.trx[i].ts[tn].lchans[ss].ciph_state = CipherState::RxTxConf;
                }
            }
            MphReq::Activate { chan_nr } => {
                let tn = chan_nr_tn(chan_nr) as usize;
                let ss = chan_nr_ss(chan_nr) as usize;
                let lchan = self.bts.trx[i].ts[tn].lchans[ss].clone();
                let mut actions = SchedActions::default();
                let t = &mut self.trxs[i];
                let _ = t.sched.set_lchan(chan_nr, 0x00, true, &mut actions);
                let _ = t.sched.set_lchan(chan_nr, 0x40, true, &mut actions);
                let _ = t.sched.set_mode(
                    chan_nr,
                    lchan.rsl_cmode,
                    lchan.tch_mode,
                    &lchan.amr,
                    lchan.ho_rach_detect,
                    &mut actions,
                );
                if lchan.cipher.algo != 0 {
                    let _ = t.sched.set_cipher(chan_nr, false, lchan.cipher.algo, lchan.cipher.key);
                    let _ = t.sched.set_cipher(chan_nr, true, lchan.cipher.algo, lchan.cipher.key);
                    self.bts.trx[i].ts[tn].lchans[ss].ciph_state = CipherState::RxTxConf;
                }
                self.bts.trx[i].ts[tn].lchans[ss].state = LchanState::Active;
                self.apply_sched_actions(i, actions);
                self.up.l1sap_up(L1Up::MphInfoInd(MphInfo::ChanActCnf {
                    chan_nr,
                    deactivated: false,
                    cause: 0,
                }));
            }
            MphReq::Deactivate { chan_nr, sacch_only } => {
                let tn = chan_nr_tn(chan_nr) as usize;
                let ss = chan_nr_ss(chan_nr) as usize;
                let mut actions = SchedActions::default();
                let t = &mut self.trxs[i];
                let _ = t.sched.set_lchan(chan_nr, 0x40, false, &mut actions);
                if !sacch_only {
                    let _ = t.sched.set_lchan(chan_nr, 0x00, false, &mut actions);
                    self.bts.trx[i].ts[tn].lchans[ss].state = LchanState::None;
                    self.apply_sched_actions(i, actions);
                    self.up.l1sap_up(L1Up::MphInfoInd(MphInfo::ChanActCnf {
                        chan_nr,
                        deactivated: true,
                        cause: 0,
                    }));
                    return;
                }
                self.apply_sched_actions(i, actions);
            }
            MphReq::Modify { chan_nr } => {
                let tn = chan_nr_tn(chan_nr) as usize;
                let ss = chan_nr_ss(chan_nr) as usize;
                let lchan = self.bts.trx[i].ts[tn].lchans[ss].clone();
                let mut actions = SchedActions::default();
                let _ = self.trxs[i].sched.set_mode(
                    chan_nr,
                    lchan.rsl_cmode,
                    lchan.tch_mode,
                    &lchan.amr,
                    false,
                    &mut actions,
                );
                self.apply_sched_actions(i, actions);
            }
        }
    }

    fn apply_sched_actions(&mut self, i: usize, actions: SchedActions) {
        for (tn, ss, enable) in actions.set_handover {
            let cmd = if enable { "HANDOVER" } else { "NOHANDOVER" };
            self.ctrl_enqueue(i, cmd, format!("{} {}", tn, ss), true);
        }
    }

    fn ctrl_enqueue(&mut self, i: usize, cmd: &'static str, params: String, critical: bool) {
        let t = &mut self.trxs[i];
        if let Some(wire) = t.queue.enqueue(cmd, params, critical) {
            send_str(&t.ctrl, &wire);
            t.retrans_at = Some(Instant::now() + TRXC_RETRANS);
        }
    }

    fn prov_dispatch(&mut self, i: usize, ev: ProvEvent) {
        let mut out = ProvOutput::default();
        self.trxs[i].prov.dispatch(ev, &mut out);
        self.apply_prov_output(i, out);
    }

    fn apply_prov_output(&mut self, i: usize, out: ProvOutput) {
        for (cmd, params, critical) in out.commands {
            self.ctrl_enqueue(i, cmd, params, critical);
        }
        if let Some(dbm) = out.nominal_power {
            if self.cfg.nominal_tx_power_dbm.is_none() {
                self.bts.trx[i].nominal_power_dbm = Some(dbm);
            }
        }
        if out.poweron_retry {
            self.trxs[i].poweron_retry_at = Some(Instant::now() + POWERON_RETRY);
        }
        if out.became_ready && self.trxs.len() > 1 {
            let all_ready = self.trxs[1..]
                .iter()
                .all(|t| t.prov.state == ProvState::OpenPoweron);
            if all_ready {
                self.prov_dispatch(0, ProvEvent::OtherTrxReady);
            }
        }
        match out.link {
            Some(LinkEvent::Connected) => {
                log::info!("[TRX] phy link connected");
                self.powered = true;
                self.up.l1sap_up(L1Up::MphInfoInd(MphInfo::LinkState { connected: true }));
                for j in 0..self.trxs.len() {
                    let att = self.trxs[j].ramp.start();
                    self.ctrl_enqueue(j, "SETPOWER", att.to_string(), false);
                }
            }
            Some(LinkEvent::Shutdown) => {
                log::info!("[TRX] phy link shut down");
                self.powered = false;
                self.up.l1sap_up(L1Up::MphInfoInd(MphInfo::LinkState { connected: false }));
            }
            None => {}
        }
    }

    /// Drive the reactor until a fatal error or an orderly shutdown.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(64);
        while !self.shutdown {
            self.step(&mut events)?;
        }
        Ok(())
    }

    /// Ask the reactor to exit after the current iteration.
    pub fn request_shutdown(&mut self) {
        self.shutdown = true;
    }

    /// One poll iteration: expire timers, then drain ready sockets.
    pub fn step(&mut self, events: &mut Events) -> Result<()> {
        self.step_with(events, Duration::from_millis(500))
    }

    /// Like [`PhyLink::step`] with an upper bound on the poll wait
    /// (tests and embedders with their own outer loop).
    pub fn step_with(&mut self, events: &mut Events, max_wait: Duration) -> Result<()> {
        let now = Instant::now();
        self.expire_timers(now);
        if let Some(e) = self.fatal.take() {
            return Err(e);
        }

        let timeout = self
            .next_deadline()
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(max_wait)
            .min(max_wait);
        if let Err(e) = self.poll.poll(events, Some(timeout)) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(e.into());
        }

        let tokens: Vec<Token> = events.iter().map(|e| e.token()).collect();
        for token in tokens {
            if token == CLOCK_TOKEN {
                self.drain_clock();
                continue;
            }
            let Token(t) = token;
            let idx = (t - 1) / 2;
            if (t - 1) % 2 == 0 {
                self.drain_ctrl(idx);
            } else {
                self.drain_data(idx);
            }
        }
        if let Some(e) = self.fatal.take() {
            return Err(e);
        }
        Ok(())
    }

    fn next_deadline(&self) -> Option<Instant> {
        let mut next = self.frame_timer_at;
        for t in &self.trxs {
            for d in [t.retrans_at, t.poweron_retry_at] {
                next = match (next, d) {
                    (None, d) => d,
                    (n, None) => n,
                    (Some(a), Some(b)) => Some(a.min(b)),
                };
            }
        }
        next
    }

    fn expire_timers(&mut self, now: Instant) {
        if let Some(at) = self.frame_timer_at {
            if now >= at {
                self.frame_timer_at = None;
                let mut fns = Vec::new();
                let out = self.clock.on_timer(now, &mut |f| fns.push(f));
                for f in fns {
                    self.fn_tick(f);
                }
                self.handle_clock_out(out);
            }
        }
        for i in 0..self.trxs.len() {
            if let Some(at) = self.trxs[i].retrans_at {
                if now >= at {
                    let t = &mut self.trxs[i];
                    if let Some(wire) = t.queue.retransmit() {
                        send_str(&t.ctrl, &wire);
                        t.retrans_at = Some(now + TRXC_RETRANS);
                    } else {
                        t.retrans_at = None;
                    }
                }
            }
            if let Some(at) = self.trxs[i].poweron_retry_at {
                if now >= at {
                    self.trxs[i].poweron_retry_at = None;
                    self.ctrl_enqueue(i, "POWERON", String::new(), true);
                }
            }
        }
    }

    fn handle_clock_out(&mut self, out: ClockOut) {
        match out {
            ClockOut::Rearm(at) => self.frame_timer_at = Some(at),
            ClockOut::Started(at) => {
                self.frame_timer_at = Some(at);
                self.up.l1sap_up(L1Up::MphInfoInd(MphInfo::LinkState { connected: true }));
                // Re-run provisioning; after a link loss this restarts
                // the negotiation from OPEN_POWEROFF.
                for i in 0..self.trxs.len() {
                    self.prov_dispatch(i, ProvEvent::Kick);
                }
            }
            ClockOut::Lost => self.clock_lost(),
        }
    }

    /// The modem stopped talking: flush, reset, power off, tell L2.
    fn clock_lost(&mut self) {
        log::warn!("[CLOCK] transceiver lost, resetting link");
        self.frame_timer_at = None;
        self.powered = false;
        for i in 0..self.trxs.len() {
            self.trxs[i].queue.flush();
            self.trxs[i].retrans_at = None;
            self.trxs[i].sched.reset();
            self.trxs[i].ramp.abort();
            self.trxs[i].prov.link_lost();
        }
        self.ctrl_enqueue(0, "POWEROFF", String::new(), true);
        self.up.l1sap_up(L1Up::MphInfoInd(MphInfo::LinkState { connected: false }));
    }

    fn drain_clock(&mut self) {
        loop {
            let len = match self.clock_sock.recv(&mut self.buf) {
                Ok(len) => len,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("[CLOCK] recv failed: {}", e);
                    break;
                }
            };
            let Some(fnr) = parse_clock_ind(&self.buf[..len]) else {
                log::warn!("[CLOCK] unknown message on clock port");
                continue;
            };
            if !self.powered {
                log::info!("[CLOCK] ignoring CLOCK IND {}, TRX not yet powered on", fnr);
                continue;
            }
            log::debug!("[CLOCK] clock indication fn={}", fnr);
            let now = Instant::now();
            let mut fns = Vec::new();
            let out = self.clock.on_clock_ind(fnr, now, &mut |f| fns.push(f));
            for f in fns {
                self.fn_tick(f);
            }
            self.handle_clock_out(out);
        }
    }

    /// One TDMA frame became due: schedule all carriers and ship the
    /// resulting bursts.
    fn fn_tick(&mut self, fnr: u32) {
        crate::trace_fn!("PhyLink::fn_tick");
        if !self.powered || self.trxs.is_empty() {
            return;
        }
        let clock_advance = self.cfg.clock_advance;
        let rts_advance = self.cfg.rts_advance;
        let ver = self.trxs[0].prov.trxd_ver_use;

        for i in 0..self.trxs.len() {
            let t = &mut self.trxs[i];
            let mut bursts: Vec<(u8, u32, [u8; 148])> = Vec::new();
            t.sched.fn_tick(fnr, clock_advance, rts_advance, &mut *self.up, |tn, f, bits| {
                bursts.push((tn, f, bits));
            });
            if bursts.is_empty() {
                continue;
            }

            let att = t.ramp.current_att_db();
            let tsc = t.sched.tsc;
            let pdus: Vec<DlPdu> = bursts
                .into_iter()
                .map(|(tn, f, bits)| DlPdu {
                    tn,
                    fnr: f,
                    trx_num: i as u8,
                    att,
                    modulation: Modulation::Gmsk,
                    tsc_set: 0,
                    tsc,
                    scpir: 0,
                    bits: bits.to_vec(),
                })
                .collect();
            let mut out = Vec::new();
            if ver >= 2 {
                build_dl(&pdus, ver, &mut out);
                send_bytes(&t.data, &out);
            } else {
                for pdu in &pdus {
                    build_dl(std::slice::from_ref(pdu), ver, &mut out);
                    send_bytes(&t.data, &out);
                }
            }
        }

        // Drive the power ramp once per SACCH period.
        if fnr % 104 == 0 {
            for i in 0..self.trxs.len() {
                if let Some(att) = self.trxs[i].ramp.step() {
                    self.ctrl_enqueue(i, "SETPOWER", att.to_string(), false);
                }
            }
        }
    }

    fn drain_ctrl(&mut self, i: usize) {
        loop {
            let len = match self.trxs[i].ctrl.recv(&mut self.buf) {
                Ok(len) => len,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("[TRXC] recv failed: {}", e);
                    break;
                }
            };
            let line = String::from_utf8_lossy(&self.buf[..len]).into_owned();
            self.handle_ctrl_line(i, &line);
        }
    }

    fn handle_ctrl_line(&mut self, i: usize, line: &str) {
        let outcome = self.trxs[i].queue.handle_rsp(line);
        match outcome {
            CtrlOutcome::Completed { req, rsp } => {
                self.trxs[i].retrans_at = None;
                // Release the next queued command.
                if let Some(wire) = self.trxs[i].queue.head_wire() {
                    send_str(&self.trxs[i].ctrl, &wire);
                    self.trxs[i].retrans_at = Some(Instant::now() + TRXC_RETRANS);
                }
                self.handle_ctrl_completion(i, req, rsp);
            }
            CtrlOutcome::Fatal { req, rsp } => {
                self.fatal = Some(Error::CriticalNack { cmd: req.cmd, status: rsp.status });
            }
            CtrlOutcome::Duplicate | CtrlOutcome::Unmatched => {}
        }
    }

    fn handle_ctrl_completion(&mut self, i: usize, req: CtrlMsg, rsp: crate::trx::ctrl::CtrlRsp) {
        // A NACK on a critical command is unrecoverable; only POWERON
        // gets a retry instead.
        if rsp.status != 0 && req.critical && req.cmd != "POWERON" {
            self.fatal = Some(Error::CriticalNack { cmd: req.cmd, status: rsp.status });
            return;
        }
        match req.cmd.as_str() {
            "POWERON" => self.prov_dispatch(i, ProvEvent::PoweronCnf(rsp.status)),
            "POWEROFF" => self.prov_dispatch(i, ProvEvent::PoweroffCnf(rsp.status)),
            "RXTUNE" => self.prov_dispatch(i, ProvEvent::RxTuneCnf(rsp.status)),
            "TXTUNE" => self.prov_dispatch(i, ProvEvent::TxTuneCnf(rsp.status)),
            "SETTSC" => self.prov_dispatch(i, ProvEvent::SetTscCnf(rsp.status)),
            "SETBSIC" => self.prov_dispatch(i, ProvEvent::SetBsicCnf(rsp.status)),
            "NOMTXPOWER" => {
                let dbm = rsp.params.split(' ').next().and_then(|s| s.parse().ok()).unwrap_or(0);
                self.prov_dispatch(i, ProvEvent::NomTxPowerCnf { status: rsp.status, dbm });
            }
            "SETFORMAT" => {
                if rsp.cmd == "SETFORMAT" {
                    self.prov_dispatch(i, ProvEvent::SetFormatCnf(rsp.status));
                } else {
                    self.prov_dispatch(i, ProvEvent::SetFormatRej);
                }
            }
            "SETSLOT" => {
                if let Some(tn) = req.params.split(' ').next().and_then(|s| s.parse().ok()) {
                    self.trxs[i].prov.setslot_cnf(tn, rsp.status);
                }
            }
            _ => {
                if rsp.status != 0 {
                    log::warn!(
                        "[TRXC] transceiver rejected non-critical '{}' with status {}",
                        req.cmd,
                        rsp.status
                    );
                }
            }
        }
    }

    fn drain_data(&mut self, i: usize) {
        loop {
            let len = match self.trxs[i].data.recv(&mut self.buf) {
                Ok(len) => len,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("[TRXD] recv failed: {}", e);
                    break;
                }
            };
            let ver = self.trxs[i].prov.trxd_ver_use;
            let pdus = match parse_ul(&self.buf[..len], ver) {
                Ok(pdus) => pdus,
                Err(e) => {
                    log::error!("[TRXD] discarding datagram: {}", e);
                    continue;
                }
            };
            for pdu in pdus {
                // TRXDv2 batches may interleave carriers.
                let target = match pdu.trx_num {
                    Some(n) if (n as usize) < self.trxs.len() => n as usize,
                    _ => i,
                };
                let burst = UlBurst {
                    tn: pdu.tn,
                    fnr: pdu.fnr,
                    rssi: pdu.rssi,
                    toa256: pdu.toa256,
                    ci_cb: pdu.ci_cb,
                    bits: pdu.bits,
                };
                let t = &mut self.trxs[target];
                t.sched.ul_burst(&burst, &mut *self.up);
            }
        }
    }

    /// The frame number last driven by the clock (for tests/tools).
    pub fn last_fn(&self) -> u32 {
        self.clock.last_fn() % HYPERFRAME
    }

    /// Whether the modem confirmed POWERON.
    pub fn powered(&self) -> bool {
        self.powered
    }

    /// The negotiated TRXD PDU version of a carrier.
    pub fn trxd_ver(&self, trx: TrxId) -> u8 {
        self.trxs[trx.0].prov.trxd_ver_use
    }
}

fn send_str(sock: &UdpSocket, line: &str) {
    log::debug!("[TRXC] sending control '{}'", line);
    let mut wire = line.as_bytes().to_vec();
    wire.push(0);
    if let Err(e) = sock.send(&wire) {
        log::error!("[TRXC] send failed: {}", e);
    }
}

fn send_bytes(sock: &UdpSocket, buf: &[u8]) {
    if let Err(e) = sock.send(buf) {
        // UDP bursts are lossy; never retried.
        log::error!("[TRXD] send failed: {}", e);
    }
}
