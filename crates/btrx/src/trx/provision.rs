// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The provisioning state machine: takes one TRX from CLOSED through
//! configuration to POWERON and back.
//!
//! Every setting is a [`Provisioned`] triple (desired, requested,
//! acked); a configuration change invalidates the downstream state and
//! the machine recomputes which commands still need to go out. Commands
//! are emitted into a [`ProvOutput`] for the reactor to enqueue on the
//! TRXC queue; their confirmations come back as [`ProvEvent`]s.
//!
//! POWERON is only issued by TRX 0, and only once every carrier of the
//! link is fully configured; the other carriers wait in OPEN_POWEROFF
//! and are marshalled through [`ProvEvent::OtherTrxReady`].

use crate::gsm::{tune_param_khz, Band};

/// One provisionable setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Provisioned<T: Copy + PartialEq> {
    pub desired: Option<T>,
    pub requested: Option<T>,
    pub acked: Option<T>,
}

impl<T: Copy + PartialEq> Provisioned<T> {
    /// Change the target value; downstream state is invalidated when it
    /// differs from what was already negotiated.
    pub fn set_desired(&mut self, v: T) {
        if self.desired != Some(v) {
            self.desired = Some(v);
            self.requested = None;
            self.acked = None;
        }
    }

    /// The value to put on the wire now, if any.
    pub fn needs_request(&self) -> Option<T> {
        match (self.desired, self.requested) {
            (Some(d), None) => Some(d),
            (Some(d), Some(r)) if d != r => Some(d),
            _ => None,
        }
    }

    pub fn mark_requested(&mut self) {
        self.requested = self.desired;
        self.acked = None;
    }

    pub fn mark_acked(&mut self) {
        self.acked = self.requested;
    }

    pub fn is_acked(&self) -> bool {
        self.desired.is_some() && self.desired == self.acked
    }
}

/// FSM states, exactly the original's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvState {
    #[default]
    Closed,
    OpenPoweroff,
    OpenWaitPoweronCnf,
    OpenPoweron,
    OpenWaitPoweroffCnf,
}

/// Inputs to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvEvent {
    Open,
    Close,
    CfgEnable(bool),
    CfgBsic(u8),
    CfgArfcn(u16),
    CfgTs { tn: u8, slottype: u8, tsc: Option<(u8, u8)> },
    RxTuneCnf(i32),
    TxTuneCnf(i32),
    SetTscCnf(i32),
    SetBsicCnf(i32),
    NomTxPowerCnf { status: i32, dbm: i32 },
    SetFormatCnf(i32),
    /// The modem rejected SETFORMAT outright (`RSP ERR`): fall back to
    /// the legacy v0 PDU format.
    SetFormatRej,
    PoweronCnf(i32),
    PoweroffCnf(i32),
    OtherTrxReady,
    /// No-op event: re-evaluate outstanding configuration (used after
    /// the clock returns from a link loss).
    Kick,
}

/// Link-level transitions the embedding layer must act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Shutdown,
}

/// Side effects of one dispatch.
#[derive(Debug, Default)]
pub struct ProvOutput {
    /// TRXC commands to enqueue: (name, params, critical).
    pub commands: Vec<(&'static str, String, bool)>,
    pub link: Option<LinkEvent>,
    /// NOMTXPOWER result to apply to the TRX model.
    pub nominal_power: Option<i32>,
    /// POWERON was NACKed; retry it after the grace period.
    pub poweron_retry: bool,
    /// This TRX just became fully provisioned (for TRX0 marshalling).
    pub became_ready: bool,
}

impl ProvOutput {
    fn cmd(&mut self, name: &'static str, params: impl Into<String>, critical: bool) {
        self.commands.push((name, params.into(), critical));
    }
}

/// Static knobs the machine needs.
#[derive(Debug, Clone, Copy)]
pub struct ProvConfig {
    pub trx_num: u8,
    pub band: Band,
    pub auto_band: bool,
    pub use_legacy_setbsic: bool,
    pub trxd_ver_max: u8,
    /// Operator-forced nominal power: skip NOMTXPOWER.
    pub nominal_power_fixed: bool,
    pub rxgain: Option<i32>,
    pub maxdly: Option<i32>,
    pub maxdlynb: Option<i32>,
    /// RF mute state to apply while opening (administrative lock).
    pub rf_locked: bool,
}

/// The per-TRX provisioning machine.
#[derive(Debug)]
pub struct Provision {
    pub cfg: ProvConfig,
    pub state: ProvState,
    enabled: bool,
    arfcn: Option<u16>,
    rxtune: Provisioned<u32>,
    txtune: Provisioned<u32>,
    tsc: Provisioned<u8>,
    bsic: Provisioned<u8>,
    nomtxpower_requested: bool,
    nomtxpower_acked: bool,
    /// TRXD version negotiation: the version to request next.
    trxd_ver_req: u8,
    setformat_sent: bool,
    setformat_acked: bool,
    /// Negotiated version in effect.
    pub trxd_ver_use: u8,
    setslot: [Provisioned<(u8, Option<(u8, u8)>)>; 8],
    rxgain_sent: bool,
    maxdly_sent: bool,
    maxdlynb_sent: bool,
    others_ready: bool,
}

impl Provision {
    pub fn new(cfg: ProvConfig) -> Self {
        Self {
            cfg,
            state: ProvState::Closed,
            enabled: false,
            arfcn: None,
            rxtune: Provisioned::default(),
            txtune: Provisioned::default(),
            tsc: Provisioned::default(),
            bsic: Provisioned::default(),
            nomtxpower_requested: false,
            nomtxpower_acked: false,
            trxd_ver_req: cfg.trxd_ver_max,
            setformat_sent: false,
            setformat_acked: false,
            trxd_ver_use: 0,
            setslot: Default::default(),
            rxgain_sent: false,
            maxdly_sent: false,
            maxdlynb_sent: false,
            // A lone TRX0 has nothing to wait for; the link layer
            // clears this when more carriers exist.
            others_ready: true,
        }
    }

    /// Multi-TRX link: TRX0 must wait for the others before POWERON.
    pub fn set_others_ready(&mut self, ready: bool) {
        self.others_ready = ready;
    }

    /// The effective band (auto-derived from the ARFCN if configured).
    fn band(&self) -> Band {
        if self.cfg.auto_band {
            if let Some(arfcn) = self.arfcn {
                if let Some(b) = Band::from_arfcn(arfcn) {
                    return b;
                }
            }
        }
        self.cfg.band
    }

    /// Whether every pre-power-on setting is confirmed.
    fn is_provisioned(&self) -> bool {
        self.enabled
            && self.rxtune.is_acked()
            && self.txtune.is_acked()
            && (self.tsc.is_acked() || self.cfg.use_legacy_setbsic)
            && (self.bsic.is_acked() || !self.cfg.use_legacy_setbsic)
            && (self.nomtxpower_acked || self.cfg.nominal_power_fixed)
            && self.setformat_acked
    }

    /// Emit whatever configuration commands are still outstanding.
    fn push_config(&mut self, out: &mut ProvOutput) {
        if let Some(arfcn) = self.arfcn {
            let band = self.band();
            match (tune_param_khz(band, arfcn, true), tune_param_khz(band, arfcn, false)) {
                (Some(rx), Some(tx)) => {
                    self.rxtune.set_desired(rx);
                    self.txtune.set_desired(tx);
                    if let Some(v) = self.rxtune.needs_request() {
                        out.cmd("RXTUNE", v.to_string(), true);
                        self.rxtune.mark_requested();
                    }
                    if let Some(v) = self.txtune.needs_request() {
                        out.cmd("TXTUNE", v.to_string(), true);
                        self.txtune.mark_requested();
                    }
                    // Nominal power depends on the tuned carrier; ask
                    // once the transmitter confirmed.
                    if self.txtune.is_acked()
                        && !self.cfg.nominal_power_fixed
                        && !self.nomtxpower_requested
                    {
                        out.cmd("NOMTXPOWER", "", true);
                        self.nomtxpower_requested = true;
                    }
                }
                _ => {
                    log::error!("[PROV] arfcn {} not defined in band {:?}", arfcn, band);
                }
            }
        }

        if !self.cfg.use_legacy_setbsic {
            if let Some(v) = self.tsc.needs_request() {
                out.cmd("SETTSC", v.to_string(), true);
                self.tsc.mark_requested();
            }
        } else if let Some(v) = self.bsic.needs_request() {
            out.cmd("SETBSIC", v.to_string(), true);
            self.bsic.mark_requested();
        }

        if !self.setformat_sent {
            self.setformat_sent = true;
            if self.cfg.trxd_ver_max == 0 {
                log::info!("[PROV] no need to negotiate, using TRXD PDU version 0");
                self.trxd_ver_use = 0;
                self.setformat_acked = true;
            } else {
                out.cmd("SETFORMAT", self.trxd_ver_req.to_string(), false);
            }
        }
    }

    /// Post-power-on settings and timeslot configuration.
    fn push_poweron_config(&mut self, out: &mut ProvOutput) {
        if let Some(db) = self.cfg.rxgain {
            if !self.rxgain_sent {
                out.cmd("SETRXGAIN", db.to_string(), false);
                self.rxgain_sent = true;
            }
        }
        if let Some(dly) = self.cfg.maxdly {
            if !self.maxdly_sent {
                out.cmd("SETMAXDLY", dly.to_string(), false);
                self.maxdly_sent = true;
            }
        }
        if let Some(dly) = self.cfg.maxdlynb {
            if !self.maxdlynb_sent {
                out.cmd("SETMAXDLYNB", dly.to_string(), false);
                self.maxdlynb_sent = true;
            }
        }
        for tn in 0..8 {
            self.push_setslot(tn, out);
        }
    }

    fn push_setslot(&mut self, tn: usize, out: &mut ProvOutput) {
        if let Some((slottype, tsc)) = self.setslot[tn].needs_request() {
            let params = match tsc {
                Some((tsc_val, tsc_set)) => {
                    format!("{} {} C{}/S{}", tn, slottype, tsc_val, tsc_set)
                }
                None => format!("{} {}", tn, slottype),
            };
            out.cmd("SETSLOT", params, true);
            self.setslot[tn].mark_requested();
        }
    }

    /// Try to advance out of OPEN_POWEROFF once everything is acked.
    fn maybe_poweron(&mut self, out: &mut ProvOutput) {
        if self.state != ProvState::OpenPoweroff || !self.is_provisioned() {
            return;
        }
        if self.cfg.trx_num != 0 {
            self.state = ProvState::OpenPoweron;
            out.became_ready = true;
            self.push_poweron_config(out);
            return;
        }
        if !self.others_ready {
            log::info!("[PROV] trx0 provisioned, waiting for other TRX");
            return;
        }
        self.state = ProvState::OpenWaitPoweronCnf;
        out.cmd("POWERON", "", true);
    }

    /// Feed one event through the machine.
    pub fn dispatch(&mut self, ev: ProvEvent, out: &mut ProvOutput) {
        use ProvEvent::*;
        use ProvState::*;

        match (self.state, &ev) {
            (Closed, Open) => {
                if self.cfg.trx_num == 0 {
                    // Pre-emptive POWEROFF puts a restarted modem into a
                    // known state.
                    out.cmd("POWEROFF", "", true);
                }
                out.cmd("RFMUTE", if self.cfg.rf_locked { "1" } else { "0" }, false);
                self.trxd_ver_req = self.cfg.trxd_ver_max;
                self.state = OpenPoweroff;
            }
            (Closed, _) => {
                log::warn!("[PROV] trx={} event {:?} in CLOSED", self.cfg.trx_num, ev);
            }

            (OpenPoweroff, ev) => {
                match ev {
                    CfgEnable(on) => self.enabled = *on,
                    CfgBsic(bsic) => {
                        if self.cfg.use_legacy_setbsic {
                            self.bsic.set_desired(*bsic);
                        } else {
                            self.tsc.set_desired(bsic & 7);
                        }
                    }
                    CfgArfcn(arfcn) => {
                        if self.arfcn != Some(*arfcn) {
                            self.arfcn = Some(*arfcn);
                            self.rxtune = Provisioned::default();
                            self.txtune = Provisioned::default();
                            self.nomtxpower_requested = false;
                            self.nomtxpower_acked = false;
                        }
                    }
                    CfgTs { tn, slottype, tsc } => {
                        self.setslot[*tn as usize].set_desired((*slottype, *tsc));
                    }
                    RxTuneCnf(0) => self.rxtune.mark_acked(),
                    TxTuneCnf(0) => self.txtune.mark_acked(),
                    SetTscCnf(0) => self.tsc.mark_acked(),
                    SetBsicCnf(0) => self.bsic.mark_acked(),
                    NomTxPowerCnf { status, dbm } => {
                        if *status == 0 {
                            self.nomtxpower_acked = true;
                            out.nominal_power = Some(*dbm);
                        } else {
                            log::error!(
                                "[PROV] NOMTXPOWER failed ({}); configure \
                                 nominal-tx-power manually if unsupported",
                                status
                            );
                        }
                    }
                    SetFormatCnf(status) => {
                        let status = *status;
                        if status == i32::from(self.trxd_ver_req) {
                            self.trxd_ver_use = self.trxd_ver_req;
                            self.setformat_acked = true;
                            log::info!("[PROV] using TRXD PDU version {}", self.trxd_ver_use);
                        } else if (0..=i32::from(self.cfg.trxd_ver_max)).contains(&status) {
                            log::info!(
                                "[PROV] transceiver suggests TRXD PDU version {} (requested {})",
                                status,
                                self.trxd_ver_req
                            );
                            self.trxd_ver_req = status as u8;
                            self.setformat_sent = false;
                        } else {
                            log::error!(
                                "[PROV] out of range TRXD PDU version {} (requested {})",
                                status,
                                self.trxd_ver_req
                            );
                        }
                    }
                    SetFormatRej => {
                        log::warn!(
                            "[PROV] transceiver rejected format negotiation, \
                             using legacy TRXD PDU version 0"
                        );
                        self.trxd_ver_use = 0;
                        self.setformat_acked = true;
                    }
                    OtherTrxReady => {
                        debug_assert_eq!(self.cfg.trx_num, 0);
                        self.others_ready = true;
                    }
                    Close => {
                        self.state = Closed;
                        return;
                    }
                    other => {
                        log::debug!("[PROV] trx={} ignoring {:?}", self.cfg.trx_num, other);
                    }
                }
                self.push_config(out);
                self.maybe_poweron(out);
            }

            (OpenWaitPoweronCnf, PoweronCnf(rc)) => {
                if *rc == 0 {
                    out.link = Some(LinkEvent::Connected);
                    self.state = OpenPoweron;
                    self.push_poweron_config(out);
                } else {
                    log::warn!(
                        "[PROV] transceiver rejected POWERON ({}), retrying in a few seconds",
                        rc
                    );
                    out.link = Some(LinkEvent::Shutdown);
                    out.poweron_retry = true;
                }
            }
            (OpenWaitPoweronCnf, CfgTs { tn, slottype, tsc }) => {
                self.setslot[*tn as usize].set_desired((*slottype, *tsc));
            }

            (OpenPoweron, CfgTs { tn, slottype, tsc }) => {
                let tn = *tn as usize;
                self.setslot[tn].set_desired((*slottype, *tsc));
                self.push_setslot(tn, out);
            }
            (OpenPoweron, Close) => {
                if self.cfg.trx_num == 0 {
                    out.cmd("POWEROFF", "", true);
                    self.state = OpenWaitPoweroffCnf;
                } else {
                    self.state = OpenPoweroff;
                }
                self.rxgain_sent = false;
                self.maxdly_sent = false;
                self.maxdlynb_sent = false;
                for slot in &mut self.setslot {
                    slot.requested = None;
                    slot.acked = None;
                }
            }

            (OpenWaitPoweroffCnf, PoweroffCnf(_)) => {
                out.link = Some(LinkEvent::Shutdown);
                self.state = OpenPoweroff;
            }

            (state, ev) => {
                log::debug!("[PROV] trx={} ignoring {:?} in {:?}", self.cfg.trx_num, ev, state);
            }
        }
    }

    /// The clock vanished: fall back to OPEN_POWEROFF and forget every
    /// negotiation result, so a returning modem is re-provisioned from
    /// scratch (the desired configuration survives).
    pub fn link_lost(&mut self) {
        if self.state == ProvState::Closed {
            return;
        }
        log::info!("[PROV] trx={} link lost, back to OPEN_POWEROFF", self.cfg.trx_num);
        self.state = ProvState::OpenPoweroff;
        for p in [&mut self.rxtune, &mut self.txtune] {
            p.requested = None;
            p.acked = None;
        }
        self.tsc.requested = None;
        self.tsc.acked = None;
        self.bsic.requested = None;
        self.bsic.acked = None;
        self.nomtxpower_requested = false;
        self.nomtxpower_acked = false;
        self.setformat_sent = false;
        self.setformat_acked = false;
        self.trxd_ver_req = self.cfg.trxd_ver_max;
        for slot in &mut self.setslot {
            slot.requested = None;
            slot.acked = None;
        }
        self.rxgain_sent = false;
        self.maxdly_sent = false;
        self.maxdlynb_sent = false;
    }

    /// SETSLOT confirmation for a timeslot.
    pub fn setslot_cnf(&mut self, tn: u8, status: i32) {
        if status == 0 {
            self.setslot[tn as usize].mark_acked();
        } else {
            log::error!("[PROV] SETSLOT tn={} failed with status {}", tn, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(trx_num: u8) -> ProvConfig {
        ProvConfig {
            trx_num,
            band: Band::Gsm900,
            auto_band: false,
            use_legacy_setbsic: false,
            trxd_ver_max: 1,
            nominal_power_fixed: false,
            rxgain: Some(10),
            maxdly: Some(30),
            maxdlynb: None,
            rf_locked: false,
        }
    }

    fn names(out: &ProvOutput) -> Vec<&'static str> {
        out.commands.iter().map(|(n, _, _)| *n).collect()
    }

    fn drive_to_provisioned(p: &mut Provision) -> ProvOutput {
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::Open, &mut out);
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::CfgEnable(true), &mut out);
        p.dispatch(ProvEvent::CfgBsic(0x3f), &mut out);
        p.dispatch(ProvEvent::CfgArfcn(10), &mut out);
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::RxTuneCnf(0), &mut out);
        p.dispatch(ProvEvent::TxTuneCnf(0), &mut out);
        p.dispatch(ProvEvent::SetTscCnf(0), &mut out);
        p.dispatch(ProvEvent::SetFormatCnf(1), &mut out);
        let mut last = ProvOutput::default();
        p.dispatch(ProvEvent::NomTxPowerCnf { status: 0, dbm: 23 }, &mut last);
        last
    }

    #[test]
    fn test_open_sends_preemptive_poweroff_on_trx0() {
        let mut p = Provision::new(cfg(0));
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::Open, &mut out);
        assert_eq!(names(&out), vec!["POWEROFF", "RFMUTE"]);
        assert_eq!(p.state, ProvState::OpenPoweroff);

        let mut p1 = Provision::new(cfg(1));
        let mut out = ProvOutput::default();
        p1.dispatch(ProvEvent::Open, &mut out);
        assert_eq!(names(&out), vec!["RFMUTE"]);
    }

    #[test]
    fn test_config_emits_tunes_then_poweron() {
        let mut p = Provision::new(cfg(0));
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::Open, &mut out);

        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::CfgEnable(true), &mut out);
        p.dispatch(ProvEvent::CfgBsic(0x3f), &mut out);
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::CfgArfcn(10), &mut out);
        let n = names(&out);
        assert!(n.contains(&"RXTUNE"));
        assert!(n.contains(&"TXTUNE"));
        // RXTUNE tunes the uplink: ARFCN 10 -> 892.0 MHz in kHz.
        let rx = out.commands.iter().find(|(n, _, _)| *n == "RXTUNE").unwrap();
        assert_eq!(rx.1, "892000");

        let last = drive_to_provisioned(&mut p);
        assert!(names(&last).contains(&"POWERON"));
        assert_eq!(p.state, ProvState::OpenWaitPoweronCnf);
    }

    #[test]
    fn test_poweron_cnf_connects_and_pushes_slots() {
        let mut p = Provision::new(cfg(0));
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::Open, &mut out);
        let mut out = ProvOutput::default();
        p.dispatch(
            ProvEvent::CfgTs { tn: 0, slottype: 5, tsc: None },
            &mut out,
        );
        drive_to_provisioned(&mut p);

        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::PoweronCnf(0), &mut out);
        assert_eq!(out.link, Some(LinkEvent::Connected));
        let n = names(&out);
        assert!(n.contains(&"SETRXGAIN"));
        assert!(n.contains(&"SETMAXDLY"));
        let slot = out.commands.iter().find(|(n, _, _)| *n == "SETSLOT").unwrap();
        assert_eq!(slot.1, "0 5");
        assert_eq!(p.state, ProvState::OpenPoweron);
    }

    #[test]
    fn test_poweron_nack_retries() {
        let mut p = Provision::new(cfg(0));
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::Open, &mut out);
        drive_to_provisioned(&mut p);
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::PoweronCnf(-1), &mut out);
        assert!(out.poweron_retry);
        assert_eq!(out.link, Some(LinkEvent::Shutdown));
    }

    #[test]
    fn test_setformat_negotiates_down() {
        let mut p = Provision::new(ProvConfig { trxd_ver_max: 2, ..cfg(0) });
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::Open, &mut out);
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::CfgEnable(true), &mut out);
        let fmt = out.commands.iter().find(|(n, _, _)| *n == "SETFORMAT").unwrap();
        assert_eq!(fmt.1, "2");

        // Modem prefers v1: the machine re-requests it and settles.
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::SetFormatCnf(1), &mut out);
        let fmt = out.commands.iter().find(|(n, _, _)| *n == "SETFORMAT").unwrap();
        assert_eq!(fmt.1, "1");
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::SetFormatCnf(1), &mut out);
        assert_eq!(p.trxd_ver_use, 1);
    }

    #[test]
    fn test_setformat_rejection_falls_back_to_v0() {
        let mut p = Provision::new(cfg(0));
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::Open, &mut out);
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::CfgEnable(true), &mut out);
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::SetFormatRej, &mut out);
        assert_eq!(p.trxd_ver_use, 0);
    }

    #[test]
    fn test_trx0_waits_for_others() {
        let mut p = Provision::new(cfg(0));
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::Open, &mut out);
        p.others_ready = false;
        drive_to_provisioned(&mut p);
        assert_eq!(p.state, ProvState::OpenPoweroff);

        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::OtherTrxReady, &mut out);
        assert!(names(&out).contains(&"POWERON"));
        assert_eq!(p.state, ProvState::OpenWaitPoweronCnf);
    }

    #[test]
    fn test_close_from_poweron() {
        let mut p = Provision::new(cfg(0));
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::Open, &mut out);
        drive_to_provisioned(&mut p);
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::PoweronCnf(0), &mut out);

        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::Close, &mut out);
        assert!(names(&out).contains(&"POWEROFF"));
        assert_eq!(p.state, ProvState::OpenWaitPoweroffCnf);
        let mut out = ProvOutput::default();
        p.dispatch(ProvEvent::PoweroffCnf(0), &mut out);
        assert_eq!(out.link, Some(LinkEvent::Shutdown));
        assert_eq!(p.state, ProvState::OpenPoweroff);
    }
}
