// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol constants and runtime configuration.
//!
//! Wire constants here are fixed by the TRX protocol and GSM TDMA timing;
//! the runtime knobs live in [`Config`] and can be overridden through
//! `BTRX_*` environment variables.

use std::net::IpAddr;
use std::time::Duration;

/// TDMA frame duration (GSM 05.10: 120 ms / 26).
pub const FRAME_DURATION_US: u64 = 4615;
/// TDMA hyperframe length; all frame numbers wrap at this boundary.
pub const HYPERFRAME: u32 = 2_715_648;
/// Maximum tolerated jump between remote clock indications, in frames.
/// Anything beyond forces a clock re-sync.
pub const MAX_FN_SKEW: u32 = 50;
/// Number of local frame ticks without a clock indication after which the
/// transceiver link is declared lost.
pub const TRX_LOSS_FRAMES: u32 = 400;

/// Default UDP port base on the modem side (clock socket lives here).
pub const DEFAULT_BASE_PORT_REMOTE: u16 = 5700;
/// Default UDP port base on the BTS side.
pub const DEFAULT_BASE_PORT_LOCAL: u16 = 5800;

/// TRXC retransmission interval when no response is seen.
pub const TRXC_RETRANS: Duration = Duration::from_secs(2);
/// Retry interval after a POWERON NACK.
pub const POWERON_RETRY: Duration = Duration::from_secs(5);

/// Downlink frames are handed to the modem this many frames ahead of the
/// clock, so bursts arrive in time for transmission.
pub const DEFAULT_CLOCK_ADVANCE: u32 = 20;
/// PH-RTS.ind is emitted this many frames before the TX deadline, giving L2
/// (especially the PCU) time to respond.
pub const DEFAULT_RTS_ADVANCE: u32 = 5;

/// Downlink primitives whose frame number is further in the future than
/// this are dropped as stale (suggests a misconfigured rts-advance).
pub const PRIM_FN_AHEAD_MAX: u32 = 100;

/// Highest TRXD PDU version this implementation can speak.
pub const TRXD_PDU_VER_MAX: u8 = 2;

/// Runtime configuration of one phy link.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local bind address for clock/ctrl/data sockets.
    pub local_ip: IpAddr,
    /// Remote (modem) address.
    pub remote_ip: IpAddr,
    /// Local port base; TRX #i uses base+2i+1 (ctrl) and base+2i+2 (data).
    pub base_port_local: u16,
    /// Remote port base; offset 0 is the shared clock socket.
    pub base_port_remote: u16,
    /// Downlink pre-transmit amount in frames ("fn-advance").
    pub clock_advance: u32,
    /// RTS pre-emission amount in frames ("rts-advance").
    pub rts_advance: u32,
    /// Highest TRXD PDU version to request via SETFORMAT (0, 1 or 2).
    pub trxd_pdu_ver_max: u8,
    /// Per-TRX nominal output power in dBm; `None` queries NOMTXPOWER.
    pub nominal_tx_power_dbm: Option<i32>,
    /// OML-sourced maximum power reduction in dB (power ramp target).
    pub max_power_red_db: u8,
    /// Use the legacy SETBSIC command instead of SETTSC.
    pub use_legacy_setbsic: bool,
    /// MS power control loop enable.
    pub ms_power_loop: bool,
    /// Uplink RSSI target for the MS power loop, in dBm.
    pub ms_power_target_dbm: i8,
    /// Timing advance loop enable.
    pub ta_loop: bool,
    /// Derive the band from the ARFCN instead of trusting configuration.
    pub auto_band: bool,
    /// Modem receiver gain in dB, sent as SETRXGAIN after power-on.
    pub rxgain_db: Option<i32>,
    /// Maximum expected access-burst delay in symbols (SETMAXDLY).
    pub maxdly: Option<i32>,
    /// Maximum expected normal-burst delay in symbols (SETMAXDLYNB).
    pub maxdlynb: Option<i32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_ip: IpAddr::from([127, 0, 0, 1]),
            remote_ip: IpAddr::from([127, 0, 0, 1]),
            base_port_local: DEFAULT_BASE_PORT_LOCAL,
            base_port_remote: DEFAULT_BASE_PORT_REMOTE,
            clock_advance: DEFAULT_CLOCK_ADVANCE,
            rts_advance: DEFAULT_RTS_ADVANCE,
            trxd_pdu_ver_max: 1,
            nominal_tx_power_dbm: None,
            max_power_red_db: 0,
            use_legacy_setbsic: false,
            ms_power_loop: false,
            ms_power_target_dbm: -75,
            ta_loop: true,
            auto_band: false,
            rxgain_db: None,
            maxdly: None,
            maxdlynb: None,
        }
    }
}

impl Config {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Unparsable values are ignored with a log message rather than
    /// failing startup; the operator will notice the default in effect.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        env_parse("BTRX_LOCAL_IP", &mut cfg.local_ip);
        env_parse("BTRX_REMOTE_IP", &mut cfg.remote_ip);
        env_parse("BTRX_BASE_PORT_LOCAL", &mut cfg.base_port_local);
        env_parse("BTRX_BASE_PORT_REMOTE", &mut cfg.base_port_remote);
        env_parse("BTRX_FN_ADVANCE", &mut cfg.clock_advance);
        env_parse("BTRX_RTS_ADVANCE", &mut cfg.rts_advance);
        env_parse("BTRX_TRXD_VER_MAX", &mut cfg.trxd_pdu_ver_max);
        env_parse("BTRX_MAX_POWER_RED", &mut cfg.max_power_red_db);
        env_parse("BTRX_MS_POWER_TARGET", &mut cfg.ms_power_target_dbm);
        if let Ok(v) = std::env::var("BTRX_NOMINAL_TX_POWER") {
            match v.parse() {
                Ok(dbm) => cfg.nominal_tx_power_dbm = Some(dbm),
                Err(_) => log::warn!("[CFG] ignoring bad BTRX_NOMINAL_TX_POWER={}", v),
            }
        }
        for (name, out) in [
            ("BTRX_RXGAIN", &mut cfg.rxgain_db),
            ("BTRX_MAXDLY", &mut cfg.maxdly),
            ("BTRX_MAXDLYNB", &mut cfg.maxdlynb),
        ] {
            if let Ok(v) = std::env::var(name) {
                match v.parse() {
                    Ok(db) => *out = Some(db),
                    Err(_) => log::warn!("[CFG] ignoring bad {}={}", name, v),
                }
            }
        }
        cfg.use_legacy_setbsic = env_flag("BTRX_LEGACY_SETBSIC");
        cfg.ms_power_loop = env_flag("BTRX_MS_POWER_LOOP");
        if std::env::var("BTRX_TA_LOOP").map(|v| v == "0").unwrap_or(false) {
            cfg.ta_loop = false;
        }
        cfg.auto_band = env_flag("BTRX_AUTO_BAND");
        if cfg.trxd_pdu_ver_max > TRXD_PDU_VER_MAX {
            log::warn!(
                "[CFG] clamping trxd-pdu-version-max {} to {}",
                cfg.trxd_pdu_ver_max,
                TRXD_PDU_VER_MAX
            );
            cfg.trxd_pdu_ver_max = TRXD_PDU_VER_MAX;
        }
        cfg
    }

    /// Local port of the TRXC (ctrl) socket for TRX number `num`.
    pub fn ctrl_port_local(&self, num: u8) -> u16 {
        self.base_port_local + (u16::from(num) << 1) + 1
    }

    /// Remote port of the TRXC (ctrl) socket for TRX number `num`.
    pub fn ctrl_port_remote(&self, num: u8) -> u16 {
        self.base_port_remote + (u16::from(num) << 1) + 1
    }

    /// Local port of the TRXD (data) socket for TRX number `num`.
    pub fn data_port_local(&self, num: u8) -> u16 {
        self.base_port_local + (u16::from(num) << 1) + 2
    }

    /// Remote port of the TRXD (data) socket for TRX number `num`.
    pub fn data_port_remote(&self, num: u8) -> u16 {
        self.base_port_remote + (u16::from(num) << 1) + 2
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, out: &mut T) {
    if let Ok(v) = std::env::var(name) {
        match v.parse() {
            Ok(parsed) => *out = parsed,
            Err(_) => log::warn!("[CFG] ignoring bad {}={}", name, v),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_scheme() {
        let cfg = Config::default();
        assert_eq!(cfg.ctrl_port_remote(0), 5701);
        assert_eq!(cfg.data_port_remote(0), 5702);
        assert_eq!(cfg.ctrl_port_remote(1), 5703);
        assert_eq!(cfg.data_port_remote(1), 5704);
        assert_eq!(cfg.ctrl_port_local(0), 5801);
        assert_eq!(cfg.data_port_local(0), 5802);
    }

    #[test]
    fn test_defaults_match_protocol() {
        let cfg = Config::default();
        assert_eq!(cfg.clock_advance, 20);
        assert_eq!(cfg.rts_advance, 5);
        assert_eq!(cfg.trxd_pdu_ver_max, 1);
    }
}
