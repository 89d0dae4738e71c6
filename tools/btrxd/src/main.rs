// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! btrxd: the BTS layer-1 daemon.
//!
//! Configuration comes from `BTRX_*` environment variables (see
//! `btrx::config`) plus positional timeslot arguments of the form
//! `<tn>:<pchan>`, e.g.:
//!
//! ```text
//! BTRX_ARFCN=10 BTRX_BAND=900 BTRX_BSIC=63 btrxd 0:ccch+sdcch4 1:tchf
//! ```
//!
//! Upward L1-SAP primitives are logged; wiring them to an RSL stack is
//! the embedder's job (this binary exists to run the core against a
//! modem, e.g. btrx-phymock or osmo-trx).

use btrx::bts::Pchan;
use btrx::gsm::Band;
use btrx::l1sap::{L1Up, L1sapUp};
use btrx::{Bts, Config, PhyLink};

struct LogSink;

impl L1sapUp for LogSink {
    fn l1sap_up(&mut self, prim: L1Up) {
        match &prim {
            L1Up::MphInfoInd(info) => log::info!("[L1SAP] {:?}", info),
            L1Up::PhRachInd { .. } => log::info!("[L1SAP] {:?}", prim),
            other => log::debug!("[L1SAP] {:?}", other),
        }
    }
}

fn parse_pchan(name: &str) -> Option<Pchan> {
    Some(match name {
        "none" => Pchan::None,
        "ccch" => Pchan::Ccch,
        "ccch+sdcch4" => Pchan::CcchSdcch4,
        "sdcch8" => Pchan::Sdcch8,
        "tchf" => Pchan::TchF,
        "tchh" => Pchan::TchH,
        "pdch" => Pchan::Pdch,
        _ => return None,
    })
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn main() {
    btrx::logging::init();

    let band = match std::env::var("BTRX_BAND").as_deref() {
        Ok("850") => Band::Gsm850,
        Ok("1800") => Band::Dcs1800,
        Ok("1900") => Band::Pcs1900,
        _ => Band::Gsm900,
    };
    let bsic: u8 = env_or("BTRX_BSIC", 63);
    let arfcn: u16 = env_or("BTRX_ARFCN", 10);

    let mut bts = Bts::new(band, bsic & 0x3f);
    let trx0 = bts.add_trx(arfcn);

    let cfg = Config::from_env();
    let mut link = match PhyLink::new(cfg, bts, Box::new(LogSink)) {
        Ok(link) => link,
        Err(e) => {
            log::error!("[MAIN] cannot open phy link: {}", e);
            std::process::exit(1);
        }
    };

    let mut configured = false;
    for arg in std::env::args().skip(1) {
        let Some((tn, pchan)) = arg.split_once(':') else {
            log::error!("[MAIN] bad timeslot argument '{}'", arg);
            std::process::exit(2);
        };
        let (Ok(tn), Some(pchan)) = (tn.parse::<u8>(), parse_pchan(pchan)) else {
            log::error!("[MAIN] bad timeslot argument '{}'", arg);
            std::process::exit(2);
        };
        if let Err(e) = link.ts_config(trx0, tn, pchan) {
            log::error!("[MAIN] ts {} config failed: {}", tn, e);
            std::process::exit(2);
        }
        configured = true;
    }
    if !configured {
        // A lone BCCH carrier is the smallest useful configuration.
        link.ts_config(trx0, 0, Pchan::Ccch).expect("BCCH combination exists");
    }

    log::info!("[MAIN] btrxd starting: arfcn={} band={:?} bsic={}", arfcn, band, bsic);
    link.open();
    match link.run() {
        Ok(()) => log::info!("[MAIN] shutdown"),
        Err(e) => {
            log::error!("[MAIN] fatal: {}", e);
            std::process::exit(3);
        }
    }
}
