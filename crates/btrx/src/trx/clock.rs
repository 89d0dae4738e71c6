// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The frame clock: slaves the local frame number to the modem's
//! `IND CLOCK` stream and smooths it with a local per-frame timer.
//!
//! All real time comes in as explicit [`Instant`]s so the logic is
//! deterministic under test; the reactor owns the actual timer.

use crate::config::{FRAME_DURATION_US, HYPERFRAME, MAX_FN_SKEW, TRX_LOSS_FRAMES};
use crate::gsm::fn_delta_signed;
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_micros(FRAME_DURATION_US);

/// Parse an `IND CLOCK <fn>` datagram; the frame number is normalised
/// into the hyperframe.
pub fn parse_clock_ind(buf: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(buf).ok()?;
    let text = text.trim_end_matches(['\0', '\n', ' ']);
    let fnr: u32 = text.strip_prefix("IND CLOCK ")?.parse().ok()?;
    if fnr >= HYPERFRAME {
        log::error!("[CLOCK] indicated fn={} beyond the hyperframe, wrapping", fnr);
        Some(fnr % HYPERFRAME)
    } else {
        Some(fnr)
    }
}

/// What the caller must do after feeding the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOut {
    /// Rearm the frame timer for this deadline.
    Rearm(Instant),
    /// First clock indication: the transceiver became available; start
    /// provisioning, then rearm.
    Started(Instant),
    /// No clock for too long (or host time jumped): tear the link down.
    Lost,
}

/// The clock slave of one phy link.
#[derive(Debug)]
pub struct FrameClock {
    running: bool,
    last_fn: u32,
    /// Host time at which `last_fn` was driven.
    clock_ref: Instant,
    /// Timer firings since the last remote indication.
    lost_count: u32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self { running: false, last_fn: 0, clock_ref: Instant::now(), lost_count: 0 }
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn last_fn(&self) -> u32 {
        self.last_fn
    }

    /// Force the stopped state (link teardown).
    pub fn stop(&mut self) {
        self.running = false;
        self.lost_count = 0;
    }

    /// A remote clock indication arrived. `tick` runs once per frame
    /// number that becomes due, in order and without gaps.
    pub fn on_clock_ind(
        &mut self,
        fnr: u32,
        now: Instant,
        tick: &mut impl FnMut(u32),
    ) -> ClockOut {
        self.lost_count = 0;

        if !self.running {
            log::info!("[CLOCK] initial GSM clock received: fn={}", fnr);
            self.running = true;
            self.last_fn = fnr;
            tick(self.last_fn);
            self.clock_ref = now;
            return ClockOut::Started(now + FRAME);
        }

        let elapsed_fn = fn_delta_signed(fnr, self.last_fn);
        if elapsed_fn.unsigned_abs() > MAX_FN_SKEW {
            log::warn!("[CLOCK] GSM clock skew: old fn={} new fn={}", self.last_fn, fnr);
            self.last_fn = fnr;
            tick(self.last_fn);
            self.clock_ref = now;
            return ClockOut::Rearm(now + FRAME);
        }

        if elapsed_fn < 0 {
            // We ran ahead of the modem; shift the reference into the
            // future so the local timer idles until real time catches up.
            let ahead = (-elapsed_fn) as u32;
            self.clock_ref = now + FRAME * ahead;
            return ClockOut::Rearm(now + FRAME * (1 + ahead));
        }

        // Catch up whatever the modem already counted.
        while self.last_fn != fnr {
            self.last_fn = (self.last_fn + 1) % HYPERFRAME;
            tick(self.last_fn);
        }
        self.clock_ref = now;
        ClockOut::Rearm(now + FRAME)
    }

    /// The local frame timer fired without a remote indication.
    pub fn on_timer(&mut self, now: Instant, tick: &mut impl FnMut(u32)) -> ClockOut {
        if !self.running {
            return ClockOut::Lost;
        }
        self.lost_count += 1;
        if self.lost_count >= TRX_LOSS_FRAMES {
            log::warn!("[CLOCK] no more clock from transceiver");
            self.stop();
            return ClockOut::Lost;
        }

        let elapsed = now.saturating_duration_since(self.clock_ref);
        if elapsed > FRAME * MAX_FN_SKEW {
            log::warn!("[CLOCK] host clock skew: elapsed {:?}", elapsed);
            self.stop();
            return ClockOut::Lost;
        }

        let mut remaining = elapsed;
        while remaining > FRAME / 2 {
            self.clock_ref += FRAME;
            self.last_fn = (self.last_fn + 1) % HYPERFRAME;
            tick(self.last_fn);
            remaining -= FRAME;
        }
        ClockOut::Rearm(now + (FRAME - remaining))
    }
}
