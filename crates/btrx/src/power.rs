// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Downlink power ramping.
//!
//! After POWERON the carrier comes up attenuated and approaches its
//! operational attenuation (the OML-sourced maximum power reduction) in
//! 1 dB steps, one per SACCH period, so neighbouring cells see the new
//! carrier grow rather than jump. Each step is pushed to the modem as a
//! SETPOWER command by the reactor.

/// Extra attenuation the ramp starts from, on top of the target.
const RAMP_INITIAL_EXTRA_DB: u8 = 20;

#[derive(Debug, Default)]
pub struct PowerRamp {
    /// Operational attenuation below nominal power.
    target_att_db: u8,
    current_att_db: u8,
    active: bool,
}

impl PowerRamp {
    pub fn new(target_att_db: u8) -> Self {
        Self { target_att_db, current_att_db: target_att_db, active: false }
    }

    /// Begin ramping from deep attenuation toward the target. Returns
    /// the initial attenuation to order.
    pub fn start(&mut self) -> u8 {
        self.active = true;
        self.current_att_db = self.target_att_db.saturating_add(RAMP_INITIAL_EXTRA_DB);
        log::info!(
            "[POWER] ramp started: {} dB -> {} dB",
            self.current_att_db,
            self.target_att_db
        );
        self.current_att_db
    }

    /// One SACCH period elapsed: the next attenuation to order, or
    /// `None` once the ramp has completed.
    pub fn step(&mut self) -> Option<u8> {
        if !self.active {
            return None;
        }
        if self.current_att_db <= self.target_att_db {
            self.active = false;
            return None;
        }
        self.current_att_db -= 1;
        if self.current_att_db == self.target_att_db {
            log::info!("[POWER] ramp complete at {} dB", self.current_att_db);
            self.active = false;
        }
        Some(self.current_att_db)
    }

    /// Stop ramping; safe to call repeatedly.
    pub fn abort(&mut self) {
        self.active = false;
    }

    /// Attenuation currently in effect.
    pub fn current_att_db(&self) -> u8 {
        self.current_att_db
    }

    /// Change the operational target (OML power reduction update).
    pub fn set_target(&mut self, att_db: u8) {
        self.target_att_db = att_db;
        if !self.active {
            self.current_att_db = att_db;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_monotonic_to_target() {
        let mut r = PowerRamp::new(2);
        assert_eq!(r.start(), 22);
        let mut last = 22;
        let mut steps = 0;
        while let Some(att) = r.step() {
            assert_eq!(att, last - 1);
            last = att;
            steps += 1;
        }
        assert_eq!(last, 2);
        assert_eq!(steps, 20);
        // Idempotent once done.
        assert_eq!(r.step(), None);
    }

    #[test]
    fn test_abort_idempotent() {
        let mut r = PowerRamp::new(0);
        r.start();
        r.abort();
        r.abort();
        assert_eq!(r.step(), None);
    }
}
