// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging setup for BTRX binaries.
//!
//! The library itself only emits through the `log` facade, tagging each
//! message with its subsystem (`[TRXC]`, `[TRXD]`, `[SCHED]`, `[CLOCK]`,
//! `[PROV]`, `[L1SAP]`, `[LOOP]`). Binaries install the stderr logger from
//! this module; embedders are free to plug in their own `log::Log`.

mod logger;

pub use logger::{init, init_with_level};

/// Per-call tracing for the hot fn-tick path. Compiled out unless the
/// `trace` feature is enabled.
#[macro_export]
macro_rules! trace_fn {
    ($name:expr) => {
        #[cfg(feature = "trace")]
        log::trace!("[ENTER:FNC] {}", $name);
    };
}
