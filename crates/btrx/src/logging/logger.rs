// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal stderr logger behind the `log` facade.
//!
//! Level filtering comes from the `BTRX_LOG` environment variable
//! (`error`/`warn`/`info`/`debug`/`trace`, default `info`). Installation is
//! idempotent; later calls are no-ops.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;

struct StderrLogger {
    filter: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "E",
            Level::Warn => "W",
            Level::Info => "I",
            Level::Debug => "D",
            Level::Trace => "T",
        };
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{} {}", tag, record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_from_env() -> LevelFilter {
    match std::env::var("BTRX_LOG").as_deref() {
        Ok("error") => LevelFilter::Error,
        Ok("warn") => LevelFilter::Warn,
        Ok("debug") => LevelFilter::Debug,
        Ok("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Install the stderr logger with the level taken from `BTRX_LOG`.
pub fn init() {
    init_with_level(level_from_env());
}

/// Install the stderr logger with an explicit level filter.
pub fn init_with_level(filter: LevelFilter) {
    let logger = Box::new(StderrLogger { filter });
    if log::set_boxed_logger(logger).is_ok() {
        log::set_max_level(filter);
    }
}
