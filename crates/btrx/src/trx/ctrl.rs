// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TRXC: the text control protocol towards the modem.
//!
//! Requests go out as `CMD <name>[ <params>]`, responses come back as
//! `RSP <name> <status>[ <params>]`. One request is outstanding at a
//! time; the head of the queue is retransmitted on a 2-second timer
//! until a matching response arrives. A completed command is parked in
//! the `last_acked` slot so duplicate responses to a retransmission can
//! be recognized and dropped.

use std::collections::VecDeque;

/// A queued control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrlMsg {
    pub cmd: String,
    pub params: String,
    /// A NACK on a critical command is unrecoverable.
    pub critical: bool,
}

impl CtrlMsg {
    pub fn wire(&self) -> String {
        if self.params.is_empty() {
            format!("CMD {}", self.cmd)
        } else {
            format!("CMD {} {}", self.cmd, self.params)
        }
    }
}

/// A parsed response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrlRsp {
    pub cmd: String,
    pub status: i32,
    pub params: String,
}

/// Parse `RSP <name> <status>[ <params>]`.
pub fn parse_rsp(line: &str) -> Option<CtrlRsp> {
    let rest = line.strip_prefix("RSP ")?;
    let mut it = rest.splitn(3, ' ');
    let cmd = it.next()?.to_string();
    let status: i32 = it.next()?.trim_end_matches('\0').parse().ok()?;
    let params = it.next().unwrap_or("").trim_end_matches('\0').to_string();
    Some(CtrlRsp { cmd, status, params })
}

/// What handling a response produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtrlOutcome {
    /// The head command completed (possibly with a non-zero status or a
    /// mismatched response name, which callers inspect).
    Completed { req: CtrlMsg, rsp: CtrlRsp },
    /// Late duplicate of an already-completed command; ignore.
    Duplicate,
    /// Response with no command outstanding and no match in last-acked.
    Unmatched,
    /// Mismatched response to a critical command; the link is beyond
    /// repair and the process must shut down.
    Fatal { req: CtrlMsg, rsp: CtrlRsp },
}

/// The per-TRX control command queue.
#[derive(Debug, Default)]
pub struct CtrlQueue {
    queue: VecDeque<CtrlMsg>,
    last_acked: Option<CtrlMsg>,
}

fn cmd_matches_rsp(msg: &CtrlMsg, rsp: &CtrlRsp) -> bool {
    if msg.cmd != rsp.cmd {
        return false;
    }
    // SETSLOT responses are per-timeslot and SETFORMAT echoes the
    // requested version; both must also match on parameters. Other
    // commands may legitimately return different values.
    if (msg.cmd == "SETSLOT" || msg.cmd == "SETFORMAT") && msg.params != rsp.params {
        return false;
    }
    true
}

impl CtrlQueue {
    /// Append a command. Consecutive duplicates are suppressed. Returns
    /// the wire line to transmit when this became the queue head.
    pub fn enqueue(&mut self, cmd: &str, params: impl Into<String>, critical: bool) -> Option<String> {
        let msg = CtrlMsg { cmd: cmd.to_string(), params: params.into(), critical };
        if let Some(prev) = self.queue.back() {
            if prev.cmd == msg.cmd && prev.params == msg.params {
                log::debug!("[TRXC] not sending duplicate command '{}'", msg.cmd);
                return None;
            }
        }
        log::info!("[TRXC] enqueuing control command '{}'", msg.wire());
        let was_empty = self.queue.is_empty();
        self.queue.push_back(msg);
        if was_empty {
            self.head_wire()
        } else {
            None
        }
    }

    /// Wire line of the outstanding command, for (re)transmission.
    pub fn head_wire(&self) -> Option<String> {
        self.queue.front().map(CtrlMsg::wire)
    }

    /// Retransmission timer fired: log and hand out the head again.
    pub fn retransmit(&mut self) -> Option<String> {
        if let Some(head) = self.queue.front() {
            log::warn!("[TRXC] no satisfactory response from transceiver ({})", head.wire());
        }
        self.head_wire()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Put a command back at the front (POWERON retry path).
    pub fn requeue_front(&mut self, msg: CtrlMsg) {
        self.queue.push_front(msg);
    }

    /// Handle one response datagram.
    pub fn handle_rsp(&mut self, line: &str) -> CtrlOutcome {
        let Some(rsp) = parse_rsp(line) else {
            log::warn!("[TRXC] unknown TRXC message: {:?}", line);
            return CtrlOutcome::Unmatched;
        };
        log::info!("[TRXC] response message '{}'", line.trim_end_matches('\0'));

        let Some(head) = self.queue.front() else {
            if self.last_acked.as_ref().map(|m| cmd_matches_rsp(m, &rsp)).unwrap_or(false) {
                log::warn!("[TRXC] discarding duplicated RSP from old CMD '{}'", rsp.cmd);
                return CtrlOutcome::Duplicate;
            }
            log::warn!("[TRXC] response message without command");
            return CtrlOutcome::Unmatched;
        };

        if !cmd_matches_rsp(head, &rsp) {
            if self.last_acked.as_ref().map(|m| cmd_matches_rsp(m, &rsp)).unwrap_or(false) {
                log::warn!("[TRXC] discarding duplicated RSP from old CMD '{}'", rsp.cmd);
                return CtrlOutcome::Duplicate;
            }
            let critical = head.critical;
            log::log!(
                if critical { log::Level::Error } else { log::Level::Warn },
                "[TRXC] response '{}' does not match command '{}'",
                line.trim_end_matches('\0'),
                head.wire()
            );
            if critical {
                let req = self.queue.pop_front().expect("head checked");
                return CtrlOutcome::Fatal { req, rsp };
            }
            // Old transceivers answer unsupported commands with
            // 'RSP ERR 1'; complete the head with the mismatch.
        }

        let req = self.queue.pop_front().expect("head checked");
        self.last_acked = Some(req.clone());
        CtrlOutcome::Completed { req, rsp }
    }

    /// Drop everything, including the duplicate-detection slot.
    pub fn flush(&mut self) {
        self.queue.clear();
        self.last_acked = None;
    }
}
