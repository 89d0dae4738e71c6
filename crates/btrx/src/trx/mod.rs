// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The TRX wire interface: clock/control/data sockets and the protocol
//! engines behind them.
//!
//! Per phy link there is one shared clock socket (port base) and per
//! TRX a TRXC control socket (`base + 2n + 1`) and a TRXD data socket
//! (`base + 2n + 2`). Sockets are bound locally and connected to the
//! modem side, so datagrams from anywhere else are rejected by the
//! kernel.

pub mod clock;
pub mod ctrl;
pub mod data;
pub mod provision;

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};

/// Open a nonblocking, connected UDP socket.
pub fn udp_connected(local: SocketAddr, remote: SocketAddr) -> io::Result<UdpSocket> {
    let domain = if local.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let sock = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    sock.set_reuse_address(true)?;
    sock.bind(&local.into())?;
    sock.connect(&remote.into())?;
    sock.set_nonblocking(true)?;
    log::debug!("[TRX] socket bound {} -> {}", local, remote);
    Ok(sock.into())
}
