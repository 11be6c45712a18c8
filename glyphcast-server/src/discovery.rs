//! UDP discovery beacon (SPEC_FULL.md supplementary feature, grounded in the
//! teacher's JACK-side discovery control thread): a client that doesn't
//! already know the server's address can broadcast a discovery datagram and
//! get the stream listener's address back, without involving the framed
//! wire protocol at all.

use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DISCOVERY_MESSAGE: &[u8] = b"GLYPHCASTDISCOVER";
const DISCOVERY_REPLY_PREFIX: &[u8] = b"GLYPHCASTSERVERAT";

/// How long a `recv_from` on the discovery socket blocks before checking the
/// shutdown flag again.
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Binds a UDP socket on `port` and answers any `DISCOVERY_MESSAGE` datagram
/// with the stream listener's port, until `shutdown` is observed. Runs on
/// its own thread; a malformed or unrecognized datagram is silently ignored
/// rather than treated as a protocol error, since this beacon sits outside
/// the framed wire protocol entirely.
pub fn discovery_thread_run(port: u16, listener_port: u16, shutdown: Arc<AtomicBool>) {
    let socket = match UdpSocket::bind(("0.0.0.0", port)) {
        Ok(socket) => socket,
        Err(err) => {
            log::warn!("discovery: failed to bind UDP port {port}, beacon disabled: {err}");
            return;
        }
    };

    if let Err(err) = socket.set_read_timeout(Some(POLL_TIMEOUT)) {
        log::warn!("discovery: failed to set read timeout, beacon disabled: {err}");
        return;
    }

    log::info!("discovery: beacon listening on UDP {port}, advertising stream port {listener_port}");

    let mut buf = [0u8; DISCOVERY_MESSAGE.len()];
    while !shutdown.load(Ordering::Acquire) {
        let (len, source) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(err) if is_timeout(&err) => continue,
            Err(err) => {
                log::warn!("discovery: recv_from failed: {err}");
                continue;
            }
        };

        if &buf[..len] != DISCOVERY_MESSAGE {
            continue;
        }

        let mut reply = DISCOVERY_REPLY_PREFIX.to_vec();
        reply.extend_from_slice(&listener_port.to_le_bytes());
        if let Err(err) = socket.send_to(&reply, source) {
            log::warn!("discovery: failed to reply to {source}: {err}");
        }
    }

    log::debug!("discovery: beacon thread exiting");
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Parses a discovery reply datagram, returning the advertised stream port.
/// Exposed for the client CLI's discovery lookup.
pub fn parse_reply(datagram: &[u8]) -> Option<u16> {
    let rest = datagram.strip_prefix(DISCOVERY_REPLY_PREFIX)?;
    let port_bytes: [u8; 2] = rest.try_into().ok()?;
    Some(u16::from_le_bytes(port_bytes))
}
