//! The socket session: acquires an unprivileged ICMP datagram
//! socket, applies interface/source-address binding, and exposes async
//! send/receive primitives that integrate with the tokio reactor.
//!
//! Each in-flight diagnostic operation owns exactly one `SocketSession` for
//! its lifetime; dropping
//! it closes the descriptor exactly once.
//!
//! Readiness is polled with [`tokio::io::unix::AsyncFd`], the idiomatic way
//! to register a raw, non-blocking `socket2::Socket` with tokio's reactor so
//! `.readable()`/`.writable()` suspend the calling task instead of blocking a
//! thread, as the async concurrency model requires.

use crate::error::{Error, Result};
use crate::types::{Sequence, Ttl};
use crate::wire::{self, IcmpMessage};
use socket2::SockAddr;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Instant;

/// The maximum size of an ICMP datagram this crate will build or parse.
pub const MAX_PACKET_SIZE: usize = 1024;

/// Interface/source-address binding options for a [`SocketSession`].
#[derive(Debug, Clone, Default)]
pub struct BindOptions {
    pub interface: Option<String>,
    pub source_ipv4: Option<Ipv4Addr>,
}

#[cfg(unix)]
pub struct SocketSession {
    io: tokio::io::unix::AsyncFd<socket2::Socket>,
    identifier: crate::types::TraceId,
}

#[cfg(unix)]
impl SocketSession {
    /// Acquires and binds a socket, picking a random 16-bit session
    /// identifier.
    pub fn new(opts: &BindOptions) -> Result<Self> {
        use rand::Rng;
        Self::with_identifier(opts, crate::types::TraceId(rand::thread_rng().gen()))
    }

    /// Acquires and binds a socket using a caller-chosen session identifier,
    /// rather than a random one. Used by the multipath enumerator, whose
    /// flow variations need deterministically spaced identifiers rather
    /// than independently random ones.
    pub fn with_identifier(opts: &BindOptions, identifier: crate::types::TraceId) -> Result<Self> {
        let socket = super::platform::create_unprivileged_icmp_socket(opts)?;
        super::platform::enable_recv_ttl(&socket);
        let io = tokio::io::unix::AsyncFd::new(socket).map_err(|source| Error::SocketCreateFailed {
            context: "registering socket with the tokio reactor",
            source,
        })?;
        Ok(Self { io, identifier })
    }

    #[must_use]
    pub fn identifier(&self) -> crate::types::TraceId {
        self.identifier
    }

    /// Sends an Echo Request at the given TTL/sequence, returning the
    /// monotonic instant the send completed (the correlator's send
    /// timestamp).
    pub async fn send_echo_request(
        &self,
        dest: Ipv4Addr,
        ttl: Ttl,
        seq: Sequence,
        payload_size: usize,
    ) -> Result<Instant> {
        super::platform::set_ttl(self.io.get_ref(), ttl.0)?;
        let packet = wire::build_echo_request(self.identifier, seq, payload_size);
        let dest_addr = SockAddr::from(std::net::SocketAddr::new(IpAddr::V4(dest), 0));
        loop {
            let mut guard = self
                .io
                .writable()
                .await
                .map_err(|source| Error::SendFailed(source))?;
            match guard.try_io(|inner| inner.get_ref().send_to(&packet, &dest_addr)) {
                Ok(Ok(_)) => {
                    tracing::trace!(%dest, ttl = ttl.0, seq = seq.0, "sent echo request");
                    return Ok(Instant::now());
                }
                Ok(Err(source)) => return Err(Error::SendFailed(source)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Waits for at most `deadline` for the socket to become readable, then
    /// drains every ready datagram.
    pub async fn recv_ready(&self, deadline: Instant) -> Result<Vec<(IcmpMessage, IpAddr)>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(Vec::new());
        }
        let Ok(ready) = tokio::time::timeout(remaining, self.io.readable()).await else {
            return Ok(Vec::new());
        };
        let mut guard = ready.map_err(|source| Error::SendFailed(source))?;
        let mut out = Vec::new();
        loop {
            let mut buf = [0u8; MAX_PACKET_SIZE];
            match guard.try_io(|inner| inner.get_ref().recv_from(&mut buf as &mut [u8])) {
                Ok(Ok((n, from))) => {
                    if let Some(message) = wire::parse(&buf[..n]) {
                        if let Some(ip) = from.as_socket().map(|s| s.ip()) {
                            tracing::debug!(%ip, bytes = n, "received icmp datagram");
                            out.push((message, ip));
                        }
                    }
                }
                Ok(Err(_)) | Err(_would_block) => break,
            }
        }
        Ok(out)
    }
}

#[cfg(not(unix))]
pub struct SocketSession {
    _private: (),
}

#[cfg(not(unix))]
impl SocketSession {
    pub fn new(_opts: &BindOptions) -> Result<Self> {
        let _: std::convert::Infallible = super::platform::unsupported()?;
        unreachable!()
    }

    pub fn with_identifier(_opts: &BindOptions, _identifier: crate::types::TraceId) -> Result<Self> {
        let _: std::convert::Infallible = super::platform::unsupported()?;
        unreachable!()
    }

    #[must_use]
    pub fn identifier(&self) -> crate::types::TraceId {
        unreachable!("construction always fails on this platform")
    }

    pub async fn send_echo_request(
        &self,
        _dest: Ipv4Addr,
        _ttl: Ttl,
        _seq: Sequence,
        _payload_size: usize,
    ) -> Result<Instant> {
        unreachable!("construction always fails on this platform")
    }

    pub async fn recv_ready(&self, _deadline: Instant) -> Result<Vec<(IcmpMessage, IpAddr)>> {
        unreachable!("construction always fails on this platform")
    }
}
