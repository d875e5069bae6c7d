//! Unix socket acquisition for the unprivileged ICMP datagram facility
//! (`SOCK_DGRAM` + `IPPROTO_ICMP`). No `CAP_NET_RAW` is required, unlike a
//! raw-socket (`SOCK_RAW`/`IPPROTO_RAW`) implementation, which is why this
//! module carries no Linux capability-dropping dependency.

use crate::error::{Error, Result};
use crate::socket::BindOptions;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Opens and binds an unprivileged ICMP datagram socket per `opts`.
pub fn create_unprivileged_icmp_socket(opts: &BindOptions) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).map_err(|source| {
        Error::SocketCreateFailed {
            context: "socket(AF_INET, SOCK_DGRAM, IPPROTO_ICMP)",
            source,
        }
    })?;

    if let Some(interface) = &opts.interface {
        socket.bind_device(Some(interface.as_bytes())).map_err(|source| {
            tracing::warn!(interface = %interface, error = %source, "failed to bind socket to interface");
            Error::InterfaceBindFailed {
                name: interface.clone(),
                details: None,
                source,
            }
        })?;
    }

    if let Some(source_ip) = opts.source_ipv4 {
        let addr = SocketAddr::new(IpAddr::V4(source_ip), 0);
        socket.bind(&SockAddr::from(addr)).map_err(|source| {
            tracing::warn!(%source_ip, error = %source, "failed to bind socket to source address");
            Error::SourceIPBindFailed {
                ip: IpAddr::V4(source_ip),
                details: None,
                source,
            }
        })?;
    }

    socket
        .set_nonblocking(true)
        .map_err(|source| Error::SetOptFailed {
            option: "O_NONBLOCK",
            source,
        })?;

    Ok(socket)
}

/// Sets the per-send TTL on an already-bound socket.
pub fn set_ttl(socket: &Socket, ttl: u8) -> Result<()> {
    socket
        .set_ttl(u32::from(ttl))
        .map_err(|source| Error::SetOptFailed {
            option: "IP_TTL",
            source,
        })
}

/// Best-effort: request that the kernel report the TTL of inbound packets.
/// Non-fatal if the platform doesn't support it.
pub fn enable_recv_ttl(socket: &Socket) {
    use std::os::unix::io::AsRawFd;
    let fd = socket.as_raw_fd();
    let enable: libc::c_int = 1;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_IP,
            libc::IP_RECVTTL,
            std::ptr::addr_of!(enable).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        tracing::debug!(error = %std::io::Error::last_os_error(), "IP_RECVTTL unavailable, continuing without inbound TTL");
    }
}

#[must_use]
pub fn unspecified_source() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}
