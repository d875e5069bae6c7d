//! Windows has no direct equivalent of the Unix unprivileged ICMP datagram
//! facility (`SOCK_DGRAM` + `IPPROTO_ICMP`): the closest API, `IcmpSendEcho2`,
//! is a wholly different synchronous request/response model that does not
//! compose with this crate's single-socket burst-and-correlate design. A raw
//! (`SOCK_RAW`) socket would work around this, but that requires
//! administrator privilege and falls outside the unprivileged-only contract
//! this crate commits to. So, for this revision, Windows is a
//! documented gap (the `PlatformNotSupported` error kind exists for exactly
//! this) rather than a raw-socket fallback, and
//! [`SocketSession`](crate::socket::SocketSession) short-circuits to this
//! error before ever reaching here.

use crate::error::{Error, Result};

pub fn unsupported() -> Result<std::convert::Infallible> {
    Err(Error::PlatformNotSupported {
        details: "unprivileged ICMP datagram sockets are not available on Windows".to_string(),
    })
}
