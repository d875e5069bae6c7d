#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{create_unprivileged_icmp_socket, enable_recv_ttl, set_ttl};

#[cfg(not(unix))]
mod windows;
