use std::io;
use std::net::IpAddr;

/// The flat, closed error taxonomy shared by every public operation in this
/// crate. There is deliberately no `Other(Box<dyn Error>)` variant: every
/// failure mode a caller can observe is named here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to resolve host '{host}'{}", details.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
    ResolutionFailed {
        host: String,
        details: Option<String>,
    },

    #[error("failed to create unprivileged ICMP socket: {context} ({source})")]
    SocketCreateFailed {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to set socket option '{option}': {source}")]
    SetOptFailed {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to send probe: {0}")]
    SendFailed(#[source] io::Error),

    #[error("failed to bind to interface '{name}'{}: {source}", details.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    InterfaceBindFailed {
        name: String,
        details: Option<String>,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind to source address '{ip}'{}: {source}", details.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    SourceIPBindFailed {
        ip: IpAddr,
        details: Option<String>,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("ASN resolution failed{}", details.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
    ASNResolverFailed { details: Option<String> },

    #[error("STUN public IP discovery failed{}", details.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
    STUNFailed { details: Option<String> },

    #[error("unprivileged ICMP is not supported on this platform: {details}")]
    PlatformNotSupported { details: String },
}

pub type Result<T> = std::result::Result<T, Error>;
