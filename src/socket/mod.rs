//! The socket session and its platform-specific acquisition
//! logic.

mod platform;
mod session;

pub use session::{BindOptions, SocketSession, MAX_PACKET_SIZE};
