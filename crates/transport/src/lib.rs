//! Transport (§4.2): UDP/TCP socket contexts, STUN client, retry policy.

pub mod error;
pub mod stun;
pub mod tcp;
pub mod udp;

pub use error::TransportError;
pub use udp::{SharedUdpContext, UdpContext};
