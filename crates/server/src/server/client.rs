//! Client session state.

use std::net::SocketAddr;
use std::time::Instant;

/// A connected client session.
///
/// Exists from socket accept until close; the player record only exists
/// once the session has sent `init`.
#[derive(Debug)]
pub struct Client {
    /// Remote address.
    pub addr: SocketAddr,
    /// Whether `init` has been received.
    pub identified: bool,
    /// Connection time.
    pub connected_at: Instant,
}

impl Client {
    /// Create a new client session.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            identified: false,
            connected_at: Instant::now(),
        }
    }
}
