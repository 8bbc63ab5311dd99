//! The runtime-side request.

use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::SystemTime;

/// Connection metadata captured by the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Peer address.
    pub remote_addr: SocketAddr,
    /// Local address the connection was accepted on.
    pub local_addr: SocketAddr,
    /// `true` if the connection is TLS terminated by the runtime.
    pub secure: bool,
    /// When the request head was received.
    pub received_at: SystemTime,
}

impl ConnectionInfo {
    /// Plain-text connection received now.
    #[must_use]
    pub fn new(remote_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            local_addr,
            secure: false,
            received_at: SystemTime::now(),
        }
    }

    /// Marks the connection as TLS.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Overrides the receive time.
    #[must_use]
    pub fn received_at(mut self, at: SystemTime) -> Self {
        self.received_at = at;
        self
    }
}

impl Default for ConnectionInfo {
    /// Loopback peer talking to `127.0.0.1:8080`.
    fn default() -> Self {
        Self::new(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 50000)),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
        )
    }
}

/// A fully buffered runtime request plus its connection metadata.
#[derive(Debug)]
pub struct RawRequest {
    /// Request head and collected body.
    pub request: http::Request<Bytes>,
    /// Connection the request arrived on.
    pub conn: ConnectionInfo,
}

impl RawRequest {
    /// Pairs a request with its connection.
    #[must_use]
    pub fn new(request: http::Request<Bytes>, conn: ConnectionInfo) -> Self {
        Self { request, conn }
    }
}
