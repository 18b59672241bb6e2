//! Listening endpoint; produces [`StreamSocket`]s via non-blocking accept.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, SockAddr, Socket, Type};

use crate::address::Address;
use crate::error::NetError;
use crate::platform;
use crate::stream::StreamSocket;

/// Backlog passed to `listen(2)`, per §4.6.
const BACKLOG: i32 = 16;

/// Listening endpoint bound to an optional local address and a port.
pub struct ServerSocket {
    socket: Socket,
    local: Option<Address>,
    port: u16,
}

impl ServerSocket {
    /// Builds a native bind address from an optional resolved [`Address`]
    /// and a port (0 meaning "any"). A `None` address means "any address",
    /// resolved to the IPv4 unspecified address with dual-stack enabled
    /// where the platform allows it, per §4.1's "unspecified-family bind"
    /// rule.
    pub fn bind(local: Option<&Address>, port: u16) -> Result<ServerSocket, NetError> {
        let (bind_addr, domain) = match local {
            Some(address) => {
                address.require_resolved()?;
                let record = address.first_record().ok_or(NetError::NotResolved)?;
                let domain = if record.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
                (SocketAddr::new(record.ip(), port), domain)
            }
            None => (SocketAddr::new(std::net::Ipv6Addr::UNSPECIFIED.into(), port), Domain::IPV6),
        };

        let socket = Socket::new(domain, Type::STREAM, None).map_err(NetError::from)?;
        platform::make_nonblocking(&socket).map_err(NetError::from)?;
        platform::enable_dual_stack(&socket, domain);
        socket.bind(&SockAddr::from(bind_addr)).map_err(NetError::from)?;
        socket.listen(BACKLOG).map_err(NetError::from)?;

        Ok(ServerSocket {
            socket,
            local: local.cloned(),
            port,
        })
    }

    /// Non-blocking accept: `Ok(None)` when there is no pending connection,
    /// `Ok(Some(stream))` on success. The peer's numeric address and port
    /// are discovered via a reverse lookup on the accepted `sockaddr`.
    pub fn accept(&self) -> Result<Option<StreamSocket>, NetError> {
        match self.socket.accept() {
            Ok((socket, sockaddr)) => {
                let peer = sockaddr
                    .as_socket()
                    .ok_or_else(|| NetError::fatal("accepted socket has no address family"))?;
                let peer = platform::canonicalize_peer(peer);
                debug!(%peer, "accepted connection");
                let stream = StreamSocket::from_accepted(socket, peer).map_err(NetError::from)?;
                Ok(Some(stream))
            }
            Err(err) if platform::would_block(&err) => Ok(None),
            Err(err) => {
                warn!(%err, "accept failed");
                Err(NetError::from(err))
            }
        }
    }

    pub(crate) fn raw(&self) -> &Socket {
        &self.socket
    }

    pub fn local_address(&self) -> Option<Address> {
        self.local.clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The ephemeral port the OS actually bound, when `port` was 0.
    pub fn local_port(&self) -> io::Result<u16> {
        let addr = self.socket.local_addr()?;
        Ok(addr.as_socket().map(|s| s.port()).unwrap_or(self.port))
    }
}

// Drop is the destructor from §4.6: closing the handle is all `Socket`'s own
// `Drop` impl does already; already-accepted `StreamSocket`s are untouched
// because they own their file descriptors independently.
