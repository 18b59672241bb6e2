//! Bound UDP-like endpoint: per-packet send/receive with a FIFO send-queue
//! and an LRU-approximate peer-address cache, per §4.7.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;

use socket2::{Domain, SockAddr, Socket, Type};

use crate::address::Address;
use crate::error::{note_err, NetError};
use crate::fault;
use crate::platform;

/// Largest payload this endpoint will send or receive, per §4.7.
const MAX_PAYLOAD: usize = 64 * 1024;
/// Size of the receive scratch buffer and the peer-address ring.
const PEER_CACHE_SIZE: usize = 64;

struct Outbound {
    dest: Address,
    dest_port: u16,
    bytes: Vec<u8>,
}

/// One received packet: source address and port, plus payload.
pub struct Datagram {
    pub source: Address,
    pub source_port: u16,
    pub payload: Vec<u8>,
}

struct PeerCacheSlot {
    numeric: String,
    address: Address,
}

/// A 64-slot insertion-order ring: search from most recently written
/// backward, then wrap, per §9's "LRU approximation" design note.
struct PeerCache {
    slots: Vec<Option<PeerCacheSlot>>,
    write_index: usize,
}

impl PeerCache {
    fn new() -> Self {
        PeerCache {
            slots: (0..PEER_CACHE_SIZE).map(|_| None).collect(),
            write_index: 0,
        }
    }

    /// Searches from most recently written backward, then wraps, per §4.7
    /// and the LRU-approximation note in §9. Hit is by exact string match on
    /// the numeric form, which is canonical per Address (family + raw
    /// bytes) — so distinct ports from the same host collapse to one entry,
    /// matching the original's string-keyed cache.
    fn lookup_or_insert(&mut self, peer: SocketAddr) -> Address {
        let numeric = peer.ip().to_string();
        for offset in 0..PEER_CACHE_SIZE {
            let idx = (self.write_index + PEER_CACHE_SIZE - offset) % PEER_CACHE_SIZE;
            if let Some(slot) = &self.slots[idx] {
                if slot.numeric == numeric {
                    return slot.address.clone();
                }
            }
        }
        let fresh = Address::from_native(peer);
        self.write_index = (self.write_index + 1) % PEER_CACHE_SIZE;
        self.slots[self.write_index] = Some(PeerCacheSlot {
            numeric,
            address: fresh.clone(),
        });
        fresh
    }
}

/// Bound datagram endpoint. See module docs.
pub struct DatagramSocket {
    socket: Socket,
    domain: Domain,
    local: Option<Address>,
    port: u16,
    loss_percent: u8,
    scratch: Vec<u8>,
    out_queue: VecDeque<Outbound>,
    peers: PeerCache,
}

/// A dual-stack socket (bound unspecified, `v6only` disabled) only accepts
/// `sendto`/`recvfrom` peers in its own `AF_INET6` family; an IPv4
/// destination must be expressed as its IPv4-mapped IPv6 form or the kernel
/// rejects the call outright.
fn destination_for(domain: Domain, target: SocketAddr) -> SocketAddr {
    if domain == Domain::IPV6 {
        if let SocketAddr::V4(v4) = target {
            return SocketAddr::new(v4.ip().to_ipv6_mapped().into(), v4.port());
        }
    }
    target
}

impl DatagramSocket {
    /// Binds a datagram socket as §4.7 describes for servers: port 0 asks
    /// the OS for a free ephemeral port (the typical client case).
    pub fn bind(local: Option<&Address>, port: u16) -> Result<DatagramSocket, NetError> {
        let (bind_addr, domain) = match local {
            Some(address) => {
                address.require_resolved()?;
                let record = address.first_record().ok_or(NetError::NotResolved)?;
                let domain = if record.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
                (SocketAddr::new(record.ip(), port), domain)
            }
            None => (SocketAddr::new(std::net::Ipv6Addr::UNSPECIFIED.into(), port), Domain::IPV6),
        };

        let socket = Socket::new(domain, Type::DGRAM, None).map_err(NetError::from)?;
        platform::make_nonblocking(&socket).map_err(NetError::from)?;
        platform::enable_dual_stack(&socket, domain);
        socket.bind(&SockAddr::from(bind_addr)).map_err(NetError::from)?;

        Ok(DatagramSocket {
            socket,
            domain,
            local: local.cloned(),
            port,
            loss_percent: 0,
            scratch: vec![0u8; MAX_PAYLOAD],
            out_queue: VecDeque::new(),
            peers: PeerCache::new(),
        })
    }

    pub(crate) fn raw(&self) -> &Socket {
        &self.socket
    }

    /// Drains the outbound queue in enqueue order. A would-block error
    /// stops the drain, leaving the remaining packets in order; a hard
    /// error fails the call.
    pub(crate) fn pump(&mut self) -> Result<(), NetError> {
        while let Some(packet) = self.out_queue.front() {
            let dest = packet.dest.first_record().map(|r| SocketAddr::new(r.ip(), packet.dest_port));
            let Some(dest) = dest else {
                self.out_queue.pop_front();
                continue;
            };
            let dest = destination_for(self.domain, dest);
            match self.socket.send_to(&packet.bytes, &SockAddr::from(dest)) {
                Ok(_) => {
                    self.out_queue.pop_front();
                }
                Err(err) if platform::would_block(&err) => break,
                Err(err) => return Err(note_err(NetError::from(err))),
            }
        }
        Ok(())
    }

    /// Sends `bytes` to `(address, port)`. Rejects payloads over 64 KiB;
    /// zero-length sends are a documented no-op that returns success
    /// without transmitting, per §9's preserved-as-is behaviour.
    #[tracing::instrument(skip(self, address, bytes))]
    pub fn send(&mut self, address: &Address, port: u16, bytes: &[u8]) -> Result<(), NetError> {
        self.pump()?;
        address.require_resolved()?;
        if bytes.len() > MAX_PAYLOAD {
            return Err(note_err(NetError::InvalidArgument("datagram payload exceeds 64 KiB")));
        }
        if bytes.is_empty() {
            return Ok(());
        }
        if fault::roll_percent(self.loss_percent) {
            return Ok(());
        }

        let record = address.first_record().ok_or(NetError::NotResolved)?;
        let dest = destination_for(self.domain, SocketAddr::new(record.ip(), port));

        if self.out_queue.is_empty() {
            match self.socket.send_to(bytes, &SockAddr::from(dest)) {
                Ok(_) => return Ok(()),
                Err(err) if platform::would_block(&err) => {
                    self.queue(address.clone(), port, bytes);
                    return Ok(());
                }
                Err(err) => return Err(note_err(NetError::from(err))),
            }
        }

        self.queue(address.clone(), port, bytes);
        Ok(())
    }

    fn queue(&mut self, dest: Address, dest_port: u16, bytes: &[u8]) {
        self.out_queue.push_back(Outbound {
            dest,
            dest_port,
            bytes: bytes.to_vec(),
        });
    }

    /// Non-blocking receive. `Ok(None)` on would-block or when the loss
    /// dice discards an otherwise-successful read, per §4.7.
    pub fn receive(&mut self) -> Result<Option<Datagram>, NetError> {
        self.pump()?;

        // SAFETY: `recv_from` only ever writes initialized bytes into the
        // prefix it returns the length of; the scratch buffer is plain
        // zeroed `u8`, never read before being written by this call.
        let buf = unsafe {
            std::slice::from_raw_parts_mut(
                self.scratch.as_mut_ptr().cast::<std::mem::MaybeUninit<u8>>(),
                self.scratch.len(),
            )
        };
        match self.socket.recv_from(buf) {
            Ok((len, sockaddr)) => {
                if fault::roll_percent(self.loss_percent) {
                    return Ok(None);
                }
                let Some(peer) = sockaddr.as_socket() else {
                    return Ok(None);
                };
                let peer = platform::canonicalize_peer(peer);
                let source = self.peers.lookup_or_insert(peer);
                Ok(Some(Datagram {
                    source,
                    source_port: peer.port(),
                    payload: self.scratch[..len].to_vec(),
                }))
            }
            Err(err) if platform::would_block(&err) => Ok(None),
            Err(err) => {
                warn!(%err, "datagram receive failed");
                Err(note_err(NetError::from(err)))
            }
        }
    }

    pub fn set_simulated_loss(&mut self, percent: u8) {
        self.loss_percent = fault::clamp_percent(percent);
    }

    pub fn local_address(&self) -> Option<Address> {
        self.local.clone()
    }

    pub fn local_port(&self) -> io::Result<u16> {
        let addr = self.socket.local_addr()?;
        Ok(addr.as_socket().map(|s| s.port()).unwrap_or(self.port))
    }

    pub(crate) fn has_queued_output(&self) -> bool {
        !self.out_queue.is_empty()
    }
}

impl Drop for DatagramSocket {
    fn drop(&mut self) {
        // Best-effort final drain; queued-but-unsent datagrams and cached
        // peer addresses are simply dropped along with `self`.
        let _ = self.pump();
    }
}
