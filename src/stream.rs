//! Client or accepted connection: a non-blocking byte pipe with an internal
//! send-queue and the three-state connection machine from §4.5.
//!
//! Wraps a `socket2::Socket` exactly as the teacher's `AsyncRawSocket` does
//! (non-blocking on construction, closed on `Drop`), but without the
//! `Future`/waker machinery: progress is made by `pump`, invoked at the top
//! of every public call and by the readiness multiplexer, not by a
//! background event loop.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use socket2::{Domain, SockAddr, Socket, Type};

use crate::address::Address;
use crate::error::{note_err, NetError};
use crate::fault;
use crate::platform::{self, PollTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Pending,
    Connected,
    Failed,
}

/// Client or accepted stream endpoint. See module docs.
pub struct StreamSocket {
    pub(crate) socket: Socket,
    peer: Address,
    port: u16,
    status: ConnectionStatus,
    failure_text: Option<String>,
    out_buf: Vec<u8>,
    loss_percent: u8,
    fail_until: Option<Instant>,
}

/// Doubles `buf`'s capacity (starting from 1) until it can hold
/// `len + additional` bytes, per §4.5's queue growth rule. Returns
/// `ResourceExhausted` rather than panicking on overflow of the capacity
/// counter.
fn grow_for(buf: &Vec<u8>, additional: usize) -> Result<usize, NetError> {
    let needed = buf
        .len()
        .checked_add(additional)
        .ok_or(NetError::ResourceExhausted("write queue length overflow"))?;
    let mut cap = buf.capacity().max(1);
    while cap < needed {
        cap = cap
            .checked_mul(2)
            .ok_or(NetError::ResourceExhausted("write queue capacity overflow"))?;
    }
    Ok(cap)
}

impl StreamSocket {
    /// Client construction: creates a non-blocking socket and attempts
    /// connect(). The socket is always returned `Pending` — even when the OS
    /// happens to complete the handshake synchronously (common on loopback)
    /// — because the only documented pending→connected transition is the
    /// readiness multiplexer (or `wait_connected`) observing "writable", per
    /// §3/§4.5. A would-block error is expected and also leaves the socket
    /// `Pending`. Any other immediate error closes the socket and fails
    /// construction outright, matching "create-client → Stream or null".
    #[tracing::instrument(skip(address))]
    pub fn connect(address: &Address, port: u16) -> Result<StreamSocket, NetError> {
        address.require_resolved()?;
        let record = address.first_record().ok_or(NetError::NotResolved)?;
        let target = SocketAddr::new(record.ip(), port);

        let domain = if target.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, None).map_err(NetError::from)?;
        platform::make_nonblocking(&socket).map_err(NetError::from)?;

        let stream = StreamSocket {
            socket,
            peer: address.clone(),
            port,
            status: ConnectionStatus::Pending,
            failure_text: None,
            out_buf: Vec::new(),
            loss_percent: 0,
            fail_until: None,
        };

        match stream.socket.connect(&SockAddr::from(target)) {
            Ok(()) => {}
            Err(err) if platform::would_block(&err) => {}
            Err(err) => {
                let text = platform::describe_error(&err);
                warn!(error = %text, "stream connect failed immediately");
                return Err(note_err(NetError::fatal(text)));
            }
        }

        Ok(stream)
    }

    /// Used by [`crate::server::ServerSocket::accept`]: an already
    /// connected socket, with the peer's address discovered via a numeric
    /// reverse-lookup on the accepted `sockaddr`.
    pub(crate) fn from_accepted(socket: Socket, peer_addr: SocketAddr) -> io::Result<StreamSocket> {
        platform::make_nonblocking(&socket)?;
        Ok(StreamSocket {
            socket,
            peer: Address::from_native(peer_addr),
            port: peer_addr.port(),
            status: ConnectionStatus::Connected,
            failure_text: None,
            out_buf: Vec::new(),
            loss_percent: 0,
            fail_until: None,
        })
    }

    fn fail(&mut self, text: impl Into<String>) {
        let text = text.into();
        warn!(error = %text, "stream socket failed");
        self.status = ConnectionStatus::Failed;
        self.failure_text = Some(text);
    }

    fn in_failure_window(&self) -> bool {
        matches!(self.fail_until, Some(until) if Instant::now() < until)
    }

    /// After any real I/O, roll the dice on opening a fresh simulated-
    /// failure window.
    fn maybe_open_failure_window(&mut self) {
        if fault::roll_percent(self.loss_percent) {
            self.fail_until = Some(fault::simulated_failure_deadline(self.loss_percent));
        }
    }

    /// Advances pending work: flushes the send queue if the simulated-
    /// failure window (if any) has lapsed. Invoked at the top of every
    /// public call and by the multiplexer on writability.
    pub(crate) fn pump(&mut self) -> Result<(), NetError> {
        if self.status != ConnectionStatus::Connected {
            return Ok(());
        }
        if self.out_buf.is_empty() || self.in_failure_window() {
            return Ok(());
        }

        match self.socket.write(&self.out_buf) {
            Ok(sent) if sent == self.out_buf.len() => {
                self.out_buf.clear();
                self.maybe_open_failure_window();
            }
            Ok(sent) => {
                self.out_buf.drain(0..sent);
                self.maybe_open_failure_window();
            }
            Err(err) if platform::would_block(&err) => {}
            Err(err) => {
                let text = platform::describe_error(&err);
                self.fail(text);
            }
        }
        Ok(())
    }

    /// Called by the readiness multiplexer when this socket (while
    /// `Pending`) reported failure or writability.
    pub(crate) fn observe_connect_result(&mut self, failed: bool) {
        if self.status != ConnectionStatus::Pending {
            return;
        }
        if failed {
            let err = self.socket.take_error().ok().flatten();
            let text = err.map(|e| platform::describe_error(&e)).unwrap_or_else(|| "connection failed".to_owned());
            self.fail(text);
        } else {
            self.status = ConnectionStatus::Connected;
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    /// Blocks (bounded by `timeout_ms`) until the socket leaves `Pending`.
    pub fn wait_connected(&mut self, timeout_ms: i64) -> Result<ConnectionStatus, NetError> {
        let deadline = match timeout_ms {
            t if t < 0 => None,
            t => Some(Instant::now() + Duration::from_millis(t as u64)),
        };
        loop {
            if self.status != ConnectionStatus::Pending {
                return Ok(self.status);
            }
            let remaining = match deadline {
                None => None,
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(self.status);
                    }
                    Some(d - now)
                }
            };
            let targets = [PollTarget {
                socket: &self.socket,
                key: 0,
                readable: false,
                writable: true,
            }];
            let outcomes = platform::readiness_poll(&targets, remaining).map_err(NetError::from)?;
            if let Some(outcome) = outcomes.first() {
                self.observe_connect_result(outcome.failed);
            } else if timeout_ms == 0 {
                return Ok(self.status);
            }
        }
    }

    /// Writes `data`; `0` or an error per §4.5's contract. Zero-length
    /// writes are a documented no-op.
    pub fn write(&mut self, data: &[u8]) -> Result<(), NetError> {
        self.pump()?;
        if self.status == ConnectionStatus::Failed {
            return Err(note_err(NetError::fatal(self.failure_text.clone().unwrap_or_default())));
        }
        if data.is_empty() {
            return Ok(());
        }

        if self.out_buf.is_empty() && self.loss_percent == 0 {
            match self.socket.write(data) {
                Ok(sent) if sent == data.len() => {
                    self.maybe_open_failure_window();
                    return Ok(());
                }
                Ok(sent) => {
                    self.queue(&data[sent..])?;
                    self.maybe_open_failure_window();
                    return Ok(());
                }
                Err(err) if platform::would_block(&err) => {
                    self.queue(data)?;
                    return Ok(());
                }
                Err(err) => {
                    let text = platform::describe_error(&err);
                    self.fail(text.clone());
                    return Err(note_err(NetError::fatal(text)));
                }
            }
        }

        self.queue(data)
    }

    fn queue(&mut self, data: &[u8]) -> Result<(), NetError> {
        let target_cap = grow_for(&self.out_buf, data.len())?;
        if target_cap > self.out_buf.capacity() {
            self.out_buf.reserve(target_cap - self.out_buf.len());
        }
        self.out_buf.extend_from_slice(data);
        Ok(())
    }

    /// Bytes still queued for send, after pumping.
    pub fn pending_writes(&mut self) -> Result<usize, NetError> {
        self.pump()?;
        Ok(self.out_buf.len())
    }

    /// Repeatedly polls for writability and pumps until the queue drains or
    /// `timeout_ms` elapses. Returns the remaining byte count.
    pub fn drain(&mut self, timeout_ms: i64) -> Result<usize, NetError> {
        self.pump()?;
        if self.out_buf.is_empty() {
            return Ok(0);
        }
        let deadline = match timeout_ms {
            t if t < 0 => None,
            t => Some(Instant::now() + Duration::from_millis(t as u64)),
        };
        loop {
            if self.out_buf.is_empty() || self.status == ConnectionStatus::Failed {
                return Ok(self.out_buf.len());
            }
            let remaining = match deadline {
                None => None,
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(self.out_buf.len());
                    }
                    Some(d - now)
                }
            };
            let targets = [PollTarget {
                socket: &self.socket,
                key: 0,
                readable: false,
                writable: true,
            }];
            let outcomes = platform::readiness_poll(&targets, remaining).map_err(NetError::from)?;
            if outcomes.is_empty() && timeout_ms != -1 {
                return Ok(self.out_buf.len());
            }
            self.pump()?;
        }
    }

    /// Reads into `buf`. Zero is both "would block" and "in a simulated-
    /// failure window"; end-of-stream (a real zero-byte read) is reported
    /// as a fatal failure, per §4.5.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        self.pump()?;
        if self.status == ConnectionStatus::Failed {
            return Err(note_err(NetError::fatal(self.failure_text.clone().unwrap_or_default())));
        }
        if self.in_failure_window() {
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        match self.socket.read(buf) {
            Ok(0) => {
                self.fail("end of stream");
                Err(note_err(NetError::EndOfStream))
            }
            Ok(n) => {
                self.maybe_open_failure_window();
                Ok(n)
            }
            Err(err) if platform::would_block(&err) => Ok(0),
            Err(err) => {
                let text = platform::describe_error(&err);
                self.fail(text.clone());
                Err(note_err(NetError::fatal(text)))
            }
        }
    }

    /// Sets this socket's simulated packet-loss/lag percentage, clamped to
    /// `[0, 100]`.
    pub fn set_simulated_loss(&mut self, percent: u8) {
        self.loss_percent = fault::clamp_percent(percent);
    }

    pub fn peer_address(&self) -> Address {
        self.peer.clone()
    }

    pub fn peer_port(&self) -> u16 {
        self.port
    }

    pub(crate) fn has_queued_output(&self) -> bool {
        !self.out_buf.is_empty()
    }

    pub(crate) fn status_raw(&self) -> ConnectionStatus {
        self.status
    }

    pub(crate) fn raw(&self) -> &Socket {
        &self.socket
    }
}

impl Drop for StreamSocket {
    fn drop(&mut self) {
        // Best-effort final send; errors are not actionable during drop.
        let _ = self.pump();
    }
}
