//! Uniform names over the host socket primitives the rest of the crate
//! builds on: non-blocking flag, error inspection, dual-stack bind, and a
//! readiness-poll wrapper. Built on `socket2` for the socket primitives and
//! `polling` for the poll/epoll/kqueue wrapper, the same two crates the
//! teacher crate depends on for this exact purpose.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use polling::{Event, Events, Poller};
use socket2::{Domain, Socket};

/// Collapses an IPv4-mapped IPv6 peer address (as a dual-stack socket
/// reports addresses of IPv4 peers) back to its canonical `V4` form, so two
/// `Address`es for the same peer compare equal regardless of which family
/// the accepting/receiving socket happened to be.
pub(crate) fn canonicalize_peer(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), v6.port()),
            None => addr,
        },
        other => other,
    }
}

/// Puts a freshly created socket into non-blocking mode. Every endpoint in
/// this crate calls this exactly once, at construction.
pub(crate) fn make_nonblocking(socket: &Socket) -> io::Result<()> {
    socket.set_nonblocking(true)
}

/// True when an I/O error is the "would block" kind the rest of the crate
/// treats as "no progress this call, not a failure".
pub(crate) fn would_block(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock)
        || err.raw_os_error() == Some(libc_in_progress())
}

#[cfg(target_os = "linux")]
fn libc_in_progress() -> i32 {
    // EINPROGRESS: connect(2) reports this instead of EWOULDBLOCK.
    115
}

#[cfg(not(target_os = "linux"))]
fn libc_in_progress() -> i32 {
    i32::MIN
}

/// Human-readable text for an OS error code, for the thread-local last-error
/// facility.
pub(crate) fn describe_error(err: &io::Error) -> String {
    err.to_string()
}

/// Best-effort dual-stack enable: on hosts that support it, an unspecified-
/// family bind is allowed to service both IPv4 and IPv6. Failure is silently
/// tolerated, per the spec.
pub(crate) fn enable_dual_stack(socket: &Socket, domain: Domain) {
    if domain == Domain::IPV6 {
        let _ = socket.set_only_v6(false);
    }
}

/// One descriptor passed into [`readiness_poll`]: which socket, and which
/// events the caller is interested in.
pub(crate) struct PollTarget<'a> {
    pub socket: &'a Socket,
    pub key: usize,
    pub readable: bool,
    pub writable: bool,
}

/// A fired readiness event for one of the targets passed to
/// [`readiness_poll`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct PollOutcome {
    pub key: usize,
    pub readable: bool,
    pub writable: bool,
    /// Error, hangup, or invalid-descriptor — counted as "readable" by
    /// callers per the spec, but kept distinct here so the multiplexer can
    /// react to connection failures precisely.
    pub failed: bool,
}

/// Polls a heterogeneous set of sockets once, for up to `timeout` (`None`
/// means block indefinitely). Builds a fresh `Poller` scoped to this call —
/// unlike the teacher's permanent event-loop thread, there is no background
/// dispatch here; the caller's thread is the only thread that waits.
pub(crate) fn readiness_poll(
    targets: &[PollTarget<'_>],
    timeout: Option<Duration>,
) -> io::Result<Vec<PollOutcome>> {
    let poller = Poller::new()?;
    for target in targets {
        let event = event_for(target);
        // SAFETY: `socket` outlives the `Poller::add`/`Poller::delete` pair
        // below; we never let a `Socket` drop while still registered.
        unsafe {
            poller.add(target.socket, event)?;
        }
    }

    let mut events = Events::new();
    poller.wait(&mut events, timeout)?;

    let mut outcomes = Vec::with_capacity(events.len());
    for event in events.iter() {
        outcomes.push(PollOutcome {
            key: event.key,
            readable: event.readable,
            writable: event.writable,
            failed: is_failed(&event),
        });
    }

    for target in targets {
        let _ = poller.delete(target.socket);
    }

    Ok(outcomes)
}

/// Error/hangup/invalid-descriptor detection. `is_err()` is portable; the
/// interrupt (HUP without ERR, seen on Linux epoll for unconnected sockets)
/// check is platform-gated the same way the teacher's `ConnectFuture::poll`
/// gates it.
fn is_failed(event: &Event) -> bool {
    let err = event.is_err().unwrap_or(false);
    #[cfg(target_os = "linux")]
    let err = err || event.is_interrupt();
    err
}

fn event_for(target: &PollTarget<'_>) -> Event {
    match (target.readable, target.writable) {
        (true, true) => Event::all(target.key),
        (true, false) => Event::readable(target.key),
        (false, true) => Event::writable(target.key),
        (false, false) => Event::none(target.key),
    }
}
