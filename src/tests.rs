//! Cross-component scenarios from §8: address resolution, fault injection,
//! datagram exchange, and the readiness multiplexer's timeout behaviour.
//! Tests that touch process-global state (the resolver pool singleton, the
//! global resolver-loss knob) are `#[serial]` so they don't interfere with
//! each other across threads in the same test binary.

use std::time::Duration;

use serial_test::serial;

use crate::address::{Address, AddressStatus};
use crate::datagram::DatagramSocket;
use crate::multiplexer::{self, Endpoint};
use crate::server::ServerSocket;
use crate::stream::StreamSocket;

/// Scenario 1: resolving "localhost" succeeds and its numeric form is one
/// of the two canonical loopback addresses.
#[test]
#[serial]
fn resolve_localhost_succeeds() {
    crate::simulate_resolver_loss(0);
    let address = Address::resolve("localhost");
    let status = address.wait_resolved(-1);
    assert_eq!(status, AddressStatus::Resolved);
    let numeric = address.string().expect("resolved address has a numeric form");
    assert!(
        numeric == "127.0.0.1" || numeric == "::1",
        "unexpected numeric form: {numeric}"
    );
}

/// Scenario 2: a syntactically valid but unresolvable hostname fails, and
/// the failure is sticky across repeated `status()` queries.
#[test]
#[serial]
fn resolve_unresolvable_hostname_fails() {
    crate::simulate_resolver_loss(0);
    let address = Address::resolve("no-such-host.invalid");
    let status = address.wait_resolved(-1);
    assert_eq!(status, AddressStatus::Failed);
    assert!(crate::get_last_error().is_some());
    assert_eq!(address.status(), AddressStatus::Failed);
}

/// Scenario 3: global loss=100 fails resolution with the sentinel text,
/// without performing any real lookup (a bogus-but-resolvable-looking name
/// would otherwise succeed).
#[test]
#[serial]
fn global_resolver_loss_100_forces_simulated_failure() {
    crate::simulate_resolver_loss(100);
    let address = Address::resolve("localhost");
    let status = address.wait_resolved(-1);
    assert_eq!(status, AddressStatus::Failed);
    assert_eq!(crate::get_last_error().as_deref(), Some("simulated failure"));
    crate::simulate_resolver_loss(0);
}

/// Address status is final once observed non-in-progress (§8 invariant).
#[test]
#[serial]
fn address_status_is_final_once_resolved() {
    crate::simulate_resolver_loss(0);
    let address = Address::resolve("localhost");
    address.wait_resolved(-1);
    let first = address.status();
    std::thread::sleep(Duration::from_millis(50));
    let second = address.status();
    assert_eq!(first, second);
}

/// §8 resolver pool invariant: live-worker count stays within [0, MAX] and
/// at least MIN while the pool is alive, regardless of a burst of
/// concurrent resolve() calls.
#[test]
#[serial]
fn resolver_pool_worker_count_is_bounded() {
    crate::simulate_resolver_loss(0);
    let addresses: Vec<Address> = (0..40).map(|_| Address::resolve("127.0.0.1")).collect();
    let live = crate::resolver::live_worker_count();
    assert!(live <= 10, "live worker count {live} exceeds MAX");
    for address in &addresses {
        address.wait_resolved(5_000);
    }
    let live_after = crate::resolver::live_worker_count();
    assert!(live_after >= 2, "live worker count {live_after} dropped below MIN");
}

/// Scenario 5: two datagram sockets on loopback exchange three payloads in
/// order; each receive reproduces the exact bytes and length.
#[test]
#[serial]
fn datagram_exchange_preserves_bytes_and_order() {
    let mut a = DatagramSocket::bind(None, 0).expect("bind a");
    let mut b = DatagramSocket::bind(None, 0).expect("bind b");
    let b_port = b.local_port().expect("b local port");

    let loopback = Address::resolve("127.0.0.1");
    loopback.wait_resolved(-1);

    let payloads: [&[u8]; 3] = [&[0x01], &[0x02, 0x02], &[0x03, 0x03, 0x03]];
    for payload in payloads {
        a.send(&loopback, b_port, payload).expect("send");
    }

    let mut received = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while received.len() < payloads.len() && std::time::Instant::now() < deadline {
        let mut endpoints = [Endpoint::Datagram(&mut b)];
        let ready = multiplexer::wait_until_input(&mut endpoints, 200).expect("poll");
        if ready == 0 {
            continue;
        }
        while let Some(datagram) = b.receive().expect("receive") {
            received.push(datagram);
        }
    }

    assert_eq!(received.len(), payloads.len());
    for (datagram, expected) in received.iter().zip(payloads.iter()) {
        assert_eq!(&datagram.payload, expected);
        assert_eq!(Address::compare(&datagram.source, &loopback), std::cmp::Ordering::Equal);
    }
}

/// Scenario 6: the multiplexer given an idle server and datagram socket
/// (nobody connecting, nobody sending) returns 0 once the timeout elapses,
/// and does so close to the requested bound rather than hanging.
#[test]
fn multiplexer_returns_zero_after_timeout_when_idle() {
    let server = ServerSocket::bind(None, 0).expect("bind server");
    let mut datagram = DatagramSocket::bind(None, 0).expect("bind datagram");

    let start = std::time::Instant::now();
    let mut endpoints = vec![Endpoint::Server(&server), Endpoint::Datagram(&mut datagram)];
    let ready = multiplexer::wait_until_input(&mut endpoints, 200).expect("poll");
    let elapsed = start.elapsed();

    assert_eq!(ready, 0);
    assert!(elapsed >= Duration::from_millis(190), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "took too long: {elapsed:?}");
}

/// `pending_writes` invariant from §8: after a successful write with an
/// empty queue and zero loss, pending bytes plus transmitted bytes equal
/// the write size.
#[test]
fn pending_writes_plus_transmitted_equals_written() {
    let server = ServerSocket::bind(None, 0).expect("bind server");
    let port = server.local_port().expect("local port");
    let loopback = Address::resolve("127.0.0.1");
    loopback.wait_resolved(-1);

    let mut client = StreamSocket::connect(&loopback, port).expect("connect");
    client.wait_connected(2000).expect("wait connected");

    let payload = vec![0x42u8; 4096];
    client.write(&payload).expect("write");
    let pending = client.pending_writes().expect("pending writes");
    // Either the whole buffer went out immediately (pending == 0) or
    // whatever remains is queued; either way pending <= payload.len().
    assert!(pending <= payload.len());
}
