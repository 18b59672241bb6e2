//! Basic connectivity scenario (§8 scenario 4): server on an OS-chosen
//! port, client connects, writes a large buffer in one call, drains, and
//! the server reads back exactly what was sent.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use crate::address::Address;
use crate::server::ServerSocket;
use crate::stream::{ConnectionStatus, StreamSocket};

fn resolve_loopback() -> Address {
    let address = Address::resolve("127.0.0.1");
    address.wait_resolved(-1);
    address
}

#[test]
fn client_writes_large_buffer_and_server_reads_it_all() {
    let server = ServerSocket::bind(None, 0).expect("bind server");
    let port = server.local_port().expect("local port");

    let address = resolve_loopback();
    let mut client = StreamSocket::connect(&address, port).expect("connect");
    client.wait_connected(2000).expect("wait connected");
    assert_eq!(client.connection_status(), ConnectionStatus::Connected);

    let payload = vec![0xABu8; 100_000];
    client.write(&payload).expect("write");
    let remaining = client.drain(5_000).expect("drain");
    assert_eq!(remaining, 0);

    // The multiplexer isn't exercised here; poll accept directly, since the
    // server side of this scenario only needs to observe one connection.
    let mut accepted = wait_for_accept(&server, Duration::from_secs(2)).expect("server accepted connection");

    let mut received = Vec::new();
    read_all(&mut accepted, &mut received, payload.len(), Duration::from_secs(5));
    assert_eq!(received, payload);
}

fn wait_for_accept(server: &ServerSocket, timeout: Duration) -> Option<StreamSocket> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if let Some(stream) = server.accept().expect("accept") {
            return Some(stream);
        }
        if std::time::Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn read_all(stream: &mut StreamSocket, into: &mut Vec<u8>, want: usize, timeout: Duration) {
    let deadline = std::time::Instant::now() + timeout;
    let mut buf = [0u8; 8192];
    while into.len() < want {
        match stream.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => into.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
        if std::time::Instant::now() >= deadline {
            break;
        }
    }
}

/// Sanity check that a client connecting to a genuinely closed port
/// observes a `Failed` connection rather than hanging, using a real
/// `std::net` listener that is dropped before the client connects.
#[test]
fn connect_to_closed_port_fails() {
    let bound = TcpListener::bind("127.0.0.1:0").expect("bind throwaway listener");
    let port = bound.local_addr().expect("local addr").port();
    drop(bound);

    let address = resolve_loopback();
    let mut client = StreamSocket::connect(&address, port).expect("construct client");
    let status = client.wait_connected(2000).expect("wait connected");
    assert_eq!(status, ConnectionStatus::Failed);
}

/// A plain `std::net::TcpStream` peer is indistinguishable from one of our
/// own `StreamSocket`s on the wire: byte-for-byte reliable-ordered pipe.
#[test]
fn interop_with_std_net_tcp_stream() {
    let server = ServerSocket::bind(None, 0).expect("bind server");
    let port = server.local_port().expect("local port");

    let handle = std::thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("std connect");
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).expect("std read");
        assert_eq!(&buf, b"hello");
    });

    let mut accepted = wait_for_accept(&server, Duration::from_secs(2)).expect("accept");
    accepted.write(b"hello").expect("write");
    accepted.drain(2000).expect("drain");

    handle.join().expect("client thread joined cleanly");
}
