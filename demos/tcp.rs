//! Resolves loopback, binds a server on an OS-chosen port, connects a
//! client, and exchanges one message — the non-blocking stream API's
//! pump-on-every-call discipline means no explicit event loop is needed.

use std::time::Duration;

use netrt::{Address, ConnectionStatus, ServerSocket, StreamSocket};

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_max_level(tracing::Level::DEBUG)
        .with_thread_names(true)
        .init();

    let server = ServerSocket::bind(None, 0)?;
    let port = server.local_port()?;
    tracing::info!(port, "listening");

    let address = Address::resolve("127.0.0.1");
    address.wait_resolved(-1);
    let mut client = StreamSocket::connect(&address, port)?;
    client.wait_connected(2_000)?;
    assert_eq!(client.connection_status(), ConnectionStatus::Connected);

    client.write(b"GET / HTTP/1.0\r\n\r\n")?;
    client.drain(2_000)?;

    let mut accepted = wait_for_accept(&server)?;
    let mut buf = [0u8; 1024];
    let mut received = Vec::new();
    while received.len() < 18 {
        let n = accepted.read(&mut buf)?;
        received.extend_from_slice(&buf[..n]);
    }
    tracing::info!(request = %String::from_utf8_lossy(&received), "server received request");

    Ok(())
}

fn wait_for_accept(server: &ServerSocket) -> anyhow::Result<StreamSocket> {
    loop {
        if let Some(stream) = server.accept()? {
            return Ok(stream);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
