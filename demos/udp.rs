//! Two datagram sockets on loopback, ping-ponging a handful of packets
//! using the multiplexer to wait for input instead of busy-polling.

use std::time::Duration;

use netrt::multiplexer::{self, Endpoint};
use netrt::{Address, DatagramSocket};

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_max_level(tracing::Level::DEBUG)
        .with_thread_names(true)
        .init();

    let mut a = DatagramSocket::bind(None, 0)?;
    let mut b = DatagramSocket::bind(None, 0)?;
    let a_port = a.local_port()?;
    let b_port = b.local_port()?;

    let loopback = Address::resolve("127.0.0.1");
    loopback.wait_resolved(-1);

    a.send(&loopback, b_port, b"hello")?;

    for round in 0..9 {
        let mut endpoints = [Endpoint::Datagram(&mut a), Endpoint::Datagram(&mut b)];
        let ready = multiplexer::wait_until_input(&mut endpoints, 2_000)?;
        if ready == 0 {
            tracing::warn!("nothing arrived within the timeout");
            break;
        }

        if let Some(datagram) = b.receive()? {
            tracing::info!(round, port = datagram.source_port, "b received, bouncing back");
            b.send(&datagram.source, a_port, &datagram.payload)?;
        }
        if let Some(datagram) = a.receive()? {
            tracing::info!(round, port = datagram.source_port, "a received the bounce");
            a.send(&datagram.source, b_port, b"hello")?;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    Ok(())
}
