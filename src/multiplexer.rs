//! Single call that blocks on a heterogeneous set of endpoints until any
//! becomes ready, per §4.8.

use std::time::{Duration, Instant};

use crate::datagram::DatagramSocket;
use crate::error::NetError;
use crate::platform::{self, PollTarget};
use crate::server::ServerSocket;
use crate::stream::{ConnectionStatus, StreamSocket};

/// One endpoint handle passed into [`wait_until_input`]. Borrows mutably
/// because the multiplexer pumps writable sockets and may move a pending
/// stream into `Connected`/`Failed` as a side effect, per §4.8.
pub enum Endpoint<'a> {
    Stream(&'a mut StreamSocket),
    Server(&'a ServerSocket),
    Datagram(&'a mut DatagramSocket),
}

/// Blocks until at least one endpoint in `endpoints` has input (or, for a
/// pending stream, a connection outcome), or `timeout_ms` elapses. `-1`
/// blocks indefinitely, `0` polls once without waiting. Returns the number
/// of ready endpoints.
pub fn wait_until_input(endpoints: &mut [Endpoint<'_>], timeout_ms: i64) -> Result<usize, NetError> {
    let deadline = match timeout_ms {
        t if t < 0 => None,
        t => Some(Instant::now() + Duration::from_millis(t as u64)),
    };

    loop {
        let remaining = match deadline {
            None => None,
            Some(d) => {
                let now = Instant::now();
                if now >= d {
                    return Ok(0);
                }
                Some(d - now)
            }
        };

        let mut targets = Vec::with_capacity(endpoints.len());
        for (key, endpoint) in endpoints.iter().enumerate() {
            let (socket, readable, writable) = match endpoint {
                Endpoint::Stream(stream) => match stream.status_raw() {
                    ConnectionStatus::Pending => (stream.raw(), false, true),
                    ConnectionStatus::Connected if stream.has_queued_output() => (stream.raw(), true, true),
                    ConnectionStatus::Connected => (stream.raw(), true, false),
                    ConnectionStatus::Failed => (stream.raw(), true, false),
                },
                Endpoint::Server(server) => (server.raw(), true, false),
                Endpoint::Datagram(datagram) if datagram.has_queued_output() => (datagram.raw(), true, true),
                Endpoint::Datagram(datagram) => (datagram.raw(), true, false),
            };
            targets.push(PollTarget {
                socket,
                key,
                readable,
                writable,
            });
        }

        let outcomes = platform::readiness_poll(&targets, remaining).map_err(NetError::from)?;

        let mut ready = 0usize;
        for outcome in &outcomes {
            if let Some(endpoint) = endpoints.get_mut(outcome.key) {
                match endpoint {
                    Endpoint::Stream(stream) => {
                        if stream.status_raw() == ConnectionStatus::Pending {
                            stream.observe_connect_result(outcome.failed);
                        }
                        if outcome.writable {
                            let _ = stream.pump();
                        }
                    }
                    Endpoint::Datagram(datagram) => {
                        if outcome.writable {
                            let _ = datagram.pump();
                        }
                    }
                    Endpoint::Server(_) => {}
                }
            }
            if outcome.readable || outcome.failed {
                ready += 1;
            }
        }

        if ready > 0 || timeout_ms == 0 {
            return Ok(ready);
        }
        // Infinite-timeout callers may wake spuriously on writability
        // alone; loop internally rather than returning 0, per §4.8.
    }
}
