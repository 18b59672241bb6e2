//! Portable, thin-but-opinionated user-space networking runtime.
//!
//! Three facilities, covered in dependency order by the modules below:
//! asynchronous hostname resolution backed by a shared worker pool
//! ([`address`], [`resolver`]); non-blocking reliable byte-stream endpoints
//! with automatic write-queuing ([`stream`], [`server`]); and non-blocking
//! unreliable datagram endpoints with per-packet send/receive and
//! sender-address caching ([`datagram`]). [`multiplexer`] blocks on any
//! mixture of the three until one becomes ready.
//!
//! Calls never block except at the handful of explicit wait points named in
//! each module's documentation — pending work lives in internal queues and
//! is advanced by every subsequent call on the same endpoint ("pumping") or
//! by [`multiplexer::wait_until_input`].

#[macro_use]
extern crate tracing;

pub mod address;
pub mod datagram;
pub mod error;
mod fault;
pub mod lifecycle;
pub mod local_addresses;
mod platform;
pub mod multiplexer;
mod resolver;
pub mod server;
pub mod stream;

pub use address::{Address, AddressStatus};
pub use datagram::{Datagram, DatagramSocket};
pub use error::{get_last_error, NetError};
pub use lifecycle::{init, quit};
pub use local_addresses::local_addresses;
pub use multiplexer::{wait_until_input, Endpoint};
pub use server::ServerSocket;
pub use stream::{ConnectionStatus, StreamSocket};

/// Sets the process-wide resolver fault-injection loss percentage, clamped
/// to `[0, 100]`. Part of the fault injector (§4.4): with probability
/// `percent / 100` a resolution is delayed, and independently with the same
/// probability it is failed outright with the sentinel text
/// `"simulated failure"`.
pub fn simulate_resolver_loss(percent: u8) {
    fault::set_global_resolver_loss(percent);
}

#[cfg(test)]
mod test;
#[cfg(test)]
mod tests;
