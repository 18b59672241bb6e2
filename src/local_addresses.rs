//! Enumeration of the host's own bound addresses, for `local_addresses()`.
//!
//! Grounded on the teacher's sibling crate `network-scanner`'s
//! `ip_utils::get_subnets`, which walks `network_interface::NetworkInterface`
//! adapters; here we keep every non-loopback address instead of filtering to
//! broadcast-capable IPv4 subnets, since this facility answers "what
//! addresses does this host own" rather than "what subnets can I scan".

use std::net::IpAddr;

use anyhow::Context as _;
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};

use crate::error::NetError;

/// Adapter walk itself stays on `anyhow`, the way the teacher's
/// `ip_utils::get_subnets` does for this exact call — it's an internal
/// helper, not part of the public error surface, so it gets converted to
/// `NetError` only at the boundary below.
fn enumerate_adapters() -> anyhow::Result<Vec<IpAddr>> {
    let interfaces = NetworkInterface::show().context("failed to enumerate network interfaces")?;

    Ok(interfaces
        .into_iter()
        .flat_map(|iface| iface.addr.into_iter())
        .filter_map(|addr| {
            let ip = match addr {
                Addr::V4(v4) => IpAddr::V4(v4.ip),
                Addr::V6(v6) => IpAddr::V6(v6.ip),
            };
            if ip.is_loopback() {
                None
            } else {
                Some(ip)
            }
        })
        .collect())
}

/// Every non-loopback address of every interface, across both families —
/// the "present implementation enumerates both" half of the asymmetric
/// behaviour §9 preserves as-is (§6's `local-addresses()` external interface).
pub fn local_addresses() -> Result<Vec<IpAddr>, NetError> {
    enumerate_adapters().map_err(|err| NetError::fatal(format!("{err:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_addresses_excludes_loopback() {
        // Best-effort: CI sandboxes may have zero configured interfaces,
        // but none of whatever is returned should be loopback.
        if let Ok(addrs) = local_addresses() {
            assert!(addrs.iter().all(|ip| !ip.is_loopback()));
        }
    }
}
