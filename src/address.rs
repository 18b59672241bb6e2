//! Opaque, reference-counted handle for a (possibly still-resolving) host.
//!
//! The distilled spec models this as a manually ref-counted C object shared
//! between the caller and a resolver worker thread. Here the sharing is a
//! plain `Arc`: the worker holds a clone until it publishes an outcome, the
//! caller holds its own clone, and the object is freed when the last one
//! drops — the same lifecycle, expressed with ownership the compiler
//! checks instead of a hand-rolled refcount.

use std::cmp::Ordering as CmpOrdering;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::error::{set_last_error_str, NetError};
use crate::resolver;

/// Resolution status of an [`Address`]. Once it leaves `InProgress` it is
/// final — enforced by `OnceLock`, which only ever accepts one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressStatus {
    InProgress,
    Resolved,
    Failed,
}

#[derive(Debug)]
enum Outcome {
    Resolved { numeric: String, records: Vec<SocketAddr> },
    Failed { error: String },
}

struct Inner {
    hostname: String,
    outcome: OnceLock<Outcome>,
}

/// Handle for a host, possibly still resolving. Cheaply cloneable; clones
/// share the same underlying resolution outcome.
#[derive(Clone)]
pub struct Address(Arc<Inner>);

impl Address {
    /// Resolves `hostname` asynchronously: returns immediately with an
    /// address in the `InProgress` state, already enqueued on the shared
    /// resolver pool.
    pub fn resolve(hostname: &str) -> Address {
        let address = Address(Arc::new(Inner {
            hostname: hostname.to_owned(),
            outcome: OnceLock::new(),
        }));
        resolver::pool().enqueue(address.clone());
        address
    }

    /// Builds an already-resolved `Address` from a native address record,
    /// as used by server accept() and datagram receive() when they learn a
    /// peer's address from a `sockaddr` rather than a hostname. The
    /// "hostname" field for such an address is its own numeric form, and
    /// resolution happens via a numeric reverse-lookup so no DNS traffic is
    /// generated.
    pub(crate) fn from_native(record: SocketAddr) -> Address {
        let numeric = record.ip().to_string();
        let address = Address(Arc::new(Inner {
            hostname: numeric.clone(),
            outcome: OnceLock::new(),
        }));
        let _ = address.0.outcome.set(Outcome::Resolved {
            numeric,
            records: vec![record],
        });
        address
    }

    pub(crate) fn hostname(&self) -> &str {
        &self.0.hostname
    }

    /// Invoked by a resolver worker once, after it has looked up (or failed
    /// to look up) the hostname. Fields are written into the `Outcome`
    /// before the `OnceLock` is set, so any reader observing `Some(_)`
    /// via `status()`/`string()` sees a fully-populated record — the same
    /// "write before publish" discipline the spec calls out explicitly.
    pub(crate) fn publish_resolved(&self, numeric: String, records: Vec<SocketAddr>) {
        let _ = self.0.outcome.set(Outcome::Resolved { numeric, records });
    }

    pub(crate) fn publish_failed(&self, error: String) {
        let _ = self.0.outcome.set(Outcome::Failed { error });
    }

    /// Never blocks. On `Failed`, installs the stored error text as the
    /// thread-local last error, per the spec's republish-on-query rule.
    pub fn status(&self) -> AddressStatus {
        match self.0.outcome.get() {
            None => AddressStatus::InProgress,
            Some(Outcome::Resolved { .. }) => AddressStatus::Resolved,
            Some(Outcome::Failed { error }) => {
                set_last_error_str(error.clone());
                AddressStatus::Failed
            }
        }
    }

    /// Blocks (bounded by `timeout_ms`; `-1` is infinite, `0` polls once)
    /// until the address leaves `InProgress`, or the timeout elapses.
    /// Returns the final status observed.
    pub fn wait_resolved(&self, timeout_ms: i64) -> AddressStatus {
        resolver::pool().wait_resolved(self, timeout_ms)
    }

    /// Human-readable numeric form (e.g. `"127.0.0.1"`), or `None` when not
    /// yet resolved (includes the failed case).
    pub fn string(&self) -> Option<String> {
        match self.0.outcome.get() {
            Some(Outcome::Resolved { numeric, .. }) => Some(numeric.clone()),
            _ => None,
        }
    }

    /// All native address records for a resolved address (empty otherwise).
    pub fn records(&self) -> Vec<SocketAddr> {
        match self.0.outcome.get() {
            Some(Outcome::Resolved { records, .. }) => records.clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn first_record(&self) -> Option<SocketAddr> {
        self.records().into_iter().next()
    }

    /// Total order suitable for sorting: no-record addresses sort before
    /// addresses with a record; among addresses with a record, by family,
    /// then raw length, then lexicographic bytes.
    pub fn compare(a: &Address, b: &Address) -> CmpOrdering {
        if Arc::ptr_eq(&a.0, &b.0) {
            return CmpOrdering::Equal;
        }
        match (a.first_record(), b.first_record()) {
            (None, None) => CmpOrdering::Equal,
            (None, Some(_)) => CmpOrdering::Less,
            (Some(_), None) => CmpOrdering::Greater,
            (Some(ra), Some(rb)) => compare_records(ra, rb),
        }
    }

    /// Returns `NetError::NotResolved` unless this address is resolved.
    pub(crate) fn require_resolved(&self) -> Result<(), NetError> {
        match self.status() {
            AddressStatus::Resolved => Ok(()),
            AddressStatus::Failed => Err(NetError::fatal("address resolution failed")),
            AddressStatus::InProgress => Err(NetError::NotResolved),
        }
    }
}

fn compare_records(a: SocketAddr, b: SocketAddr) -> CmpOrdering {
    let fa = family_rank(&a);
    let fb = family_rank(&b);
    if fa != fb {
        return fa.cmp(&fb);
    }
    let ba = raw_bytes(&a);
    let bb = raw_bytes(&b);
    ba.len().cmp(&bb.len()).then_with(|| ba.cmp(&bb))
}

fn family_rank(addr: &SocketAddr) -> u8 {
    match addr {
        SocketAddr::V4(_) => 0,
        SocketAddr::V6(_) => 1,
    }
}

fn raw_bytes(addr: &SocketAddr) -> Vec<u8> {
    match addr {
        SocketAddr::V4(v4) => v4.ip().octets().to_vec(),
        SocketAddr::V6(v6) => v6.ip().octets().to_vec(),
    }
}

/// Thin re-export so callers don't need to spell out `Duration` themselves
/// when converting the spec's millisecond timeouts.
pub(crate) fn ms_to_duration(timeout_ms: i64) -> Option<Duration> {
    if timeout_ms < 0 {
        None
    } else {
        Some(Duration::from_millis(timeout_ms as u64))
    }
}
