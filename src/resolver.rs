//! Bounded worker pool that drains a queue of [`Address`]es, performing
//! blocking name lookups in parallel with the caller's thread.
//!
//! Worker bookkeeping (spawn-on-demand up to a cap, self-detach when
//! over-provisioned, a `stop`/shutdown flag drained under one lock) is
//! grounded on the `TaskManager` idiom the teacher crate's sibling
//! `network-scanner` uses for its async task bookkeeping, translated here
//! from tokio tasks to OS threads because this pool is specified as
//! thread-based, not an async-task pool.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::address::{ms_to_duration, Address, AddressStatus};
use crate::fault;

/// At least this many workers are kept warm while the pool is alive.
const MIN_WORKERS: usize = 2;
/// Never more than this many resolver threads run concurrently.
const MAX_WORKERS: usize = 10;

struct PoolState {
    queue: VecDeque<Address>,
    slots: Vec<Option<JoinHandle<()>>>,
    live_workers: usize,
    outstanding: usize,
    shutdown: bool,
}

pub(crate) struct ResolverPool {
    state: Mutex<PoolState>,
    cv: Condvar,
}

static POOL: OnceLock<Arc<ResolverPool>> = OnceLock::new();

/// Returns the process-wide resolver pool, creating it (with `MIN_WORKERS`
/// warm workers) on first use. Paired with [`shutdown`] at `quit()`.
pub(crate) fn pool() -> Arc<ResolverPool> {
    Arc::clone(POOL.get_or_init(|| {
        let pool = Arc::new(ResolverPool {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                slots: (0..MAX_WORKERS).map(|_| None).collect(),
                live_workers: 0,
                outstanding: 0,
                shutdown: false,
            }),
            cv: Condvar::new(),
        });
        {
            let mut state = pool.state.lock();
            for slot in 0..MIN_WORKERS {
                spawn_worker(&pool, &mut state, slot);
            }
        }
        pool
    }))
}

/// Tears the pool down: sets the shutdown flag, wakes every worker, and
/// joins whichever slots still hold a live thread. Safe to call even if
/// `pool()` was never touched (lifecycle `quit()` calls this unconditionally
/// when the init refcount reaches zero).
pub(crate) fn shutdown() {
    let Some(pool) = POOL.get() else { return };
    debug!("shutting down resolver pool");
    let handles: Vec<JoinHandle<()>> = {
        let mut state = pool.state.lock();
        state.shutdown = true;
        pool.cv.notify_all();
        state.slots.iter_mut().filter_map(|slot| slot.take()).collect()
    };
    for handle in handles {
        let _ = handle.join();
    }
}

impl ResolverPool {
    /// Admission: the new address is prepended to the queue (current
    /// behaviour, and a documented bug — see design notes: a FIFO queue is
    /// preferred so old requests don't starve, but this crate preserves the
    /// original prepend-and-dequeue-from-the-head ordering as-is).
    pub(crate) fn enqueue(&self, address: Address) {
        let mut state = self.state.lock();
        state.queue.push_front(address);
        state.outstanding += 1;
        if state.outstanding >= state.live_workers && state.live_workers < MAX_WORKERS {
            if let Some(slot) = state.slots.iter().position(Option::is_none) {
                spawn_worker(&self.self_arc(), &mut state, slot);
            }
        }
        drop(state);
        self.cv.notify_all();
    }

    /// Blocks until `address` leaves `InProgress` or `timeout_ms` elapses.
    /// `-1` waits indefinitely, `0` polls once without waiting.
    pub(crate) fn wait_resolved(&self, address: &Address, timeout_ms: i64) -> AddressStatus {
        let status = address.status();
        if status != AddressStatus::InProgress {
            return status;
        }
        if timeout_ms == 0 {
            return address.status();
        }

        let deadline = ms_to_duration(timeout_ms).map(|d| Instant::now() + d);
        let mut state = self.state.lock();
        loop {
            let status = address.status();
            if status != AddressStatus::InProgress {
                return status;
            }
            match deadline {
                None => {
                    self.cv.wait(&mut state);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return address.status();
                    }
                    let timed_out = self.cv.wait_for(&mut state, deadline - now).timed_out();
                    if timed_out && address.status() == AddressStatus::InProgress {
                        return address.status();
                    }
                }
            }
        }
    }

    fn self_arc(&self) -> Arc<ResolverPool> {
        // The pool is only ever constructed behind the `POOL` singleton, so
        // this upgrade always succeeds once `pool()` has run.
        Arc::clone(POOL.get().expect("resolver pool initialised"))
    }
}

fn spawn_worker(pool: &Arc<ResolverPool>, state: &mut PoolState, slot: usize) {
    let pool = Arc::clone(pool);
    let spawned = thread::Builder::new()
        .name(format!("netrt-resolver-{slot}"))
        .spawn(move || worker_loop(pool, slot));
    match spawned {
        Ok(handle) => {
            state.slots[slot] = Some(handle);
            state.live_workers += 1;
            debug!(slot, live_workers = state.live_workers, "spawned resolver worker");
        }
        Err(error) => {
            // Failing to spawn is non-fatal per the spec: existing workers
            // still drain the queue.
            warn!(%error, slot, "failed to spawn resolver worker");
        }
    }
}

fn worker_loop(pool: Arc<ResolverPool>, slot: usize) {
    loop {
        let address = {
            let mut state = pool.state.lock();
            loop {
                if state.shutdown {
                    state.live_workers -= 1;
                    return;
                }
                if let Some(address) = state.queue.pop_front() {
                    break Some(address);
                }
                if state.live_workers > MIN_WORKERS {
                    state.live_workers -= 1;
                    state.slots[slot] = None;
                    return;
                }
                pool.cv.wait(&mut state);
            }
        };

        if let Some(address) = address {
            trace!(hostname = address.hostname(), "resolver worker picked up request");
            perform_lookup(&address);

            let mut state = pool.state.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
            drop(state);
            pool.cv.notify_all();
        }
    }
}

fn perform_lookup(address: &Address) {
    let percent = fault::global_resolver_loss();

    if fault::roll_percent(percent) {
        let delay = fault::random_duration_ms(250, 2000 + 50 * u64::from(percent));
        trace!(?delay, "resolver injecting lag");
        thread::sleep(delay);
    }
    if fault::roll_percent(percent) {
        debug!(hostname = address.hostname(), "resolver injecting simulated failure");
        address.publish_failed("simulated failure".to_owned());
        return;
    }

    match dns_lookup::lookup_host(address.hostname()) {
        Ok(ips) if !ips.is_empty() => {
            let records: Vec<SocketAddr> = ips.into_iter().map(|ip| SocketAddr::new(ip, 0)).collect();
            let numeric = records[0].ip().to_string();
            debug!(hostname = address.hostname(), %numeric, count = records.len(), "resolved hostname");
            address.publish_resolved(numeric, records);
        }
        Ok(_) => {
            warn!(hostname = address.hostname(), "lookup returned no addresses");
            address.publish_failed(format!("no addresses found for {}", address.hostname()));
        }
        Err(err) => {
            warn!(hostname = address.hostname(), %err, "lookup failed");
            address.publish_failed(err.to_string());
        }
    }
}

/// Live-worker count, exposed for tests validating the `[0, MAX]` /
/// `>= MIN` invariants from §8.
#[cfg(test)]
pub(crate) fn live_worker_count() -> usize {
    pool().state.lock().live_workers
}
