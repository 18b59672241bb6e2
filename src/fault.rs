//! Deterministic, deliberately weak fault injection. Seeded from a
//! high-resolution clock so repeated runs of the same test binary are
//! reproducible from run to run of a *build*, not cryptographically
//! unpredictable — this PRNG must never be used for anything security
//! sensitive.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Linear-congruential generator matching glibc's classic `TYPE_0` constants:
/// multiplier 1103515245, increment 12345, with the output taken from bits
/// 30..16 of the updated state (mod 32768).
struct Lcg {
    state: u32,
}

impl Lcg {
    fn new(seed: u32) -> Self {
        Lcg { state: seed }
    }

    fn next_u15(&mut self) -> u16 {
        self.state = self.state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        ((self.state >> 16) & 0x7fff) as u16
    }
}

fn seed_from_clock() -> u32 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (now.as_nanos() as u32) ^ (now.as_secs() as u32)
}

static RNG: Mutex<Option<Lcg>> = Mutex::new(None);

fn with_rng<R>(f: impl FnOnce(&mut Lcg) -> R) -> R {
    let mut guard = RNG.lock();
    let lcg = guard.get_or_insert_with(|| Lcg::new(seed_from_clock()));
    f(lcg)
}

/// Rolls the dice with probability `percent / 100`. `percent` is clamped to
/// `[0, 100]` by every setter in this crate, so no clamping happens here.
pub(crate) fn roll_percent(percent: u8) -> bool {
    if percent == 0 {
        return false;
    }
    let draw = with_rng(|lcg| lcg.next_u15());
    (u32::from(draw) * 100 / 32768) < u32::from(percent)
}

/// A random duration in `[min_ms, max_ms)`, used for both the resolver's
/// lag injection and the per-socket simulated-failure window.
pub(crate) fn random_duration_ms(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    let span = max_ms - min_ms;
    let draw = with_rng(|lcg| u64::from(lcg.next_u15()));
    Duration::from_millis(min_ms + draw % span)
}

pub(crate) fn clamp_percent(percent: u8) -> u8 {
    percent.min(100)
}

/// Process-wide resolver loss knob, set via [`crate::set_global_resolver_loss`].
static GLOBAL_RESOLVER_LOSS: AtomicU32 = AtomicU32::new(0);

pub(crate) fn set_global_resolver_loss(percent: u8) {
    GLOBAL_RESOLVER_LOSS.store(u32::from(clamp_percent(percent)), Ordering::Relaxed);
}

pub(crate) fn global_resolver_loss() -> u8 {
    GLOBAL_RESOLVER_LOSS.load(Ordering::Relaxed) as u8
}

/// Picks a future instant for a stream's simulated-failure window, per
/// §4.4: `now + random(250..2000+50p)` ms, expressed against a monotonic
/// clock so it survives wall-clock adjustment (design note in §9).
pub(crate) fn simulated_failure_deadline(percent: u8) -> Instant {
    Instant::now() + random_duration_ms(250, 2000 + 50 * u64::from(percent))
}
