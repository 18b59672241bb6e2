//! Reference-counted process-wide init/quit, per §6's lifecycle group.
//!
//! The resolver pool already lazily self-initialises on first `resolve()`
//! call (see [`crate::resolver::pool`]); `init()`/`quit()` exist for parity
//! with the distilled spec's explicit lifecycle pair and to give callers a
//! deterministic point to tear the pool down, nested safely.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::resolver;

static INIT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Increments the init refcount. Repeated calls are cheap and do not
/// duplicate state; only the outermost `quit()` (refcount reaching zero)
/// actually tears anything down.
pub fn init() {
    INIT_COUNT.fetch_add(1, Ordering::SeqCst);
}

/// Decrements the init refcount; tears down the resolver pool once it
/// reaches zero. Calling `quit()` more times than `init()` is a no-op past
/// zero rather than underflowing.
pub fn quit() {
    let prev = INIT_COUNT.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
        Some(count.saturating_sub(1))
    });
    if let Ok(1) = prev {
        resolver::shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_init_quit_is_safe() {
        init();
        init();
        quit();
        quit();
        quit(); // extra quit() must not panic or underflow
    }
}
