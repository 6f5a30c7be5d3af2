//! The pluggable surface: the busy-wait policy every spin site routes
//! through, and the compare-and-swap primitive every list mutation
//! goes through.

use std::sync::atomic::{AtomicPtr, Ordering};
use std::thread;

/// Called on every spin iteration of every wait loop in the crate. May
/// pure-spin, back off, or yield the OS thread. Must not block
/// indefinitely on a resource owned by a peer participant.
///
/// The `spins` counter is owned by the call site and threaded through
/// so a handler can implement backoff without keeping its own state.
pub trait BusyWait: Clone {
    fn wait(&self, spins: &mut u32);
}

/// The default: pure spin, no yielding.
#[derive(Clone, Copy, Debug, Default)]
pub struct Spin;

impl BusyWait for Spin {
    #[inline]
    fn wait(&self, _spins: &mut u32) {
        std::hint::spin_loop();
    }
}

/// Spins `threshold` times, then yields the OS thread once per
/// iteration thereafter.
#[derive(Clone, Copy, Debug)]
pub struct YieldAfter {
    pub threshold: u32,
}

impl Default for YieldAfter {
    fn default() -> Self {
        YieldAfter { threshold: 5 }
    }
}

impl BusyWait for YieldAfter {
    fn wait(&self, spins: &mut u32) {
        *spins += 1;
        if *spins > self.threshold {
            *spins = 0;
            thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
    }
}

/// The compare-and-swap primitive every list mutation is built on.
/// Generic over the pointee so one `Cas` implementation serves all
/// three lists. A caller bridging threads and interrupt handlers can
/// wrap this to mask interrupts around the exchange.
pub trait Cas: Clone {
    fn compare_exchange<T>(&self, slot: &AtomicPtr<T>, current: *mut T, new: *mut T) -> bool;
}

/// The default: a plain hardware `compare_exchange`, acquire/release.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicCas;

impl Cas for AtomicCas {
    #[inline]
    fn compare_exchange<T>(&self, slot: &AtomicPtr<T>, current: *mut T, new: *mut T) -> bool {
        slot.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Bundles the busy-wait and compare-and-swap policies a participant
/// uses. Passed to [`crate::Rendezvous::join`].
#[derive(Clone, Debug, Default)]
pub struct Config<B: BusyWait = Spin, C: Cas = AtomicCas> {
    pub busy_wait: B,
    pub cas: C,
}

impl Config<Spin, AtomicCas> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: BusyWait, C: Cas> Config<B, C> {
    pub fn with(busy_wait: B, cas: C) -> Self {
        Config { busy_wait, cas }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yield_after_resets_after_threshold() {
        let y = YieldAfter { threshold: 2 };
        let mut spins = 0;
        y.wait(&mut spins);
        y.wait(&mut spins);
        assert_eq!(spins, 2);
        y.wait(&mut spins);
        assert_eq!(spins, 0);
    }

    #[test]
    fn atomic_cas_succeeds_on_match() {
        let mut a = 1i32;
        let mut b = 2i32;
        let slot = AtomicPtr::new(&mut a as *mut i32);
        let cas = AtomicCas;
        assert!(cas.compare_exchange(&slot, &mut a as *mut i32, &mut b as *mut i32));
        assert_eq!(slot.load(Ordering::Relaxed), &mut b as *mut i32);
    }

    #[test]
    fn atomic_cas_fails_on_mismatch() {
        let mut a = 1i32;
        let mut b = 2i32;
        let mut c = 3i32;
        let slot = AtomicPtr::new(&mut a as *mut i32);
        let cas = AtomicCas;
        assert!(!cas.compare_exchange(&slot, &mut b as *mut i32, &mut c as *mut i32));
    }
}
