//! The shared meeting point every participant joins and attends
//! through.

use crate::config::{BusyWait, Cas, Config};
use crate::list::{LockFreeList, Removing, WaitActive};
use crate::place::Place;

/// A dynamic barrier-rendezvous: an arbitrarily varying set of threads
/// can [`join`](Rendezvous::join), repeatedly
/// [`attend`](Place::attend) meetings at which they exchange and
/// reduce data, and leave by dropping their [`Place`] — all without
/// ever quiescing the whole group.
///
/// `Rendezvous` is meant to be held by reference: every [`Place`]
/// borrows it for as long as it participates, and construction and
/// destruction are cheap because no refcounting is involved — the
/// borrow checker enforces that the `Rendezvous` outlives its `Place`s
/// instead of a runtime check.
///
/// # Examples
///
/// ```
/// use rendezvous::{Config, Rendezvous};
///
/// let rdv: Rendezvous<i32> = Rendezvous::new();
/// std::thread::scope(|scope| {
///     for n in [1, 2, 3] {
///         let rdv = &rdv;
///         scope.spawn(move || {
///             let place = rdv.join(Config::new());
///             let sum = place.attend(&n, |_passed| 0i32, |acc, d| *acc += *d, |acc| acc);
///             assert_eq!(sum, 6);
///         });
///     }
/// });
/// ```
pub struct Rendezvous<T> {
    pub(crate) waiting: LockFreeList<T, WaitActive>,
    pub(crate) active: LockFreeList<T, WaitActive>,
    pub(crate) removing: LockFreeList<T, Removing>,
}

impl<T> Rendezvous<T> {
    pub fn new() -> Self {
        Rendezvous {
            waiting: LockFreeList::new(),
            active: LockFreeList::new(),
            removing: LockFreeList::new(),
        }
    }

    /// Joins this rendezvous, publishing a new [`Place`] onto *waiting*.
    /// Admission into *active* is deferred until the first
    /// [`Place::attend`] or until the `Place` is dropped.
    pub fn join<B: BusyWait, C: Cas>(&self, config: Config<B, C>) -> Place<'_, T, B, C> {
        Place::join(self, config)
    }
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Rendezvous<T> {
    fn drop(&mut self) {
        // Callers must drop every `Place` before dropping the
        // `Rendezvous` itself; no per-place busy-wait policy is
        // available here (it lives on `Place`), so this just spins.
        while !(self.waiting.is_empty() && self.active.is_empty() && self.removing.is_empty()) {
            std::hint::spin_loop();
        }
    }
}

// SAFETY: `Rendezvous` only exposes its lists through atomics and the
// lock-free list protocol; no field is ever accessed without going
// through `LockFreeList`'s documented synchronization.
unsafe impl<T: Send> Send for Rendezvous<T> {}
unsafe impl<T: Send> Sync for Rendezvous<T> {}
