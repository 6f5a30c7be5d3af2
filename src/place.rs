//! Per-participant membership handle: joining, attending meetings,
//! master election, and the leave handshake run in `Drop`.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, Ordering};

use crate::config::{AtomicCas, BusyWait, Cas, Config, Spin};
use crate::mod_counter::ModCounter;
use crate::rendezvous::Rendezvous;

/// The tri-state departure flag a leaving place and the current master
/// use to hand off cleanup of the `removing` list.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub(crate) enum RemoveAction {
    Go = 0,
    Wait = 1,
    Sync = 2,
}

impl RemoveAction {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RemoveAction::Go,
            1 => RemoveAction::Wait,
            2 => RemoveAction::Sync,
            other => unreachable!("corrupted remove flag: {other}"),
        }
    }
}

/// The heap-allocated record a list actually links. Lives behind a
/// stable address for as long as its owning [`Place`] is alive: the
/// address is published to other threads via the three lists the
/// instant it is created, so it must never move.
pub(crate) struct PlaceInner<T> {
    wait: AtomicBool,
    remove: AtomicU8,
    counter: ModCounter,
    data: UnsafeCell<*const T>,
    pub(crate) link_wa: AtomicPtr<PlaceInner<T>>,
    pub(crate) link_rm: AtomicPtr<PlaceInner<T>>,
}

// SAFETY: every field is either an atomic or an `UnsafeCell` whose sole
// writer is the owning thread; readers on other threads only dereference
// `data` between this place's own phase-B and phase-C barrier waits,
// by which point the write has already happened-before through the
// counter's release/acquire pair.
unsafe impl<T> Sync for PlaceInner<T> {}

impl<T> PlaceInner<T> {
    pub(crate) fn new() -> Self {
        PlaceInner {
            wait: AtomicBool::new(true),
            remove: AtomicU8::new(RemoveAction::Go as u8),
            counter: ModCounter::new(),
            data: UnsafeCell::new(std::ptr::null()),
            link_wa: AtomicPtr::new(std::ptr::null_mut()),
            link_rm: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    fn remove_flag(&self, order: Ordering) -> RemoveAction {
        RemoveAction::from_u8(self.remove.load(order))
    }

    fn set_remove_flag(&self, action: RemoveAction, order: Ordering) {
        self.remove.store(action as u8, order);
    }

    /// # Safety
    /// The caller must guarantee the pointer stored by the most recent
    /// `publish_data` is still live for the duration of the borrow.
    unsafe fn data_ref(&self) -> &T {
        // SAFETY: forwarded to caller.
        unsafe { &*(*self.data.get()) }
    }

    fn publish_data(&self, data: *const T) {
        // SAFETY: only the owning thread ever writes `data`, and only
        // while it is not concurrently being read (readers only run
        // between this place's phase B and phase C, after it has
        // already published in the current call).
        unsafe { *self.data.get() = data };
    }
}

/// Membership handle for a single participating activity. Created by
/// [`Rendezvous::join`]; the leave handshake runs in [`Drop`].
///
/// `Place` borrows its `Rendezvous` for `'r`: the rendezvous must
/// outlive every `Place` joined to it, which the borrow checker
/// enforces directly at compile time.
pub struct Place<'r, T, B: BusyWait = Spin, C: Cas = AtomicCas> {
    rendezvous: &'r Rendezvous<T>,
    ptr: NonNull<PlaceInner<T>>,
    busy_wait: B,
    cas: C,
    _not_send_across_without_sync: PhantomData<*const ()>,
}

// SAFETY: a `Place` only ever touches its `PlaceInner` through atomics
// and the single-writer `UnsafeCell` discipline documented on
// `PlaceInner`; moving the handle to another thread is sound as long
// as the handle itself is not used from two threads at once, which the
// normal `&mut self` / non-`Clone` API already prevents.
unsafe impl<'r, T, B: BusyWait + Send, C: Cas + Send> Send for Place<'r, T, B, C> {}

impl<'r, T, B: BusyWait, C: Cas> Place<'r, T, B, C> {
    pub(crate) fn join(rendezvous: &'r Rendezvous<T>, config: Config<B, C>) -> Self {
        let boxed = Box::new(PlaceInner::new());
        let ptr = NonNull::from(Box::leak(boxed));
        rendezvous
            .waiting
            .add_atomic(ptr.as_ptr(), &config.busy_wait, &config.cas);
        Place {
            rendezvous,
            ptr,
            busy_wait: config.busy_wait,
            cas: config.cas,
            _not_send_across_without_sync: PhantomData,
        }
    }

    fn inner(&self) -> &PlaceInner<T> {
        // SAFETY: `self.ptr` is allocated in `join` and freed only by
        // this handle's `Drop`, after the full leave handshake.
        unsafe { self.ptr.as_ref() }
    }

    fn is_master(&self) -> bool {
        self.rendezvous.active.head() == self.ptr.as_ptr()
    }

    /// Promotes the head of `waiting` to master when `active` is empty:
    /// swaps the two lists and releases every newly active peer.
    fn try_become_master(&self) -> bool {
        if self.rendezvous.waiting.head() == self.ptr.as_ptr() && self.rendezvous.active.is_empty() {
            self.rendezvous
                .active
                .set_atomic(&self.rendezvous.waiting, &self.busy_wait, &self.cas);
            self.rendezvous
                .active
                .iterate(|p| p.wait.store(false, Ordering::Release));
            true
        } else {
            false
        }
    }

    /// Drains `waiting` into `active`, adopting the master's current
    /// phase so newcomers don't trip the barrier's wrap-around check.
    fn process_waiting(&self) {
        if !self.rendezvous.waiting.is_empty() {
            let c = self.inner().counter.load(Ordering::Acquire);
            let w = self
                .rendezvous
                .waiting
                .acquire_atomic(&self.busy_wait, &self.cas);
            w.iterate(|p| p.counter.set(c, Ordering::Relaxed));
            self.rendezvous.active.append(&w);
            w.iterate(|p| p.wait.store(false, Ordering::Release));
        }
    }

    /// Spins until admitted to *active*, attempting master election on
    /// every iteration. Shared by `attend` and `drop`.
    fn wait_for_admission(&self) -> bool {
        let mut spins = 0u32;
        while self.inner().wait.load(Ordering::Acquire) {
            if self.try_become_master() {
                break;
            }
            self.busy_wait.wait(&mut spins);
        }
        self.is_master()
    }

    /// The Lamport barrier step: increment this place's counter, then
    /// spin until no peer in *active* is still strictly behind it.
    /// Returns the number of peers observed once every peer has caught
    /// up.
    fn sync(&self) -> u32 {
        self.inner().counter.increment();
        let mut spins = 0u32;
        loop {
            let my_counter = self.inner().counter.load(Ordering::Acquire);
            let mut passed = 0u32;
            let found_behind = self.rendezvous.active.search(|p| {
                passed += 1;
                ModCounter::strictly_one_ahead(my_counter, p_counter(p))
            });
            if !found_behind {
                return passed;
            }
            self.busy_wait.wait(&mut spins);
        }
    }

    /// Runs one full meeting: publishes `data`, waits for every other
    /// current participant to do the same, then folds every
    /// participant's datum (including this one's) into a result every
    /// participant receives.
    pub fn attend<Acc, Res>(
        &self,
        data: &T,
        init: impl FnOnce(u32) -> Acc,
        mut fold: impl FnMut(&mut Acc, &T),
        compute: impl FnOnce(Acc) -> Res,
    ) -> Res {
        // Step 1: publish data.
        self.inner().publish_data(data as *const T);

        // Step 2: wait for admission, attempting master election.
        let master = self.wait_for_admission();

        // Step 3: master drains *waiting* into *active*.
        if master {
            self.process_waiting();
        }

        // Step 4: phase A.
        self.sync();

        // Step 5: master-only cleanup of *removing*.
        let to_remove = if master && !self.rendezvous.removing.is_empty() {
            let r = self
                .rendezvous
                .removing
                .acquire_atomic(&self.busy_wait, &self.cas);
            self.rendezvous.active.remove(&r);
            Some(r)
        } else {
            None
        };

        // Step 6: phase B.
        let passed = self.sync();

        // Step 7: release leavers harvested in step 5.
        if let Some(r) = &to_remove {
            r.iterate(|p| p.set_remove_flag(RemoveAction::Go, Ordering::Release));
        }

        // Step 8/9: reduction.
        let mut acc = init(passed);
        self.rendezvous.active.iterate(|p| {
            // SAFETY: every peer observed here is between its own phase
            // B and phase C (they cannot have progressed past phase C
            // without this place having observed their phase-C counter
            // during `sync`), so its `data` pointer is stable and was
            // published before the counter increment `sync` waited on.
            let peer_data = unsafe { p.data_ref() };
            fold(&mut acc, peer_data);
        });
        let result = compute(acc);

        // Step 10: phase C.
        self.sync();

        result
    }
}

/// Reads a peer's counter through the shared reference handed to
/// `search`'s predicate; split out so `sync`'s closure reads cleanly.
fn p_counter<T>(p: &PlaceInner<T>) -> u32 {
    p.counter.load(Ordering::Acquire)
}

impl<'r, T, B: BusyWait, C: Cas> Drop for Place<'r, T, B, C> {
    fn drop(&mut self) {
        // Step 1: reach *active* if not already there.
        let master = self.wait_for_admission();

        // Step 2: stranded newcomers must not be left behind.
        if master {
            self.process_waiting();
        }

        // Step 3: publish departure.
        self.inner()
            .set_remove_flag(RemoveAction::Wait, Ordering::Release);
        self.rendezvous
            .removing
            .add_atomic(self.ptr.as_ptr(), &self.busy_wait, &self.cas);

        // Step 4: the phase at which the current master harvests *removing*.
        self.sync();

        if master {
            // Step 5: master leaver path.
            let r = self
                .rendezvous
                .removing
                .acquire_atomic(&self.busy_wait, &self.cas);
            self.rendezvous.active.remove(&r);
            r.iterate(|p| p.set_remove_flag(RemoveAction::Sync, Ordering::Release));
            // Re-arm this place's own flag: it is itself a member of
            // `r` and needs no external SYNC round, unlike its peers.
            self.inner()
                .set_remove_flag(RemoveAction::Wait, Ordering::Release);
            let mut spins = 0u32;
            while r.search(|p| p.remove_flag(Ordering::Acquire) != RemoveAction::Wait) {
                self.busy_wait.wait(&mut spins);
            }
            r.iterate(|p| p.set_remove_flag(RemoveAction::Go, Ordering::Release));
        } else {
            // Step 6: non-master leaver path.
            let mut spins = 0u32;
            while self.inner().remove_flag(Ordering::Acquire) == RemoveAction::Wait {
                self.busy_wait.wait(&mut spins);
            }
            if self.inner().remove_flag(Ordering::Acquire) == RemoveAction::Sync {
                self.inner()
                    .set_remove_flag(RemoveAction::Wait, Ordering::Release);
                let mut spins2 = 0u32;
                while self.inner().remove_flag(Ordering::Acquire) != RemoveAction::Go {
                    self.busy_wait.wait(&mut spins2);
                }
            }
        }

        // SAFETY: the handshake above guarantees no other participant
        // still holds a reachable pointer to this node: the master
        // removed it from *active* and *removing* before releasing it
        // to `Go`, and it was never re-added to *waiting*.
        unsafe {
            drop(Box::from_raw(self.ptr.as_ptr()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendezvous::Rendezvous;

    #[test]
    fn join_publishes_to_waiting() {
        let r: Rendezvous<i32> = Rendezvous::new();
        let p = r.join(Config::new());
        assert!(r.waiting.present(p.ptr.as_ptr()));
    }

    #[test]
    fn solo_attend_sees_only_self() {
        let r: Rendezvous<i32> = Rendezvous::new();
        let p = r.join(Config::new());
        let datum = 7;
        let result = p.attend(&datum, |passed| (passed, 0i32), |acc, d| acc.1 += *d, |acc| acc);
        assert_eq!(result, (1, 7));
    }
}
