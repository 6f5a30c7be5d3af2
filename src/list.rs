//! The intrusive, lock-free singly-linked list every list in a
//! [`crate::Rendezvous`] is built from.
//!
//! A [`Place`] is never owned by a list: lists only ever hold raw,
//! non-owning pointers to `PlaceInner` records whose storage is owned
//! by the joining thread and released only once the leave handshake
//! has run. Because a `Place` can be linked into *waiting*/*active*
//! and *removing* at once, it carries two independent link slots;
//! which one a given list uses is selected at compile time by the
//! `Role` marker type.
//!
//! [`Place`]: crate::Place

use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, Ordering};

use cache_padded::CachePadded;

use crate::config::{BusyWait, Cas};
use crate::place::PlaceInner;

/// Selects which of `PlaceInner`'s two link slots a `LockFreeList`
/// threads through.
pub(crate) trait Role<T> {
    fn link(node: &PlaceInner<T>) -> &AtomicPtr<PlaceInner<T>>;
}

/// The waiting/active membership link.
pub(crate) struct WaitActive;

impl<T> Role<T> for WaitActive {
    #[inline]
    fn link(node: &PlaceInner<T>) -> &AtomicPtr<PlaceInner<T>> {
        &node.link_wa
    }
}

/// The departure link.
pub(crate) struct Removing;

impl<T> Role<T> for Removing {
    #[inline]
    fn link(node: &PlaceInner<T>) -> &AtomicPtr<PlaceInner<T>> {
        &node.link_rm
    }
}

pub(crate) struct LockFreeList<T, R> {
    head: CachePadded<AtomicPtr<PlaceInner<T>>>,
    tail: CachePadded<AtomicPtr<PlaceInner<T>>>,
    _role: PhantomData<fn() -> R>,
}

impl<T, R: Role<T>> LockFreeList<T, R> {
    pub(crate) fn new() -> Self {
        LockFreeList {
            head: CachePadded::new(AtomicPtr::new(std::ptr::null_mut())),
            tail: CachePadded::new(AtomicPtr::new(std::ptr::null_mut())),
            _role: PhantomData,
        }
    }

    pub(crate) fn head(&self) -> *mut PlaceInner<T> {
        self.head.load(Ordering::Acquire)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head().is_null()
    }

    /// Walks from `start` to the end of the chain via `R::link`.
    fn tail_from(start: *mut PlaceInner<T>) -> *mut PlaceInner<T> {
        if start.is_null() {
            return std::ptr::null_mut();
        }
        let mut t = start;
        loop {
            // SAFETY: every node reachable from `start` is linked into
            // this list and thus kept alive by the leave handshake
            // until it is detached from every list it belongs to.
            let next = R::link(unsafe { &*t }).load(Ordering::Acquire);
            if next.is_null() {
                return t;
            }
            t = next;
        }
    }

    /// Multi-producer, lock-free append.
    pub(crate) fn add_atomic<B: BusyWait, C: Cas>(
        &self,
        node: *mut PlaceInner<T>,
        busy_wait: &B,
        cas: &C,
    ) {
        // SAFETY: `node` is a live `PlaceInner` owned by the caller for
        // at least the duration of this call.
        R::link(unsafe { &*node }).store(std::ptr::null_mut(), Ordering::Relaxed);
        let mut spins = 0u32;
        loop {
            if cas.compare_exchange(&self.tail, std::ptr::null_mut(), node) {
                // The list was empty: we must also publish `head`.
                let mut head_spins = 0u32;
                while !cas.compare_exchange(&self.head, std::ptr::null_mut(), node) {
                    busy_wait.wait(&mut head_spins);
                }
                return;
            }
            let t = self.tail.load(Ordering::Acquire);
            if !t.is_null() {
                // SAFETY: `t` was just read from `tail`; nodes are
                // never freed while still reachable through a list.
                let t_link = R::link(unsafe { &*t });
                if cas.compare_exchange(t_link, std::ptr::null_mut(), node) {
                    // Best-effort: another appender may already have
                    // swung `tail` further forward.
                    let _ = cas.compare_exchange(&self.tail, t, node);
                    return;
                }
            }
            busy_wait.wait(&mut spins);
        }
    }

    /// Single-consumer detach of the whole list into a freshly returned
    /// one, leaving `self` empty. Callers must serialize invocations
    /// against each other on the same list (only the master calls
    /// this).
    pub(crate) fn acquire_atomic<B: BusyWait, C: Cas>(&self, busy_wait: &B, cas: &C) -> Self {
        let mut spins = 0u32;
        let mut t = self.tail.load(Ordering::Acquire);
        loop {
            if t.is_null() {
                return Self::new();
            }
            if cas.compare_exchange(&self.tail, t, std::ptr::null_mut()) {
                break;
            }
            busy_wait.wait(&mut spins);
            t = self.tail.load(Ordering::Acquire);
        }
        // No concurrent `AddAtomic` can still be racing `head` here:
        // `tail` was non-null, so `head` was already published by a
        // prior append and will not go through the empty-list
        // bootstrap CAS again until this list is empty.
        let h = self.head.swap(std::ptr::null_mut(), Ordering::AcqRel);
        let new_tail = Self::tail_from(h);
        LockFreeList {
            head: CachePadded::new(AtomicPtr::new(h)),
            tail: CachePadded::new(AtomicPtr::new(new_tail)),
            _role: PhantomData,
        }
    }

    /// Atomically empties `src` into `self`. `self` must currently be
    /// empty (only invoked at master promotion).
    pub(crate) fn set_atomic<B: BusyWait, C: Cas>(&self, src: &Self, busy_wait: &B, cas: &C) {
        debug_assert!(self.is_empty());
        let acquired = src.acquire_atomic(busy_wait, cas);
        self.head.store(acquired.head.load(Ordering::Relaxed), Ordering::Release);
        self.tail.store(acquired.tail.load(Ordering::Relaxed), Ordering::Release);
    }

    /// Non-atomic concatenation. Caller must own both lists exclusively.
    pub(crate) fn append(&self, other: &Self) {
        let other_head = other.head.load(Ordering::Relaxed);
        if other_head.is_null() {
            return;
        }
        let t = self.tail.load(Ordering::Relaxed);
        if t.is_null() {
            self.head.store(other_head, Ordering::Relaxed);
        } else {
            // SAFETY: caller owns `self` exclusively at this call site.
            R::link(unsafe { &*t }).store(other_head, Ordering::Relaxed);
        }
        self.tail
            .store(other.tail.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Non-atomic filter: removes from `self` every node also present
    /// in `other`. Caller must own both lists exclusively.
    pub(crate) fn remove<R2: Role<T>>(&self, other: &LockFreeList<T, R2>) {
        let mut prev: *mut PlaceInner<T> = std::ptr::null_mut();
        let mut new_tail: *mut PlaceInner<T> = std::ptr::null_mut();
        let mut cur = self.head.load(Ordering::Relaxed);
        while !cur.is_null() {
            // SAFETY: `cur` is reachable from `self`'s head and is kept
            // alive by the leave handshake while linked in.
            let node = unsafe { &*cur };
            let next = R::link(node).load(Ordering::Relaxed);
            if other.present(cur) {
                if prev.is_null() {
                    self.head.store(next, Ordering::Relaxed);
                } else {
                    // SAFETY: `prev` is a live node from this same walk.
                    R::link(unsafe { &*prev }).store(next, Ordering::Relaxed);
                }
            } else {
                prev = cur;
                new_tail = cur;
            }
            cur = next;
        }
        self.tail.store(new_tail, Ordering::Relaxed);
    }

    /// Non-atomic traversal; may run concurrently with `add_atomic` on
    /// the same list, since a node's link is set before it is
    /// published through `tail`. Returns `true` (and stops) as soon as
    /// `f` returns `true`.
    pub(crate) fn search(&self, mut f: impl FnMut(&PlaceInner<T>) -> bool) -> bool {
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            // SAFETY: `cur` is reachable from `head` and thus alive.
            let node = unsafe { &*cur };
            if f(node) {
                return true;
            }
            cur = R::link(node).load(Ordering::Acquire);
        }
        false
    }

    pub(crate) fn iterate(&self, mut f: impl FnMut(&PlaceInner<T>)) {
        self.search(|n| {
            f(n);
            false
        });
    }

    pub(crate) fn present(&self, p: *mut PlaceInner<T>) -> bool {
        self.search(|n| std::ptr::eq(n, p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AtomicCas, Spin};

    fn new_inner() -> PlaceInner<u32> {
        PlaceInner::new()
    }

    #[test]
    fn add_then_present() {
        let list: LockFreeList<u32, WaitActive> = LockFreeList::new();
        let a = new_inner();
        list.add_atomic(&a as *const _ as *mut _, &Spin, &AtomicCas);
        assert!(!list.is_empty());
        assert!(list.present(&a as *const _ as *mut _));
    }

    #[test]
    fn acquire_atomic_empties_source() {
        let list: LockFreeList<u32, WaitActive> = LockFreeList::new();
        let a = new_inner();
        let b = new_inner();
        list.add_atomic(&a as *const _ as *mut _, &Spin, &AtomicCas);
        list.add_atomic(&b as *const _ as *mut _, &Spin, &AtomicCas);
        let acquired = list.acquire_atomic(&Spin, &AtomicCas);
        assert!(list.is_empty());
        assert!(acquired.present(&a as *const _ as *mut _));
        assert!(acquired.present(&b as *const _ as *mut _));
    }

    #[test]
    fn remove_filters_matching_nodes() {
        let active: LockFreeList<u32, WaitActive> = LockFreeList::new();
        let removing: LockFreeList<u32, Removing> = LockFreeList::new();
        let a = new_inner();
        let b = new_inner();
        active.add_atomic(&a as *const _ as *mut _, &Spin, &AtomicCas);
        active.add_atomic(&b as *const _ as *mut _, &Spin, &AtomicCas);
        removing.add_atomic(&a as *const _ as *mut _, &Spin, &AtomicCas);
        active.remove(&removing);
        assert!(!active.present(&a as *const _ as *mut _));
        assert!(active.present(&b as *const _ as *mut _));
    }

    #[test]
    fn append_concatenates() {
        let l1: LockFreeList<u32, WaitActive> = LockFreeList::new();
        let l2: LockFreeList<u32, WaitActive> = LockFreeList::new();
        let a = new_inner();
        let b = new_inner();
        l1.add_atomic(&a as *const _ as *mut _, &Spin, &AtomicCas);
        l2.add_atomic(&b as *const _ as *mut _, &Spin, &AtomicCas);
        l1.append(&l2);
        assert!(l1.present(&a as *const _ as *mut _));
        assert!(l1.present(&b as *const _ as *mut _));
    }

    #[test]
    fn empty_list_has_no_head() {
        let list: LockFreeList<u32, WaitActive> = LockFreeList::new();
        assert!(list.is_empty());
        assert!(list.head().is_null());
    }
}
