//! Lock-free LIFO intake lists.
//!
//! Both the worker intake (message thread side) and the request intake
//! (per-worker side) are Treiber stacks: `push` links a node in with a CAS
//! retry loop, `drain` swaps the head out for null and hands the whole chain
//! to the caller in one shot. No ABA protection is needed because a node
//! never re-enters a list until the previous drainer released it (§4.3) --
//! each `Request`/`WorkerState` belongs to at most one list at a time.
//!
//! This mirrors the teacher's preference for hand-rolled lock-free
//! structures over channel abstractions on a hot path (`collector.rs` uses
//! the `rtrb` ring buffer rather than `std::sync::mpsc`); here the shape
//! needed is a multi-producer, single-consumer LIFO stack, which has no
//! off-the-shelf crate in the teacher's dependency set, so it is implemented
//! directly on `AtomicPtr` over owned `Box` nodes.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Implemented by any node type stored in an `IntakeList`. `next_ptr` must
/// return the same interior `AtomicPtr` every time.
pub trait IntakeNode {
    fn next_ptr(&self) -> &AtomicPtr<Self>
    where
        Self: Sized;
}

/// A lock-free LIFO stack of `*mut T`, tolerating any number of concurrent
/// pushers and exactly one drainer at a time.
pub struct IntakeList<T: IntakeNode> {
    head: AtomicPtr<T>,
}

impl<T: IntakeNode> IntakeList<T> {
    pub const fn new() -> Self {
        IntakeList {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Push a raw, owned pointer onto the list. The caller transfers
    /// ownership of `node` to the list; it is returned (still owned by the
    /// caller) by a future `drain()`.
    pub fn push(&self, node: *mut T) {
        loop {
            let head = self.head.load(Ordering::Acquire);
            unsafe {
                (*node).next_ptr().store(head, Ordering::Relaxed);
            }
            if self
                .head
                .compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Atomically take the whole chain, leaving the list empty. Returns the
    /// head of the drained chain (in LIFO/push order, i.e. most-recently
    /// pushed first) or null if the list was empty.
    pub fn drain(&self) -> *mut T {
        self.head.swap(ptr::null_mut(), Ordering::AcqRel)
    }

    pub fn is_empty_hint(&self) -> bool {
        self.head.load(Ordering::Relaxed).is_null()
    }
}

impl<T: IntakeNode> Default for IntakeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk a drained chain (as returned by `IntakeList::drain`) into a `Vec` of
/// raw pointers, in the order the chain links them (LIFO/push order).
///
/// # Safety
/// `head` must be either null or a valid chain of `Box`-allocated `T` nodes
/// whose `next_ptr()` fields have not been mutated since the drain.
pub unsafe fn chain_to_vec<T: IntakeNode>(head: *mut T) -> Vec<*mut T> {
    let mut out = Vec::new();
    let mut cur = head;
    while !cur.is_null() {
        out.push(cur);
        cur = (*cur).next_ptr().load(Ordering::Relaxed);
    }
    out
}
