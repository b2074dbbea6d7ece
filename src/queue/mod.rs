//! A multi-source queue.
//!
//! Many producers, one per thread, contribute elements; a single reader
//! walks a stable, globally-visible sequence that is the union of
//! everyone's contributions. The design target is a runtime's tracking
//! structures (registries of live objects, handles, roots): every worker
//! thread appends constantly and deletes occasionally, while the scanning
//! side needs an uninterrupted, allocation-free traversal.
//!
//! Three moving parts:
//!
//! * [`Producer`]: a thread-owned handle staging inserts in a private,
//!   unsynchronized pending list. [`Producer::publish`] splices the whole
//!   pending list onto the shared global list in one locked step.
//! * [`MultiSourceQueue`]: the shared global list, guarded by a
//!   [`RawLock`], plus [`apply_deletions`](MultiSourceQueue::apply_deletions),
//!   the pass that unlinks tombstoned nodes and returns their storage to
//!   the node allocator.
//! * [`LockedIter`]: a scoped token from
//!   [`lock_for_iter`](MultiSourceQueue::lock_for_iter) that pins the
//!   global list by holding the lock and yields the live elements in
//!   global order.
//!
//! Erasure is multi-source too: [`Producer::erase`] accepts a [`NodeRef`]
//! minted by any producer of the same queue. A node still pending on the
//! erasing producer dies immediately; everything else gets an atomic
//! tombstone and waits for `apply_deletions`.
mod iter;
mod node;
mod producer;

pub use iter::{Iter, LockedIter};
pub use node::NodeRef;
pub use producer::Producer;

use crate::alloc::{Global, RawAlloc, TypedAlloc};
use crate::hints::{assert_hint, unlikely};
use crate::lock::{RawLock, SpinLock};
use node::Node;
use std::cell::UnsafeCell;
use std::ptr::{null_mut, NonNull};

/// A concurrent collection fed by per-thread [`Producer`]s and scanned
/// through [`LockedIter`] tokens.
///
/// Parameterized over the element type, the lock implementation and the
/// byte-allocator handle backing node storage. The node allocator is
/// obtained by [rebinding](TypedAlloc::rebind) whatever element-typed
/// adapter the constructor received, so nodes and any user allocations
/// share backing storage.
pub struct MultiSourceQueue<T, L = SpinLock, A = Global>
where
    T: Send,
    L: RawLock,
    A: RawAlloc,
{
    /// Head of the global list. Guarded by `lock`.
    global_head: UnsafeCell<*mut Node<T>>,
    /// Tail of the global list. Guarded by `lock`.
    global_tail: UnsafeCell<*mut Node<T>>,
    lock: L,
    alloc: TypedAlloc<Node<T>, A>,
}

impl<T, L, A> MultiSourceQueue<T, L, A>
where
    T: Send,
    L: RawLock,
    A: RawAlloc + Default,
{
    /// Creates an empty queue backed by a default allocator handle.
    pub fn new() -> Self {
        Self::with_alloc(TypedAlloc::default())
    }
}

impl<T, L, A> Default for MultiSourceQueue<T, L, A>
where
    T: Send,
    L: RawLock,
    A: RawAlloc + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, L, A> MultiSourceQueue<T, L, A>
where
    T: Send,
    L: RawLock,
    A: RawAlloc,
{
    /// Creates an empty queue that allocates nodes from the backing storage
    /// of `alloc`.
    pub fn with_alloc(alloc: TypedAlloc<T, A>) -> Self {
        Self {
            global_head: UnsafeCell::new(null_mut()),
            global_tail: UnsafeCell::new(null_mut()),
            lock: L::default(),
            alloc: alloc.rebind(),
        }
    }

    /// Creates a producer bound to this queue.
    pub fn producer(&self) -> Producer<'_, T, L, A> {
        Producer::new(self)
    }

    /// Locks the queue and returns the iteration token.
    ///
    /// While the token lives the global list cannot change: publishes,
    /// tombstoning erases and [`apply_deletions`](Self::apply_deletions)
    /// block. Iterating the token yields the non-tombstoned elements in
    /// global order: each publication is a contiguous run in insertion
    /// order, and runs are ordered by which publish acquired the lock first.
    pub fn lock_for_iter(&self) -> LockedIter<'_, T, L, A> {
        self.lock.lock();

        unsafe { LockedIter::new(self) }
    }

    /// Unlinks every tombstoned node from the global list and returns its
    /// storage to the node allocator. Idempotent.
    ///
    /// Pending lists are never touched: a tombstone set on a node another
    /// producer has not yet published takes effect only once that publish
    /// makes the node visible here.
    pub fn apply_deletions(&self) {
        self.lock.lock();

        unsafe {
            let mut prev: *mut Node<T> = null_mut();
            let mut cur = *self.global_head.get();

            while !cur.is_null() {
                let next = (*cur).next;

                if (*cur).is_deleted() {
                    if prev.is_null() {
                        *self.global_head.get() = next;
                    } else {
                        (*prev).next = next;
                    }

                    if *self.global_tail.get() == cur {
                        *self.global_tail.get() = prev;
                    }

                    self.alloc.drop_delete(NonNull::new_unchecked(cur));
                } else {
                    prev = cur;
                }

                cur = next;
            }

            self.lock.unlock();
        }
    }

    /// Splices a pending list `head..=tail` onto the global tail.
    pub(crate) fn publish_list(&self, head: *mut Node<T>, tail: *mut Node<T>) {
        self.lock.lock();

        if unlikely(head.is_null()) {
            // An empty publish is still serialized on the lock.
            unsafe { self.lock.unlock() };

            return;
        }

        unsafe {
            assert_hint((*tail).next.is_null(), "pending tail must end the list");

            let global_tail = *self.global_tail.get();

            if global_tail.is_null() {
                *self.global_head.get() = head;
            } else {
                (*global_tail).next = head;
            }

            *self.global_tail.get() = tail;

            self.lock.unlock();
        }
    }

    /// Tombstones a node that is not in the calling producer's pending list.
    pub(crate) fn mark_deleted(&self, node: NodeRef<T>) {
        self.lock.lock();

        unsafe {
            (*node.as_ptr()).mark_deleted();

            self.lock.unlock();
        }
    }
}

impl<T, L, A> Drop for MultiSourceQueue<T, L, A>
where
    T: Send,
    L: RawLock,
    A: RawAlloc,
{
    fn drop(&mut self) {
        // Producers and iteration tokens borrow the queue, so none are left
        // and no lock is needed. Tombstoned nodes are freed like live ones.
        let mut cur = *self.global_head.get_mut();

        while !cur.is_null() {
            unsafe {
                let next = (*cur).next;

                self.alloc.drop_delete(NonNull::new_unchecked(cur));

                cur = next;
            }
        }
    }
}

unsafe impl<T, L, A> Send for MultiSourceQueue<T, L, A>
where
    T: Send,
    L: RawLock + Send,
    A: RawAlloc + Send,
{
}

unsafe impl<T, L, A> Sync for MultiSourceQueue<T, L, A>
where
    T: Send + Sync,
    L: RawLock + Sync,
    A: RawAlloc + Sync,
{
}
