//! The intrusive node and its public handle.
use crate::loom_bindings::sync::atomic::AtomicBool;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::Ordering::Relaxed;

/// A heap node owning one element.
///
/// A node is reachable from exactly one list at a time: the inserting
/// producer's pending list until publication, the queue's global list
/// afterwards. The phases are disjoint, so a single link serves both.
pub(crate) struct Node<T> {
    pub(crate) value: T,
    /// Pending-list link before publication, global-list link after.
    /// Written by the owning producer while pending, under the queue lock
    /// once published.
    pub(crate) next: *mut Node<T>,
    deleted: AtomicBool,
}

impl<T> Node<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            value,
            next: std::ptr::null_mut(),
            deleted: AtomicBool::new(false),
        }
    }

    /// Sets the tombstone. Called at most from under the queue lock; the
    /// lock also orders every load, so `Relaxed` is enough on both sides.
    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Relaxed);
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Relaxed)
    }
}

/// An opaque handle to an inserted element.
///
/// Returned by [`Producer::insert`](crate::queue::Producer::insert). It can
/// be passed to [`erase`](crate::queue::Producer::erase) on **any** producer
/// bound to the same queue, and dereferences to the element. It stays valid
/// until the node is reclaimed: by an owning-producer erase while still
/// pending, by [`apply_deletions`](crate::queue::MultiSourceQueue::apply_deletions)
/// after a tombstoning erase, or by the queue's destruction.
pub struct NodeRef<T> {
    node: NonNull<Node<T>>,
}

impl<T> NodeRef<T> {
    pub(crate) fn new(node: NonNull<Node<T>>) -> Self {
        Self { node }
    }

    pub(crate) fn as_ptr(self) -> *mut Node<T> {
        self.node.as_ptr()
    }
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<T> {}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &self.node.as_ref().value }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

unsafe impl<T: Sync> Send for NodeRef<T> {}
unsafe impl<T: Sync> Sync for NodeRef<T> {}
