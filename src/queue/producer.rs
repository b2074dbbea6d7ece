//! The producer-side staging handle.
use crate::alloc::{AllocError, Global, RawAlloc};
use crate::lock::{RawLock, SpinLock};
use crate::queue::node::{Node, NodeRef};
use crate::queue::MultiSourceQueue;
use std::marker::PhantomData;
use std::ptr::{null_mut, NonNull};

/// A thread-owned handle that stages insertions for one queue.
///
/// Each producer belongs to a single thread and synchronizes nothing
/// internally: inserts land in a private pending list, invisible to
/// iteration until [`publish`](Self::publish) splices them onto the queue's
/// global list in one locked step. Dropping the producer publishes whatever
/// is still pending.
pub struct Producer<'q, T, L = SpinLock, A = Global>
where
    T: Send,
    L: RawLock,
    A: RawAlloc,
{
    queue: &'q MultiSourceQueue<T, L, A>,
    pending_head: *mut Node<T>,
    pending_tail: *mut Node<T>,
    _thread_bound: PhantomData<*const ()>,
}

impl<'q, T, L, A> Producer<'q, T, L, A>
where
    T: Send,
    L: RawLock,
    A: RawAlloc,
{
    pub(crate) fn new(queue: &'q MultiSourceQueue<T, L, A>) -> Self {
        Self {
            queue,
            pending_head: null_mut(),
            pending_tail: null_mut(),
            _thread_bound: PhantomData,
        }
    }

    /// Allocates a node for `value` and appends it to the pending list.
    ///
    /// The returned handle is usable with any producer bound to the same
    /// queue until the node is reclaimed. On allocation failure nothing is
    /// added and the producer is unchanged.
    pub fn insert(&mut self, value: T) -> Result<NodeRef<T>, AllocError> {
        let node = self.queue.alloc.alloc_new(Node::new(value))?;

        if self.pending_head.is_null() {
            self.pending_head = node.as_ptr();
        } else {
            unsafe { (*self.pending_tail).next = node.as_ptr() };
        }

        self.pending_tail = node.as_ptr();

        Ok(NodeRef::new(node))
    }

    /// Erases the element behind `node`.
    ///
    /// A node still sitting in **this** producer's pending list is unlinked
    /// and freed on the spot, without touching the queue lock. Anything else
    /// (already published, or pending on another producer) is tombstoned
    /// under the lock and reclaimed by a later
    /// [`apply_deletions`](MultiSourceQueue::apply_deletions); a tombstone
    /// on a foreign pending node becomes visible once its owner publishes.
    ///
    /// `node` must not have been reclaimed; tombstoning an already
    /// tombstoned node is a no-op.
    pub fn erase(&mut self, node: NodeRef<T>) {
        let target = node.as_ptr();
        let mut prev: *mut Node<T> = null_mut();
        let mut cur = self.pending_head;

        while !cur.is_null() {
            if cur == target {
                unsafe {
                    let next = (*cur).next;

                    if prev.is_null() {
                        self.pending_head = next;
                    } else {
                        (*prev).next = next;
                    }

                    if self.pending_tail == cur {
                        self.pending_tail = prev;
                    }

                    self.queue.alloc.drop_delete(NonNull::new_unchecked(cur));
                }

                return;
            }

            prev = cur;
            cur = unsafe { (*cur).next };
        }

        self.queue.mark_deleted(node);
    }

    /// Splices the pending list onto the tail of the queue's global list, in
    /// insertion order, as one atomic step. Leaves the pending list empty.
    ///
    /// Publishing nothing is a valid no-op that still serializes on the
    /// queue lock.
    pub fn publish(&mut self) {
        self.queue
            .publish_list(self.pending_head, self.pending_tail);

        self.pending_head = null_mut();
        self.pending_tail = null_mut();
    }
}

impl<T, L, A> Drop for Producer<'_, T, L, A>
where
    T: Send,
    L: RawLock,
    A: RawAlloc,
{
    fn drop(&mut self) {
        self.publish();
    }
}
