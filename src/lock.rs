//! Mutual-exclusion capability for the queue.
//!
//! The queue does not care how blocking is implemented. It needs a
//! [`RawLock`]: something that can be acquired, released, and polled. The
//! default is [`SpinLock`]; runtimes that park threads or track safepoints
//! can implement the trait over their own primitive.
use crate::loom_bindings::sync::atomic::AtomicBool;
use std::fmt;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

#[cfg(not(msq_loom))]
use crossbeam_utils::Backoff;

/// A raw mutual-exclusion capability.
///
/// Unlike [`std::sync::Mutex`], a `RawLock` guards no data of its own. The
/// caller pairs [`lock`](Self::lock) with [`unlock`](Self::unlock) and is
/// responsible for what happens in between.
pub trait RawLock: Default {
    /// Acquires the lock, blocking until it is available.
    fn lock(&self);

    /// Tries to acquire the lock without blocking.
    /// Returns whether the lock was acquired.
    fn try_lock(&self) -> bool;

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock.
    unsafe fn unlock(&self);
}

/// A test-and-test-and-set spinlock with exponential backoff.
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLock for SpinLock {
    fn lock(&self) {
        #[cfg(not(msq_loom))]
        {
            let backoff = Backoff::new();

            while !self.try_lock() {
                // Spin on the cheap load, CAS again only once it looks free.
                while self.locked.load(Relaxed) {
                    backoff.snooze();
                }
            }
        }

        #[cfg(msq_loom)]
        {
            while !self.try_lock() {
                crate::loom_bindings::thread::yield_now();
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Acquire, Relaxed)
            .is_ok()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.locked.store(false, Release);
    }
}

impl fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.locked.load(Relaxed))
            .finish()
    }
}
