pub mod hint {
    pub use loom::hint::spin_loop;
}

pub mod thread {
    pub use loom::thread::yield_now;
}

pub mod sync {
    pub use loom::sync::{Arc, MutexGuard};

    use std::sync::{PoisonError, TryLockError};

    /// Adapter for `loom::sync::Mutex` that removes the poisoning aspects
    /// from its API.
    #[derive(Debug)]
    pub struct Mutex<T: ?Sized>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub fn new(t: T) -> Self {
            Self(loom::sync::Mutex::new(t))
        }

        pub fn lock(&self) -> MutexGuard<'_, T> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
            match self.0.try_lock() {
                Ok(guard) => Some(guard),
                Err(TryLockError::Poisoned(p_err)) => Some(p_err.into_inner()),
                Err(TryLockError::WouldBlock) => None,
            }
        }
    }

    pub mod atomic {
        pub use loom::sync::atomic::{AtomicBool, AtomicUsize};
    }
}
