//! This module contains a lock for tests.
use crate::loom_bindings::sync::Mutex;

/// Serializes the multi-threaded tests, which are noisy neighbors.
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());
