//! Hints to the compiler that affects how code should be emitted or optimized.

/// Do the same as [`assert_unchecked`](std::hint::assert_unchecked), but instead of UB,
/// it panics with `debug_assertions`.
///
/// # Panics
///
/// It panics with `debug_assertions` if `cond` is `false`.
#[inline(always)]
#[track_caller]
#[allow(unused_variables, reason = "It contains #[cfg(debug_assertions)]")]
pub fn assert_hint(cond: bool, debug_msg: &str) {
    if cfg!(debug_assertions) {
        assert!(cond, "{debug_msg}");
    } else {
        unsafe { std::hint::assert_unchecked(cond) };
    }
}

/// Indicate that a given branch is **not** likely to be taken, relatively speaking.
#[inline(always)]
#[cold]
pub const fn cold_path() {}

/// Indicate that a given condition is likely to be false.
#[inline(always)]
pub const fn unlikely(b: bool) -> bool {
    if b {
        cold_path();
    }

    b
}
