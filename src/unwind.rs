//! This file contains the logic for propagating panics between the two halves
//! of a coroutine pair.
//!
//! A panic escaping a coroutine body is caught at the root of the coroutine
//! stack, stored in the control block and then re-thrown with
//! `resume_unwind` on whichever side resumes the coroutine next.
//!
//! Dropping a handle while the body is suspended raises a `ForcedUnwind` panic
//! inside the body. It unwinds the body's frames, running their destructors,
//! and is swallowed once it reaches the root of the coroutine stack. Code which
//! catches panics inside a body must let this payload through, which is what
//! [`catch_unwind`] does.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe, UnwindSafe};

/// Payload of a panic caught at the root of a coroutine stack.
pub(crate) type CaughtPanic = Box<dyn Any + Send>;

/// Panic payload used to unwind a suspended coroutine body.
///
/// This is never observed by user code unless it catches panics itself.
pub(crate) struct ForcedUnwind;

/// Runs the body of a coroutine, catching any panic before it reaches the
/// stack switching code.
#[inline]
pub(crate) fn catch_unwind_at_root<T, F: FnOnce() -> T>(f: F) -> Result<T, CaughtPanic> {
    panic::catch_unwind(AssertUnwindSafe(f))
}

/// Re-throws a panic captured on the other side of a coroutine pair.
#[inline]
pub(crate) fn resume_unwind(payload: CaughtPanic) -> ! {
    panic::resume_unwind(payload)
}

/// Starts unwinding the current coroutine body.
///
/// `resume_unwind` does not invoke the panic hook, so nothing is printed.
#[cold]
pub(crate) fn force_unwind() -> ! {
    panic::resume_unwind(Box::new(ForcedUnwind))
}

/// Returns whether a caught panic payload is the forced unwind raised into a
/// suspended coroutine body when its handle was dropped.
///
/// Such a payload must always be re-thrown with
/// [`std::panic::resume_unwind`].
pub fn is_forced_unwind(payload: &(dyn Any + Send)) -> bool {
    payload.is::<ForcedUnwind>()
}

/// Variant of [`std::panic::catch_unwind`] for use inside coroutine bodies.
///
/// Behaves exactly like the standard library function except that the forced
/// unwind used to tear down a suspended coroutine is never caught: it keeps
/// unwinding towards the root of the coroutine stack.
pub fn catch_unwind<F, R>(f: F) -> std::thread::Result<R>
where
    F: FnOnce() -> R + UnwindSafe,
{
    match panic::catch_unwind(f) {
        Err(payload) if is_forced_unwind(&*payload) => panic::resume_unwind(payload),
        result => result,
    }
}
