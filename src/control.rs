//! The control block shared by the two halves of a coroutine pair.
//!
//! A pair consists of the handle created by user code (the *caller* side,
//! running on the caller's stack) and the handle synthesized for the body (the
//! *callee* side, running on the coroutine stack). Both refer to a single
//! reference-counted `ControlBlock` which holds:
//!
//! - the execution context of the coroutine stack, resumed by the caller side,
//! - the execution context of the caller, suspended into by the callee side,
//! - one set of lifecycle flags per side,
//! - a slot for a panic that escaped the body,
//! - a slot pointing to the value currently being handed across.
//!
//! Control strictly ping-pongs between the two sides, so the shared slots need
//! no synchronization: the running side writes them just before switching and
//! the other side reads them just after regaining control.

use core::cell::{Cell, UnsafeCell};
use core::mem;
use core::ptr::NonNull;
use std::io;
use std::rc::Rc;

use corosensei::{Coroutine, Yielder};
use log::{debug, error, trace};

use crate::attributes::Attributes;
use crate::fpu::FpuState;
use crate::stack::StackAllocator;
use crate::unwind::{self, CaughtPanic};

/// One half of a coroutine pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    /// The handle constructed by user code.
    Caller,
    /// The handle synthesized on the coroutine stack and passed to the body.
    Callee,
}

impl Side {
    /// The other half of the pair.
    #[inline]
    pub(crate) fn dual(self) -> Side {
        match self {
            Side::Caller => Side::Callee,
            Side::Callee => Side::Caller,
        }
    }

    #[inline]
    fn index(self) -> usize {
        match self {
            Side::Caller => 0,
            Side::Callee => 1,
        }
    }
}

bitflags::bitflags! {
    /// Lifecycle flags of one side of a coroutine pair.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct State: u8 {
        /// Releasing this side must unwind a suspended body.
        const UNWIND = 1 << 0;
        /// The body has finished, normally or by panicking.
        const COMPLETE = 1 << 1;
        /// This side was released while the body was suspended.
        const EARLY_EXIT = 1 << 2;
    }
}

/// Execution context of the coroutine stack.
type CalleeContext<S> = Coroutine<(), (), (), S>;

/// Execution context of the caller, as seen from the coroutine stack.
type CallerContext = Yielder<(), ()>;

pub(crate) struct ControlBlock<T, A: StackAllocator> {
    // Coroutine owning the stack. Only the caller side touches this, and only
    // while it is the running side. None once the block is being dropped.
    callee: UnsafeCell<Option<CalleeContext<A::Stack>>>,

    // Link back to the caller, recorded by the trampoline on first entry. It
    // points to the root of the coroutine stack and is only used from there.
    caller: Cell<Option<NonNull<CallerContext>>>,

    allocator: A,
    preserve_fpu: bool,
    state: [Cell<State>; 2],

    // Side which currently holds control.
    pub(crate) running: Cell<Side>,

    // Panic which escaped the body, re-thrown by the next resuming side.
    exception: Cell<Option<CaughtPanic>>,

    // Value being handed across. It lives in the frame of the sending side,
    // which stays suspended for as long as the pointer is set.
    transfer: Cell<Option<NonNull<Option<T>>>>,
}

impl<T: 'static, A: StackAllocator> ControlBlock<T, A> {
    /// Allocates a stack and prepares a coroutine which will run `entry` on it
    /// with the synthesized half of the block.
    ///
    /// The coroutine does not run until the caller side first switches to it.
    pub(crate) fn spawn<F>(mut allocator: A, attributes: Attributes, entry: F) -> io::Result<Rc<Self>>
    where
        F: FnOnce(Rc<Self>) + 'static,
    {
        let stack = allocator.allocate(attributes.size)?;
        let block = Rc::new(Self {
            callee: UnsafeCell::new(None),
            caller: Cell::new(None),
            allocator,
            preserve_fpu: attributes.preserve_fpu,
            state: [Cell::new(State::UNWIND), Cell::new(State::empty())],
            running: Cell::new(Side::Caller),
            exception: Cell::new(None),
            transfer: Cell::new(None),
        });

        let ptr = Rc::as_ptr(&block);
        let coroutine = CalleeContext::<A::Stack>::with_stack(
            stack,
            move |yielder: &CallerContext, (): ()| {
                // SAFETY: the caller side keeps its reference alive for as long
                // as this coroutine can run (see `Handle::drop`).
                let block = unsafe { &*ptr };
                block.caller.set(Some(NonNull::from(yielder)));

                // The synthesized half shares the allocation of the fresh one.
                let synthesized = unsafe {
                    Rc::increment_strong_count(ptr);
                    Rc::from_raw(ptr)
                };

                match unwind::catch_unwind_at_root(move || entry(synthesized)) {
                    Ok(()) => trace!("coroutine body returned"),
                    Err(payload) if unwind::is_forced_unwind(&*payload) => {
                        trace!("coroutine body unwound");
                    }
                    Err(payload) => {
                        debug!("coroutine body panicked, passing the panic to its resumer");
                        block.exception.set(Some(payload));
                    }
                }

                // Returning switches back to the caller for the last time.
                block.complete();
            },
        );
        unsafe {
            *block.callee.get() = Some(coroutine);
        }

        trace!("spawned coroutine with {} byte stack", attributes.size);
        Ok(block)
    }

    /// Transfers control from `from` to the other side and returns once
    /// control comes back.
    ///
    /// On return, a panic captured from the body is re-thrown, and a release
    /// of the other side turns into a forced unwind of the current frame.
    pub(crate) fn jump_to(&self, from: Side) {
        assert_eq!(
            self.running.get(),
            from,
            "coroutine handle used while the other half of its pair is running"
        );

        let fpu = self.preserve_fpu.then(FpuState::save);
        self.running.set(from.dual());
        match from {
            Side::Caller => {
                // SAFETY: the callee context is only accessed by the caller
                // side, which is suspended in here until the coroutine yields.
                let callee = unsafe { &mut *self.callee.get() };
                if let Some(coroutine) = callee.as_mut() {
                    let _ = coroutine.resume(());
                }
            }
            Side::Callee => {
                if let Some(caller) = self.caller.get() {
                    // SAFETY: the link lives at the root of the coroutine stack
                    // that this code is running on.
                    unsafe { caller.as_ref() }.suspend(());
                }
            }
        }
        self.running.set(from);
        if let Some(fpu) = fpu {
            fpu.restore();
        }

        if let Some(payload) = self.exception.take() {
            unwind::resume_unwind(payload);
        }
        if self.state(from.dual()).contains(State::EARLY_EXIT) {
            unwind::force_unwind();
        }
    }

    /// Releases the given side. If that side is responsible for a body which
    /// is still suspended, the body is resumed once more and unwound.
    pub(crate) fn release(&self, side: Side) {
        let state = self.state(side);
        if state.contains(State::COMPLETE) || !state.contains(State::UNWIND) {
            return;
        }

        debug!("unwinding suspended coroutine body");
        self.state[side.index()].set(state | State::EARLY_EXIT);
        self.jump_to(side);

        if !self.is_complete() {
            // A second panic would abort the process.
            if std::thread::panicking() {
                error!("the forced unwind was caught and not rethrown, leaking the stack");
                return;
            }
            panic!("the forced unwind was caught and not rethrown");
        }
    }

    /// Marks the body as finished. Called from the coroutine stack just before
    /// it switches back for the last time.
    fn complete(&self) {
        let caller = &self.state[Side::Caller.index()];
        caller.set((caller.get() | State::COMPLETE) - State::UNWIND);
        self.transfer.set(None);
    }

    #[inline]
    fn state(&self, side: Side) -> State {
        self.state[side.index()].get()
    }

    /// Whether the body has finished executing.
    #[inline]
    pub(crate) fn is_complete(&self) -> bool {
        self.state(Side::Caller).contains(State::COMPLETE)
    }

    /// Whether a value is waiting in the transfer slot.
    #[inline]
    pub(crate) fn has_value(&self) -> bool {
        !self.is_complete() && self.value().is_some()
    }

    /// The value waiting in the transfer slot, if any.
    ///
    /// The returned reference is valid until the next switch.
    #[inline]
    pub(crate) fn value(&self) -> Option<&T> {
        let slot = self.transfer.get()?;
        // SAFETY: the slot lives in the suspended sender's frame.
        unsafe { (*slot.as_ptr()).as_ref() }
    }

    /// Moves the value out of the transfer slot.
    #[inline]
    pub(crate) fn take_value(&self) -> Option<T> {
        let slot = self.transfer.get()?;
        // SAFETY: the slot lives in the suspended sender's frame.
        unsafe { (*slot.as_ptr()).take() }
    }

    /// Hands `value` to the other side and switches to it. The value is
    /// dropped once control returns if the other side did not take it.
    pub(crate) fn send(&self, from: Side, value: T) {
        let mut slot = Some(value);
        self.transfer.set(Some(NonNull::from(&mut slot)));
        let _clear = scopeguard::guard((), |()| self.transfer.set(None));
        self.jump_to(from);
    }
}

impl<T, A: StackAllocator> Drop for ControlBlock<T, A> {
    fn drop(&mut self) {
        if let Some(coroutine) = self.callee.get_mut().take() {
            if coroutine.done() {
                self.allocator.deallocate(coroutine.into_stack());
                trace!("returned coroutine stack to its allocator");
            } else {
                // Live frames remain on the stack, so it can't be reused.
                error!("leaking the stack of a coroutine which was not unwound");
                mem::forget(coroutine);
            }
        }
    }
}

/// An owning reference to one side of a control block.
pub(crate) struct Handle<T: 'static, A: StackAllocator> {
    pub(crate) block: Rc<ControlBlock<T, A>>,
    pub(crate) side: Side,
}

impl<T: 'static, A: StackAllocator> Handle<T, A> {
    #[inline]
    pub(crate) fn new(block: Rc<ControlBlock<T, A>>, side: Side) -> Self {
        Self { block, side }
    }

    pub(crate) fn resume(&self) {
        assert!(
            !self.block.is_complete(),
            "attempt to resume a completed coroutine"
        );
        self.block.jump_to(self.side);
    }

    pub(crate) fn send(&self, value: T) {
        assert!(
            !self.block.is_complete(),
            "attempt to send to a completed coroutine"
        );
        self.block.send(self.side, value);
    }
}

impl<T: 'static, A: StackAllocator> Drop for Handle<T, A> {
    fn drop(&mut self) {
        if self.block.running.get() != self.side && !self.block.is_complete() {
            // The body is running on the coroutine stack, which must not be
            // freed under it. Leak the block instead.
            mem::forget(self.block.clone());
            if std::thread::panicking() {
                error!("coroutine handle dropped while its body is running");
                return;
            }
            panic!("coroutine handle dropped while its body is running");
        }
        self.block.release(self.side);
    }
}
