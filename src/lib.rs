//! *Two stacks, one thread, strictly taking turns.*
//!
//! ## Overview
//!
//! This crate provides symmetric stackful [coroutines] in the form of a pair of handles: a [`Pull`] which consumes values and a [`Push`] which produces them. Creating either half runs a body on a dedicated stack and hands it the other half, so that values flow between ordinary nested loops on both sides without turning either of them into a state machine. Control only ever moves when a value changes hands: a producer suspends inside [`Push::send`] and a consumer suspends inside [`Pull::resume`].
//!
//! Both handles are single-threaded and cannot be sent to another thread, since the two halves share one control block.
//!
//! [coroutines]: https://en.wikipedia.org/wiki/Coroutine
//!
//! ## Example
//!
//! ```rust
//! use tandem::Pull;
//!
//! fn main() {
//!     println!("[main] creating coroutine");
//!
//!     let mut source = Pull::new(|sink| {
//!         println!("[coroutine] coroutine started");
//!         for i in 0..3 {
//!             println!("[coroutine] sending {}", i);
//!             sink.send(i);
//!         }
//!         println!("[coroutine] exiting coroutine");
//!     });
//!
//!     while !source.is_complete() {
//!         println!("[main] got {} from coroutine", source.peek());
//!         source.resume();
//!     }
//!
//!     println!("[main] exiting");
//! }
//! ```
//!
//! #### Output
//!
//! ```text
//! [main] creating coroutine
//! [coroutine] coroutine started
//! [coroutine] sending 0
//! [main] got 0 from coroutine
//! [coroutine] sending 1
//! [main] got 1 from coroutine
//! [coroutine] sending 2
//! [main] got 2 from coroutine
//! [coroutine] exiting coroutine
//! [main] exiting
//! ```
//!
//! A [`Pull`] starts its body immediately so that the first value is ready once it has been constructed. A [`Push`] instead waits for the first value to be sent before starting its body.
//!
//! ## Features
//!
//! #### Iterators
//!
//! [`Pull::iter`] adapts a consumer into a standard [`Iterator`], and [`Push`] implements [`Extend`], which makes it easy to connect coroutines to the rest of the iterator ecosystem. [`Push::iter`] returns a [`PushIter`] cursor which reports when the other half stops accepting values.
//!
//! #### Panic propagation
//!
//! If a panic occurs in a coroutine body then it unwinds through the coroutine stack and then continues to unwind out of the call which last switched to the body. Once this has happened, the pair is complete and can no longer be resumed.
//!
//! ```rust
//! use std::panic::{catch_unwind, AssertUnwindSafe};
//!
//! use tandem::Pull;
//!
//! fn main() {
//!     let mut source = Pull::new(|sink| {
//!         sink.send(42);
//!         panic!("foobar");
//!     });
//!     println!("[main] got value {} from coroutine", source.peek());
//!
//!     let result = catch_unwind(AssertUnwindSafe(|| {
//!         source.resume();
//!     }));
//!     println!(
//!         "[main] caught panic \"{}\" from coroutine",
//!         result.unwrap_err().downcast_ref::<&'static str>().unwrap()
//!     );
//!     assert!(source.is_complete());
//! }
//! ```
//!
//! #### Cleanup on drop
//!
//! If one half is dropped while the body is suspended then the body's stack is unwound using the same mechanism as panics, which drops every local variable on it before the stack is released. This is necessary to maintain a safe API: the stack cannot be freed or reused while there are still live objects on it.
//!
//! The unwinding uses a dedicated panic payload which is never reported by the panic hook. Code inside a body which catches panics must let it through; [`catch_unwind`] is a drop-in replacement for [`std::panic::catch_unwind`] which does exactly that, and [`is_forced_unwind`] recognizes the payload. Swallowing it is detected and reported as a panic.
//!
//! #### Stack allocation
//!
//! Stacks come from a [`StackAllocator`](stack::StackAllocator). The default [`FixedSize`](stack::FixedSize) allocator maps the requested size with a guard page below it; see the [`stack`] module for the other strategies. Allocators and stack sizes are chosen with [`Pull::with_allocator`] and [`Push::with_allocator`], together with an [`Attributes`] value.
//!
//! #### Floating-point state
//!
//! Setting [`Attributes::preserve_fpu`] saves the floating-point control state (rounding mode and exception masks) on every switch and restores it once control returns, so changes made on one side do not leak into the other.
//!
//! ## Logging
//!
//! Stack allocation, forced unwinding and panics crossing between the two halves are reported through the [`log`](https://docs.rs/log) facade at `trace` and `debug` level.

#![warn(missing_docs)]

mod attributes;
mod control;
mod fpu;
mod pull;
mod push;
pub mod stack;
mod unwind;

pub use attributes::Attributes;
pub use pull::{Pull, PullIter};
pub use push::{Push, PushIter};
pub use unwind::{catch_unwind, is_forced_unwind};

#[cfg(test)]
mod tests;
