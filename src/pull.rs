use core::fmt;
use core::iter::FusedIterator;
use std::io;

use crate::attributes::Attributes;
use crate::control::{ControlBlock, Handle, Side};
use crate::push::Push;
use crate::stack::{FixedSize, StackAllocator};

/// The consuming half of a coroutine pair.
///
/// A `Pull` reads values which the other half of the pair sends to it with
/// [`Push::send`]. When created directly with [`Pull::new`], the body of the
/// pair runs on its own stack and receives a [`Push`] through which it
/// produces values:
///
/// ```
/// use tandem::Pull;
///
/// let mut fib = Pull::new(|sink| {
///     let (mut a, mut b) = (1u64, 1u64);
///     for _ in 0..8 {
///         sink.send(a);
///         (a, b) = (b, a + b);
///     }
/// });
///
/// let values: Vec<u64> = fib.iter().collect();
/// assert_eq!(values, [1, 1, 2, 3, 5, 8, 13, 21]);
/// ```
///
/// A `Pull` is also handed to the body of a [`Push`], in which case it reads
/// the values sent by the caller.
pub struct Pull<T: 'static, A: StackAllocator = FixedSize> {
    pub(crate) handle: Handle<T, A>,
}

impl<T: 'static> Pull<T> {
    /// Creates a new coroutine pair which runs `body` on a freshly allocated
    /// stack with the default [`Attributes`].
    ///
    /// The body starts running immediately and is suspended at its first
    /// call to [`Push::send`], so that the first value is available as soon as
    /// this function returns.
    ///
    /// # Panics
    ///
    /// Panics if the stack could not be allocated, or if `body` panics before
    /// sending its first value.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(&mut Push<T>) + 'static,
    {
        Self::with_allocator(FixedSize, Attributes::default(), body)
            .expect("failed to allocate stack")
    }
}

impl<T: 'static, A: StackAllocator> Pull<T, A> {
    /// Creates a new coroutine pair which runs `body` on a stack obtained
    /// from `allocator`.
    ///
    /// The stack is returned to `allocator` when the pair is destroyed.
    /// Returns an error if the stack could not be allocated, in which case
    /// `body` never runs.
    pub fn with_allocator<F>(allocator: A, attributes: Attributes, body: F) -> io::Result<Self>
    where
        F: FnOnce(&mut Push<T, A>) + 'static,
    {
        let block = ControlBlock::spawn(allocator, attributes, move |block| {
            let mut sink = Push {
                handle: Handle::new(block, Side::Callee),
            };
            body(&mut sink);
        })?;

        // Run the body up to its first value.
        let pull = Self {
            handle: Handle::new(block, Side::Caller),
        };
        pull.handle.block.jump_to(Side::Caller);
        Ok(pull)
    }

    /// Switches to the other half of the pair until it sends the next value or
    /// finishes.
    ///
    /// Any value currently held which was not taken is discarded. If the other
    /// half panics, the panic continues unwinding out of this call.
    ///
    /// # Panics
    ///
    /// Panics if the pair is already complete.
    pub fn resume(&mut self) -> &mut Self {
        self.handle.resume();
        self
    }

    /// Returns whether a value is available to [`peek`](Self::peek) or
    /// [`take`](Self::take).
    #[inline]
    pub fn has_value(&self) -> bool {
        self.handle.block.has_value()
    }

    /// Returns a reference to the current value without consuming it.
    ///
    /// # Panics
    ///
    /// Panics if no value is available.
    #[inline]
    pub fn peek(&self) -> &T {
        match self.handle.block.value() {
            Some(value) if !self.is_complete() => value,
            _ => panic!("no value available"),
        }
    }

    /// Moves the current value out, leaving no value available until the next
    /// [`resume`](Self::resume).
    #[inline]
    pub fn take(&mut self) -> Option<T> {
        if self.is_complete() {
            return None;
        }
        self.handle.block.take_value()
    }

    /// Returns whether the body of the pair has finished.
    ///
    /// Once complete, no further values will arrive.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.handle.block.is_complete()
    }

    /// Returns an iterator over the values received from the other half.
    ///
    /// The iterator starts with the value which is currently available, if
    /// any, and resumes the other half whenever it has taken the last one.
    pub fn iter(&mut self) -> PullIter<'_, T, A> {
        PullIter { pull: Some(self) }
    }
}

impl<T: 'static, A: StackAllocator> fmt::Debug for Pull<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pull")
            .field("has_value", &self.has_value())
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl<'a, T: 'static, A: StackAllocator> IntoIterator for &'a mut Pull<T, A> {
    type Item = T;
    type IntoIter = PullIter<'a, T, A>;

    fn into_iter(self) -> PullIter<'a, T, A> {
        self.iter()
    }
}

/// Iterator over the values received by a [`Pull`].
///
/// Each call yields the value currently waiting, resuming the other half first
/// if there is none. Once the pair completes the iterator returns `None` and
/// keeps doing so.
pub struct PullIter<'a, T: 'static, A: StackAllocator = FixedSize> {
    pull: Option<&'a mut Pull<T, A>>,
}

impl<T: 'static, A: StackAllocator> Iterator for PullIter<'_, T, A> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let pull = self.pull.as_mut()?;
        if !pull.has_value() && !pull.is_complete() {
            pull.resume();
        }

        let value = pull.take();
        if value.is_none() {
            self.pull = None;
        }
        value
    }
}

impl<T: 'static, A: StackAllocator> FusedIterator for PullIter<'_, T, A> {}
