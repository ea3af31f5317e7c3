use core::fmt;
use std::io;

use crate::attributes::Attributes;
use crate::control::{ControlBlock, Handle, Side};
use crate::pull::Pull;
use crate::stack::{FixedSize, StackAllocator};

/// The producing half of a coroutine pair.
///
/// A `Push` hands values to the other half of the pair, which reads them
/// through a [`Pull`]. When created directly with [`Push::new`], the body of
/// the pair runs on its own stack and receives a [`Pull`] from which it
/// consumes the values sent by the caller:
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use tandem::Push;
///
/// let lines = Rc::new(RefCell::new(Vec::new()));
/// let out = lines.clone();
/// let mut sink = Push::new(move |source| {
///     for word in source.iter() {
///         out.borrow_mut().push(format!("<{word}>"));
///     }
/// });
///
/// sink.send("hello").send("world");
/// assert_eq!(*lines.borrow(), ["<hello>", "<world>"]);
/// ```
///
/// A body consuming values this way is suspended waiting for more input until
/// its `Push` is dropped, at which point it is unwound.
pub struct Push<T: 'static, A: StackAllocator = FixedSize> {
    pub(crate) handle: Handle<T, A>,
}

impl<T: 'static> Push<T> {
    /// Creates a new coroutine pair which runs `body` on a freshly allocated
    /// stack with the default [`Attributes`].
    ///
    /// The body does not start running until the first value is sent, and
    /// it never runs if the `Push` is dropped before that.
    ///
    /// # Panics
    ///
    /// Panics if the stack could not be allocated.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(&mut Pull<T>) + 'static,
    {
        Self::with_allocator(FixedSize, Attributes::default(), body)
            .expect("failed to allocate stack")
    }
}

impl<T: 'static, A: StackAllocator> Push<T, A> {
    /// Creates a new coroutine pair which runs `body` on a stack obtained
    /// from `allocator`.
    ///
    /// The stack is returned to `allocator` when the pair is destroyed.
    /// Returns an error if the stack could not be allocated.
    pub fn with_allocator<F>(allocator: A, attributes: Attributes, body: F) -> io::Result<Self>
    where
        F: FnOnce(&mut Pull<T, A>) + 'static,
    {
        let block = ControlBlock::spawn(allocator, attributes, move |block| {
            let mut source = Pull {
                handle: Handle::new(block, Side::Callee),
            };
            // Wait for the first value.
            source.handle.block.jump_to(Side::Callee);
            body(&mut source);
        })?;

        let push = Self {
            handle: Handle::new(block, Side::Caller),
        };
        push.handle.block.jump_to(Side::Caller);
        Ok(push)
    }

    /// Hands `value` to the other half of the pair and switches to it until
    /// it asks for the next value or finishes.
    ///
    /// If the other half does not take the value before switching back, it
    /// is dropped when this call returns. If the other half panics, the panic
    /// continues unwinding out of this call.
    ///
    /// # Panics
    ///
    /// Panics if the pair is already complete.
    pub fn send(&mut self, value: T) -> &mut Self {
        self.handle.send(value);
        self
    }

    /// Returns whether the other half can still accept values.
    #[inline]
    pub fn is_open(&self) -> bool {
        !self.handle.block.is_complete()
    }

    /// Returns a write cursor over this `Push`.
    pub fn iter(&mut self) -> PushIter<'_, T, A> {
        PushIter { push: Some(self) }
    }
}

impl<A: StackAllocator> Push<(), A> {
    /// Switches to the other half of a pair which carries no values.
    ///
    /// Equivalent to `send(())`.
    pub fn suspend(&mut self) -> &mut Self {
        self.send(())
    }
}

impl<T: 'static, A: StackAllocator> Extend<T> for Push<T, A> {
    /// Sends items from `iter` until it runs out or the other half finishes.
    ///
    /// Items are only pulled from `iter` while the pair is open, so no item is
    /// lost to a closed pair.
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let mut iter = iter.into_iter();
        while self.is_open() {
            match iter.next() {
                Some(value) => {
                    self.send(value);
                }
                None => break,
            }
        }
    }
}

impl<T: 'static, A: StackAllocator> fmt::Debug for Push<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Push")
            .field("open", &self.is_open())
            .finish()
    }
}

/// Write cursor over a [`Push`].
///
/// Reaches its end once the pair finishes, after which every
/// [`put`](Self::put) hands the value back.
pub struct PushIter<'a, T: 'static, A: StackAllocator = FixedSize> {
    push: Option<&'a mut Push<T, A>>,
}

impl<T: 'static, A: StackAllocator> PushIter<'_, T, A> {
    /// Sends `value` through the underlying [`Push`].
    ///
    /// Returns the value back if the cursor has reached its end.
    pub fn put(&mut self, value: T) -> Result<(), T> {
        match self.push.take() {
            Some(push) if push.is_open() => {
                push.send(value);
                if push.is_open() {
                    self.push = Some(push);
                }
                Ok(())
            }
            _ => Err(value),
        }
    }

    /// Returns whether the cursor has reached its end.
    pub fn is_end(&self) -> bool {
        match &self.push {
            Some(push) => !push.is_open(),
            None => true,
        }
    }
}
