//! Stack allocation strategies for coroutines.
//!
//! Every coroutine pair runs its body on a dedicated stack obtained from a
//! [`StackAllocator`] when the pair is created and handed back to the same
//! allocator when the pair is destroyed. In most cases the default
//! [`FixedSize`] allocator is sufficient. The other strategies trade memory
//! for safety margins or lazy commitment:
//!
//! | Allocator              | Guard region         | Memory commitment          |
//! |------------------------|----------------------|----------------------------|
//! | [`FixedSize`]          | 1 page               | requested size             |
//! | [`ProtectedFixedSize`] | configurable         | requested size             |
//! | [`Segmented`]          | 1 page               | grows on demand (Unix)     |
//!
//! Stacks handed out by an allocator implement the [`Stack`] trait of the
//! underlying context switching library and can therefore also be produced by
//! a custom allocator.

use std::io;

pub use corosensei::stack::{Stack, StackPointer};
#[cfg(windows)]
pub use corosensei::stack::StackTebFields;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use self::unix::MappedStack;
        use self::unix::os_page_size;
    } else if #[cfg(windows)] {
        mod windows;
        pub use self::windows::MappedStack;
        use self::windows::os_page_size;
    } else {
        compile_error!("stack allocation is only implemented for Unix and Windows targets");
    }
}

/// Minimum usable size of a stack, excluding guard pages.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Stack size used by [`Attributes::default`](crate::Attributes).
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Returns the size of a memory page on this system.
pub fn page_size() -> usize {
    os_page_size()
}

/// A strategy for provisioning and releasing coroutine stacks.
///
/// The allocator is moved into the coroutine pair and lives as long as the
/// pair does, so a stack is always returned to the allocator it came from.
pub trait StackAllocator: 'static {
    /// Type of the stacks produced by this allocator.
    type Stack: Stack + 'static;

    /// Allocates a stack with at least `size` bytes of usable memory.
    fn allocate(&mut self, size: usize) -> io::Result<Self::Stack>;

    /// Releases a stack previously returned by `allocate`.
    ///
    /// Called once the coroutine running on the stack has finished, so no
    /// live frames remain on it.
    fn deallocate(&mut self, stack: Self::Stack) {
        drop(stack);
    }
}

/// Default allocator: a stack of the requested size with a single guard page
/// below it.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedSize;

impl StackAllocator for FixedSize {
    type Stack = MappedStack;

    fn allocate(&mut self, size: usize) -> io::Result<MappedStack> {
        let stack = MappedStack::new(size, 1, false)?;
        log::trace!("allocated fixed-size stack of {} bytes", stack.size());
        Ok(stack)
    }
}

/// Allocator which places a larger guard region below each stack.
///
/// A single guard page only catches overflows that touch it. A frame larger
/// than a page can step over it and corrupt whatever lies below the stack; a
/// wider guard region makes such frames fault as well.
#[derive(Clone, Copy, Debug)]
pub struct ProtectedFixedSize {
    /// Number of inaccessible pages placed below the usable stack.
    pub guard_pages: usize,
}

impl ProtectedFixedSize {
    /// Creates an allocator with the given number of guard pages.
    ///
    /// At least one guard page is always used.
    pub fn new(guard_pages: usize) -> Self {
        Self {
            guard_pages: guard_pages.max(1),
        }
    }
}

impl Default for ProtectedFixedSize {
    fn default() -> Self {
        Self::new(4)
    }
}

impl StackAllocator for ProtectedFixedSize {
    type Stack = MappedStack;

    fn allocate(&mut self, size: usize) -> io::Result<MappedStack> {
        let stack = MappedStack::new(size, self.guard_pages, false)?;
        log::trace!(
            "allocated protected stack of {} bytes with {} guard pages",
            stack.size(),
            self.guard_pages
        );
        Ok(stack)
    }
}

/// Allocator for growable stacks.
///
/// Address space for `max_size` bytes is reserved up front without reserving
/// swap, and physical memory is committed page by page as the stack actually
/// grows. This makes it cheap to give every coroutine a large stack.
///
/// Only available on Unix targets.
#[cfg(unix)]
#[derive(Clone, Copy, Debug)]
pub struct Segmented {
    /// Upper bound on the stack size. Requests larger than this are honoured
    /// as-is.
    pub max_size: usize,
}

#[cfg(unix)]
impl Segmented {
    /// Creates an allocator whose stacks can grow up to `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }
}

#[cfg(unix)]
impl Default for Segmented {
    fn default() -> Self {
        Self::new(8 * 1024 * 1024)
    }
}

#[cfg(unix)]
impl StackAllocator for Segmented {
    type Stack = MappedStack;

    fn allocate(&mut self, size: usize) -> io::Result<MappedStack> {
        let stack = MappedStack::new(size.max(self.max_size), 1, true)?;
        log::trace!("reserved segmented stack of {} bytes", stack.size());
        Ok(stack)
    }
}

/// Rounds `size` up to a multiple of `page_size`, which must be a power of two.
fn page_round_up(size: usize, page_size: usize) -> io::Result<usize> {
    size.checked_add(page_size - 1)
        .map(|size| size & !(page_size - 1))
        .ok_or_else(size_overflow)
}

fn size_overflow() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        "integer overflow while calculating stack size",
    )
}

#[test]
fn page_rounding() {
    assert_eq!(page_round_up(1, 4096).unwrap(), 4096);
    assert_eq!(page_round_up(4096, 4096).unwrap(), 4096);
    assert_eq!(page_round_up(4097, 4096).unwrap(), 8192);
    assert!(page_round_up(usize::MAX, 4096).is_err());
}

#[test]
fn assert_send_sync() {
    fn send<T: Send>() {}
    fn sync<T: Sync>() {}
    send::<MappedStack>();
    sync::<MappedStack>();
}
