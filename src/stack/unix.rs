use std::io::{Error, Result};
use std::ptr;

use scopeguard::ScopeGuard;

use super::{page_round_up, size_overflow, Stack, StackPointer, MIN_STACK_SIZE};

pub(super) fn os_page_size() -> usize {
    let pagesize = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    assert!(pagesize.is_power_of_two());
    pagesize
}

/// Address one past the end of a mapping, which is where the stack starts.
fn mapping_top(addr: usize, len: usize) -> Result<StackPointer> {
    addr.checked_add(len)
        .and_then(StackPointer::new)
        .ok_or_else(size_overflow)
}

fn map_flags(_lazy: bool) -> libc::c_int {
    // OpenBSD requires MAP_STACK on anything that is used as a stack.
    cfg_if::cfg_if! {
        if #[cfg(target_os = "openbsd")] {
            let flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_STACK;
        } else {
            let flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    if _lazy {
        return flags | libc::MAP_NORESERVE;
    }

    flags
}

/// Stack memory obtained with `mmap`, with inaccessible guard pages at its
/// lowest addresses.
///
/// ```text
/// +------------------+  <- base
/// |                  |
/// ~   Usable stack   ~  [PROT_READ | PROT_WRITE]
/// |                  |
/// +------------------+
/// |   Guard pages    |  [PROT_NONE]
/// +------------------+  <- limit
/// ```
#[derive(Debug)]
pub struct MappedStack {
    base: StackPointer,
    mmap_len: usize,
    guard_len: usize,
}

impl MappedStack {
    /// Maps a stack with at least `size` usable bytes and `guard_pages` guard
    /// pages. A `lazy` stack does not reserve swap space for its pages where
    /// the platform allows it.
    pub(crate) fn new(size: usize, guard_pages: usize, lazy: bool) -> Result<Self> {
        // Apply minimum stack size.
        let size = size.max(MIN_STACK_SIZE);

        let page_size = os_page_size();
        let guard_len = guard_pages
            .max(1)
            .checked_mul(page_size)
            .ok_or_else(size_overflow)?;
        let usable_len = page_round_up(size, page_size)?;
        let mmap_len = usable_len
            .checked_add(guard_len)
            .ok_or_else(size_overflow)?;

        unsafe {
            // Reserve some address space for the stack.
            let mmap = libc::mmap(
                ptr::null_mut(),
                mmap_len,
                libc::PROT_NONE,
                map_flags(lazy),
                -1,
                0,
            );
            if mmap == libc::MAP_FAILED {
                return Err(Error::last_os_error());
            }

            // Unmap again if anything below fails.
            let mapping = scopeguard::guard(mmap, |mmap| {
                libc::munmap(mmap, mmap_len);
            });
            let base = mapping_top(mmap as usize, mmap_len)?;

            // Make everything except the guard pages writable.
            if libc::mprotect(
                mmap.cast::<u8>().add(guard_len).cast(),
                usable_len,
                libc::PROT_READ | libc::PROT_WRITE,
            ) != 0
            {
                return Err(Error::last_os_error());
            }

            ScopeGuard::into_inner(mapping);
            Ok(Self {
                base,
                mmap_len,
                guard_len,
            })
        }
    }

    /// Number of usable bytes, excluding guard pages.
    pub fn size(&self) -> usize {
        self.mmap_len - self.guard_len
    }

    /// Number of bytes in the guard region.
    pub fn guard_size(&self) -> usize {
        self.guard_len
    }
}

impl Drop for MappedStack {
    fn drop(&mut self) {
        unsafe {
            let mmap = self.base.get() - self.mmap_len;
            let ret = libc::munmap(mmap as _, self.mmap_len);
            debug_assert_eq!(ret, 0);
        }
    }
}

unsafe impl Stack for MappedStack {
    #[inline]
    fn base(&self) -> StackPointer {
        self.base
    }

    #[inline]
    fn limit(&self) -> StackPointer {
        StackPointer::new(self.base.get() - self.mmap_len).unwrap()
    }
}

#[test]
fn mapping_top_overflow() {
    assert_eq!(mapping_top(4096, 4096).unwrap().get(), 8192);
    assert!(mapping_top(usize::MAX - 4095, 4096).is_err());
    assert!(mapping_top(usize::MAX, 1).is_err());
}
