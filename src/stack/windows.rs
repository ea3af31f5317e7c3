//! Here's an overview of what a coroutine stack looks like on Windows:
//!
//! ```text
//! +------------------+  <- TEB.StackBase
//! |                  |
//! ~ Used stack space ~  [MEM_COMMIT + PAGE_READWRITE]
//! |                  |
//! +------------------+  <- TEB.StackLimit
//! | Soft guard page  |  [MEM_COMMIT + PAGE_READWRITE + PAGE_GUARD]
//! +------------------+
//! |                  |
//! ~ Stack guarantee  ~  [MEM_COMMIT + PAGE_READWRITE + PAGE_GUARD]
//! |                  |
//! +------------------+
//! |                  |
//! ~ Reserved stack   ~  [MEM_RESERVE]
//! |                  |
//! +------------------+
//! | Hard guard pages |  [MEM_RESERVE]
//! +------------------+  <- TEB.DeallocationStack
//! ```
//!
//! Windows only commits the top of a stack and moves the soft guard page down
//! as the stack grows, so every stack here is growable up to its reserved
//! size. The hard guard region at the bottom is never committed and catches
//! overflows which the kernel could not turn into a stack overflow exception.
//!
//! The "stack guarantee" is the space kept committed below the guard page for
//! the stack overflow handler, as set by `SetThreadStackGuarantee`.

use std::io::{Error, Result};
use std::ptr;

use scopeguard::ScopeGuard;

use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_GUARD, PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows_sys::Win32::System::Threading::SetThreadStackGuarantee;

use super::{page_round_up, size_overflow, Stack, StackPointer, StackTebFields, MIN_STACK_SIZE};

pub(super) fn os_page_size() -> usize {
    unsafe {
        let mut sysinfo: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut sysinfo);
        assert!(sysinfo.dwPageSize.is_power_of_two());
        sysinfo.dwPageSize as usize
    }
}

fn get_thread_stack_guarantee(page_size: usize) -> Result<usize> {
    // Passing a value of 0 will just query the existing value.
    let mut stack_guarantee = 0;
    unsafe {
        SetThreadStackGuarantee(&mut stack_guarantee);
    }

    // At a bare minimum we need to reserve 1 page for the stack overflow
    // handler.
    page_round_up((stack_guarantee as usize).max(page_size), page_size)
}

fn soft_guard_size(page_size: usize) -> usize {
    if cfg!(target_pointer_width = "64") {
        2 * page_size
    } else {
        page_size
    }
}

/// Stack memory obtained with `VirtualAlloc`, committed on demand and with
/// reserved hard guard pages at its lowest addresses.
#[derive(Debug)]
pub struct MappedStack {
    base: StackPointer,
    limit: usize,
    deallocation_stack: StackPointer,
    stack_guarantee: usize,
    usable_len: usize,
    guard_len: usize,
}

impl MappedStack {
    /// Reserves a stack with at least `size` usable bytes and `guard_pages`
    /// hard guard pages. Windows stacks are always committed lazily, so
    /// `_lazy` has no further effect.
    pub(crate) fn new(size: usize, guard_pages: usize, _lazy: bool) -> Result<Self> {
        // Apply minimum stack size.
        let size = size.max(MIN_STACK_SIZE);

        // Calculate how many extra pages we need to add for the various guard
        // pages:
        // - 1 or 2 soft guard pages to catch the fault.
        // - N pages for the thread stack guarantee.
        // - the hard guard pages at the end of the stack.
        let page_size = os_page_size();
        let soft_guard = soft_guard_size(page_size);
        let stack_guarantee = get_thread_stack_guarantee(page_size)?;
        let guard_len = guard_pages
            .max(1)
            .checked_mul(page_size)
            .ok_or_else(size_overflow)?;
        let usable_len = page_round_up(size, page_size)?;
        let min_commit = page_round_up(MIN_STACK_SIZE, page_size)?;
        let alloc_len = usable_len
            .checked_add(soft_guard + stack_guarantee)
            .and_then(|len| len.checked_add(guard_len))
            .ok_or_else(size_overflow)?;

        unsafe {
            // Reserve virtual memory for the stack.
            let alloc_base = VirtualAlloc(ptr::null(), alloc_len, MEM_RESERVE, PAGE_READWRITE);
            if alloc_base.is_null() {
                return Err(Error::last_os_error());
            }

            // Release the reservation again if `out` cannot be built.
            let reservation = scopeguard::guard(alloc_base, |alloc_base| {
                VirtualFree(alloc_base, 0, MEM_RELEASE);
            });
            let alloc_top = (alloc_base as usize)
                .checked_add(alloc_len)
                .ok_or_else(size_overflow)?;
            let limit = alloc_top - min_commit;
            let base = StackPointer::new(alloc_top).ok_or_else(size_overflow)?;
            let deallocation_stack =
                StackPointer::new(alloc_base as usize).ok_or_else(size_overflow)?;
            ScopeGuard::into_inner(reservation);

            // Create the result here. If the later VirtualAlloc calls fail then
            // this will be dropped and the memory will be released.
            let out = Self {
                base,
                limit,
                deallocation_stack,
                stack_guarantee,
                usable_len,
                guard_len,
            };

            // Commit the first MIN_STACK_SIZE bytes of the stack.
            if VirtualAlloc(limit as *mut _, alloc_top - limit, MEM_COMMIT, PAGE_READWRITE)
                .is_null()
            {
                return Err(Error::last_os_error());
            }

            // Commit the soft guard pages and the stack guarantee.
            let stack_guard_size = soft_guard + stack_guarantee;
            if VirtualAlloc(
                (limit - stack_guard_size) as *mut _,
                stack_guard_size,
                MEM_COMMIT,
                PAGE_READWRITE | PAGE_GUARD,
            )
            .is_null()
            {
                return Err(Error::last_os_error());
            }

            Ok(out)
        }
    }

    /// Number of usable bytes, excluding guard pages.
    pub fn size(&self) -> usize {
        self.usable_len
    }

    /// Number of bytes in the hard guard region.
    pub fn guard_size(&self) -> usize {
        self.guard_len
    }
}

impl Drop for MappedStack {
    fn drop(&mut self) {
        unsafe {
            let alloc_base = self.deallocation_stack.get() as *mut _;
            let ret = VirtualFree(alloc_base, 0, MEM_RELEASE);
            debug_assert!(ret != 0);
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
        self.deallocation_stack
    }

    #[inline]
    fn teb_fields(&self) -> StackTebFields {
        StackTebFields {
            StackBase: self.base.get(),
            StackLimit: self.limit,
            DeallocationStack: self.deallocation_stack.get(),
            GuaranteedStackBytes: self.stack_guarantee,
        }
    }

    #[inline]
    fn update_teb_fields(&mut self, stack_limit: usize, guaranteed_stack_bytes: usize) {
        self.limit = stack_limit;
        self.stack_guarantee = guaranteed_stack_bytes;
    }
}
