//! Floating-point control state which can optionally be carried across a
//! stack switch.
//!
//! The rounding mode and exception masks are thread state rather than stack
//! state, so a coroutine that changes them would otherwise leak the change
//! into whichever side it switches to.

cfg_if::cfg_if! {
    if #[cfg(any(target_arch = "x86_64", all(target_arch = "x86", target_feature = "sse")))] {
        use core::arch::asm;
        use core::ptr;

        /// Saved MXCSR register and x87 control word.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub(crate) struct FpuState {
            mxcsr: u32,
            x87_cw: u16,
        }

        impl FpuState {
            #[inline]
            pub(crate) fn save() -> Self {
                let mut state = FpuState { mxcsr: 0, x87_cw: 0 };
                unsafe {
                    asm!(
                        "stmxcsr dword ptr [{mxcsr}]",
                        "fnstcw word ptr [{x87_cw}]",
                        mxcsr = in(reg) ptr::addr_of_mut!(state.mxcsr),
                        x87_cw = in(reg) ptr::addr_of_mut!(state.x87_cw),
                        options(nostack, preserves_flags),
                    );
                }
                state
            }

            #[inline]
            pub(crate) fn restore(&self) {
                unsafe {
                    asm!(
                        "ldmxcsr dword ptr [{mxcsr}]",
                        "fldcw word ptr [{x87_cw}]",
                        mxcsr = in(reg) ptr::addr_of!(self.mxcsr),
                        x87_cw = in(reg) ptr::addr_of!(self.x87_cw),
                        options(nostack, preserves_flags, readonly),
                    );
                }
            }
        }
    } else if #[cfg(target_arch = "aarch64")] {
        use core::arch::asm;

        /// Saved FPCR register.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub(crate) struct FpuState {
            fpcr: u64,
        }

        impl FpuState {
            #[inline]
            pub(crate) fn save() -> Self {
                let fpcr: u64;
                unsafe {
                    asm!("mrs {}, fpcr", out(reg) fpcr, options(nomem, nostack, preserves_flags));
                }
                FpuState { fpcr }
            }

            #[inline]
            pub(crate) fn restore(&self) {
                unsafe {
                    asm!("msr fpcr, {}", in(reg) self.fpcr, options(nomem, nostack, preserves_flags));
                }
            }
        }
    } else {
        /// No floating-point control state is tracked on this target.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub(crate) struct FpuState;

        impl FpuState {
            #[inline]
            pub(crate) fn save() -> Self {
                FpuState
            }

            #[inline]
            pub(crate) fn restore(&self) {}
        }
    }
}
