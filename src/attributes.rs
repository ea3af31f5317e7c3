use crate::stack::DEFAULT_STACK_SIZE;

/// Parameters of a coroutine pair which are fixed when it is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Attributes {
    /// Requested usable stack size in bytes.
    ///
    /// Allocators round this up to a whole number of pages and never go below
    /// [`MIN_STACK_SIZE`](crate::stack::MIN_STACK_SIZE).
    pub size: usize,

    /// Whether the floating-point control state (rounding mode, exception
    /// masks) is saved and restored on every switch between the two halves.
    pub preserve_fpu: bool,
}

impl Attributes {
    /// Attributes with the given stack size and no FPU preservation.
    pub const fn new(size: usize) -> Self {
        Self {
            size,
            preserve_fpu: false,
        }
    }

    /// Sets whether the floating-point control state is preserved.
    pub fn preserve_fpu(mut self, preserve: bool) -> Self {
        self.preserve_fpu = preserve;
        self
    }
}

impl Default for Attributes {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_SIZE)
    }
}
