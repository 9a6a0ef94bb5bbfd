/// Kernel error numbers handed back to the trap handler and the syscall layer.
///
/// The numeric values are the kernel's `errno` ABI; user programs see them
/// unchanged.
#[repr(i32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Errno {
    /// `EUNIMP`: the request needs functionality this kernel does not have.
    Unimplemented = 2,
    /// `ENOMEM`: out of physical frames.
    NoMemory = 3,
    /// `EFAULT`: bad address, or an access the mapping does not permit.
    Fault = 6,
    /// `EINVAL`: malformed request.
    Invalid = 8,
}

impl Errno {
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<Errno> for i32 {
    fn from(value: Errno) -> Self {
        value.as_i32()
    }
}
