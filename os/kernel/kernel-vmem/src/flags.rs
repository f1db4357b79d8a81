bitflags::bitflags! {
    /// Architecture-neutral permissions of a single mapping.
    ///
    /// Backends translate these into their native entry layout; on `x86_64`
    /// the absence of [`EXEC`](Self::EXEC) sets the no-execute bit.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct VmmFlags: u32 {
        const PRESENT = 1 << 0;
        /// Writable.
        const RW = 1 << 1;
        /// Executable.
        const EXEC = 1 << 2;
        /// Accessible from user mode.
        const USER = 1 << 3;
        const RWX = Self::RW.bits() | Self::EXEC.bits();
    }
}
