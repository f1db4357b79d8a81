use crate::{PAGE_SHIFT, PAGE_SIZE, PhysicalAddress};
use core::fmt;

/// A 4 KiB physical frame.
///
/// Frames are identified by their index (`physical address / 4096`), which
/// is also their bit position in the frame bitmap.
///
/// ### Invariants
/// - The base address is always 4 KiB aligned.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalFrame(u64);

impl PhysicalFrame {
    /// The frame containing `addr` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(addr: PhysicalAddress) -> Self {
        Self(addr.as_u64() & !(PAGE_SIZE - 1))
    }

    #[inline]
    #[must_use]
    pub const fn from_index(index: u64) -> Self {
        Self(index << PAGE_SHIFT)
    }

    /// Frame index, i.e. the bit number in the frame bitmap.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0)
    }

    /// The frame `n` frames after this one.
    #[inline]
    #[must_use]
    pub const fn forward(self, n: u64) -> Self {
        Self(self.0 + (n << PAGE_SHIFT))
    }
}

impl fmt::Debug for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(#{} @ 0x{:016X})", self.index(), self.0)
    }
}

impl fmt::Display for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/4K", self.0)
    }
}

impl From<PhysicalFrame> for PhysicalAddress {
    #[inline]
    fn from(frame: PhysicalFrame) -> Self {
        frame.base()
    }
}
