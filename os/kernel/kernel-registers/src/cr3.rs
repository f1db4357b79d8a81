#[cfg(all(feature = "asm", target_arch = "x86_64"))]
use crate::StoreRegisterUnsafe;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame};

/// CR3: Page-Map Level-4 Base Register (IA-32e, PCID disabled).
///
/// Holds the **physical** frame of the active top-level page table. Writing
/// it switches address spaces and flushes all non-global TLB entries.
#[bitfield(u64)]
pub struct Cr3 {
    /// Bits 0–2: reserved (must be 0).
    #[bits(3)]
    pub reserved0: u8,

    /// Bit 3: PWT, page-level write-through for top-level table accesses.
    pub pwt: bool,

    /// Bit 4: PCD, page-level cache disable for top-level table accesses.
    pub pcd: bool,

    /// Bits 5–11: reserved (must be 0 when written).
    #[bits(7)]
    pub reserved1: u8,

    /// Bits 12–51: frame number of the top-level table.
    #[bits(40)]
    root_frame: u64,

    /// Bits 52–63: reserved.
    #[bits(12)]
    pub reserved2: u16,
}

impl Cr3 {
    /// Build a CR3 value that activates the table in `root`, with caching enabled.
    #[must_use]
    pub const fn from_root(root: PhysicalFrame) -> Self {
        Self::new().with_root_frame(root.index())
    }

    /// The physical frame of the top-level table.
    #[must_use]
    pub const fn root(&self) -> PhysicalFrame {
        PhysicalFrame::from_index(self.root_frame())
    }

    #[must_use]
    pub const fn root_address(&self) -> PhysicalAddress {
        self.root().base()
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}
