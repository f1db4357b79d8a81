//! # HHDM-based `PhysMapper`
//!
//! While the higher-half direct map is active, physical address `pa` is
//! reachable at virtual address `pa + offset`. The offset is handed over by
//! the bootloader, so the mapper carries it as a value instead of a constant.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::HhdmPhysMapper;
//! use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
//! use kernel_vmem::PhysMapper;
//!
//! let hhdm = HhdmPhysMapper::new(0xFFFF_8000_0000_0000);
//! let va = hhdm.phys_to_virt(PhysicalAddress::new(0x1234_0000));
//! assert_eq!(va, VirtualAddress::new(0xFFFF_8000_1234_0000));
//! ```

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for a higher-half direct map at a runtime offset.
///
/// # Safety
/// Dereferencing through this mapper is only sound for physical ranges the
/// direct map actually covers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HhdmPhysMapper {
    offset: u64,
}

impl HhdmPhysMapper {
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }
}

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(pa.as_u64().wrapping_add(self.offset))
    }
}
