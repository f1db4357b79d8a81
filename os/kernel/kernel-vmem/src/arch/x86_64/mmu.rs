use crate::Mmu;
use kernel_memory_addresses::{PhysicalFrame, VirtualAddress};
use kernel_registers::StoreRegisterUnsafe;
use kernel_registers::cr3::Cr3;
use kernel_registers::tlb;

/// The CPU's own translation control: `mov cr3` and `invlpg`.
#[derive(Copy, Clone, Debug, Default)]
pub struct HardwareMmu;

impl Mmu for HardwareMmu {
    unsafe fn activate(&self, root: PhysicalFrame) {
        // SAFETY: the caller guarantees the table keeps the kernel mapped.
        unsafe { Cr3::from_root(root).store_unsafe() };
    }

    fn invalidate_page(&self, va: VirtualAddress) {
        // SAFETY: the memory manager only runs in ring 0.
        unsafe { tlb::invalidate_page(va) };
    }
}
