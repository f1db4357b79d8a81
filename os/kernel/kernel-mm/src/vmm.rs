use crate::{PMM, VMM, fatal, install};
use kernel_alloc::{BitmapFrameAllocator, HhdmPhysMapper, Vmm};
use kernel_info::boot::BootInfo;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{RootTable, VmmFlags};

const SUBSYSTEM: &str = "vmm";

/// The paging backend of the running kernel.
#[cfg(not(test))]
pub type KernelPaging = kernel_vmem::NativePaging<HhdmPhysMapper>;

#[cfg(not(test))]
const fn kernel_paging(mapper: HhdmPhysMapper) -> KernelPaging {
    kernel_vmem::native_paging(mapper)
}

/// The paging backend of the running kernel.
#[cfg(test)]
pub type KernelPaging =
    kernel_vmem::arch::x86_64::X86_64Paging<HhdmPhysMapper, crate::tests::TestMmu>;

#[cfg(test)]
const fn kernel_paging(mapper: HhdmPhysMapper) -> KernelPaging {
    kernel_vmem::arch::x86_64::X86_64Paging::new(mapper, crate::tests::TestMmu)
}

/// Run `f` under the VMM lock, then the PMM lock.
fn with_vmm<R>(f: impl FnOnce(&Vmm<KernelPaging>, &mut BitmapFrameAllocator) -> R) -> R {
    VMM.with(|vmm| PMM.with(|pmm| f(vmm, pmm)))
}

/// Build and activate the kernel address space.
///
/// Returns [`STATUS_OK`](crate::STATUS_OK); every failure is fatal.
///
/// # Safety
/// See [`Vmm::try_init`]. [`pmm_init`](crate::pmm_init) must have run with
/// the same `boot`.
pub unsafe fn vmm_init<B: BootInfo>(boot: &B) -> i32 {
    let vmm = PMM.with(|pmm| {
        let paging = kernel_paging(*pmm.mapper());
        // SAFETY: forwarded to the caller.
        unsafe { Vmm::init(paging, boot, pmm) }
    });
    install(&VMM, SUBSYSTEM, vmm);
    crate::STATUS_OK
}

/// The kernel's root page table.
///
/// # Panics
/// Before [`vmm_init`] has run.
#[must_use]
pub fn vmm_kernel_pt() -> RootTable {
    VMM.try_with(|vmm| vmm.kernel_pt()).unwrap_or_else(|| {
        fatal(
            SUBSYSTEM,
            &"attempt to fetch the kernel page table before VMM initialization",
        )
    })
}

#[must_use]
pub fn vmm_new_pt() -> RootTable {
    with_vmm(|vmm, pmm| vmm.new_pt(pmm))
}

/// # Safety
/// See [`Vmm::destroy_pt`].
pub unsafe fn vmm_destroy_pt(pt: RootTable) {
    // SAFETY: forwarded to the caller.
    with_vmm(|vmm, pmm| unsafe { vmm.destroy_pt(pmm, pt) });
}

/// # Safety
/// See [`Vmm::switch`].
pub unsafe fn vmm_switch(pt: RootTable) {
    // SAFETY: forwarded to the caller.
    VMM.with(|vmm| unsafe { vmm.switch(pt) });
}

pub fn vmm_map(pt: RootTable, pa: PhysicalAddress, va: VirtualAddress, flags: VmmFlags) {
    with_vmm(|vmm, pmm| vmm.map(pmm, pt, pa, va, flags));
}

pub fn vmm_unmap(pt: RootTable, va: VirtualAddress) {
    with_vmm(|vmm, pmm| vmm.unmap(pmm, pt, va));
}

pub fn vmm_set_flags(pt: RootTable, va: VirtualAddress, flags: VmmFlags) {
    with_vmm(|vmm, pmm| vmm.set_flags(pmm, pt, va, flags));
}

/// Map `size` bytes; a trailing partial page is mapped whole.
pub fn vmm_map_range(
    pt: RootTable,
    pa: PhysicalAddress,
    va: VirtualAddress,
    size: u64,
    flags: VmmFlags,
) {
    with_vmm(|vmm, pmm| vmm.map_range(pmm, pt, pa, va, size, flags));
}

#[must_use]
pub fn vmm_translate(pt: RootTable, va: VirtualAddress) -> Option<PhysicalAddress> {
    VMM.with(|vmm| vmm.translate(pt, va))
}
