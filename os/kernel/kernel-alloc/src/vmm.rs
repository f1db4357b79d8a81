//! # Virtual Memory Manager
//!
//! Architecture-neutral facade over a [`PagingBackend`]. At boot it builds the
//! kernel address space:
//!
//! 1. allocate a fresh top-level table,
//! 2. map every memory-map entry into the direct-map window
//!    (`phys → phys + hhdm`, `PRESENT | RWX`), skipping physical page 0,
//! 3. map the kernel image at its linked virtual base with the same rights,
//! 4. activate the table and keep it as the kernel's root table.
//!
//! Afterwards it serves page-granular mapping requests for any address space.
//!
//! ## Example
//! ```rust,ignore
//! use kernel_alloc::{BitmapFrameAllocator, Vmm};
//! use kernel_vmem::{VmmFlags, native_paging};
//!
//! let mut pmm = unsafe { BitmapFrameAllocator::init(&boot) };
//! let paging = native_paging(*pmm.mapper());
//! let vmm = unsafe { Vmm::init(paging, &boot, &mut pmm) };
//! vmm.map_range(&mut pmm, vmm.kernel_pt(), pa, va, 3 * 4096 + 1, VmmFlags::PRESENT | VmmFlags::RW);
//! ```

use crate::fatal;
use kernel_info::boot::BootInfo;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress, pages_for};
use kernel_vmem::{FrameAlloc, PagingBackend, PagingError, RootTable, VmmFlags};
use log::{info, trace};

const SUBSYSTEM: &str = "vmm";

#[inline]
fn or_fatal<T>(result: Result<T, PagingError>) -> T {
    result.unwrap_or_else(|e| fatal(SUBSYSTEM, &e))
}

/// Kernel address-space manager over the paging backend `B`.
pub struct Vmm<B> {
    backend: B,
    kernel_pt: RootTable,
}

impl<B: PagingBackend> Vmm<B> {
    /// Build and activate the kernel address space.
    ///
    /// # Errors
    /// Any [`PagingError`] raised while building the tables. Nothing is
    /// activated in that case.
    ///
    /// # Safety
    /// The resulting table is activated on this CPU; the memory map and kernel
    /// bounds in `boot` must describe the running kernel truthfully.
    pub unsafe fn try_init<I: BootInfo, A: FrameAlloc + ?Sized>(
        backend: B,
        boot: &I,
        alloc: &mut A,
    ) -> Result<Self, PagingError> {
        let kernel_pt = backend.new_pt(alloc)?;
        let vmm = Self { backend, kernel_pt };
        let hhdm = boot.hhdm_offset();
        let rwx = VmmFlags::PRESENT | VmmFlags::RWX;

        trace!("Mapping memmap entries...");
        for entry in boot.memmap_entries() {
            let (mut base, mut length) = (entry.base.as_u64(), entry.length);
            if base == 0 {
                base += PAGE_SIZE;
                length = length.saturating_sub(PAGE_SIZE);
            }
            trace!("  {:?} +{length:#x} ({})", PhysicalAddress::new(base), entry.kind);
            vmm.try_map_range(
                alloc,
                kernel_pt,
                PhysicalAddress::new(base),
                VirtualAddress::new(base.wrapping_add(hhdm)),
                length,
                rwx,
            )?;
        }

        trace!("Mapping kernel...");
        vmm.try_map_range(
            alloc,
            kernel_pt,
            boot.kernel_physical_base(),
            boot.kernel_virtual_base(),
            boot.kernel_size(),
            rwx,
        )?;

        // SAFETY: the table maps the direct map and the kernel image; forwarded to the caller.
        unsafe { vmm.backend.switch(kernel_pt) };
        info!("VMM Initialized");
        Ok(vmm)
    }

    /// As [`try_init`](Self::try_init), halting on failure.
    ///
    /// # Safety
    /// See [`try_init`](Self::try_init).
    pub unsafe fn init<I: BootInfo, A: FrameAlloc + ?Sized>(
        backend: B,
        boot: &I,
        alloc: &mut A,
    ) -> Self {
        // SAFETY: forwarded to the caller.
        or_fatal(unsafe { Self::try_init(backend, boot, alloc) })
    }

    /// The kernel's root table, fixed at init.
    #[must_use]
    pub const fn kernel_pt(&self) -> RootTable {
        self.kernel_pt
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Allocate an empty top-level table.
    pub fn new_pt<A: FrameAlloc + ?Sized>(&self, alloc: &mut A) -> RootTable {
        or_fatal(self.backend.new_pt(alloc))
    }

    /// Tear down the lower half of `pt` and free its root.
    ///
    /// # Panics
    /// If `pt` is the kernel's root table.
    ///
    /// # Safety
    /// See [`PagingBackend::destroy_pt`].
    pub unsafe fn destroy_pt<A: FrameAlloc + ?Sized>(&self, alloc: &mut A, pt: RootTable) {
        if pt == self.kernel_pt {
            fatal(SUBSYSTEM, &"refusing to destroy the kernel page table");
        }
        // SAFETY: forwarded to the caller.
        unsafe { self.backend.destroy_pt(alloc, pt) };
    }

    /// # Safety
    /// See [`PagingBackend::switch`].
    pub unsafe fn switch(&self, pt: RootTable) {
        // SAFETY: forwarded to the caller.
        unsafe { self.backend.switch(pt) };
    }

    pub fn map<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        pa: PhysicalAddress,
        va: VirtualAddress,
        flags: VmmFlags,
    ) {
        or_fatal(self.backend.map(alloc, pt, pa, va, flags));
    }

    pub fn unmap<A: FrameAlloc + ?Sized>(&self, alloc: &mut A, pt: RootTable, va: VirtualAddress) {
        or_fatal(self.backend.unmap(alloc, pt, va));
    }

    pub fn set_flags<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        va: VirtualAddress,
        flags: VmmFlags,
    ) {
        or_fatal(self.backend.set_flags(alloc, pt, va, flags));
    }

    /// Map `size` bytes page by page. A trailing partial page is mapped whole.
    ///
    /// # Errors
    /// The first [`PagingError`] hit; earlier pages stay mapped.
    pub fn try_map_range<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        pa: PhysicalAddress,
        va: VirtualAddress,
        size: u64,
        flags: VmmFlags,
    ) -> Result<(), PagingError> {
        let pages = pages_for(size);
        for offset in (0..pages).map(|page| page * PAGE_SIZE) {
            self.backend.map(alloc, pt, pa + offset, va + offset, flags)?;
        }
        Ok(())
    }

    /// As [`try_map_range`](Self::try_map_range), halting on failure.
    pub fn map_range<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        pa: PhysicalAddress,
        va: VirtualAddress,
        size: u64,
        flags: VmmFlags,
    ) {
        or_fatal(self.try_map_range(alloc, pt, pa, va, size, flags));
    }

    #[must_use]
    pub fn translate(&self, pt: RootTable, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.backend.translate(pt, va)
    }
}
