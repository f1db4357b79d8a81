use super::{ENTRIES, Level, PageEntry, PageTable, TableIndices};
use crate::{FrameAlloc, Mmu, PagingBackend, PagingError, PhysMapper, RootTable, VmmFlags};
use kernel_info::memory::LOWER_HALF_ENTRIES;
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};
use log::trace;

/// Four-level x86-64 paging over a [`PhysMapper`] and an [`Mmu`].
pub struct X86_64Paging<M, U> {
    mapper: M,
    mmu: U,
}

impl<M: PhysMapper, U: Mmu> X86_64Paging<M, U> {
    pub const fn new(mapper: M, mmu: U) -> Self {
        Self { mapper, mmu }
    }

    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// View the table stored in `frame` through the mapper.
    ///
    /// # Safety
    /// `frame` must hold a page table reachable from a table we were handed,
    /// and no other reference to it may be alive.
    unsafe fn table<'t>(&self, frame: PhysicalFrame) -> &'t mut PageTable {
        unsafe { self.mapper.phys_to_mut::<PageTable>(frame.base()) }
    }

    fn alloc_table<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        level: Level,
    ) -> Result<PhysicalFrame, PagingError> {
        let frame = alloc.alloc_4k().ok_or(PagingError::OutOfMemory {
            level: level.name(),
        })?;
        // SAFETY: the frame was just handed to us and is not linked anywhere yet.
        unsafe { self.table(frame).zero() };
        Ok(frame)
    }

    /// Resolve the leaf entry for `va`, creating missing intermediate tables.
    ///
    /// # Errors
    /// [`PagingError::OutOfMemory`] if a table level cannot be allocated. Levels
    /// created before the failure stay linked.
    pub fn walk_or_create<'t, A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        va: VirtualAddress,
    ) -> Result<&'t mut PageEntry, PagingError> {
        let idx = TableIndices::split(va);
        // SAFETY: `pt` is a live root table; every frame below is linked from it.
        let mut table: &'t mut PageTable = unsafe { self.table(pt.frame()) };

        for (index, child) in [
            (idx.pml4, Level::Pdpt),
            (idx.pdpt, Level::Pd),
            (idx.pd, Level::Pt),
        ] {
            let entry = table.entry_mut(index);
            let next = if entry.present() {
                entry.frame()
            } else {
                let frame = self.alloc_table(alloc, child)?;
                *entry = PageEntry::table_link(frame);
                trace!("created {} table at {frame:?} for {va:?}", child.name());
                frame
            };
            // SAFETY: `next` is linked from a present entry of the current level.
            table = unsafe { self.table(next) };
        }

        Ok(table.entry_mut(idx.pt))
    }

    /// Read-only walk. Returns the leaf entry if every level is present.
    fn walk(&self, pt: RootTable, va: VirtualAddress) -> Option<PageEntry> {
        let idx = TableIndices::split(va);
        // SAFETY: `pt` is a live root table.
        let mut table: &PageTable = unsafe { self.table(pt.frame()) };
        for index in [idx.pml4, idx.pdpt, idx.pd] {
            let entry = table.get(index);
            if !entry.present() {
                return None;
            }
            // SAFETY: linked from a present entry.
            table = unsafe { self.table(entry.frame()) };
        }
        Some(table.get(idx.pt)).filter(PageEntry::present)
    }
}

impl<M: PhysMapper, U: Mmu> PagingBackend for X86_64Paging<M, U> {
    fn new_pt<A: FrameAlloc + ?Sized>(&self, alloc: &mut A) -> Result<RootTable, PagingError> {
        let frame = self.alloc_table(alloc, Level::Pml4)?;
        Ok(RootTable::new(frame, self.mapper.phys_to_virt(frame.base())))
    }

    unsafe fn destroy_pt<A: FrameAlloc + ?Sized>(&self, alloc: &mut A, pt: RootTable) {
        // SAFETY (all table views below): every frame is linked from a present
        // entry of `pt`, which the caller hands over exclusively.
        let root = unsafe { self.table(pt.frame()) };
        for pml4e in root.present_entries(0..LOWER_HALF_ENTRIES) {
            let pdpt = unsafe { self.table(pml4e.frame()) };
            for pdpte in pdpt.present_entries(0..ENTRIES) {
                let pd = unsafe { self.table(pdpte.frame()) };
                for pde in pd.present_entries(0..ENTRIES) {
                    let leaves = unsafe { self.table(pde.frame()) };
                    for pte in leaves.present_entries(0..ENTRIES) {
                        unsafe { alloc.free_4k(pte.frame()) };
                    }
                    unsafe { alloc.free_4k(pde.frame()) };
                }
                unsafe { alloc.free_4k(pdpte.frame()) };
            }
            unsafe { alloc.free_4k(pml4e.frame()) };
        }
        unsafe { alloc.free_4k(pt.frame()) };
    }

    unsafe fn switch(&self, pt: RootTable) {
        // SAFETY: forwarded to the caller.
        unsafe { self.mmu.activate(pt.frame()) };
    }

    fn map<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        pa: PhysicalAddress,
        va: VirtualAddress,
        flags: VmmFlags,
    ) -> Result<(), PagingError> {
        let leaf = self.walk_or_create(alloc, pt, va)?;
        leaf.set_frame(pa);
        leaf.apply_flags(flags);
        Ok(())
    }

    fn unmap<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        va: VirtualAddress,
    ) -> Result<(), PagingError> {
        let leaf = self.walk_or_create(alloc, pt, va)?;
        leaf.clear_mapping();
        self.mmu.invalidate_page(va);
        Ok(())
    }

    fn set_flags<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        va: VirtualAddress,
        flags: VmmFlags,
    ) -> Result<(), PagingError> {
        self.walk_or_create(alloc, pt, va)?.apply_flags(flags);
        Ok(())
    }

    fn translate(&self, pt: RootTable, va: VirtualAddress) -> Option<PhysicalAddress> {
        let leaf = self.walk(pt, va)?;
        Some(leaf.frame().base() + (va.as_u64() & 0xFFF))
    }
}
