use crate::{FrameAlloc, PagingBackend, PagingError, PhysMapper, RootTable, VmmFlags};
use core::marker::PhantomData;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use log::warn;

/// Names an architecture that has no page-table backend yet.
pub trait StubArch {
    const NAME: &'static str;
}

/// Backend for architectures without paging support.
///
/// Root tables are real zeroed frames so address-space lifetime bookkeeping
/// works unchanged; every mapping operation fails with
/// [`PagingError::Unsupported`].
pub struct StubPaging<M, A> {
    mapper: M,
    _arch: PhantomData<A>,
}

impl<M: PhysMapper, A: StubArch> StubPaging<M, A> {
    pub const fn new(mapper: M) -> Self {
        Self {
            mapper,
            _arch: PhantomData,
        }
    }

    const fn unsupported() -> PagingError {
        PagingError::Unsupported { arch: A::NAME }
    }
}

impl<M: PhysMapper, A: StubArch> PagingBackend for StubPaging<M, A> {
    fn new_pt<F: FrameAlloc + ?Sized>(&self, alloc: &mut F) -> Result<RootTable, PagingError> {
        let frame = alloc
            .alloc_4k()
            .ok_or(PagingError::OutOfMemory { level: "root" })?;
        // SAFETY: freshly allocated frame, exclusively ours.
        #[allow(clippy::cast_possible_truncation)]
        unsafe {
            self.mapper.fill(frame.base(), 0, PAGE_SIZE as usize);
        }
        Ok(RootTable::new(frame, self.mapper.phys_to_virt(frame.base())))
    }

    unsafe fn destroy_pt<F: FrameAlloc + ?Sized>(&self, alloc: &mut F, pt: RootTable) {
        // Nothing can have been mapped below the root.
        unsafe { alloc.free_4k(pt.frame()) };
    }

    unsafe fn switch(&self, pt: RootTable) {
        warn!("{}: cannot activate {pt:?}, paging not implemented", A::NAME);
    }

    fn map<F: FrameAlloc + ?Sized>(
        &self,
        _alloc: &mut F,
        _pt: RootTable,
        _pa: PhysicalAddress,
        _va: VirtualAddress,
        _flags: VmmFlags,
    ) -> Result<(), PagingError> {
        Err(Self::unsupported())
    }

    fn unmap<F: FrameAlloc + ?Sized>(
        &self,
        _alloc: &mut F,
        _pt: RootTable,
        _va: VirtualAddress,
    ) -> Result<(), PagingError> {
        Err(Self::unsupported())
    }

    fn set_flags<F: FrameAlloc + ?Sized>(
        &self,
        _alloc: &mut F,
        _pt: RootTable,
        _va: VirtualAddress,
        _flags: VmmFlags,
    ) -> Result<(), PagingError> {
        Err(Self::unsupported())
    }

    fn translate(&self, _pt: RootTable, _va: VirtualAddress) -> Option<PhysicalAddress> {
        None
    }
}
