use crate::{HEAP, PMM};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull, null_mut};
use kernel_info::memory::KHEAP_GRANULE;

/// `GlobalAlloc` over the kernel heap.
///
/// Serves alignments up to [`KHEAP_GRANULE`]. Larger alignments, allocations
/// before [`kheap_init`](crate::kheap_init) and exhaustion all yield null, as
/// the `GlobalAlloc` contract expects.
#[derive(Debug, Default, Copy, Clone)]
pub struct KernelHeapAllocator;

unsafe impl GlobalAlloc for KernelHeapAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > KHEAP_GRANULE {
            return null_mut();
        }
        HEAP.try_with(|heap| PMM.with(|pmm| heap.try_alloc(pmm, layout.size())))
            .and_then(Result::ok)
            .map_or(null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // SAFETY: `ptr` was returned by `alloc` above.
        HEAP.try_with(|heap| unsafe { heap.free(ptr) });
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let p = unsafe { self.alloc(layout) };
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, layout.size()) };
        }
        p
    }
}
