use crate::{HEAP, PMM, install};
use core::ptr::NonNull;
use kernel_alloc::{HeapStats, KernelHeap};

/// Set up the kernel heap.
///
/// Returns [`STATUS_OK`](crate::STATUS_OK); every failure is fatal.
pub fn kheap_init() -> i32 {
    let heap = PMM.with(KernelHeap::init);
    install(&HEAP, "kheap", heap);
    crate::STATUS_OK
}

/// Allocate `size` bytes, 16-byte aligned. Exhaustion is fatal.
pub fn kmalloc(size: usize) -> NonNull<u8> {
    HEAP.with(|heap| PMM.with(|pmm| heap.alloc(pmm, size)))
}

/// Release memory obtained from [`kmalloc`]. Null is ignored.
///
/// # Safety
/// `ptr` must be null or a pointer returned by [`kmalloc`].
pub unsafe fn kfree(ptr: *mut u8) {
    // SAFETY: forwarded to the caller.
    HEAP.with(|heap| unsafe { heap.free(ptr) });
}

#[must_use]
pub fn kheap_stats() -> HeapStats {
    HEAP.with(|heap| heap.stats())
}
