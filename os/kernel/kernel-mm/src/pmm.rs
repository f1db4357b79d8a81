use crate::{PMM, fatal, install, status};
use kernel_alloc::{BitmapFrameAllocator, FrameRange};
use kernel_info::boot::BootInfo;

const SUBSYSTEM: &str = "pmm";

/// Build the frame allocator from the boot memory map.
///
/// Returns [`STATUS_OK`](crate::STATUS_OK); every failure is fatal.
///
/// # Safety
/// See [`BitmapFrameAllocator::try_init`].
pub unsafe fn pmm_init<B: BootInfo>(boot: &B) -> i32 {
    if !boot.bootloader_supported() {
        fatal(SUBSYSTEM, &"bootloader does not support the requested boot protocol");
    }
    // SAFETY: forwarded to the caller.
    let pmm = unsafe { BitmapFrameAllocator::init(boot) };
    install(&PMM, SUBSYSTEM, pmm);
    crate::STATUS_OK
}

/// Allocate `pages` contiguous frames. Exhaustion is fatal.
pub fn pmm_alloc(pages: u64) -> FrameRange {
    PMM.with(|pmm| pmm.alloc(pages))
}

/// Release frames obtained from [`pmm_alloc`].
///
/// Returns [`STATUS_FAILED`](crate::STATUS_FAILED) if the frames were not
/// allocated; nothing is changed in that case.
pub fn pmm_free(range: FrameRange) -> i32 {
    status(&PMM.with(|pmm| pmm.free(range)))
}

#[must_use]
pub fn pmm_free_frames() -> u64 {
    PMM.with(|pmm| pmm.free_frames())
}
