//! TLB maintenance.

use kernel_memory_addresses::VirtualAddress;

/// Drop any cached translation for the page containing `va` on this CPU.
///
/// # Safety
/// Privileged instruction; must run in ring 0.
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
#[inline]
pub unsafe fn invalidate_page(va: VirtualAddress) {
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va.as_u64(), options(nostack, preserves_flags));
    }
}
