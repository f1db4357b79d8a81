//! Boot-sequence test over the process-wide slots.
//!
//! The slots can be installed only once per test binary, so the whole boot
//! flow runs as one test.

use crate::*;
use crate::PMM;
use core::alloc::{GlobalAlloc, Layout};
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_info::boot::{MemoryMapEntry, MemoryMapEntryType, StaticBootInfo};
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};
use kernel_vmem::Mmu;
use std::panic;

static ACTIVE_ROOT: AtomicU64 = AtomicU64::new(0);
static INVALIDATED: AtomicU64 = AtomicU64::new(0);

/// Records the last activated root and invalidated page.
#[derive(Copy, Clone)]
pub struct TestMmu;

impl Mmu for TestMmu {
    unsafe fn activate(&self, root: PhysicalFrame) {
        ACTIVE_ROOT.store(root.base().as_u64(), Ordering::SeqCst);
    }

    fn invalidate_page(&self, va: VirtualAddress) {
        INVALIDATED.store(va.as_u64(), Ordering::SeqCst);
    }
}

#[repr(C, align(4096))]
#[derive(Clone)]
struct Frame([u8; 4096]);

const FRAMES: usize = 256;
const KERNEL_PA: u64 = 0x80000;
const KERNEL_VA: u64 = 0xFFFF_FFFF_8000_0000;

#[test]
#[allow(clippy::too_many_lines)]
fn boot_sequence_and_runtime_services() {
    let ram: &'static mut [Frame] = vec![Frame([0; 4096]); FRAMES].leak();
    let hhdm = ram.as_mut_ptr() as u64;
    let map: &'static [MemoryMapEntry] = vec![
        MemoryMapEntry::new(PhysicalAddress::zero(), KERNEL_PA, MemoryMapEntryType::Usable),
        MemoryMapEntry::new(
            PhysicalAddress::new(KERNEL_PA),
            0x4000,
            MemoryMapEntryType::KernelAndModules,
        ),
        MemoryMapEntry::new(
            PhysicalAddress::new(KERNEL_PA + 0x4000),
            (FRAMES as u64) * 4096 - KERNEL_PA - 0x4000,
            MemoryMapEntryType::Usable,
        ),
    ]
    .leak();
    let boot = StaticBootInfo::new(map, hhdm)
        .with_kernel(
            PhysicalAddress::new(KERNEL_PA),
            VirtualAddress::new(KERNEL_VA),
            0x4000,
        )
        .with_bootloader("test", "1.0", kernel_info::boot::FirmwareType::Uefi64, true);

    // Out-of-order boot is fatal.
    assert!(panic::catch_unwind(vmm_kernel_pt).is_err());
    assert!(unsafe { KernelHeapAllocator.alloc(Layout::new::<u8>()) }.is_null());

    assert_eq!(unsafe { pmm_init(&boot) }, STATUS_OK);
    let free_after_pmm = pmm_free_frames();
    assert_eq!(free_after_pmm, FRAMES as u64 - 2 - 4);

    assert_eq!(unsafe { vmm_init(&boot) }, STATUS_OK);
    let kernel_pt = vmm_kernel_pt();
    assert_eq!(ACTIVE_ROOT.load(Ordering::SeqCst), kernel_pt.physical().as_u64());
    assert_eq!(
        vmm_translate(kernel_pt, VirtualAddress::new(hhdm + 0x1234)),
        Some(PhysicalAddress::new(0x1234))
    );
    assert_eq!(
        vmm_translate(kernel_pt, VirtualAddress::new(KERNEL_VA + 0x3ABC)),
        Some(PhysicalAddress::new(KERNEL_PA + 0x3ABC))
    );
    assert_eq!(vmm_translate(kernel_pt, VirtualAddress::new(hhdm)), None);

    // Frames: alloc/free round trip and status codes.
    let before = pmm_free_frames();
    let range = pmm_alloc(3);
    assert_ne!(range.first_frame().index(), 0);
    assert_eq!(pmm_free_frames(), before - 3);
    let base = range.base();
    assert_eq!(pmm_free(range), STATUS_OK);
    assert_eq!(pmm_free_frames(), before);
    let stale = unsafe { FrameRange::from_raw(base, 3) };
    assert_eq!(pmm_free(stale), STATUS_FAILED);

    // A user address space.
    let user_pt = vmm_new_pt();
    let page = pmm_alloc(2).leak();
    let va = VirtualAddress::new(0x0000_0000_0040_0000);
    vmm_map(user_pt, page, va, VmmFlags::PRESENT | VmmFlags::RW | VmmFlags::USER);
    assert_eq!(vmm_translate(user_pt, va + 0x10), Some(page + 0x10));
    vmm_set_flags(user_pt, va, VmmFlags::PRESENT);
    assert_eq!(vmm_translate(user_pt, va), Some(page));
    vmm_unmap(user_pt, va);
    assert_eq!(INVALIDATED.load(Ordering::SeqCst), va.as_u64());
    assert_eq!(vmm_translate(user_pt, va), None);
    vmm_map_range(user_pt, page, va, 4097, VmmFlags::PRESENT);
    assert_eq!(vmm_translate(user_pt, va + 0x1000), Some(page + 0x1000));
    unsafe { vmm_switch(user_pt) };
    assert_eq!(ACTIVE_ROOT.load(Ordering::SeqCst), user_pt.physical().as_u64());
    unsafe { vmm_switch(kernel_pt) };
    unsafe { vmm_destroy_pt(user_pt) };
    assert!(!PMM.with(|pmm| pmm.is_allocated(user_pt.frame())));

    // Heap.
    assert_eq!(kheap_init(), STATUS_OK);
    let initial = kheap_stats();
    assert_eq!(initial.total_bytes, 16 * 4096);
    let a = kmalloc(24);
    let b = kmalloc(0);
    assert_eq!(a.as_ptr().addr() % 16, 0);
    assert_eq!(b.as_ptr().addr() % 16, 0);
    unsafe {
        kfree(b.as_ptr());
        kfree(a.as_ptr());
        kfree(core::ptr::null_mut());
    }
    assert_eq!(kheap_stats(), initial);

    let layout = Layout::from_size_align(100, 8).unwrap();
    let p = unsafe { KernelHeapAllocator.alloc_zeroed(layout) };
    assert!(!p.is_null());
    assert!(unsafe { core::slice::from_raw_parts(p, 100) }.iter().all(|&x| x == 0));
    unsafe { KernelHeapAllocator.dealloc(p, layout) };
    let wide = Layout::from_size_align(64, 64).unwrap();
    assert!(unsafe { KernelHeapAllocator.alloc(wide) }.is_null());
    assert_eq!(kheap_stats(), initial);

    // Every stage can be installed once only.
    assert!(panic::catch_unwind(kheap_init).is_err());
}
