//! # Memory Layout

/// Size of a physical frame and of a virtual page.
pub const PAGE_SIZE: u64 = kernel_memory_addresses::PAGE_SIZE;

/// Number of pages the kernel heap requests from the frame allocator at init.
pub const KHEAP_INIT_PAGES: u64 = 16;

/// Every heap allocation size is rounded up to this many bytes.
pub const KHEAP_GRANULE: usize = 16;

/// Byte pattern written over freed frames and freed heap payloads.
pub const POISON_BYTE: u8 = 0xFF;

/// Number of entries in a top-level page table.
pub const TOP_LEVEL_ENTRIES: usize = 512;

/// Top-level entries `0..LOWER_HALF_ENTRIES` describe the per-address-space
/// lower half. The remaining entries are the kernel's shared upper half.
pub const LOWER_HALF_ENTRIES: usize = TOP_LEVEL_ENTRIES / 2;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(KHEAP_GRANULE.is_power_of_two());
    assert!(KHEAP_INIT_PAGES > 0);
    assert!(LOWER_HALF_ENTRIES == 256);
};
