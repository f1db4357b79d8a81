//! # Kernel Boot Information and Memory Layout
//!
//! This crate is the memory manager's window onto the boot environment. It
//! defines the read-only contract a boot protocol must satisfy so that the
//! physical frame allocator, the virtual memory manager and the kernel heap
//! can be brought up, and the compile-time constants those subsystems share.
//!
//! ## Overview
//!
//! The memory manager never talks to the bootloader directly. Everything it
//! needs is queried by value through the [`BootInfo`](boot::BootInfo) trait:
//!
//! * **Compatibility**: whether the bootloader speaks the protocol revision we expect
//! * **HHDM offset**: where all of physical memory is mapped in the higher half
//! * **Memory map**: `{base, length, type}` entries describing physical RAM
//! * **Kernel image**: physical load base, virtual link base and image size
//!
//! ## Architecture
//!
//! ### Boot Information ([`boot`])
//! * [`BootInfo`](boot::BootInfo): provider trait implemented by the boot protocol glue
//! * [`MemoryMapEntry`](boot::MemoryMapEntry) and [`MemoryMapEntryType`](boot::MemoryMapEntryType)
//! * [`StaticBootInfo`](boot::StaticBootInfo): a slice-backed provider for early boot and tests
//!
//! ### Memory Layout ([`memory`])
//! * Page and heap granules
//! * Initial heap size
//! * The split between per-process (lower half) and shared kernel (upper half)
//!   top-level page-table entries
//!
//! ## Boot Flow
//!
//! ```text
//! ┌────────────┐   memory map    ┌─────┐  frames  ┌─────┐  pages  ┌───────┐
//! │ BootInfo   ├────────────────►│ PMM ├─────────►│ VMM │         │ kheap │
//! │ (provider) │  HHDM, kernel   └──┬──┘          └─────┘         └───┬───┘
//! └────────────┘  bases ──────────► │ ◄──────────────────────────────┘
//!                                   └── pages for heap init / extension
//! ```
//!
//! ## Example
//!
//! ```rust
//! use kernel_info::boot::{BootInfo, MemoryMapEntry, MemoryMapEntryType, StaticBootInfo};
//! use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
//!
//! let map = [
//!     MemoryMapEntry::new(PhysicalAddress::new(0), 0x9_F000, MemoryMapEntryType::Usable),
//!     MemoryMapEntry::new(PhysicalAddress::new(0x10_0000), 0x20_0000, MemoryMapEntryType::KernelAndModules),
//! ];
//! let info = StaticBootInfo::new(&map, 0xFFFF_8000_0000_0000)
//!     .with_kernel(PhysicalAddress::new(0x10_0000), VirtualAddress::new(0xFFFF_FFFF_8000_0000), 0x20_0000);
//!
//! assert_eq!(info.memmap_entry_count(), 2);
//! assert_eq!(info.memmap_entry(1).kind.as_str(), "Kernel and Modules");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
