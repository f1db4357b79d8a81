//! # Physical and Virtual Memory Address Types
//!
//! Strongly typed wrappers for the raw addresses the memory manager juggles.
//!
//! ## Overview
//!
//! Every physical frame is reachable under two names while the higher-half
//! direct map (HHDM) is active: its physical address, and the virtual alias
//! `physical + hhdm_offset`. Mixing the two up either writes a virtual address
//! into a page-table entry or dereferences a physical one; both are silent
//! machine-wide corruption. The types in this crate keep them apart:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A byte address in physical memory. Never dereferenced directly. |
//! | [`VirtualAddress`] | A byte address in the current address space. May be turned into a pointer. |
//! | [`PhysicalFrame`] | A 4 KiB aligned physical frame, identified by its frame index. |
//!
//! ## Alignment helpers
//!
//! [`align_up`], [`align_down`] and [`pages_for`] operate on raw `u64` byte
//! counts and are used when sizing bitmaps, heap extensions and mapping ranges.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
//! let frame = pa.frame();
//! assert_eq!(frame.base().as_u64(), 0x0000_0010_2000_0000);
//! assert_eq!(frame.index(), 0x0000_0010_2000_0000 / PAGE_SIZE);
//! assert_eq!(pages_for(PAGE_SIZE + 1), 2);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod page_size;
mod physical_address;
mod physical_frame;
mod virtual_address;

pub use page_size::{PAGE_SHIFT, PAGE_SIZE, align_down, align_up, is_page_aligned, pages_for};
pub use physical_address::PhysicalAddress;
pub use physical_frame::PhysicalFrame;
pub use virtual_address::VirtualAddress;
