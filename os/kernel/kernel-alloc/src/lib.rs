//! # Kernel Memory Allocation and Virtual Memory Management
//!
//! This crate turns the bootloader's physical memory map into usable frames,
//! builds the kernel's own address space, and serves arbitrary-size kernel
//! allocations on top of both.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Kernel Heap (kheap)                 │
//! │    • First-fit, split-and-coalesce block list       │
//! │    • Grows by whole pages from the PMM              │
//! │    • Use-after-free poisoning                       │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ pages (via HHDM)
//! ┌─────────────────▼───────────────────────────────────┐
//! │         Virtual Memory Manager facade (vmm)         │
//! │    • Builds the kernel address space at boot        │
//! │    • Page-granular range mapping                    │
//! │    • Drives an arch PagingBackend (kernel-vmem)     │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ table frames
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Physical Frame Allocator (frame_alloc)       │
//! │    • One bit per tracked 4 KiB frame                │
//! │    • Bitmap stored inside usable RAM                │
//! │    • First-fit contiguous runs, frame 0 reserved    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Physical Frame Allocator ([`frame_alloc`])
//!
//! [`BitmapFrameAllocator`] tracks frames `0..N`, where `N` comes from the
//! highest end address of any usable memory-map entry. Allocation hands out a
//! [`FrameRange`], which is the only way to free through the safe API.
//!
//! ### Physical Mapper ([`phys_mapper`])
//!
//! [`HhdmPhysMapper`] is the explicit `physical ↔ HHDM` translation every
//! component uses to touch physical memory.
//!
//! ### Virtual Memory Manager ([`vmm`])
//!
//! [`Vmm`] owns the kernel's root page table and maps the memory map and the
//! kernel image at boot.
//!
//! ### Kernel Heap ([`kheap`])
//!
//! [`KernelHeap`] keeps a doubly linked, address-ordered list of block
//! headers over the pages it obtained from the PMM.
//!
//! ## Failure Model
//!
//! Every fallible operation has a `try_*` form that returns a `Result`. The
//! plain forms treat failure as fatal: they log at error level and panic,
//! which halts the machine through the kernel's panic handler. Resource
//! exhaustion is never handed back to callers of the plain forms.
//!
//! ## Concurrency
//!
//! None of the types here lock. The process-wide instances live behind
//! `kernel_sync::GlobalSlot` in `kernel-mm`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod bitmap;
pub mod frame_alloc;
pub mod kheap;
pub mod phys_mapper;
pub mod vmm;

#[cfg(test)]
mod test_support;

pub use frame_alloc::{BitmapFrameAllocator, FrameRange, PmmError};
pub use kheap::{HeapError, HeapStats, KernelHeap};
pub use phys_mapper::HhdmPhysMapper;
pub use vmm::Vmm;

use core::fmt;

/// Log and halt on an unrecoverable memory-management failure.
#[cold]
#[track_caller]
pub(crate) fn fatal(subsystem: &str, err: &dyn fmt::Display) -> ! {
    log::error!("{subsystem}: {err}");
    panic!("{subsystem}: {err}");
}
