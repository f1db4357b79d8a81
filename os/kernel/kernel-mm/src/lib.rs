//! # Kernel Memory Management Entry Points
//!
//! Process-wide memory services for the rest of the kernel. Each subsystem of
//! `kernel-alloc` lives in its own [`GlobalSlot`], installed exactly once
//! during boot in this order:
//!
//! ```text
//! pmm_init(boot) ──► vmm_init(boot) ──► kheap_init()
//!      │                  │                  │
//!      ▼                  ▼                  ▼
//!     PMM                VMM                HEAP
//! ```
//!
//! ## Locking
//! Every entry point takes the lock of its own slot. Operations that need
//! frames additionally take the PMM lock, always last:
//!
//! - `VMM → PMM`
//! - `HEAP → PMM`
//!
//! No entry point holds two locks in any other order, and none takes the VMM
//! and heap locks together.
//!
//! ## Status codes
//! Entry points that report success as a number return [`STATUS_OK`] or
//! [`STATUS_FAILED`]. Resource exhaustion is never reported this way; it is
//! fatal.
//!
//! ## Global allocator
//! [`KernelHeapAllocator`] exposes the heap to `alloc`:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOCATOR: kernel_mm::KernelHeapAllocator = kernel_mm::KernelHeapAllocator;
//! ```

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

mod global_alloc;
mod kheap;
mod pmm;
mod vmm;

pub use global_alloc::KernelHeapAllocator;
pub use kheap::{kfree, kheap_init, kheap_stats, kmalloc};
pub use pmm::{pmm_alloc, pmm_free, pmm_free_frames, pmm_init};
pub use vmm::{
    KernelPaging, vmm_destroy_pt, vmm_init, vmm_kernel_pt, vmm_map, vmm_map_range, vmm_new_pt,
    vmm_set_flags, vmm_switch, vmm_translate, vmm_unmap,
};

pub use kernel_alloc::{FrameRange, HeapStats};
pub use kernel_vmem::{RootTable, VmmFlags};

use core::fmt;
use kernel_alloc::{BitmapFrameAllocator, KernelHeap, Vmm};
use kernel_sync::GlobalSlot;

pub const STATUS_OK: i32 = 0;
pub const STATUS_FAILED: i32 = -1;

static PMM: GlobalSlot<BitmapFrameAllocator> = GlobalSlot::new("PMM");
static VMM: GlobalSlot<Vmm<KernelPaging>> = GlobalSlot::new("VMM");
static HEAP: GlobalSlot<KernelHeap> = GlobalSlot::new("kernel heap");

#[cold]
#[track_caller]
fn fatal(subsystem: &str, err: &dyn fmt::Display) -> ! {
    log::error!("{subsystem}: {err}");
    panic!("{subsystem}: {err}");
}

/// Map `Result<(), E>` onto the status convention.
const fn status<E>(result: &Result<(), E>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(_) => STATUS_FAILED,
    }
}

/// Install `value` into `slot`, halting if boot code ran a stage twice.
fn install<T>(slot: &GlobalSlot<T>, subsystem: &str, value: T) {
    if slot.install(value).is_err() {
        fatal(subsystem, &format_args!("{} initialized twice", slot.name()));
    }
}

#[cfg(test)]
mod tests;
