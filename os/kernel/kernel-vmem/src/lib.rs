//! # Page-Table Backends
//!
//! Architecture-specific page-table management behind one architecture-neutral
//! contract, [`PagingBackend`]. A backend owns the in-memory representation of
//! an address space: it walks the levels, materializes missing intermediate
//! tables on demand, and writes or clears leaf mappings.
//!
//! ## Seams
//!
//! A backend never allocates memory or touches hardware on its own. It is
//! handed three collaborators:
//!
//! | Trait | Provides | Kernel implementation |
//! |-------|----------|-----------------------|
//! | [`FrameAlloc`] | Zeroable 4 KiB frames for new table levels, and their release | the bitmap frame allocator |
//! | [`PhysMapper`] | `physical → virtual` translation to touch table memory | the higher-half direct map |
//! | [`Mmu`] | Activating a root table and invalidating a TLB entry | `CR3` and `invlpg` on `x86_64` |
//!
//! ## Dual addresses
//!
//! Every table lives in a physical frame and is touched through its HHDM
//! alias. Entries always store the **physical** frame number; the CPU is only
//! ever given the **physical** address of a root table. [`RootTable`] carries
//! both names so neither has to be recomputed by hand.
//!
//! ## Lazy intermediate levels
//!
//! ```text
//!  map(va) ─► root[i4] ──absent──► alloc zeroed PDPT, link P|RW|US
//!                │present
//!                ▼
//!             PDPT[i3] ──absent──► alloc zeroed PD,   link P|RW|US
//!                │
//!                ▼
//!              PD[i2]  ──absent──► alloc zeroed PT,   link P|RW|US
//!                │
//!                ▼
//!              PT[i1]  ◄── frame number + leaf permissions from VmmFlags
//! ```
//!
//! Intermediate levels are always maximally permissive; the effective
//! protection of a page is decided by its leaf entry alone.
//!
//! ## Architectures
//!
//! - [`arch::x86_64`]: the four-level reference implementation.
//! - [`arch::riscv64`], [`arch::aarch64`]: stubs that honor the contract for
//!   table lifetime but reject mapping operations with
//!   [`PagingError::Unsupported`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod arch;
mod error;
mod flags;

#[cfg(test)]
mod test_support;

pub use error::PagingError;
pub use flags::VmmFlags;

use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};

/// Source of physical frames for new page-table levels.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame. The contents are unspecified.
    fn alloc_4k(&mut self) -> Option<PhysicalFrame>;

    /// Return one 4 KiB frame.
    ///
    /// # Safety
    /// `frame` must have been handed out by this allocator and must no longer
    /// be referenced by any live page table or pointer.
    unsafe fn free_4k(&mut self, frame: PhysicalFrame);
}

/// Translation from physical addresses to addresses the kernel can dereference.
pub trait PhysMapper {
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress;

    /// View the physical memory at `pa` as a `T`.
    ///
    /// # Safety
    /// - `pa` must be mapped by this mapper and valid for reads and writes of `T`.
    /// - No other reference to the same memory may be alive while the returned
    ///   one is used.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        // SAFETY: upheld by the caller.
        unsafe { &mut *self.phys_to_virt(pa).as_mut_ptr::<T>() }
    }

    /// Fill `len` bytes of physical memory starting at `pa` with `byte`.
    ///
    /// # Safety
    /// The whole range must be mapped and not in use by anyone else.
    unsafe fn fill(&self, pa: PhysicalAddress, byte: u8, len: usize) {
        // SAFETY: upheld by the caller.
        unsafe { core::ptr::write_bytes(self.phys_to_virt(pa).as_mut_ptr::<u8>(), byte, len) }
    }
}

/// Privileged per-CPU translation control.
pub trait Mmu {
    /// Make the table rooted at `root` the active address space of this CPU.
    ///
    /// # Safety
    /// The table must map the currently executing code, the current stack and
    /// the direct map; otherwise the next instruction fetch faults.
    unsafe fn activate(&self, root: PhysicalFrame);

    /// Drop any cached translation for the page containing `va` on this CPU.
    fn invalidate_page(&self, va: VirtualAddress);
}

/// Handle to the top-level table of one address space.
///
/// Carries both the physical frame (what the CPU and parent entries see) and
/// its HHDM alias (what the kernel dereferences).
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct RootTable {
    frame: PhysicalFrame,
    hhdm: VirtualAddress,
}

impl RootTable {
    #[must_use]
    pub const fn new(frame: PhysicalFrame, hhdm: VirtualAddress) -> Self {
        Self { frame, hhdm }
    }

    #[must_use]
    pub const fn frame(self) -> PhysicalFrame {
        self.frame
    }

    /// Raw physical address, as loaded into the translation base register.
    #[must_use]
    pub const fn physical(self) -> PhysicalAddress {
        self.frame.base()
    }

    /// Directly dereferenceable alias of the table.
    #[must_use]
    pub const fn hhdm(self) -> VirtualAddress {
        self.hhdm
    }
}

impl fmt::Debug for RootTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootTable({:?} @ {:?})", self.frame.base(), self.hhdm)
    }
}

/// Architecture-specific page-table operations.
///
/// Every operation that may need a new table level takes the frame allocator
/// explicitly; lookups that must never allocate ([`translate`](Self::translate))
/// do not.
pub trait PagingBackend {
    /// Allocate and zero a top-level table.
    ///
    /// # Errors
    /// [`PagingError::OutOfMemory`] if no frame is available.
    fn new_pt<A: FrameAlloc + ?Sized>(&self, alloc: &mut A) -> Result<RootTable, PagingError>;

    /// Free every lower-half leaf frame and table level reachable from `pt`,
    /// then `pt` itself. Upper-half (shared kernel) subtrees are left alone.
    ///
    /// # Safety
    /// `pt` must not be active on any CPU and must not be used afterwards.
    unsafe fn destroy_pt<A: FrameAlloc + ?Sized>(&self, alloc: &mut A, pt: RootTable);

    /// Install `pt` as the active address space on this CPU.
    ///
    /// # Safety
    /// See [`Mmu::activate`].
    unsafe fn switch(&self, pt: RootTable);

    /// Map the 4 KiB page at `va` to the frame containing `pa`.
    ///
    /// # Errors
    /// [`PagingError::OutOfMemory`] if an intermediate table cannot be allocated.
    fn map<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        pa: PhysicalAddress,
        va: VirtualAddress,
        flags: VmmFlags,
    ) -> Result<(), PagingError>;

    /// Clear the leaf entry for `va` and invalidate its cached translation.
    ///
    /// # Errors
    /// [`PagingError::OutOfMemory`] if an intermediate table cannot be allocated.
    fn unmap<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        va: VirtualAddress,
    ) -> Result<(), PagingError>;

    /// Rewrite the permissions of the leaf entry for `va`.
    ///
    /// # Errors
    /// [`PagingError::OutOfMemory`] if an intermediate table cannot be allocated.
    fn set_flags<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        pt: RootTable,
        va: VirtualAddress,
        flags: VmmFlags,
    ) -> Result<(), PagingError>;

    /// Resolve `va` to the physical address it is mapped to, without
    /// allocating. Returns `None` if any level is absent.
    fn translate(&self, pt: RootTable, va: VirtualAddress) -> Option<PhysicalAddress>;
}

/// The backend for the architecture this crate is compiled for.
#[cfg(all(target_arch = "x86_64", feature = "asm"))]
pub type NativePaging<M> = arch::x86_64::X86_64Paging<M, arch::x86_64::HardwareMmu>;

#[cfg(target_arch = "riscv64")]
pub type NativePaging<M> = arch::riscv64::Riscv64Paging<M>;

#[cfg(target_arch = "aarch64")]
pub type NativePaging<M> = arch::aarch64::Aarch64Paging<M>;

/// Construct the [`NativePaging`] backend over `mapper`.
#[cfg(all(target_arch = "x86_64", feature = "asm"))]
pub const fn native_paging<M: PhysMapper>(mapper: M) -> NativePaging<M> {
    arch::x86_64::X86_64Paging::new(mapper, arch::x86_64::HardwareMmu)
}

/// Construct the [`NativePaging`] backend over `mapper`.
#[cfg(any(target_arch = "riscv64", target_arch = "aarch64"))]
pub const fn native_paging<M: PhysMapper>(mapper: M) -> NativePaging<M> {
    arch::StubPaging::new(mapper)
}
