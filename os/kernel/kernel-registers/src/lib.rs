//! # Typed `X86_64` Paging Registers
//!
//! The two privileged operations the `x86_64` page-table backend needs from the
//! CPU: installing a new top-level table in `CR3`, and dropping a single stale
//! translation from the TLB.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr3")]
pub mod cr3;

pub mod tlb;

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn store_unsafe(self);
}
