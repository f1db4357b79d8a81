//! # Kernel synchronization primitives
//!
//! The memory manager's shared state (frame bitmap, kernel page table, heap
//! block list) is process-wide and mutated in place. Every public entry point
//! takes the lock of the resource it touches:
//!
//! * [`SpinLock`]: test-and-test-and-set lock with an RAII guard.
//! * [`GlobalSlot`]: a [`SpinLock`] around a value that is installed exactly
//!   once during boot and is a fatal error to touch before that.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod global_slot;
mod spin_lock;

pub use global_slot::{AlreadyInstalled, GlobalSlot};
pub use spin_lock::{SpinLock, SpinLockGuard};
