//! # x86-64 Four-Level Paging
//!
//! The reference backend. A virtual address is split into four 9-bit table
//! indices and a 12-bit page offset:
//!
//! ```text
//!  63      48 47     39 38     30 29     21 20     12 11          0
//! ┌──────────┬─────────┬─────────┬─────────┬─────────┬─────────────┐
//! │ sign ext │  PML4   │  PDPT   │   PD    │   PT    │   offset    │
//! └──────────┴─────────┴─────────┴─────────┴─────────┴─────────────┘
//! ```
//!
//! - [`PageEntry`]: one 64-bit entry, identical layout at every level.
//! - [`PageTable`]: 512 entries, 4 KiB aligned.
//! - [`X86_64Paging`]: the [`PagingBackend`](crate::PagingBackend) implementation.
//! - [`HardwareMmu`]: `CR3` loads and `invlpg`.
//!
//! Large pages are not used; the page-size bit is cleared on every leaf write.

mod entry;
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
mod mmu;
mod paging;
mod table;

pub use entry::PageEntry;
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
pub use mmu::HardwareMmu;
pub use paging::X86_64Paging;
pub use table::{ENTRIES, Level, PageTable, TableIndex, TableIndices};
