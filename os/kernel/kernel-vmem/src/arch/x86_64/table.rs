use super::PageEntry;
use core::ops::Range;
use kernel_memory_addresses::VirtualAddress;

/// Entries per table at every level.
pub const ENTRIES: usize = 512;

/// One of the four paging levels, top to bottom.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    Pml4,
    Pdpt,
    Pd,
    Pt,
}

impl Level {
    /// Position of this level's 9 index bits in a virtual address.
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::Pml4 => 39,
            Self::Pdpt => 30,
            Self::Pd => 21,
            Self::Pt => 12,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pml4 => "PML4",
            Self::Pdpt => "PDPT",
            Self::Pd => "PD",
            Self::Pt => "PT",
        }
    }
}

/// Index into a table at some level. Always `< 512`.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// Extract the index for `level` from `va`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn of(va: VirtualAddress, level: Level) -> Self {
        Self(((va.as_u64() >> level.shift()) & 0x1FF) as u16)
    }

    /// ### Debug assertions
    /// - Asserts `v < 512` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 512);
        Self(v & 0x1FF)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// The four table indices of one virtual address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableIndices {
    pub pml4: TableIndex,
    pub pdpt: TableIndex,
    pub pd: TableIndex,
    pub pt: TableIndex,
}

impl TableIndices {
    #[must_use]
    pub const fn split(va: VirtualAddress) -> Self {
        Self {
            pml4: TableIndex::of(va, Level::Pml4),
            pdpt: TableIndex::of(va, Level::Pdpt),
            pd: TableIndex::of(va, Level::Pd),
            pt: TableIndex::of(va, Level::Pt),
        }
    }
}

/// A page table of any level: 512 entries, 4 KiB aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; ENTRIES],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageEntry::zero(); ENTRIES],
        }
    }

    /// Mark every entry non-present.
    pub fn zero(&mut self) {
        self.entries.fill(PageEntry::zero());
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    pub fn entry_mut(&mut self, i: TableIndex) -> &mut PageEntry {
        &mut self.entries[i.as_usize()]
    }

    /// Present entries whose index falls into `range`, in index order.
    pub fn present_entries(&self, range: Range<usize>) -> impl Iterator<Item = PageEntry> + '_ {
        self.entries[range].iter().copied().filter(PageEntry::present)
    }
}
