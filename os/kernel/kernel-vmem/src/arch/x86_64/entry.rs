use crate::VmmFlags;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PAGE_SHIFT, PhysicalAddress, PhysicalFrame};

/// A single x86-64 page-table entry.
///
/// The same layout is used at all four levels. An entry at the top three
/// levels links to the next table; an entry in the last level maps a page.
///
/// ### Bit layout
///
/// | Bits  | Field           | Meaning |
/// |-------|-----------------|---------|
/// | 0     | `present`       | Valid entry if set |
/// | 1     | `writable`      | Writes allowed if set |
/// | 2     | `user_access`   | User mode may access if set |
/// | 3     | `write_through` | Write-through caching |
/// | 4     | `cache_disabled`| Caching disabled |
/// | 5     | `accessed`      | Set by the CPU on access |
/// | 6     | `available_low` | Ignored by the walk we use; dirty on leaves |
/// | 7     | `large_page`    | Page size; always 0 here |
/// | 8–11  | `available`     | Free for software |
/// | 12–62 | `frame_number`  | Physical address `>> 12` |
/// | 63    | `no_execute`    | Instruction fetches fault if set |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::arch::x86_64::PageEntry;
/// # use kernel_vmem::VmmFlags;
/// # use kernel_memory_addresses::PhysicalAddress;
/// let mut e = PageEntry::zero();
/// e.set_frame(PhysicalAddress::new(0x1234_5000));
/// e.apply_flags(VmmFlags::PRESENT | VmmFlags::RW);
/// assert!(e.present() && e.writable() && e.no_execute());
/// assert_eq!(e.frame().base().as_u64(), 0x1234_5000);
/// ```
#[bitfield(u64)]
pub struct PageEntry {
    pub present: bool,
    pub writable: bool,
    pub user_access: bool,
    pub write_through: bool,
    pub cache_disabled: bool,
    pub accessed: bool,
    pub available_low: bool,
    pub large_page: bool,
    #[bits(4)]
    pub available: u8,
    #[bits(51)]
    frame_number: u64,
    pub no_execute: bool,
}

impl PageEntry {
    /// A non-present entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new()
    }

    /// An intermediate entry linking to the table in `frame`.
    ///
    /// Links are present, writable and user-accessible; the leaf decides the
    /// effective permissions.
    #[inline]
    #[must_use]
    pub const fn table_link(frame: PhysicalFrame) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
            .with_frame_number(frame.index())
    }

    /// The frame this entry points at (next table or mapped page).
    #[inline]
    #[must_use]
    pub const fn frame(self) -> PhysicalFrame {
        PhysicalFrame::from_index(self.frame_number())
    }

    /// Store the frame containing `pa`. Flags are left untouched.
    #[inline]
    pub fn set_frame(&mut self, pa: PhysicalAddress) {
        self.set_frame_number(pa.as_u64() >> PAGE_SHIFT);
    }

    /// Rewrite the permission bits from `flags` and clear the page-size bit.
    pub fn apply_flags(&mut self, flags: VmmFlags) {
        self.set_present(flags.contains(VmmFlags::PRESENT));
        self.set_writable(flags.contains(VmmFlags::RW));
        self.set_user_access(flags.contains(VmmFlags::USER));
        self.set_large_page(false);
        self.set_no_execute(!flags.contains(VmmFlags::EXEC));
    }

    /// Clear the present bit and the frame number.
    pub fn clear_mapping(&mut self) {
        self.set_present(false);
        self.set_frame_number(0);
    }
}
