//! # Kernel Boot Information

use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Kind of a physical memory-map entry.
///
/// The discriminants are the stable integer encoding used at the boot
/// protocol boundary.
#[repr(u64)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoryMapEntryType {
    Unknown = 0,
    /// Free RAM, available to the frame allocator.
    Usable = 1,
    Reserved = 2,
    AcpiReclaimable = 3,
    AcpiNvs = 4,
    BadMemory = 5,
    BootloaderReclaimable = 6,
    /// The kernel image and any loaded modules.
    KernelAndModules = 7,
    Framebuffer = 8,
}

impl MemoryMapEntryType {
    /// Decode the boot protocol's integer encoding. Unrecognized values
    /// become [`Unknown`](Self::Unknown).
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        match raw {
            1 => Self::Usable,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::BadMemory,
            6 => Self::BootloaderReclaimable,
            7 => Self::KernelAndModules,
            8 => Self::Framebuffer,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self as u64
    }

    /// Human-readable name, used when dumping the memory map.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Usable => "Usable",
            Self::Reserved => "Reserved",
            Self::AcpiReclaimable => "ACPI Reclaimable",
            Self::AcpiNvs => "ACPI NVS",
            Self::BadMemory => "Bad Memory",
            Self::BootloaderReclaimable => "Bootloader Reclaimable",
            Self::KernelAndModules => "Kernel and Modules",
            Self::Framebuffer => "Framebuffer",
        }
    }
}

impl fmt::Display for MemoryMapEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{base, length, type}` record of the physical memory map.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryMapEntry {
    pub base: PhysicalAddress,
    /// Length in bytes.
    pub length: u64,
    pub kind: MemoryMapEntryType,
}

impl MemoryMapEntry {
    #[must_use]
    pub const fn new(base: PhysicalAddress, length: u64, kind: MemoryMapEntryType) -> Self {
        Self { base, length, kind }
    }

    /// One past the last byte of the entry, clamped to the top of the
    /// physical address space.
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64().saturating_add(self.length))
    }

    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.kind, MemoryMapEntryType::Usable)
    }
}

/// Firmware the bootloader was started from.
#[repr(u64)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FirmwareType {
    #[default]
    Unknown = 0,
    X86Bios = 1,
    Uefi32 = 2,
    Uefi64 = 3,
}

/// Read-only view of everything the bootloader hands to the memory manager.
///
/// All queries return by value and must be stable for the lifetime of the
/// kernel; the memory manager reads the map only during initialization.
pub trait BootInfo {
    /// Whether the bootloader understands the protocol revision we requested.
    fn bootloader_supported(&self) -> bool;

    fn bootloader_name(&self) -> &str;

    fn bootloader_version(&self) -> &str;

    fn firmware_type(&self) -> FirmwareType;

    /// Offset of the higher-half direct map: physical `p` is at virtual `p + offset`.
    fn hhdm_offset(&self) -> u64;

    fn memmap_entry_count(&self) -> usize;

    /// Fetch entry `index`.
    ///
    /// # Panics
    /// Implementations must treat an out-of-bounds index as a fatal assertion.
    fn memmap_entry(&self, index: usize) -> MemoryMapEntry;

    fn kernel_physical_base(&self) -> PhysicalAddress;

    fn kernel_virtual_base(&self) -> VirtualAddress;

    /// Size of the loaded kernel image in bytes.
    fn kernel_size(&self) -> u64;

    /// Iterate over all memory-map entries in order.
    fn memmap_entries(&self) -> MemoryMapEntries<'_, Self>
    where
        Self: Sized,
    {
        MemoryMapEntries {
            info: self,
            next: 0,
        }
    }
}

/// Iterator returned by [`BootInfo::memmap_entries`].
pub struct MemoryMapEntries<'a, B: BootInfo> {
    info: &'a B,
    next: usize,
}

impl<B: BootInfo> Iterator for MemoryMapEntries<'_, B> {
    type Item = MemoryMapEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.info.memmap_entry_count() {
            return None;
        }
        let entry = self.info.memmap_entry(self.next);
        self.next += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.info.memmap_entry_count().saturating_sub(self.next);
        (left, Some(left))
    }
}

/// [`BootInfo`] backed by a borrowed memory-map slice.
///
/// Boot protocol glue copies the bootloader's responses into one of these
/// before handing control to the memory manager.
#[derive(Clone, Debug)]
pub struct StaticBootInfo<'a> {
    entries: &'a [MemoryMapEntry],
    hhdm_offset: u64,
    kernel_physical_base: PhysicalAddress,
    kernel_virtual_base: VirtualAddress,
    kernel_size: u64,
    bootloader_name: &'a str,
    bootloader_version: &'a str,
    firmware: FirmwareType,
    supported: bool,
}

impl<'a> StaticBootInfo<'a> {
    #[must_use]
    pub const fn new(entries: &'a [MemoryMapEntry], hhdm_offset: u64) -> Self {
        Self {
            entries,
            hhdm_offset,
            kernel_physical_base: PhysicalAddress::zero(),
            kernel_virtual_base: VirtualAddress::new(0),
            kernel_size: 0,
            bootloader_name: "",
            bootloader_version: "",
            firmware: FirmwareType::Unknown,
            supported: true,
        }
    }

    #[must_use]
    pub const fn with_kernel(
        mut self,
        physical_base: PhysicalAddress,
        virtual_base: VirtualAddress,
        size: u64,
    ) -> Self {
        self.kernel_physical_base = physical_base;
        self.kernel_virtual_base = virtual_base;
        self.kernel_size = size;
        self
    }

    #[must_use]
    pub const fn with_bootloader(
        mut self,
        name: &'a str,
        version: &'a str,
        firmware: FirmwareType,
        supported: bool,
    ) -> Self {
        self.bootloader_name = name;
        self.bootloader_version = version;
        self.firmware = firmware;
        self.supported = supported;
        self
    }
}

impl BootInfo for StaticBootInfo<'_> {
    fn bootloader_supported(&self) -> bool {
        self.supported
    }

    fn bootloader_name(&self) -> &str {
        self.bootloader_name
    }

    fn bootloader_version(&self) -> &str {
        self.bootloader_version
    }

    fn firmware_type(&self) -> FirmwareType {
        self.firmware
    }

    fn hhdm_offset(&self) -> u64 {
        self.hhdm_offset
    }

    fn memmap_entry_count(&self) -> usize {
        self.entries.len()
    }

    fn memmap_entry(&self, index: usize) -> MemoryMapEntry {
        assert!(
            index < self.entries.len(),
            "memory map index {index} out of bounds ({} entries)",
            self.entries.len()
        );
        self.entries[index]
    }

    fn kernel_physical_base(&self) -> PhysicalAddress {
        self.kernel_physical_base
    }

    fn kernel_virtual_base(&self) -> VirtualAddress {
        self.kernel_virtual_base
    }

    fn kernel_size(&self) -> u64 {
        self.kernel_size
    }
}
