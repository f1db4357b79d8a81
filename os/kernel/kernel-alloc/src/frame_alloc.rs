//! # Bitmap Physical Frame Allocator
//!
//! Tracks every 4 KiB frame from physical address 0 up to the end of the
//! highest usable memory-map entry with one bit (`1` = allocated or unusable,
//! `0` = free). The bitmap itself is stored in the first usable region that
//! can hold it and is reached through the direct map.
//!
//! ```text
//! frame:   0   1   2   3   4   5   6   7  ...
//! bit:     1   1   0   0   1   0   0   0  ...
//!          │   │           └─ allocated
//!          │   └─ bitmap storage
//!          └─ permanently reserved
//! ```
//!
//! Allocation is a first-fit scan from frame 0 on every call. Freed frames are
//! poisoned with [`POISON_BYTE`] before their bits are cleared.

use crate::bitmap::FrameBitmap;
use crate::fatal;
use crate::phys_mapper::HhdmPhysMapper;
use core::fmt;
use core::ops::Range;
use core::ptr::NonNull;
use kernel_info::boot::BootInfo;
use kernel_info::memory::{PAGE_SIZE, POISON_BYTE};
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame, align_down, align_up, pages_for};
use kernel_vmem::{FrameAlloc, PhysMapper};
use log::{debug, info, warn};

const SUBSYSTEM: &str = "pmm";

#[derive(Debug, thiserror::Error, Copy, Clone, Eq, PartialEq)]
pub enum PmmError {
    #[error("cannot allocate zero pages")]
    ZeroPages,
    #[error("out of physical memory: no run of {pages} free frames")]
    OutOfMemory { pages: u64 },
    #[error("no usable region can hold the {bytes}-byte frame bitmap")]
    NoBitmapRegion { bytes: u64 },
    #[error("memory map contains no usable memory")]
    EmptyMemoryMap,
    #[error("{frame:?} is not allocated")]
    NotAllocated { frame: PhysicalFrame },
    #[error("{frame:?} lies beyond the tracked frames")]
    OutOfRange { frame: PhysicalFrame },
    #[error("{frame:?} is permanently reserved")]
    Reserved { frame: PhysicalFrame },
}

/// A run of contiguous frames handed out by [`BitmapFrameAllocator::alloc`].
///
/// The handle is the only way to give frames back through the safe API. It
/// is deliberately neither `Copy` nor `Clone`.
#[must_use = "dropping a FrameRange leaks its frames"]
#[derive(Debug, Eq, PartialEq)]
pub struct FrameRange {
    base: PhysicalFrame,
    pages: u64,
}

impl FrameRange {
    /// Rebuild a range from a base and page count previously obtained via
    /// [`leak`](Self::leak).
    ///
    /// # Safety
    /// The frames must have been allocated as one range by the same allocator
    /// and must not be owned by any other `FrameRange`.
    pub const unsafe fn from_raw(base: PhysicalAddress, pages: u64) -> Self {
        Self {
            base: PhysicalFrame::containing(base),
            pages,
        }
    }

    /// Physical address of the first byte.
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base.base()
    }

    #[must_use]
    pub const fn first_frame(&self) -> PhysicalFrame {
        self.base
    }

    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.pages
    }

    #[must_use]
    pub const fn len_bytes(&self) -> u64 {
        self.pages * PAGE_SIZE
    }

    pub fn frames(&self) -> impl Iterator<Item = PhysicalFrame> + '_ {
        (0..self.pages).map(|i| self.base.forward(i))
    }

    /// Give up ownership without freeing. The frames stay allocated forever
    /// unless reclaimed with [`from_raw`](Self::from_raw).
    #[must_use]
    pub const fn leak(self) -> PhysicalAddress {
        self.base.base()
    }

    const fn indices(self) -> Range<u64> {
        self.base.index()..self.base.index() + self.pages
    }
}

/// Bitmap-backed physical frame allocator.
pub struct BitmapFrameAllocator {
    bitmap: FrameBitmap,
    bitmap_base: PhysicalFrame,
    bitmap_frames: u64,
    total_frames: u64,
    mapper: HhdmPhysMapper,
}

impl BitmapFrameAllocator {
    /// Build the allocator from the boot memory map.
    ///
    /// # Errors
    /// - [`PmmError::EmptyMemoryMap`] if no usable memory is reported.
    /// - [`PmmError::NoBitmapRegion`] if no usable region can hold the bitmap.
    ///
    /// # Safety
    /// Every usable memory-map range must be reachable through the direct map
    /// at `boot.hhdm_offset()` and must not be in use by anyone else. The
    /// allocator takes ownership of all of it.
    pub unsafe fn try_init<B: BootInfo>(boot: &B) -> Result<Self, PmmError> {
        let mapper = HhdmPhysMapper::new(boot.hhdm_offset());

        let highest = boot
            .memmap_entries()
            .filter(|e| e.is_usable())
            .map(|e| align_down(e.end().as_u64(), PAGE_SIZE))
            .max()
            .unwrap_or(0);
        let total_frames = highest / PAGE_SIZE;
        let bytes = total_frames.div_ceil(8);
        if bytes == 0 {
            return Err(PmmError::EmptyMemoryMap);
        }

        // Page 0 is never a candidate, even inside a usable entry.
        let bitmap_pa = boot
            .memmap_entries()
            .filter(|e| e.is_usable())
            .find_map(|e| {
                let start = align_up(e.base.as_u64().max(PAGE_SIZE), PAGE_SIZE);
                let end = e.end().as_u64();
                (start.checked_add(bytes)? <= end).then_some(start)
            })
            .ok_or(PmmError::NoBitmapRegion { bytes })?;

        let bitmap_base = PhysicalFrame::containing(PhysicalAddress::new(bitmap_pa));
        let bitmap_frames = pages_for(bytes);
        let len = usize::try_from(bytes).map_err(|_| PmmError::NoBitmapRegion { bytes })?;
        let ptr = NonNull::new(mapper.phys_to_virt(bitmap_base.base()).as_mut_ptr::<u8>())
            .ok_or(PmmError::NoBitmapRegion { bytes })?;

        // SAFETY: the bitmap lies inside a usable region handed to us by the caller.
        let mut bitmap = unsafe { FrameBitmap::from_raw(ptr, len) };
        bitmap.fill(0xFF);
        for entry in boot.memmap_entries().filter(|e| e.is_usable()) {
            let first = align_up(entry.base.as_u64(), PAGE_SIZE) / PAGE_SIZE;
            let last = align_down(entry.end().as_u64(), PAGE_SIZE) / PAGE_SIZE;
            if first < last {
                bitmap.clear_range(first..last);
            }
        }
        let reserved = bitmap_base.index()..bitmap_base.index() + bitmap_frames;
        bitmap.set_range(reserved);
        bitmap.set(0);

        let pmm = Self {
            bitmap,
            bitmap_base,
            bitmap_frames,
            total_frames,
            mapper,
        };
        debug!(
            "PMM: tracking {total_frames} frames, {bytes}-byte bitmap at {:?}",
            bitmap_base.base()
        );
        debug!("PMM: {} frames free", pmm.free_frames());
        info!("PMM Initialized");
        Ok(pmm)
    }

    /// As [`try_init`](Self::try_init), halting on failure.
    ///
    /// # Safety
    /// See [`try_init`](Self::try_init).
    pub unsafe fn init<B: BootInfo>(boot: &B) -> Self {
        // SAFETY: forwarded to the caller.
        unsafe { Self::try_init(boot) }.unwrap_or_else(|e| fatal(SUBSYSTEM, &e))
    }

    /// Allocate `pages` contiguous frames, first fit from frame 0.
    ///
    /// # Errors
    /// [`PmmError::ZeroPages`] for an empty request, [`PmmError::OutOfMemory`]
    /// if no free run is long enough.
    pub fn try_alloc(&mut self, pages: u64) -> Result<FrameRange, PmmError> {
        if pages == 0 {
            return Err(PmmError::ZeroPages);
        }
        let start = self
            .bitmap
            .find_clear_run(pages, self.total_frames)
            .ok_or(PmmError::OutOfMemory { pages })?;
        self.bitmap.set_range(start..start + pages);
        Ok(FrameRange {
            base: PhysicalFrame::from_index(start),
            pages,
        })
    }

    /// Allocate `pages` contiguous frames. Exhaustion is fatal.
    pub fn alloc(&mut self, pages: u64) -> FrameRange {
        self.try_alloc(pages).unwrap_or_else(|e| fatal(SUBSYSTEM, &e))
    }

    /// Poison and release every frame of `range`.
    ///
    /// # Errors
    /// A range that is not fully allocated, not fully tracked, or touches a
    /// reserved frame is logged and left untouched.
    pub fn free(&mut self, range: FrameRange) -> Result<(), PmmError> {
        self.release(range.indices())
    }

    fn release(&mut self, frames: Range<u64>) -> Result<(), PmmError> {
        if let Err(e) = self.check_owned(frames.clone()) {
            warn!("PMM: ignoring free of frames {frames:?}: {e}");
            return Err(e);
        }
        for index in frames {
            let frame = PhysicalFrame::from_index(index);
            // SAFETY: the frame is tracked, allocated and handed back by its owner.
            #[allow(clippy::cast_possible_truncation)]
            unsafe {
                self.mapper.fill(frame.base(), POISON_BYTE, PAGE_SIZE as usize);
            }
            self.bitmap.clear(index);
        }
        Ok(())
    }

    fn check_owned(&self, frames: Range<u64>) -> Result<(), PmmError> {
        for index in frames {
            let frame = PhysicalFrame::from_index(index);
            if index >= self.total_frames {
                return Err(PmmError::OutOfRange { frame });
            }
            if self.is_reserved(index) {
                return Err(PmmError::Reserved { frame });
            }
            if !self.bitmap.get(index) {
                return Err(PmmError::NotAllocated { frame });
            }
        }
        Ok(())
    }

    const fn is_reserved(&self, index: u64) -> bool {
        let first = self.bitmap_base.index();
        index == 0 || (index >= first && index < first + self.bitmap_frames)
    }

    /// Number of frames covered by the bitmap.
    #[must_use]
    pub const fn total_frames(&self) -> u64 {
        self.total_frames
    }

    #[must_use]
    pub fn free_frames(&self) -> u64 {
        (0..self.total_frames)
            .filter(|&i| !self.bitmap.get(i))
            .count() as u64
    }

    /// Whether `frame` is currently marked as allocated or unusable.
    /// Untracked frames count as allocated.
    #[must_use]
    pub fn is_allocated(&self, frame: PhysicalFrame) -> bool {
        frame.index() >= self.total_frames || self.bitmap.get(frame.index())
    }

    /// Raw bitmap bytes, frame `i` at bit `i % 8` of byte `i / 8`.
    #[must_use]
    pub fn bitmap(&self) -> &[u8] {
        self.bitmap.as_bytes()
    }

    /// Physical frames holding the bitmap.
    #[must_use]
    pub const fn bitmap_location(&self) -> (PhysicalFrame, u64) {
        (self.bitmap_base, self.bitmap_frames)
    }

    #[must_use]
    pub const fn mapper(&self) -> &HhdmPhysMapper {
        &self.mapper
    }
}

impl fmt::Debug for BitmapFrameAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapFrameAllocator")
            .field("total_frames", &self.total_frames)
            .field("bitmap", &self.bitmap_base)
            .field("bitmap_frames", &self.bitmap_frames)
            .finish_non_exhaustive()
    }
}

impl FrameAlloc for BitmapFrameAllocator {
    fn alloc_4k(&mut self) -> Option<PhysicalFrame> {
        self.try_alloc(1).ok().map(FrameRange::leak).map(PhysicalFrame::containing)
    }

    unsafe fn free_4k(&mut self, frame: PhysicalFrame) {
        // Rejections are already logged.
        let _ = self.release(frame.index()..frame.index() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestRam, usable};
    use kernel_info::boot::{MemoryMapEntry, MemoryMapEntryType};

    /// 64 frames of RAM: usable `[0, 0x10000)`, reserved `[0x10000, 0x20000)`,
    /// usable `[0x20000, 0x40000)`.
    fn layout(ram: &TestRam) -> BitmapFrameAllocator {
        let map = [
            usable(0, 0x10000),
            MemoryMapEntry::new(
                PhysicalAddress::new(0x10000),
                0x10000,
                MemoryMapEntryType::Reserved,
            ),
            usable(0x20000, 0x20000),
        ];
        unsafe { BitmapFrameAllocator::init(&ram.boot_info(&map)) }
    }

    #[test]
    fn init_reserves_page_zero_bitmap_and_holes() {
        let ram = TestRam::new(64);
        let pmm = layout(&ram);

        assert_eq!(pmm.total_frames(), 64);
        assert_eq!(pmm.bitmap().len(), 8);
        assert_eq!(pmm.bitmap_location(), (PhysicalFrame::from_index(1), 1));
        assert!(pmm.is_allocated(PhysicalFrame::from_index(0)));
        assert!(pmm.is_allocated(PhysicalFrame::from_index(1)));
        assert!(!pmm.is_allocated(PhysicalFrame::from_index(2)));
        assert!(pmm.is_allocated(PhysicalFrame::from_index(16)));
        assert!(pmm.is_allocated(PhysicalFrame::from_index(31)));
        assert!(!pmm.is_allocated(PhysicalFrame::from_index(32)));
        assert_eq!(pmm.free_frames(), 14 + 32);
        assert_eq!(pmm.bitmap(), [0x03, 0x00, 0xFF, 0xFF, 0, 0, 0, 0]);
    }

    #[test]
    fn alloc_is_first_fit_from_frame_zero() {
        let ram = TestRam::new(64);
        let mut pmm = layout(&ram);

        let a = pmm.alloc(2);
        assert_eq!(a.base(), PhysicalAddress::new(0x2000));
        let b = pmm.alloc(13);
        assert_eq!(b.base(), PhysicalAddress::new(0x20000));
        pmm.free(a).unwrap();
        let c = pmm.alloc(1);
        assert_eq!(c.base(), PhysicalAddress::new(0x2000));
        let _ = (b.leak(), c.leak());
    }

    #[test]
    fn alloc_then_free_restores_bitmap_bit_for_bit() {
        let ram = TestRam::new(64);
        let mut pmm = layout(&ram);
        let _held = pmm.alloc(3).leak();

        for pages in [1, 2, 7, 14, 32] {
            let before = pmm.bitmap().to_vec();
            let range = pmm.alloc(pages);
            assert_ne!(pmm.bitmap(), before.as_slice());
            pmm.free(range).unwrap();
            assert_eq!(pmm.bitmap(), before.as_slice(), "pages = {pages}");
        }
    }

    #[test]
    fn frame_zero_is_never_returned() {
        let ram = TestRam::new(16);
        let map = [usable(0, 0x10000)];
        let mut pmm = unsafe { BitmapFrameAllocator::init(&ram.boot_info(&map)) };

        let mut ranges = Vec::new();
        while let Ok(range) = pmm.try_alloc(1) {
            assert_ne!(range.first_frame().index(), 0);
            ranges.push(range);
        }
        assert_eq!(ranges.len(), 14);
        for range in ranges.drain(..).rev() {
            pmm.free(range).unwrap();
        }
        let all = pmm.alloc(14);
        assert_eq!(all.first_frame().index(), 2);
        let _ = all.leak();
    }

    #[test]
    fn free_poisons_the_frames() {
        let ram = TestRam::new(64);
        let mut pmm = layout(&ram);
        let range = pmm.alloc(2);
        let frames: Vec<_> = range.frames().map(PhysicalFrame::index).collect();
        assert_eq!(frames, [2, 3]);

        ram.fill_frame(2, 0x11);
        pmm.free(range).unwrap();

        assert!(ram.frame_bytes(2).iter().all(|&b| b == POISON_BYTE));
        assert!(ram.frame_bytes(3).iter().all(|&b| b == POISON_BYTE));
    }

    #[test]
    fn bad_frees_are_ignored() {
        let ram = TestRam::new(64);
        let mut pmm = layout(&ram);
        let before = pmm.bitmap().to_vec();

        let free = unsafe { FrameRange::from_raw(PhysicalAddress::new(0x5000), 1) };
        assert_eq!(
            pmm.free(free),
            Err(PmmError::NotAllocated {
                frame: PhysicalFrame::from_index(5)
            })
        );
        let beyond = unsafe { FrameRange::from_raw(PhysicalAddress::new(0x40000), 1) };
        assert!(matches!(pmm.free(beyond), Err(PmmError::OutOfRange { .. })));
        let bitmap = unsafe { FrameRange::from_raw(PhysicalAddress::new(0x1000), 1) };
        assert!(matches!(pmm.free(bitmap), Err(PmmError::Reserved { .. })));
        let zero = unsafe { FrameRange::from_raw(PhysicalAddress::zero(), 1) };
        assert!(matches!(pmm.free(zero), Err(PmmError::Reserved { .. })));

        assert_eq!(pmm.bitmap(), before.as_slice());
    }

    #[test]
    fn double_free_through_frame_alloc_is_ignored() {
        let ram = TestRam::new(64);
        let mut pmm = layout(&ram);
        let frame = pmm.alloc_4k().unwrap();
        unsafe { pmm.free_4k(frame) };
        ram.fill_frame(frame.index(), 0x22);

        unsafe { pmm.free_4k(frame) };
        assert!(ram.frame_bytes(frame.index()).iter().all(|&b| b == 0x22));
        assert!(!pmm.is_allocated(frame));
    }

    /// One usable entry of three allocatable pages plus the bitmap page.
    #[test]
    #[should_panic(expected = "out of physical memory: no run of 3 free frames")]
    fn second_exhausting_alloc_is_fatal() {
        let ram = TestRam::new(8);
        let map = [usable(0x1000, 0x4000)];
        let mut pmm = unsafe { BitmapFrameAllocator::init(&ram.boot_info(&map)) };
        assert_eq!(pmm.free_frames(), 3);

        let first = pmm.alloc(3);
        assert_eq!(first.base(), PhysicalAddress::new(0x2000));
        let _ = first.leak();
        let _ = pmm.alloc(3);
    }

    #[test]
    fn three_page_region_with_bitmap_cannot_fit_three_pages() {
        let ram = TestRam::new(4);
        let map = [usable(0x1000, 0x3000)];
        let mut pmm = unsafe { BitmapFrameAllocator::init(&ram.boot_info(&map)) };

        assert_eq!(
            pmm.try_alloc(3),
            Err(PmmError::OutOfMemory { pages: 3 })
        );
        let two = pmm.alloc(2);
        assert_eq!(pmm.try_alloc(1), Err(PmmError::OutOfMemory { pages: 1 }));
        pmm.free(two).unwrap();
    }

    #[test]
    fn zero_pages_is_rejected() {
        let ram = TestRam::new(4);
        let mut pmm = unsafe { BitmapFrameAllocator::init(&ram.boot_info(&[usable(0, 0x4000)])) };
        assert_eq!(pmm.try_alloc(0), Err(PmmError::ZeroPages));
    }

    #[test]
    fn empty_memory_map_is_rejected() {
        let ram = TestRam::new(1);
        let map = [MemoryMapEntry::new(
            PhysicalAddress::zero(),
            0x1000,
            MemoryMapEntryType::Reserved,
        )];
        let err = unsafe { BitmapFrameAllocator::try_init(&ram.boot_info(&map)) }.unwrap_err();
        assert_eq!(err, PmmError::EmptyMemoryMap);
    }

    #[test]
    fn entry_running_past_the_top_of_memory_is_rejected() {
        let ram = TestRam::new(64);
        let map = [usable(0, 0x40000), usable(0xFFFF_FFFF_FFFF_F000, 0x2000)];
        let err = unsafe { BitmapFrameAllocator::try_init(&ram.boot_info(&map)) }.unwrap_err();
        assert_eq!(err, PmmError::NoBitmapRegion { bytes: 1 << 49 });
    }

    #[test]
    #[should_panic(expected = "pmm: no usable region can hold the 1-byte frame bitmap")]
    fn missing_bitmap_region_is_fatal() {
        let ram = TestRam::new(1);
        let map = [usable(0, 0x1000)];
        let _ = unsafe { BitmapFrameAllocator::init(&ram.boot_info(&map)) };
    }
}
