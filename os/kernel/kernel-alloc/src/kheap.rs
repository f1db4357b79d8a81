//! # Kernel Heap
//!
//! A first-fit, split-and-coalesce allocator over pages obtained from the
//! [`BitmapFrameAllocator`] and addressed through the direct map.
//!
//! Every block, free or used, is prefixed by a [`BlockHeader`]. The headers
//! form a doubly linked list in address order that spans every byte the heap
//! owns:
//!
//! ```text
//!  head                                                  tail
//!   │                                                     │
//!   ▼                                                     ▼
//! ┌────────┬──────────┬────────┬──────────────┬────────┬─────────┐
//! │ header │ used 64  │ header │   free 208   │ header │ free …  │
//! └────────┴──────────┴────────┴──────────────┴────────┴─────────┘
//!           ▲ returned pointer
//! ```
//!
//! ## Sizes
//! Requests are rounded up to [`KHEAP_GRANULE`] bytes; a zero-size request
//! takes one granule. Since the header is a multiple of the granule and every
//! region starts on a page, all payloads are granule aligned.
//!
//! ## Growth
//! If no free block fits, the heap obtains `align_up(size + header, 4 KiB)`
//! fresh bytes from the PMM, appends them as one free block at the tail and
//! searches once more. A second miss is an out-of-memory failure.
//!
//! ## Freeing
//! Freed payloads are poisoned with [`POISON_BYTE`], then merged with the
//! following and the preceding block when those are free and physically
//! adjacent. Freeing a block that is already free only logs a warning.

use crate::fatal;
use crate::frame_alloc::{BitmapFrameAllocator, PmmError};
use core::fmt;
use core::ptr::{self, NonNull, null_mut};
use kernel_info::memory::{KHEAP_GRANULE, KHEAP_INIT_PAGES, PAGE_SIZE, POISON_BYTE};
use kernel_memory_addresses::align_up;
use kernel_vmem::PhysMapper;
use log::{debug, info, warn};

const SUBSYSTEM: &str = "kheap";

/// Header in front of every heap block.
#[repr(C)]
struct BlockHeader {
    /// Payload bytes following this header.
    size: usize,
    free: bool,
    next: *mut BlockHeader,
    prev: *mut BlockHeader,
}

const HEADER: usize = size_of::<BlockHeader>();

const _: () = assert!(HEADER.is_multiple_of(KHEAP_GRANULE));
const _: () = assert!(align_of::<BlockHeader>() <= KHEAP_GRANULE);

#[derive(Debug, thiserror::Error, Copy, Clone, Eq, PartialEq)]
pub enum HeapError {
    #[error("no heap block of {size} bytes available after growing the heap")]
    OutOfMemory { size: usize },
    #[error(transparent)]
    Frames(#[from] PmmError),
}

/// Byte and block accounting of the heap.
///
/// `used_bytes + free_bytes + blocks * header size == total_bytes` holds at
/// all times.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct HeapStats {
    /// Bytes obtained from the PMM.
    pub total_bytes: usize,
    /// Payload bytes of free blocks.
    pub free_bytes: usize,
    /// Payload bytes of allocated blocks.
    pub used_bytes: usize,
    pub blocks: usize,
    pub free_blocks: usize,
}

/// The kernel's general-purpose allocator.
pub struct KernelHeap {
    head: *mut BlockHeader,
    tail: *mut BlockHeader,
    total_bytes: usize,
}

// Safety: the heap exclusively owns its pages; callers serialize access.
unsafe impl Send for KernelHeap {}

/// Round a request up to the allocation granule.
const fn granule_size(size: usize) -> Option<usize> {
    if size == 0 {
        return Some(KHEAP_GRANULE);
    }
    match size.checked_add(KHEAP_GRANULE - 1) {
        Some(padded) => Some(padded & !(KHEAP_GRANULE - 1)),
        None => None,
    }
}

impl KernelHeap {
    /// Set up the heap over [`KHEAP_INIT_PAGES`] fresh pages.
    ///
    /// # Errors
    /// [`HeapError::Frames`] if the PMM cannot supply the pages.
    pub fn try_init(pmm: &mut BitmapFrameAllocator) -> Result<Self, HeapError> {
        let (block, bytes) = Self::claim(pmm, KHEAP_INIT_PAGES)?;
        // SAFETY: `claim` hands out an exclusive, writable, page-aligned region.
        unsafe {
            ptr::write(
                block,
                BlockHeader {
                    size: bytes - HEADER,
                    free: true,
                    next: null_mut(),
                    prev: null_mut(),
                },
            );
        }
        info!("KHEAP: initialized with {bytes} bytes at {block:p}");
        Ok(Self {
            head: block,
            tail: block,
            total_bytes: bytes,
        })
    }

    /// As [`try_init`](Self::try_init), halting on failure.
    pub fn init(pmm: &mut BitmapFrameAllocator) -> Self {
        Self::try_init(pmm).unwrap_or_else(|e| fatal(SUBSYSTEM, &e))
    }

    /// Take `pages` pages from the PMM for good and return their direct-map
    /// address together with their size in bytes.
    fn claim(
        pmm: &mut BitmapFrameAllocator,
        pages: u64,
    ) -> Result<(*mut BlockHeader, usize), HeapError> {
        let range = pmm.try_alloc(pages)?;
        let bytes = usize::try_from(range.len_bytes())
            .map_err(|_| PmmError::OutOfMemory { pages })?;
        let va = pmm.mapper().phys_to_virt(range.leak());
        Ok((va.as_mut_ptr::<BlockHeader>(), bytes))
    }

    /// Allocate `size` bytes, growing the heap once if needed.
    ///
    /// # Errors
    /// [`HeapError::Frames`] if growing fails, [`HeapError::OutOfMemory`] if
    /// the grown heap still has no fitting block.
    pub fn try_alloc(
        &mut self,
        pmm: &mut BitmapFrameAllocator,
        size: usize,
    ) -> Result<NonNull<u8>, HeapError> {
        let size = granule_size(size).ok_or(HeapError::OutOfMemory { size })?;
        for attempt in 0..2 {
            if let Some(payload) = self.first_fit(size) {
                return Ok(payload);
            }
            if attempt == 0 {
                self.extend(pmm, size)?;
            }
        }
        Err(HeapError::OutOfMemory { size })
    }

    /// Allocate `size` bytes. Exhaustion is fatal.
    pub fn alloc(&mut self, pmm: &mut BitmapFrameAllocator, size: usize) -> NonNull<u8> {
        self.try_alloc(pmm, size).unwrap_or_else(|e| fatal(SUBSYSTEM, &e))
    }

    fn first_fit(&mut self, size: usize) -> Option<NonNull<u8>> {
        let mut bh = self.head;
        while !bh.is_null() {
            // SAFETY: every header reachable from `head` lies inside heap memory.
            unsafe {
                if (*bh).free && (*bh).size >= size {
                    if (*bh).size > size + HEADER {
                        self.split(bh, size);
                    }
                    (*bh).free = false;
                    return NonNull::new(bh.cast::<u8>().add(HEADER));
                }
                bh = (*bh).next;
            }
        }
        None
    }

    /// Shrink `bh` to `size` payload bytes and link the remainder as a free
    /// block right behind it.
    ///
    /// # Safety
    /// `bh` must be a block of this heap holding more than `size + HEADER` bytes.
    // `size` is a granule multiple and `HEADER` keeps granule alignment.
    #[allow(clippy::cast_ptr_alignment)]
    unsafe fn split(&mut self, bh: *mut BlockHeader, size: usize) {
        unsafe {
            let rest = bh.cast::<u8>().add(HEADER + size).cast::<BlockHeader>();
            ptr::write(
                rest,
                BlockHeader {
                    size: (*bh).size - (size + HEADER),
                    free: true,
                    next: (*bh).next,
                    prev: bh,
                },
            );
            (*bh).size = size;
            (*bh).next = rest;
            if let Some(next) = (*rest).next.as_mut() {
                next.prev = rest;
            }
            if bh == self.tail {
                self.tail = rest;
            }
        }
    }

    /// Append a zeroed free block large enough for `size` payload bytes.
    fn extend(&mut self, pmm: &mut BitmapFrameAllocator, size: usize) -> Result<(), HeapError> {
        let needed = size
            .checked_add(HEADER)
            .ok_or(HeapError::OutOfMemory { size })?;
        let pages = align_up(needed as u64, PAGE_SIZE) / PAGE_SIZE;
        let (block, bytes) = Self::claim(pmm, pages)?;
        // SAFETY: fresh exclusive region; `tail` is a live header.
        unsafe {
            ptr::write_bytes(block.cast::<u8>(), 0, bytes);
            ptr::write(
                block,
                BlockHeader {
                    size: bytes - HEADER,
                    free: true,
                    next: null_mut(),
                    prev: self.tail,
                },
            );
            (*self.tail).next = block;
        }
        self.tail = block;
        self.total_bytes += bytes;
        debug!(
            "KHEAP: extended by {bytes} bytes at {block:p}, now {} bytes",
            self.total_bytes
        );
        Ok(())
    }

    /// Release a block returned by [`alloc`](Self::alloc). A null pointer is
    /// ignored; a block that is already free is reported and ignored.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer returned by this heap.
    // Payloads sit `HEADER` bytes past a granule-aligned header.
    #[allow(clippy::cast_ptr_alignment)]
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        // SAFETY: `ptr` came from this heap, so its header sits right before it.
        unsafe {
            let bh = ptr.sub(HEADER).cast::<BlockHeader>();
            if (*bh).free {
                warn!("Invalid kfree() address {ptr:p}");
                return;
            }
            (*bh).free = true;
            ptr::write_bytes(ptr, POISON_BYTE, (*bh).size);

            let next = (*bh).next;
            if !next.is_null() && (*next).free && Self::end_of(bh) == next.cast() {
                self.absorb_next(bh);
            }
            let prev = (*bh).prev;
            if !prev.is_null() && (*prev).free && Self::end_of(prev) == bh.cast() {
                self.absorb_next(prev);
            }
        }
    }

    /// First byte after the payload of `bh`.
    unsafe fn end_of(bh: *mut BlockHeader) -> *mut u8 {
        unsafe { bh.cast::<u8>().add(HEADER + (*bh).size) }
    }

    /// Merge the block following `bh` into `bh`.
    ///
    /// # Safety
    /// Both blocks must be free, adjacent, and linked.
    unsafe fn absorb_next(&mut self, bh: *mut BlockHeader) {
        unsafe {
            let next = (*bh).next;
            (*bh).size += HEADER + (*next).size;
            (*bh).next = (*next).next;
            if let Some(after) = (*bh).next.as_mut() {
                after.prev = bh;
            }
            if next == self.tail {
                self.tail = bh;
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            total_bytes: self.total_bytes,
            ..HeapStats::default()
        };
        for (size, free) in self.blocks() {
            stats.blocks += 1;
            if free {
                stats.free_blocks += 1;
                stats.free_bytes += size;
            } else {
                stats.used_bytes += size;
            }
        }
        stats
    }

    /// `(payload size, free)` of every block in address order.
    fn blocks(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        let mut bh = self.head;
        core::iter::from_fn(move || {
            // SAFETY: headers reachable from `head` are live.
            let header = unsafe { bh.as_ref()? };
            bh = header.next;
            Some((header.size, header.free))
        })
    }
}

impl fmt::Debug for KernelHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelHeap")
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestRam, logs, usable};

    const INIT_BYTES: usize = 16 * 4096;

    fn setup(ram: &TestRam) -> (BitmapFrameAllocator, KernelHeap) {
        let map = [usable(0, 0x40000)];
        let mut pmm = unsafe { BitmapFrameAllocator::init(&ram.boot_info(&map)) };
        let heap = KernelHeap::init(&mut pmm);
        (pmm, heap)
    }

    #[allow(clippy::cast_ptr_alignment)]
    fn header_of(ptr: NonNull<u8>) -> &'static BlockHeader {
        unsafe { &*ptr.as_ptr().sub(HEADER).cast::<BlockHeader>() }
    }

    fn assert_accounting(heap: &KernelHeap) {
        let s = heap.stats();
        assert_eq!(s.used_bytes + s.free_bytes + s.blocks * HEADER, s.total_bytes);
    }

    #[test]
    fn header_is_a_whole_number_of_granules() {
        assert_eq!(HEADER, 32);
    }

    #[test]
    fn init_formats_one_free_block() {
        let ram = TestRam::new(64);
        let (pmm, heap) = setup(&ram);

        assert_eq!(
            heap.stats(),
            HeapStats {
                total_bytes: INIT_BYTES,
                free_bytes: INIT_BYTES - HEADER,
                used_bytes: 0,
                blocks: 1,
                free_blocks: 1,
            }
        );
        assert_eq!(pmm.free_frames(), 62 - 16);
    }

    #[test]
    fn sizes_round_up_to_the_granule() {
        let ram = TestRam::new(64);
        let (mut pmm, mut heap) = setup(&ram);

        for (request, expected) in [(1, 16), (10, 16), (16, 16), (17, 32), (20, 32), (0, 16)] {
            let p = heap.alloc(&mut pmm, request);
            assert_eq!(p.as_ptr().addr() % 16, 0);
            assert_eq!(header_of(p).size, expected, "request {request}");
        }
        assert_accounting(&heap);
    }

    #[test]
    fn alloc_then_free_restores_free_bytes() {
        let ram = TestRam::new(64);
        let (mut pmm, mut heap) = setup(&ram);
        let _keep = heap.alloc(&mut pmm, 48);

        for size in [1, 16, 100, 4096, 30_000] {
            let before = heap.stats();
            let p = heap.alloc(&mut pmm, size);
            assert!(heap.stats().free_bytes < before.free_bytes);
            unsafe { heap.free(p.as_ptr()) };
            assert_eq!(heap.stats(), before, "size {size}");
        }
    }

    #[test]
    fn neighbours_coalesce_in_either_order() {
        for reverse in [false, true] {
            let ram = TestRam::new(64);
            let (mut pmm, mut heap) = setup(&ram);
            let a = heap.alloc(&mut pmm, 64);
            let b = heap.alloc(&mut pmm, 64);
            let _c = heap.alloc(&mut pmm, 64);
            assert_eq!(heap.stats().blocks, 4);

            let (first, second) = if reverse { (b, a) } else { (a, b) };
            unsafe {
                heap.free(first.as_ptr());
                heap.free(second.as_ptr());
            }

            let merged = header_of(a);
            assert!(merged.free);
            assert_eq!(merged.size, 64 + 64 + HEADER);
            assert_eq!(heap.stats().blocks, 3);
            assert_accounting(&heap);
        }
    }

    #[test]
    fn freeing_the_last_block_merges_into_the_tail() {
        let ram = TestRam::new(64);
        let (mut pmm, mut heap) = setup(&ram);
        let a = heap.alloc(&mut pmm, 64);
        unsafe { heap.free(a.as_ptr()) };

        let stats = heap.stats();
        assert_eq!((stats.blocks, stats.free_blocks), (1, 1));
        assert_eq!(heap.head, heap.tail);
    }

    #[test]
    fn freeing_the_tail_merges_it_into_a_free_predecessor() {
        let ram = TestRam::new(64);
        let (mut pmm, mut heap) = setup(&ram);
        let a = heap.alloc(&mut pmm, INIT_BYTES - HEADER);
        let b = heap.alloc(&mut pmm, 4096 - HEADER);
        assert_eq!(heap.stats().blocks, 2);
        assert_eq!(heap.tail, b.as_ptr().wrapping_sub(HEADER).cast::<BlockHeader>());

        unsafe {
            heap.free(a.as_ptr());
            heap.free(b.as_ptr());
        }

        assert_eq!(heap.tail, heap.head);
        let stats = heap.stats();
        assert_eq!((stats.blocks, stats.free_blocks), (1, 1));
        assert_eq!(stats.free_bytes, INIT_BYTES + 4096 - HEADER);
        assert!(header_of(a).next.is_null());
        assert_accounting(&heap);
    }

    #[test]
    fn first_fit_reuses_the_first_hole_and_leaves_neighbours_alone() {
        let ram = TestRam::new(64);
        let (mut pmm, mut heap) = setup(&ram);
        let a = heap.alloc(&mut pmm, 128);
        let b = heap.alloc(&mut pmm, 128);
        let c = heap.alloc(&mut pmm, 128);
        unsafe { ptr::write_bytes(b.as_ptr(), 0xB5, 128) };

        unsafe {
            heap.free(a.as_ptr());
            heap.free(c.as_ptr());
        }
        let d = heap.alloc(&mut pmm, 64);

        assert_eq!(d, a);
        assert!(!header_of(b).free);
        assert_eq!(header_of(b).size, 128);
        let payload = unsafe { core::slice::from_raw_parts(b.as_ptr(), 128) };
        assert!(payload.iter().all(|&x| x == 0xB5));
        assert_accounting(&heap);
    }

    #[test]
    fn freed_payload_is_poisoned() {
        let ram = TestRam::new(64);
        let (mut pmm, mut heap) = setup(&ram);
        let a = heap.alloc(&mut pmm, 64);
        let _b = heap.alloc(&mut pmm, 64);
        unsafe { ptr::write_bytes(a.as_ptr(), 0, 64) };

        unsafe { heap.free(a.as_ptr()) };
        let payload = unsafe { core::slice::from_raw_parts(a.as_ptr(), 64) };
        assert!(payload.iter().all(|&x| x == POISON_BYTE));
    }

    #[test]
    fn double_free_only_warns() {
        let _logs = logs::capture();
        let ram = TestRam::new(64);
        let (mut pmm, mut heap) = setup(&ram);
        let a = heap.alloc(&mut pmm, 64);
        let _b = heap.alloc(&mut pmm, 64);

        unsafe { heap.free(a.as_ptr()) };
        let before = heap.stats();
        unsafe { heap.free(a.as_ptr()) };

        assert_eq!(heap.stats(), before);
        assert!(logs::contains(log::Level::Warn, "Invalid kfree() address"));
    }

    #[test]
    fn null_free_is_a_no_op() {
        let ram = TestRam::new(64);
        let (_pmm, mut heap) = setup(&ram);
        let before = heap.stats();
        unsafe { heap.free(null_mut()) };
        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn oversized_requests_grow_the_heap() {
        let ram = TestRam::new(64);
        let (mut pmm, mut heap) = setup(&ram);

        let p = heap.alloc(&mut pmm, 100_000);
        let stats = heap.stats();
        assert_eq!(stats.total_bytes, INIT_BYTES + 25 * 4096);
        assert_eq!(header_of(p).size, 100_000);
        assert_eq!(stats.blocks, 3);
        assert_eq!(pmm.free_frames(), 62 - 16 - 25);
        assert_accounting(&heap);

        unsafe { ptr::write_bytes(p.as_ptr(), 0x5A, 100_000) };
        unsafe { heap.free(p.as_ptr()) };
        assert_eq!(heap.stats().used_bytes, 0);
        assert_accounting(&heap);
    }

    #[test]
    fn exhaustion_is_reported_by_try_alloc() {
        let ram = TestRam::new(64);
        let (mut pmm, mut heap) = setup(&ram);
        let err = heap.try_alloc(&mut pmm, 0x40000).unwrap_err();
        assert_eq!(err, HeapError::Frames(PmmError::OutOfMemory { pages: 65 }));
        assert_eq!(heap.stats().total_bytes, INIT_BYTES);
    }

    #[test]
    #[should_panic(expected = "kheap: out of physical memory")]
    fn exhaustion_is_fatal() {
        let ram = TestRam::new(64);
        let (mut pmm, mut heap) = setup(&ram);
        let _ = heap.alloc(&mut pmm, 0x40000);
    }
}
