//! Simulated physical memory for backend tests.

use crate::{FrameAlloc, Mmu, PhysMapper};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalFrame, VirtualAddress};
use std::cell::RefCell;

#[repr(C, align(4096))]
#[derive(Clone)]
struct Frame([u8; 4096]);

/// A page-aligned buffer standing in for physical RAM.
/// Physical address `p` lives at `base + p`.
pub struct TestPhys {
    base: *mut Frame,
    len: usize,
}

impl TestPhys {
    pub fn new(frames: usize) -> Self {
        let boxed = vec![Frame([0; 4096]); frames].into_boxed_slice();
        Self {
            base: Box::into_raw(boxed).cast::<Frame>(),
            len: frames,
        }
    }

    pub fn mapper(&self) -> TestMapper {
        TestMapper {
            base: self.base as u64,
        }
    }

    pub fn fill_frame(&self, index: u64, byte: u8) {
        unsafe { self.mapper().fill(PhysicalFrame::from_index(index).base(), byte, 4096) };
    }

    pub fn frame_bytes(&self, index: u64) -> &[u8] {
        let index = usize::try_from(index).unwrap();
        assert!(index < self.len);
        unsafe { std::slice::from_raw_parts(self.base.add(index).cast::<u8>(), 4096) }
    }
}

impl Drop for TestPhys {
    fn drop(&mut self) {
        let slice = std::ptr::slice_from_raw_parts_mut(self.base, self.len);
        drop(unsafe { Box::from_raw(slice) });
    }
}

#[derive(Copy, Clone)]
pub struct TestMapper {
    base: u64,
}

impl PhysMapper for TestMapper {
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(self.base + pa.as_u64())
    }
}

/// Hands out frames `1..limit` in order and records releases.
pub struct TestAlloc {
    next: u64,
    limit: u64,
    pub freed: Vec<PhysicalFrame>,
}

impl TestAlloc {
    pub const fn new(limit: u64) -> Self {
        Self {
            next: 1,
            limit,
            freed: Vec::new(),
        }
    }

    pub const fn allocated(&self) -> u64 {
        self.next - 1
    }
}

impl FrameAlloc for TestAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalFrame> {
        if self.next >= self.limit {
            return None;
        }
        let frame = PhysicalFrame::from_index(self.next);
        self.next += 1;
        Some(frame)
    }

    unsafe fn free_4k(&mut self, frame: PhysicalFrame) {
        assert!(frame.base().as_u64() < self.limit * PAGE_SIZE);
        self.freed.push(frame);
    }
}

/// Records activations and invalidations instead of touching the CPU.
#[derive(Default)]
pub struct RecordingMmu {
    pub active: RefCell<Option<PhysicalFrame>>,
    pub invalidated: RefCell<Vec<VirtualAddress>>,
}

impl Mmu for &RecordingMmu {
    unsafe fn activate(&self, root: PhysicalFrame) {
        *self.active.borrow_mut() = Some(root);
    }

    fn invalidate_page(&self, va: VirtualAddress) {
        self.invalidated.borrow_mut().push(va);
    }
}
