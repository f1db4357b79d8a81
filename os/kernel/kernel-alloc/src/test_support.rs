//! Simulated physical memory for allocator tests.
//!
//! The HHDM offset handed to the code under test is the buffer's address, so
//! physical address `p` lives at `base + p`.

use kernel_info::boot::{MemoryMapEntry, MemoryMapEntryType, StaticBootInfo};
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};
use kernel_vmem::Mmu;
use std::cell::RefCell;

#[repr(C, align(4096))]
#[derive(Clone)]
struct Frame([u8; 4096]);

pub struct TestRam {
    base: *mut Frame,
    len: usize,
}

impl TestRam {
    pub fn new(frames: usize) -> Self {
        let boxed = vec![Frame([0; 4096]); frames].into_boxed_slice();
        Self {
            base: Box::into_raw(boxed).cast::<Frame>(),
            len: frames,
        }
    }

    pub fn hhdm(&self) -> u64 {
        self.base as u64
    }

    pub fn boot_info<'a>(&self, map: &'a [MemoryMapEntry]) -> StaticBootInfo<'a> {
        StaticBootInfo::new(map, self.hhdm())
    }

    pub fn bytes(&self, pa: u64, len: usize) -> &[u8] {
        let end = usize::try_from(pa).unwrap() + len;
        assert!(end <= self.len * 4096);
        unsafe { std::slice::from_raw_parts(self.base.cast::<u8>().add(end - len), len) }
    }

    pub fn frame_bytes(&self, index: u64) -> &[u8] {
        self.bytes(index * 4096, 4096)
    }

    pub fn fill_frame(&self, index: u64, byte: u8) {
        let index = usize::try_from(index).unwrap();
        assert!(index < self.len);
        unsafe { self.base.add(index).cast::<u8>().write_bytes(byte, 4096) };
    }
}

impl Drop for TestRam {
    fn drop(&mut self) {
        let slice = std::ptr::slice_from_raw_parts_mut(self.base, self.len);
        drop(unsafe { Box::from_raw(slice) });
    }
}

pub const fn usable(base: u64, length: u64) -> MemoryMapEntry {
    MemoryMapEntry::new(
        PhysicalAddress::new(base),
        length,
        MemoryMapEntryType::Usable,
    )
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

/// Captures log records so tests can assert on warnings.
///
/// The logger is process-wide; tests that inspect it hold [`capture`] for
/// their whole body.
pub mod logs {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::{Mutex, MutexGuard, Once, PoisonError};

    static RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());
    static EXCLUSIVE: Mutex<()> = Mutex::new(());
    static INSTALL: Once = Once::new();

    struct Capture;

    impl Log for Capture {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &Record<'_>) {
            RECORDS
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    /// Install the capturing logger and clear previous records.
    pub fn capture() -> MutexGuard<'static, ()> {
        INSTALL.call_once(|| {
            log::set_logger(&Capture).unwrap();
            log::set_max_level(LevelFilter::Trace);
        });
        let guard = EXCLUSIVE.lock().unwrap_or_else(PoisonError::into_inner);
        RECORDS.lock().unwrap_or_else(PoisonError::into_inner).clear();
        guard
    }

    pub fn contains(level: Level, text: &str) -> bool {
        RECORDS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(text))
    }
}
