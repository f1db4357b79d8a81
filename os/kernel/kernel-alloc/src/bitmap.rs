use core::ops::Range;
use core::ptr::NonNull;

/// One bit per frame; `1` = allocated or unusable, `0` = free.
///
/// The bytes live in physical memory and are reached through the direct map,
/// so the bitmap holds a raw pointer instead of a borrow. Every access goes
/// through a bounds-checked slice.
pub(crate) struct FrameBitmap {
    bits: NonNull<u8>,
    len: usize,
}

// Safety: the bitmap exclusively owns its bytes; callers serialize access.
unsafe impl Send for FrameBitmap {}

#[allow(clippy::cast_possible_truncation)]
const fn locate(bit: u64) -> (usize, u8) {
    ((bit / 8) as usize, 1 << (bit % 8))
}

impl FrameBitmap {
    /// # Safety
    /// `bits` must be valid for reads and writes of `len` bytes for as long as
    /// the bitmap exists, and nothing else may access those bytes.
    pub(crate) const unsafe fn from_raw(bits: NonNull<u8>, len: usize) -> Self {
        Self { bits, len }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        // SAFETY: guaranteed by `from_raw`.
        unsafe { core::slice::from_raw_parts(self.bits.as_ptr(), self.len) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: guaranteed by `from_raw`.
        unsafe { core::slice::from_raw_parts_mut(self.bits.as_ptr(), self.len) }
    }

    pub(crate) fn fill(&mut self, byte: u8) {
        self.as_bytes_mut().fill(byte);
    }

    /// # Panics
    /// If `bit` lies beyond the bitmap.
    pub(crate) fn get(&self, bit: u64) -> bool {
        let (byte, mask) = locate(bit);
        self.as_bytes()[byte] & mask != 0
    }

    pub(crate) fn set(&mut self, bit: u64) {
        let (byte, mask) = locate(bit);
        self.as_bytes_mut()[byte] |= mask;
    }

    pub(crate) fn clear(&mut self, bit: u64) {
        let (byte, mask) = locate(bit);
        self.as_bytes_mut()[byte] &= !mask;
    }

    pub(crate) fn set_range(&mut self, bits: Range<u64>) {
        for bit in bits {
            self.set(bit);
        }
    }

    pub(crate) fn clear_range(&mut self, bits: Range<u64>) {
        for bit in bits {
            self.clear(bit);
        }
    }

    /// First index of `len` consecutive clear bits below `limit`, scanning
    /// from bit 0.
    pub(crate) fn find_clear_run(&self, len: u64, limit: u64) -> Option<u64> {
        let bytes = self.as_bytes();
        let mut start = 0;
        let mut run = 0;
        let mut bit = 0;
        while bit < limit {
            // Whole bytes of allocated frames end any run at once.
            let (byte, _) = locate(bit);
            if bit % 8 == 0 && bit + 8 <= limit && bytes[byte] == 0xFF {
                run = 0;
                bit += 8;
                start = bit;
                continue;
            }
            if self.get(bit) {
                run = 0;
                start = bit + 1;
            } else {
                run += 1;
                if run == len {
                    return Some(start);
                }
            }
            bit += 1;
        }
        None
    }
}
