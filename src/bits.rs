//! Growable bit buffer
//!
//! Backing store of the packer. Bit `i` of the stream lives in word `i / 64`
//! at bit `i % 64`. Every write is masked to its declared width, so a value
//! wider than its field can never spill into neighbouring bits. Reads past
//! the written region return zeros.

use num_bigint::BigUint;

use crate::policy::mask64;

// ── Bit Reversal ───────────────────────────────────────────────────────

/// Reverse the low `width` bits of `value` (`width <= 64`).
#[inline]
pub fn reverse_bits(value: u64, width: usize) -> u64 {
    if width == 0 {
        return 0;
    }
    (value & mask64(width)).reverse_bits() >> (64 - width)
}

// ── BitBuffer ──────────────────────────────────────────────────────────

/// Growable little-endian bit buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitBuffer {
    words: Vec<u64>,
}

impl BitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero all bits, keeping the allocation
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Number of bits currently backed by storage
    pub fn capacity_bits(&self) -> usize {
        self.words.len() * 64
    }

    fn ensure(&mut self, end: usize) {
        let needed = end.div_ceil(64);
        if needed > self.words.len() {
            self.words.resize(needed, 0);
        }
    }

    /// Write the low `width` bits of `value` at bit position `pos`.
    pub fn write(&mut self, pos: usize, value: u64, width: usize) {
        if width == 0 {
            return;
        }
        debug_assert!(width <= 64);
        let value = value & mask64(width);
        self.ensure(pos + width);
        let word = pos / 64;
        let shift = pos % 64;
        let lo_bits = (64 - shift).min(width);
        let lo_mask = mask64(lo_bits) << shift;
        self.words[word] = (self.words[word] & !lo_mask) | ((value << shift) & lo_mask);
        if lo_bits < width {
            let hi_bits = width - lo_bits;
            let hi_mask = mask64(hi_bits);
            self.words[word + 1] = (self.words[word + 1] & !hi_mask) | ((value >> lo_bits) & hi_mask);
        }
    }

    /// Read `width` bits starting at `pos`.
    pub fn read(&self, pos: usize, width: usize) -> u64 {
        if width == 0 {
            return 0;
        }
        debug_assert!(width <= 64);
        let word = pos / 64;
        let shift = pos % 64;
        let lo = self.words.get(word).copied().unwrap_or(0) >> shift;
        let lo_bits = 64 - shift;
        let value = if lo_bits < width {
            let hi = self.words.get(word + 1).copied().unwrap_or(0);
            lo | (hi << lo_bits)
        } else {
            lo
        };
        value & mask64(width)
    }

    pub fn bit(&self, pos: usize) -> bool {
        self.read(pos, 1) == 1
    }

    pub fn set_bit(&mut self, pos: usize, value: bool) {
        self.write(pos, value as u64, 1);
    }

    /// Write the low `width` bits of a wide value, least significant chunk first.
    pub fn write_wide(&mut self, pos: usize, value: &BigUint, width: usize) {
        let mut digits = value.iter_u64_digits();
        let mut offset = 0;
        while offset < width {
            let chunk = (width - offset).min(64);
            self.write(pos + offset, digits.next().unwrap_or(0), chunk);
            offset += chunk;
        }
    }

    /// Read `width` bits as a wide value.
    pub fn read_wide(&self, pos: usize, width: usize) -> BigUint {
        let mut digits = Vec::with_capacity(width.div_ceil(64));
        let mut offset = 0;
        while offset < width {
            let chunk = (width - offset).min(64);
            digits.push(self.read(pos + offset, chunk));
            offset += chunk;
        }
        let mut value = BigUint::default();
        for (i, d) in digits.into_iter().enumerate() {
            value |= BigUint::from(d) << (i * 64);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_bits_basic() {
        assert_eq!(reverse_bits(0b1, 4), 0b1000);
        assert_eq!(reverse_bits(0x1234, 16), 0x2C48);
        assert_eq!(reverse_bits(0xFF, 0), 0);
        assert_eq!(reverse_bits(1, 64), 1 << 63);
    }

    #[test]
    fn reverse_bits_masks_input() {
        assert_eq!(reverse_bits(0xF1, 4), 0b1000);
    }

    #[test]
    fn write_read_within_word() {
        let mut b = BitBuffer::new();
        b.write(3, 0b101, 3);
        assert_eq!(b.read(3, 3), 0b101);
        assert_eq!(b.read(0, 6), 0b101000);
    }

    #[test]
    fn write_read_across_word_boundary() {
        let mut b = BitBuffer::new();
        b.write(60, 0xABCD, 16);
        assert_eq!(b.read(60, 16), 0xABCD);
        assert_eq!(b.capacity_bits(), 128);
    }

    #[test]
    fn write_masks_to_width() {
        let mut b = BitBuffer::new();
        b.write(0, u64::MAX, 4);
        assert_eq!(b.read(0, 64), 0xF);
    }

    #[test]
    fn write_overwrites_only_its_field() {
        let mut b = BitBuffer::new();
        b.write(0, u64::MAX, 64);
        b.write(8, 0, 8);
        assert_eq!(b.read(0, 64), 0xFFFF_FFFF_FFFF_00FF);
    }

    #[test]
    fn read_past_end_is_zero() {
        let b = BitBuffer::new();
        assert_eq!(b.read(1000, 64), 0);
        assert!(!b.bit(5));
    }

    #[test]
    fn wide_roundtrip() {
        let mut b = BitBuffer::new();
        let v = (BigUint::from(0xDEAD_BEEFu32) << 100u32) | BigUint::from(7u8);
        b.write_wide(5, &v, 140);
        assert_eq!(b.read_wide(5, 140), v);
    }

    #[test]
    fn wide_write_truncates() {
        let mut b = BitBuffer::new();
        let v = BigUint::from(u64::MAX) << 64u32 | BigUint::from(u64::MAX);
        b.write_wide(0, &v, 70);
        assert_eq!(b.read_wide(0, 128), (BigUint::from(1u8) << 70u32) - 1u8);
    }

    #[test]
    fn clear_zeroes() {
        let mut b = BitBuffer::new();
        b.write(10, 0xFF, 8);
        b.clear();
        assert_eq!(b.read(10, 8), 0);
    }

    #[test]
    fn set_bit_and_bit() {
        let mut b = BitBuffer::new();
        b.set_bit(65, true);
        assert!(b.bit(65));
        assert!(!b.bit(64));
    }
}
