//! Bit packer — structural serialization of object fields
//!
//! Turns a sequence of typed field writes into one flat bit-stream and back.
//! Fields are appended at the cursor (`count`) in the order they are packed
//! and must be unpacked in the same order and with the same sizes; the
//! stream itself carries no framing.
//!
//! # Bit order
//!
//! With `big_endian` set each field is bit-reversed over its width before it
//! is written, and [`Packer::get_bytes`]/[`Packer::get_ints`] emit the
//! highest chunk of the accumulator first. Packing `0x1234` in 16 bits
//! therefore yields the bytes `[0x2C, 0x48]`, not network byte order.
//! Byte and word arrays are written in reverse element order under
//! `big_endian`, so `pack_bytes` followed by `get_bytes` reproduces the
//! input in both modes.
//!
//! # Metadata
//!
//! With `use_metadata` set, sub-objects are preceded by a 4-bit null marker
//! and strings are followed by a zero terminator byte; unpacking reads both
//! back.

use num_bigint::BigUint;

use crate::bits::{reverse_bits, BitBuffer};
use crate::config::{PackerConfig, PolicyConfig};
use crate::error::PackError;
use crate::object::{ObjectId, UvmObject, VisitSet};
use crate::policy::RecursionPolicy;
use crate::report::Reporter;
use crate::scope::ScopeStack;

/// Widest single field accepted by [`Packer::pack_field`]
pub const MAX_FIELD_BITS: usize = 4096;

const META_BITS: usize = 4;

// ── Packer ─────────────────────────────────────────────────────────────

/// Bit-stream packer/unpacker
#[derive(Debug)]
pub struct Packer {
    config: PackerConfig,
    bits: BitBuffer,
    /// Bits written (packing) or consumed (unpacking)
    count: usize,
    /// Committed stream length
    packed_size: usize,
    scope: ScopeStack,
    visits: VisitSet,
    reporter: Reporter,
    errors: Vec<PackError>,
}

impl Default for Packer {
    fn default() -> Self {
        Self::new()
    }
}

impl Packer {
    pub fn new() -> Self {
        Self::with_config(PackerConfig::default())
    }

    pub fn with_config(config: PackerConfig) -> Self {
        Self {
            config,
            bits: BitBuffer::new(),
            count: 0,
            packed_size: 0,
            scope: ScopeStack::new(),
            visits: VisitSet::new(),
            reporter: Reporter::default(),
            errors: Vec::new(),
        }
    }

    /// Build from the `[packer]` and `[report]` sections
    pub fn from_policy(policy: &PolicyConfig) -> Self {
        let mut packer = Self::with_config(policy.packer.clone());
        packer.reporter.set_max_verbosity(policy.report.max_verbosity);
        packer
    }

    // ── Knobs ──────────────────────────────────────────────────────────

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PackerConfig {
        &mut self.config
    }

    pub fn big_endian(&self) -> bool {
        self.config.big_endian
    }

    pub fn set_big_endian(&mut self, big_endian: bool) {
        self.config.big_endian = big_endian;
    }

    pub fn use_metadata(&self) -> bool {
        self.config.use_metadata
    }

    pub fn set_use_metadata(&mut self, use_metadata: bool) {
        self.config.use_metadata = use_metadata;
    }

    /// Whether `do_pack` implementations should include physical fields
    pub fn physical(&self) -> bool {
        self.config.physical
    }

    /// Whether `do_pack` implementations should include abstract fields
    pub fn abstract_(&self) -> bool {
        self.config.abstract_
    }

    pub fn policy(&self) -> RecursionPolicy {
        self.config.policy
    }

    // ── State ──────────────────────────────────────────────────────────

    /// Zero the stream, cursor, scope and error list.
    pub fn reset(&mut self) {
        self.bits.clear();
        self.count = 0;
        self.packed_size = 0;
        self.scope.clear();
        self.errors.clear();
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn get_packed_size(&self) -> usize {
        self.packed_size
    }

    /// Commit the bits written so far and rewind the cursor.
    pub fn set_packed_size(&mut self) {
        self.packed_size = self.count;
        self.count = 0;
    }

    pub fn scope(&self) -> &ScopeStack {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut ScopeStack {
        &mut self.scope
    }

    pub fn visits(&self) -> &VisitSet {
        &self.visits
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut Reporter {
        &mut self.reporter
    }

    /// Usage errors since the last [`reset`](Self::reset)
    pub fn errors(&self) -> &[PackError] {
        &self.errors
    }

    fn fail(&mut self, id: &str, err: PackError) {
        self.reporter.error(id, err.to_string());
        self.errors.push(err);
    }

    // ── Raw Field Access ───────────────────────────────────────────────

    fn write_field(&mut self, value: u64, size: usize) {
        let value = if self.config.big_endian {
            reverse_bits(value, size)
        } else {
            value
        };
        self.bits.write(self.count, value, size);
        self.count += size;
    }

    fn read_field(&mut self, size: usize) -> u64 {
        let raw = self.bits.read(self.count, size);
        self.count += size;
        if self.config.big_endian {
            reverse_bits(raw, size)
        } else {
            raw
        }
    }

    fn write_field_wide(&mut self, value: &BigUint, size: usize) {
        if !self.config.big_endian {
            self.bits.write_wide(self.count, value, size);
        } else {
            // chunk k (value bits 64k..64k+w) lands mirrored at the far end
            let mut digits = value.iter_u64_digits();
            let mut offset = 0;
            while offset < size {
                let w = (size - offset).min(64);
                let chunk = digits.next().unwrap_or(0);
                self.bits
                    .write(self.count + size - offset - w, reverse_bits(chunk, w), w);
                offset += w;
            }
        }
        self.count += size;
    }

    fn read_field_wide(&mut self, size: usize) -> BigUint {
        let value = if !self.config.big_endian {
            self.bits.read_wide(self.count, size)
        } else {
            let mut value = BigUint::default();
            let mut offset = 0;
            while offset < size {
                let w = (size - offset).min(64);
                let raw = self.bits.read(self.count + size - offset - w, w);
                value |= BigUint::from(reverse_bits(raw, w)) << offset;
                offset += w;
            }
            value
        };
        self.count += size;
        value
    }

    // ── Packing ────────────────────────────────────────────────────────

    /// Pack the low `size` bits of `value` (`size <= 64`).
    pub fn pack_field_int(&mut self, value: u64, size: usize) {
        if size > 64 {
            self.fail(
                "PCKSZ",
                PackError::FieldTooWide {
                    size,
                    max: 64,
                    what: "pack_field_int",
                },
            );
            return;
        }
        self.write_field(value, size);
    }

    /// Pack the low `size` bits of a wide value (`size <= 4096`).
    pub fn pack_field(&mut self, value: &BigUint, size: usize) {
        if size <= 64 {
            let low = value.iter_u64_digits().next().unwrap_or(0);
            self.pack_field_int(low, size);
            return;
        }
        if size > MAX_FIELD_BITS {
            self.fail(
                "PCKSZ",
                PackError::FieldTooWide {
                    size,
                    max: MAX_FIELD_BITS,
                    what: "pack_field",
                },
            );
            return;
        }
        self.write_field_wide(value, size);
    }

    fn pack_array(&mut self, elems: &[u64], elem_bits: usize, size: Option<usize>, what: &'static str) {
        let capacity = elems.len() * elem_bits;
        let total = match size {
            Some(size) if size > capacity => {
                self.fail(
                    "UVM/BASE/PACKER/BAD_SIZE",
                    PackError::SizeExceedsCapacity { size, capacity, what },
                );
                return;
            }
            Some(size) => size,
            None => capacity,
        };
        let mut remaining = total;
        let mut write = |packer: &mut Self, elem: u64| {
            let w = remaining.min(elem_bits);
            packer.bits.write(packer.count, elem, w);
            packer.count += w;
            remaining -= w;
        };
        if self.config.big_endian {
            for &e in elems.iter().rev() {
                write(self, e);
            }
        } else {
            for &e in elems {
                write(self, e);
            }
        }
    }

    /// Pack a byte array; `size` limits the number of bits taken.
    pub fn pack_bytes(&mut self, values: &[u8], size: Option<usize>) {
        let elems: Vec<u64> = values.iter().map(|&b| b as u64).collect();
        self.pack_array(&elems, 8, size, "pack_bytes");
    }

    /// Pack a 32-bit word array; `size` limits the number of bits taken.
    pub fn pack_ints(&mut self, values: &[u32], size: Option<usize>) {
        let elems: Vec<u64> = values.iter().map(|&w| w as u64).collect();
        self.pack_array(&elems, 32, size, "pack_ints");
    }

    /// Pack a string as one integer of `8 * len` bits, first character most
    /// significant. A zero terminator byte follows under `use_metadata`.
    pub fn pack_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        if !bytes.is_empty() {
            let v = BigUint::from_bytes_be(bytes);
            self.write_field_wide(&v, bytes.len() * 8);
        }
        if self.config.use_metadata {
            self.write_field(0, 8);
        }
    }

    pub fn pack_time(&mut self, value: u64) {
        self.write_field(value, 64);
    }

    pub fn pack_real(&mut self, value: f64) {
        self.write_field(value.to_bits(), 64);
    }

    /// Pack a sub-object through its `do_pack` hook.
    pub fn pack_object(&mut self, value: Option<&dyn UvmObject>) {
        let Some(obj) = value else {
            if self.config.use_metadata {
                self.write_field(0, META_BITS);
            }
            return;
        };
        let Some(_guard) = self.visits.enter(ObjectId::of(obj)) else {
            self.reporter.warning(
                "CYCFND",
                format!("Cycle detected for object @{} during pack", obj.inst_id()),
            );
            if self.config.use_metadata {
                self.write_field(0, META_BITS);
            }
            return;
        };
        if self.config.policy != RecursionPolicy::Reference {
            if self.config.use_metadata {
                self.write_field(1, META_BITS);
            }
            self.scope.down(obj.name());
            obj.do_pack(self);
            self.scope.up();
        } else if self.config.use_metadata {
            self.write_field(0, META_BITS);
        }
    }

    // ── Unpacking ──────────────────────────────────────────────────────

    /// Check that `needed` bits remain; reports `PCKSZ` when they don't.
    pub fn enough_bits(&mut self, needed: usize, what: &'static str) -> bool {
        let available = self.packed_size.saturating_sub(self.count);
        if available < needed {
            self.fail(
                "PCKSZ",
                PackError::NotEnoughBits {
                    needed,
                    available,
                    what,
                },
            );
            return false;
        }
        true
    }

    /// Unpack `size` bits (`size <= 64`). Yields 0 when the stream is short.
    pub fn unpack_field_int(&mut self, size: usize) -> u64 {
        if size > 64 {
            self.fail(
                "PCKSZ",
                PackError::FieldTooWide {
                    size,
                    max: 64,
                    what: "unpack_field_int",
                },
            );
            return 0;
        }
        if !self.enough_bits(size, "integral") {
            return 0;
        }
        self.read_field(size)
    }

    /// Unpack a wide field (`size <= 4096`).
    pub fn unpack_field(&mut self, size: usize) -> BigUint {
        if size <= 64 {
            return BigUint::from(self.unpack_field_int(size));
        }
        if size > MAX_FIELD_BITS {
            self.fail(
                "PCKSZ",
                PackError::FieldTooWide {
                    size,
                    max: MAX_FIELD_BITS,
                    what: "unpack_field",
                },
            );
            return BigUint::default();
        }
        if !self.enough_bits(size, "integral") {
            return BigUint::default();
        }
        self.read_field_wide(size)
    }

    fn unpack_array(&mut self, len: usize, elem_bits: usize, size: Option<usize>, what: &'static str) -> Vec<u64> {
        let capacity = len * elem_bits;
        let total = match size {
            Some(size) if size > capacity => {
                self.fail(
                    "UVM/BASE/PACKER/BAD_SIZE",
                    PackError::SizeExceedsCapacity { size, capacity, what },
                );
                return vec![0; len];
            }
            Some(size) => size,
            None => capacity,
        };
        if !self.enough_bits(total, what) {
            return vec![0; len];
        }
        let mut out = Vec::with_capacity(len);
        let mut remaining = total;
        for _ in 0..len {
            let w = remaining.min(elem_bits);
            out.push(self.bits.read(self.count, w));
            self.count += w;
            remaining -= w;
        }
        if self.config.big_endian {
            out.reverse();
        }
        out
    }

    /// Unpack `len` bytes; `size` limits the number of bits read.
    pub fn unpack_bytes(&mut self, len: usize, size: Option<usize>) -> Vec<u8> {
        self.unpack_array(len, 8, size, "unpack_bytes")
            .into_iter()
            .map(|e| e as u8)
            .collect()
    }

    /// Unpack `len` 32-bit words; `size` limits the number of bits read.
    pub fn unpack_ints(&mut self, len: usize, size: Option<usize>) -> Vec<u32> {
        self.unpack_array(len, 32, size, "unpack_ints")
            .into_iter()
            .map(|e| e as u32)
            .collect()
    }

    /// Unpack a string of `num_chars` characters, or up to the next zero
    /// byte (or end of stream) when `None`.
    pub fn unpack_string(&mut self, num_chars: Option<usize>) -> String {
        let n = match num_chars {
            Some(n) => n,
            None => {
                let mut n = 0;
                while self.packed_size.saturating_sub(self.count) >= 8 * (n + 1)
                    && self.bits.read(self.count + 8 * n, 8) != 0
                {
                    n += 1;
                }
                n
            }
        };
        let mut text = String::new();
        if n > 0 && self.enough_bits(8 * n, "string") {
            let v = self.read_field_wide(8 * n);
            let bytes = if v.bits() == 0 { Vec::new() } else { v.to_bytes_be() };
            let mut padded = vec![0u8; n.saturating_sub(bytes.len())];
            padded.extend_from_slice(&bytes);
            text = String::from_utf8_lossy(&padded).into_owned();
        }
        if self.config.use_metadata && self.enough_bits(8, "string") {
            self.count += 8;
        }
        text
    }

    pub fn unpack_time(&mut self) -> u64 {
        self.unpack_field_int(64)
    }

    pub fn unpack_real(&mut self) -> f64 {
        f64::from_bits(self.unpack_field_int(64))
    }

    /// Peek the metadata marker of the next object. Always `false` without
    /// `use_metadata`.
    pub fn is_null(&self) -> bool {
        if !self.config.use_metadata {
            return false;
        }
        self.bits.read(self.count, META_BITS) == 0
    }

    /// Unpack a sub-object through its `do_unpack` hook. Under `Reference`
    /// policy nothing but the metadata marker is read.
    pub fn unpack_object(&mut self, value: Option<&mut dyn UvmObject>) {
        let non_null = if self.config.use_metadata {
            self.unpack_field_int(META_BITS) != 0
        } else {
            true
        };
        let by_value = non_null && self.config.policy != RecursionPolicy::Reference;
        match value {
            Some(obj) if by_value => {
                let Some(_guard) = self.visits.enter(ObjectId::of(&*obj)) else {
                    self.reporter.warning(
                        "CYCFND",
                        format!("Cycle detected for object @{} during unpack", obj.inst_id()),
                    );
                    return;
                };
                let name = obj.name().to_owned();
                self.scope.down(&name);
                obj.do_unpack(self);
                self.scope.up();
            }
            Some(_) => {}
            None if by_value => self.fail("UNPOBJ", PackError::NullObject),
            None => {}
        }
    }

    // ── Materialization ────────────────────────────────────────────────

    fn get_chunks(&self, unit: usize) -> Vec<u64> {
        let n = self.packed_size.div_ceil(unit);
        let mut out: Vec<u64> = (0..n)
            .map(|i| {
                let w = (self.packed_size - i * unit).min(unit);
                self.bits.read(i * unit, w)
            })
            .collect();
        if self.config.big_endian {
            out.reverse();
        }
        out
    }

    fn put_chunks(&mut self, chunks: impl DoubleEndedIterator<Item = u64> + ExactSizeIterator, unit: usize) {
        self.bits.clear();
        let n = chunks.len();
        let big_endian = self.config.big_endian;
        let mut store = |i: usize, v: u64| self.bits.write(i * unit, v, unit);
        if big_endian {
            for (i, v) in chunks.rev().enumerate() {
                store(i, v);
            }
        } else {
            for (i, v) in chunks.enumerate() {
                store(i, v);
            }
        }
        self.packed_size = n * unit;
        self.count = 0;
    }

    /// Packed stream as individual bits, stream order
    pub fn get_bits(&self) -> Vec<bool> {
        (0..self.packed_size).map(|i| self.bits.bit(i)).collect()
    }

    /// Packed stream as bytes; the final partial byte is masked
    pub fn get_bytes(&self) -> Vec<u8> {
        self.get_chunks(8).into_iter().map(|v| v as u8).collect()
    }

    /// Packed stream as 32-bit words; the final partial word is masked
    pub fn get_ints(&self) -> Vec<u32> {
        self.get_chunks(32).into_iter().map(|v| v as u32).collect()
    }

    /// Packed stream as one integer, stream bit 0 least significant
    pub fn get_packed_bits(&self) -> BigUint {
        self.bits.read_wide(0, self.packed_size)
    }

    /// Load a bit stream for unpacking.
    pub fn put_bits(&mut self, bits: &[bool]) {
        self.bits.clear();
        for (i, &b) in bits.iter().enumerate() {
            self.bits.set_bit(i, b);
        }
        self.packed_size = bits.len();
        self.count = 0;
    }

    /// Load bytes produced by [`get_bytes`](Self::get_bytes).
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_chunks(bytes.iter().map(|&b| b as u64), 8);
    }

    /// Load words produced by [`get_ints`](Self::get_ints).
    pub fn put_ints(&mut self, ints: &[u32]) {
        self.put_chunks(ints.iter().map(|&w| w as u64), 32);
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
