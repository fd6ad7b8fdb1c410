//! Recursion policies and radix formatting
//!
//! Shared knobs of the packer, comparer and recorder, and the text rendering
//! of field values used in miscompare messages and transcripts.

use core::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

// ── Recursion Policy ───────────────────────────────────────────────────

/// How sub-objects are visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecursionPolicy {
    /// Recurse into sub-objects
    #[default]
    Deep,
    /// Currently visited like `Deep`
    Shallow,
    /// Identity only, never recurse
    Reference,
}

// ── Radix ──────────────────────────────────────────────────────────────

/// Numeric base used for diagnostic text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Radix {
    Bin,
    Oct,
    /// Signed decimal: the masked value is read as two's complement over
    /// the field width, so `0x80` in 8 bits renders `-128`. Use `Unsigned`
    /// for plain magnitude.
    Dec,
    Unsigned,
    Hex,
    String,
    Time,
    Enum,
    Real,
    /// Use the policy object's default
    #[default]
    NoRadix,
}

impl Radix {
    pub fn uvm_name(self) -> &'static str {
        match self {
            Radix::Bin => "UVM_BIN",
            Radix::Oct => "UVM_OCT",
            Radix::Dec => "UVM_DEC",
            Radix::Unsigned => "UVM_UNSIGNED",
            Radix::Hex => "UVM_HEX",
            Radix::String => "UVM_STRING",
            Radix::Time => "UVM_TIME",
            Radix::Enum => "UVM_ENUM",
            Radix::Real => "UVM_REAL",
            Radix::NoRadix => "UVM_NORADIX",
        }
    }
}

impl fmt::Display for Radix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uvm_name())
    }
}

// ── Value Formatting ───────────────────────────────────────────────────

/// Mask for the low `size` bits of a 64-bit value
#[inline]
pub fn mask64(size: usize) -> u64 {
    if size >= 64 {
        u64::MAX
    } else {
        (1u64 << size) - 1
    }
}

/// Truncate a wide value to its low `size` bits
pub fn mask_wide(value: &BigUint, size: usize) -> BigUint {
    if value.bits() as usize <= size {
        return value.clone();
    }
    let mask = (BigUint::from(1u8) << size) - 1u8;
    value & mask
}

/// Render `value` (masked to `size` bits) in the given radix.
///
/// `NoRadix` and `Enum` render as hex and unsigned decimal respectively.
pub fn format_value(value: &BigUint, size: usize, radix: Radix) -> String {
    let v = mask_wide(value, size);
    match radix {
        Radix::Bin => v.to_str_radix(2),
        Radix::Oct => v.to_str_radix(8),
        Radix::Hex | Radix::NoRadix => v.to_str_radix(16),
        Radix::Unsigned | Radix::Time | Radix::Enum => v.to_str_radix(10),
        Radix::Dec => {
            if size > 0 && v.bit(size as u64 - 1) {
                let modulus = BigUint::from(1u8) << size;
                format!("-{}", (modulus - v).to_str_radix(10))
            } else {
                v.to_str_radix(10)
            }
        }
        Radix::String => {
            let bytes = v.to_bytes_be();
            bytes
                .iter()
                .filter(|&&b| b != 0)
                .map(|&b| b as char)
                .collect()
        }
        Radix::Real => {
            let bits = v.iter_u64_digits().next().unwrap_or(0);
            format_real(f64::from_bits(bits))
        }
    }
}

/// Render a 64-bit value; shorthand for [`format_value`].
pub fn format_int(value: u64, size: usize, radix: Radix) -> String {
    format_value(&BigUint::from(value), size, radix)
}

/// `%g`-style rendering of a real
pub fn format_real(value: f64) -> String {
    format!("{value}")
}
