//! UVM Policy — data-object automation core
//!
//! Pack, compare and record tree-structured transaction objects.
//!
//! Field-level automation for verification data objects:
//! - Bit packer with big/little-endian field order and optional metadata
//! - Structural comparer with cycle-safe pairing and miscompare tallies
//! - Transaction recorder with pluggable backends and a text transcript
//! - Hierarchical scope names for diagnostics (`top.child[3].field`)
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bits`] | Growable bit buffer and bit reversal |
//! | [`comparer`] | Field-by-field object comparison |
//! | [`config`] | TOML-loadable policy knobs |
//! | [`error`] | Packer, recording and config errors |
//! | [`object`] | Object trait, hook traits and automation entry points |
//! | [`packer`] | Bit-stream packer/unpacker |
//! | [`policy`] | Recursion policy, radix and value formatting |
//! | [`recorder`] | Transaction recorder and backends |
//! | [`report`] | Diagnostics collector forwarding to `tracing` |
//! | [`scope`] | Scope path stack |
//! | [`text_db`] | Text transcript database |
//!
//! # Quick Start
//!
//! ```
//! use uvm_policy::{impl_uvm_object, compare, pack_bytes, unpack_bytes};
//! use uvm_policy::{Comparable, Comparer, Copyable, ObjectCore, Packable, Packer, Radix, Recordable};
//! use uvm_policy::{downcast_ref, UvmObject};
//!
//! struct Beat {
//!     core: ObjectCore,
//!     addr: u16,
//! }
//! impl_uvm_object!(Beat, core);
//!
//! impl Packable for Beat {
//!     fn do_pack(&self, p: &mut Packer) {
//!         p.pack_field_int(self.addr as u64, 16);
//!     }
//!     fn do_unpack(&mut self, p: &mut Packer) {
//!         self.addr = p.unpack_field_int(16) as u16;
//!     }
//! }
//! impl Comparable for Beat {
//!     fn do_compare(&self, rhs: &dyn UvmObject, c: &mut Comparer) -> bool {
//!         let Some(rhs) = downcast_ref::<Beat>(rhs) else { return false };
//!         c.compare_field_int("addr", self.addr as u64, rhs.addr as u64, 16, Radix::Hex)
//!     }
//! }
//! impl Recordable for Beat {}
//! impl Copyable for Beat {}
//!
//! // Big-endian packing reverses each field's bits
//! let src = Beat { core: ObjectCore::new("beat"), addr: 0x1234 };
//! let mut packer = Packer::new();
//! let bytes = pack_bytes(&src, &mut packer);
//! assert_eq!(bytes, vec![0x2C, 0x48]);
//!
//! // Round-trip and compare
//! let mut dst = Beat { core: ObjectCore::new("beat"), addr: 0 };
//! unpack_bytes(&mut dst, &bytes, &mut packer).unwrap();
//! assert!(compare(&src, Some(&dst), &mut Comparer::new()));
//! ```

pub mod bits;
pub mod comparer;
pub mod config;
pub mod error;
pub mod object;
pub mod packer;
pub mod policy;
pub mod recorder;
pub mod report;
pub mod scope;
pub mod text_db;

pub use bits::{reverse_bits, BitBuffer};
pub use comparer::Comparer;
pub use config::{ComparerConfig, PackerConfig, PolicyConfig, RecorderConfig, RecordingConfig, ReportConfig};
pub use error::{ConfigError, PackError, RecordingError};
pub use object::{
    compare, copy, copy_depth, downcast_ref, pack, pack_bytes, pack_ints, record, unpack, unpack_bytes, unpack_ints,
    Comparable, Copyable, ObjectCore, ObjectId, Packable, Recordable, UvmObject, VisitSet,
};
pub use packer::{Packer, MAX_FIELD_BITS};
pub use policy::{format_value, Radix, RecursionPolicy};
pub use recorder::{Attribute, MemoryBackend, Recorder, RecorderInfo, RecorderState, RecordingBackend, TraceEvent};
pub use report::{Report, Reporter, Severity, Verbosity};
pub use scope::ScopeStack;
pub use text_db::{TextDatabase, TextStream};
