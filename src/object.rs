//! Data-object model and automation entry points
//!
//! A data type opts into the pack/compare/record/copy machinery by
//! implementing [`UvmObject`] and the four hook traits. The hooks default to
//! no-ops, so a type only overrides the ones whose fields should take part:
//!
//! ```
//! use uvm_policy::{impl_uvm_object, ObjectCore, Packable, Comparable, Recordable, Copyable};
//! use uvm_policy::{Packer, pack_bytes};
//!
//! struct Beat { core: ObjectCore, data: u8 }
//! impl_uvm_object!(Beat, core);
//!
//! impl Packable for Beat {
//!     fn do_pack(&self, packer: &mut Packer) {
//!         packer.pack_field_int(self.data as u64, 8);
//!     }
//! }
//! impl Comparable for Beat {}
//! impl Recordable for Beat {}
//! impl Copyable for Beat {}
//!
//! let beat = Beat { core: ObjectCore::new("beat"), data: 0xA5 };
//! let mut packer = Packer::new();
//! packer.set_big_endian(false);
//! assert_eq!(pack_bytes(&beat, &mut packer), vec![0xA5]);
//! ```
//!
//! The free functions at the bottom of this module are the public,
//! non-overridable entry points. They stage the policy object and call the
//! hooks, which call back into the `pack_*`, `compare_*` and `record_*`
//! primitives.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::comparer::Comparer;
use crate::error::PackError;
use crate::packer::Packer;
use crate::recorder::Recorder;

// ── Object Core ────────────────────────────────────────────────────────

static NEXT_INST_ID: AtomicU64 = AtomicU64::new(1);

/// Name and instance id carried by every data object
#[derive(Debug, PartialEq, Eq)]
pub struct ObjectCore {
    name: String,
    inst_id: u64,
}

impl ObjectCore {
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            inst_id: NEXT_INST_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = String::from(name);
    }

    /// Process-unique instance id (never 0)
    pub fn inst_id(&self) -> u64 {
        self.inst_id
    }
}

impl Default for ObjectCore {
    fn default() -> Self {
        Self::new("")
    }
}

/// A clone is a new object: it keeps the name and gets a fresh instance id.
impl Clone for ObjectCore {
    fn clone(&self) -> Self {
        Self::new(&self.name)
    }
}

// ── Hook Traits ────────────────────────────────────────────────────────

/// Pack/unpack hooks
pub trait Packable {
    fn do_pack(&self, _packer: &mut Packer) {}
    fn do_unpack(&mut self, _packer: &mut Packer) {}
}

/// Compare hook. Returning `false` fails the comparison even when no
/// field miscompare was recorded.
pub trait Comparable {
    fn do_compare(&self, _rhs: &dyn UvmObject, _comparer: &mut Comparer) -> bool {
        true
    }
}

/// Record hook
pub trait Recordable {
    fn do_record(&self, _recorder: &mut Recorder) {}
}

/// Copy hook
pub trait Copyable {
    fn do_copy(&mut self, _rhs: &dyn UvmObject) {}
}

/// Base data object
pub trait UvmObject: Packable + Comparable + Recordable + Copyable + Any {
    fn core(&self) -> &ObjectCore;
    fn core_mut(&mut self) -> &mut ObjectCore;
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn inst_id(&self) -> u64 {
        self.core().inst_id()
    }
}

/// Implement [`UvmObject`] for a struct holding an [`ObjectCore`] field.
#[macro_export]
macro_rules! impl_uvm_object {
    ($ty:ty, $field:ident) => {
        impl $crate::object::UvmObject for $ty {
            fn core(&self) -> &$crate::object::ObjectCore {
                &self.$field
            }
            fn core_mut(&mut self) -> &mut $crate::object::ObjectCore {
                &mut self.$field
            }
            fn type_name(&self) -> &'static str {
                stringify!($ty)
            }
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}

/// Downcast a dynamic object to its concrete type
pub fn downcast_ref<T: UvmObject>(obj: &dyn UvmObject) -> Option<&T> {
    obj.as_any().downcast_ref::<T>()
}

// ── Identity & Cycle Check ─────────────────────────────────────────────

/// Identity of an object, keyed on its instance id.
///
/// Addresses are not usable here: a sub-object stored first in its parent
/// shares the parent's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn of(obj: &dyn UvmObject) -> Self {
        Self(obj.inst_id())
    }
}

/// Objects currently being visited by a traversal.
///
/// [`VisitSet::enter`] hands back a guard; the entry is removed when the
/// guard drops, so an early return or unwind cannot leave it behind.
#[derive(Debug, Default)]
pub struct VisitSet {
    active: Rc<RefCell<HashSet<ObjectId>>>,
}

/// Membership token returned by [`VisitSet::enter`]
#[derive(Debug)]
#[must_use = "the object leaves the visit set when the guard drops"]
pub struct VisitGuard {
    active: Rc<RefCell<HashSet<ObjectId>>>,
    id: ObjectId,
}

impl Drop for VisitGuard {
    fn drop(&mut self) {
        self.active.borrow_mut().remove(&self.id);
    }
}

impl VisitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as in progress. `None` if it already is (a cycle).
    pub fn enter(&self, id: ObjectId) -> Option<VisitGuard> {
        if !self.active.borrow_mut().insert(id) {
            return None;
        }
        Some(VisitGuard {
            active: Rc::clone(&self.active),
            id,
        })
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.active.borrow().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.active.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.borrow().is_empty()
    }
}

// ── Pack Entry Points ──────────────────────────────────────────────────

fn m_pack(obj: &dyn UvmObject, packer: &mut Packer) {
    packer.reset();
    let _guard = packer.visits().enter(ObjectId::of(obj));
    packer.scope_mut().down(obj.name());
    obj.do_pack(packer);
    packer.set_packed_size();
    packer.scope_mut().up();
}

/// Pack `obj` into a bit array (stream order). The size is
/// `packer.get_packed_size()`.
pub fn pack(obj: &dyn UvmObject, packer: &mut Packer) -> Vec<bool> {
    m_pack(obj, packer);
    packer.get_bits()
}

/// Pack `obj` into bytes.
pub fn pack_bytes(obj: &dyn UvmObject, packer: &mut Packer) -> Vec<u8> {
    m_pack(obj, packer);
    packer.get_bytes()
}

/// Pack `obj` into 32-bit words.
pub fn pack_ints(obj: &dyn UvmObject, packer: &mut Packer) -> Vec<u32> {
    m_pack(obj, packer);
    packer.get_ints()
}

// ── Unpack Entry Points ────────────────────────────────────────────────

fn m_unpack_post(obj: &mut dyn UvmObject, packer: &mut Packer) -> Result<usize, PackError> {
    let provided = packer.get_packed_size();
    let name = obj.name().to_owned();
    {
        let _guard = packer.visits().enter(ObjectId::of(&*obj));
        packer.scope_mut().down(&name);
        obj.do_unpack(packer);
        packer.scope_mut().up();
    }
    if let Some(err) = packer.errors().first() {
        return Err(err.clone());
    }
    let unpacked = packer.count();
    if unpacked != provided {
        let warn = PackError::IncompleteUnpack {
            unpacked,
            total: provided,
        };
        packer.reporter_mut().warning("BDUNPK", warn.to_string());
    }
    Ok(unpacked)
}

/// Unpack `obj` from a bit array. Returns the number of bits consumed, or
/// the first usage error hit during the traversal.
pub fn unpack(obj: &mut dyn UvmObject, bits: &[bool], packer: &mut Packer) -> Result<usize, PackError> {
    packer.reset();
    packer.put_bits(bits);
    m_unpack_post(obj, packer)
}

/// Unpack `obj` from bytes produced by [`pack_bytes`].
pub fn unpack_bytes(obj: &mut dyn UvmObject, bytes: &[u8], packer: &mut Packer) -> Result<usize, PackError> {
    packer.reset();
    packer.put_bytes(bytes);
    m_unpack_post(obj, packer)
}

/// Unpack `obj` from words produced by [`pack_ints`].
pub fn unpack_ints(obj: &mut dyn UvmObject, ints: &[u32], packer: &mut Packer) -> Result<usize, PackError> {
    packer.reset();
    packer.put_ints(ints);
    m_unpack_post(obj, packer)
}

// ── Compare Entry Point ────────────────────────────────────────────────

/// Deep-compare `lhs` against `rhs`.
///
/// At the top of a comparison (empty scope) the comparer is reset and the
/// object's name becomes the root scope. The result is `true` only when no
/// miscompare was tallied *and* `do_compare` returned `true`.
pub fn compare(lhs: &dyn UvmObject, rhs: Option<&dyn UvmObject>, comparer: &mut Comparer) -> bool {
    let top = comparer.scope().depth() == 0;
    if top {
        comparer.begin();
        let name = if lhs.name().is_empty() {
            "<object>"
        } else {
            lhs.name()
        };
        comparer.scope_mut().down(name);
    }

    let mut dc = false;
    match rhs {
        None => {
            comparer.print_msg(String::from("rhs is <null>"));
            if top {
                let msg = format!("Miscompare for {}: rhs is null", comparer.scope().get());
                let verbosity = comparer.config().verbosity;
                comparer.reporter_mut().info("NOCOMP", verbosity, msg);
            }
        }
        Some(rhs) => {
            let lhs_id = ObjectId::of(lhs);
            let rhs_id = ObjectId::of(rhs);
            if let Some(paired) = comparer.paired_with(rhs_id) {
                if paired != lhs_id {
                    comparer.print_msg_object(Some(lhs), Some(rhs));
                } else {
                    dc = true;
                }
            } else if comparer.config().check_type && lhs.type_name() != rhs.type_name() {
                comparer.print_msg(format!(
                    "lhs type = \"{}\" : rhs type = \"{}\"",
                    lhs.type_name(),
                    rhs.type_name()
                ));
            } else {
                comparer.pair(rhs_id, lhs_id);
                dc = lhs.do_compare(rhs, comparer);
            }
        }
    }

    if top {
        comparer.scope_mut().up();
        comparer.print_rollup(lhs, rhs);
    }
    comparer.result() == 0 && dc
}

// ── Record / Copy Entry Points ─────────────────────────────────────────

/// Record `obj`'s fields into `recorder`.
pub fn record(obj: &dyn UvmObject, recorder: &mut Recorder) {
    recorder.enter_record();
    obj.do_record(recorder);
    recorder.leave_record();
}

thread_local! {
    /// Sources of the copies in progress on this thread
    static COPY_VISITS: VisitSet = VisitSet::new();
}

/// Copy `src` into `dst` through `dst.do_copy`.
///
/// A null source is ignored, as is a copy onto itself. Nested `copy` calls
/// made from `do_copy` are cycle-checked on the source: a source already
/// being copied is skipped with a `CYCCPY` warning.
pub fn copy(dst: &mut dyn UvmObject, src: Option<&dyn UvmObject>) {
    let Some(src) = src else {
        tracing::warn!(id = "NULLCP", "A null object was supplied to copy; copy is ignored");
        return;
    };
    if ObjectId::of(&*dst) == ObjectId::of(src) {
        return;
    }
    let Some(_guard) = COPY_VISITS.with(|visits| visits.enter(ObjectId::of(src))) else {
        tracing::warn!(id = "CYCCPY", inst_id = src.inst_id(), "Cycle detected during copy; object skipped");
        return;
    };
    dst.do_copy(src);
}

/// Number of copies in progress on this thread
pub fn copy_depth() -> usize {
    COPY_VISITS.with(VisitSet::len)
}
