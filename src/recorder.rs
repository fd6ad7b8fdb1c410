//! Transaction recorder
//!
//! A [`Recorder`] captures the fields of one transaction as named attributes
//! and forwards them to a [`RecordingBackend`]. Its lifecycle is
//!
//! ```text
//! Freed --m_do_open--> Open --close--> Closed --free--> Freed
//! ```
//!
//! `free` on an open recorder closes it first. Field calls on a recorder with
//! no backend are dropped silently.
//!
//! Handles are allocated lazily from a process-wide counter the first time
//! [`Recorder::get_handle`] is called and stay stable until the recorder is
//! freed. [`Recorder::from_handle`] resolves a handle back to the recorder's
//! identity through the same registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use num_bigint::BigUint;
use parking_lot::Mutex;

use crate::config::{PolicyConfig, RecorderConfig};
use crate::error::RecordingError;
use crate::object::{self, ObjectId, UvmObject, VisitSet};
use crate::policy::{format_int, format_real, format_value, Radix, RecursionPolicy};
use crate::report::Reporter;
use crate::scope::ScopeStack;

// ── Handle Registry ────────────────────────────────────────────────────

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Registry snapshot of a recorder with a live handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderInfo {
    pub handle: u64,
    pub name: String,
    pub type_name: String,
    pub open_time: u64,
}

#[derive(Debug, Default)]
struct HandleRegistry {
    last: u64,
    /// recorder serial -> handle
    by_recorder: HashMap<u64, u64>,
    /// handle -> (recorder serial, info)
    by_handle: HashMap<u64, (u64, RecorderInfo)>,
}

impl HandleRegistry {
    fn release(&mut self, serial: u64) {
        if let Some(handle) = self.by_recorder.remove(&serial) {
            if self.by_handle.get(&handle).is_some_and(|(s, _)| *s == serial) {
                self.by_handle.remove(&handle);
            }
        }
    }
}

static HANDLES: LazyLock<Mutex<HandleRegistry>> = LazyLock::new(|| Mutex::new(HandleRegistry::default()));

// ── Backend ────────────────────────────────────────────────────────────

/// One recorded attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Handle of the recording transaction
    pub handle: u64,
    /// Full scope path of the field
    pub name: String,
    /// Value rendered in `radix`
    pub value: String,
    pub radix: Radix,
    pub bits: usize,
    /// Declared type of a generic attribute
    pub type_name: Option<String>,
}

/// Storage behind a recorder. Lifecycle hooks default to no-ops.
pub trait RecordingBackend: fmt::Debug {
    fn do_open(&mut self, _handle: u64, _name: &str, _open_time: u64, _type_name: &str) {}
    fn do_close(&mut self, _handle: u64, _close_time: u64) {}
    fn do_free(&mut self, _handle: u64, _time: u64) {}
    fn do_record_attribute(&mut self, attr: &Attribute);
}

/// Event captured by a [`MemoryBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Open {
        handle: u64,
        name: String,
        time: u64,
        type_name: String,
    },
    Close {
        handle: u64,
        time: u64,
    },
    Free {
        handle: u64,
        time: u64,
    },
    Attribute(Attribute),
}

/// In-memory linear trace. Clones share the same trace, so the caller can
/// keep one and hand another to the recorder.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    trace: Rc<RefCell<Vec<TraceEvent>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.trace.borrow().clone()
    }

    pub fn attributes(&self) -> Vec<Attribute> {
        self.trace
            .borrow()
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Attribute(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.trace.borrow_mut().clear();
    }
}

impl RecordingBackend for MemoryBackend {
    fn do_open(&mut self, handle: u64, name: &str, open_time: u64, type_name: &str) {
        self.trace.borrow_mut().push(TraceEvent::Open {
            handle,
            name: name.to_owned(),
            time: open_time,
            type_name: type_name.to_owned(),
        });
    }

    fn do_close(&mut self, handle: u64, close_time: u64) {
        self.trace.borrow_mut().push(TraceEvent::Close {
            handle,
            time: close_time,
        });
    }

    fn do_free(&mut self, handle: u64, time: u64) {
        self.trace.borrow_mut().push(TraceEvent::Free { handle, time });
    }

    fn do_record_attribute(&mut self, attr: &Attribute) {
        self.trace.borrow_mut().push(TraceEvent::Attribute(attr.clone()));
    }
}

// ── Recorder ───────────────────────────────────────────────────────────

/// Recorder lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecorderState {
    Freed,
    Open,
    Closed,
}

/// Field recorder for one transaction
#[derive(Debug)]
pub struct Recorder {
    serial: u64,
    name: String,
    config: RecorderConfig,
    state: RecorderState,
    open_time: u64,
    close_time: u64,
    type_name: String,
    backend: Option<Box<dyn RecordingBackend>>,
    scope: ScopeStack,
    visits: VisitSet,
    recording_depth: usize,
    reporter: Reporter,
}

impl Recorder {
    pub fn new(name: &str) -> Self {
        Self::with_config(name, RecorderConfig::default())
    }

    pub fn with_config(name: &str, config: RecorderConfig) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            name: String::from(name),
            config,
            state: RecorderState::Freed,
            open_time: 0,
            close_time: 0,
            type_name: String::new(),
            backend: None,
            scope: ScopeStack::new(),
            visits: VisitSet::new(),
            recording_depth: 0,
            reporter: Reporter::default(),
        }
    }

    /// Build from the `[recorder]` and `[report]` sections
    pub fn from_policy(name: &str, policy: &PolicyConfig) -> Self {
        let mut recorder = Self::with_config(name, policy.recorder.clone());
        recorder.reporter.set_max_verbosity(policy.report.max_verbosity);
        recorder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RecorderConfig {
        &mut self.config
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == RecorderState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state == RecorderState::Closed
    }

    pub fn open_time(&self) -> u64 {
        self.open_time
    }

    pub fn close_time(&self) -> u64 {
        self.close_time
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn scope(&self) -> &ScopeStack {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut ScopeStack {
        &mut self.scope
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Nesting level of object-level `record` calls in progress
    pub fn recording_depth(&self) -> usize {
        self.recording_depth
    }

    pub(crate) fn enter_record(&mut self) {
        self.recording_depth += 1;
    }

    pub(crate) fn leave_record(&mut self) {
        self.recording_depth = self.recording_depth.saturating_sub(1);
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Attach `backend` and open the recorder.
    pub fn m_do_open(
        &mut self,
        backend: Option<Box<dyn RecordingBackend>>,
        open_time: u64,
        type_name: &str,
    ) -> Result<(), RecordingError> {
        let Some(backend) = backend else {
            let err = RecordingError::NullStream(self.name.clone());
            self.reporter.error("UVM/REC/NULL_STREAM", err.to_string());
            return Err(err);
        };
        if self.state != RecorderState::Freed {
            let err = RecordingError::Reinitialized(self.name.clone());
            self.reporter.error("UVM/REC/RE_INIT", err.to_string());
            return Err(err);
        }
        self.backend = Some(backend);
        self.state = RecorderState::Open;
        self.open_time = open_time;
        self.close_time = 0;
        self.type_name = String::from(type_name);
        let handle = self.get_handle();
        tracing::debug!(handle, name = %self.name, open_time, "recorder opened");
        if let Some(backend) = self.backend.as_mut() {
            backend.do_open(handle, &self.name, open_time, type_name);
        }
        Ok(())
    }

    /// Close an open recorder. No-op in any other state.
    pub fn close(&mut self, close_time: u64) {
        if self.state != RecorderState::Open {
            return;
        }
        let handle = self.get_handle();
        if let Some(backend) = self.backend.as_mut() {
            backend.do_close(handle, close_time);
        }
        self.close_time = close_time;
        self.state = RecorderState::Closed;
        tracing::debug!(handle, close_time, "recorder closed");
    }

    /// Release the recorder, closing it first if still open.
    pub fn free(&mut self, close_time: u64) {
        if self.state == RecorderState::Freed {
            return;
        }
        self.close(close_time);
        let handle = self.get_handle();
        if let Some(mut backend) = self.backend.take() {
            backend.do_free(handle, close_time);
        }
        self.state = RecorderState::Freed;
        self.scope.clear();
        HANDLES.lock().release(self.serial);
        tracing::debug!(handle, "recorder freed");
    }

    /// Process-unique handle, or 0 when freed.
    pub fn get_handle(&self) -> u64 {
        if self.state == RecorderState::Freed {
            return 0;
        }
        let mut reg = HANDLES.lock();
        let handle = match reg.by_recorder.get(&self.serial) {
            Some(&h) => h,
            None => {
                reg.last += 1;
                let h = reg.last;
                reg.by_recorder.insert(self.serial, h);
                h
            }
        };
        let stale = reg.by_handle.get(&handle).map(|(s, _)| *s) != Some(self.serial);
        if stale {
            let info = RecorderInfo {
                handle,
                name: self.name.clone(),
                type_name: self.type_name.clone(),
                open_time: self.open_time,
            };
            reg.by_handle.insert(handle, (self.serial, info));
        }
        handle
    }

    /// Look up a live handle.
    pub fn from_handle(handle: u64) -> Option<RecorderInfo> {
        if handle == 0 {
            return None;
        }
        HANDLES.lock().by_handle.get(&handle).map(|(_, info)| info.clone())
    }

    // ── Field Recording ────────────────────────────────────────────────

    fn emit(&mut self, name: &str, value: String, radix: Radix, bits: usize, type_name: Option<&str>) {
        if self.backend.is_none() {
            return;
        }
        let handle = self.get_handle();
        self.scope.set_arg(name);
        let attr = Attribute {
            handle,
            name: self.scope.get(),
            value,
            radix,
            bits,
            type_name: type_name.map(String::from),
        };
        self.scope.unset_arg(name);
        if let Some(backend) = self.backend.as_mut() {
            backend.do_record_attribute(&attr);
        }
    }

    fn resolve(&self, radix: Radix) -> Radix {
        if radix == Radix::NoRadix {
            self.config.default_radix
        } else {
            radix
        }
    }

    /// Record the low `size` bits of a wide value.
    pub fn record_field(&mut self, name: &str, value: &BigUint, size: usize, radix: Radix) {
        let radix = self.resolve(radix);
        self.emit(name, format_value(value, size, radix), radix, size, None);
    }

    pub fn record_field_int(&mut self, name: &str, value: u64, size: usize, radix: Radix) {
        let radix = self.resolve(radix);
        self.emit(name, format_int(value, size, radix), radix, size, None);
    }

    pub fn record_field_real(&mut self, name: &str, value: f64) {
        self.emit(name, format_real(value), Radix::Real, 64, None);
    }

    pub fn record_string(&mut self, name: &str, value: &str) {
        self.emit(name, String::from(value), Radix::String, value.len() * 8, None);
    }

    pub fn record_time(&mut self, name: &str, value: u64) {
        self.emit(name, value.to_string(), Radix::Time, 64, None);
    }

    /// Record a pre-rendered value of an arbitrary type.
    pub fn record_generic(&mut self, name: &str, value: &str, type_name: &str) {
        self.emit(name, String::from(value), Radix::String, value.len() * 8, Some(type_name));
    }

    /// Record a sub-object: its instance id, then (unless `Reference`) its
    /// fields under `name`.
    pub fn record_object(&mut self, name: &str, value: Option<&dyn UvmObject>) {
        if self.backend.is_none() {
            return;
        }
        if self.config.identifier {
            let id = value.map_or(0, |o| o.inst_id());
            self.record_field_int(name, id, 32, Radix::Dec);
        }
        let Some(obj) = value else {
            return;
        };
        if self.config.policy == RecursionPolicy::Reference {
            return;
        }
        let Some(_guard) = self.visits.enter(ObjectId::of(obj)) else {
            self.reporter.warning(
                "CYCFND",
                format!("Cycle detected for object @{} during record", obj.inst_id()),
            );
            return;
        };
        self.scope.down(name);
        object::record(obj, self);
        self.scope.up();
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        HANDLES.lock().release(self.serial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{record, Comparable, Copyable, ObjectCore, Packable, Recordable};

    fn opened(name: &str) -> (Recorder, MemoryBackend) {
        let trace = MemoryBackend::new();
        let mut rec = Recorder::new(name);
        rec.m_do_open(Some(Box::new(trace.clone())), 10, "bus_tx").unwrap();
        (rec, trace)
    }

    #[test]
    fn state_machine() {
        let (mut rec, trace) = opened("tx");
        assert!(rec.is_open());
        assert_eq!(rec.open_time(), 10);
        let h = rec.get_handle();
        assert_ne!(h, 0);
        assert_eq!(rec.get_handle(), h, "handle is stable");

        rec.close(20);
        assert!(rec.is_closed());
        assert_eq!(rec.get_handle(), h);
        rec.close(30);
        assert!(rec.is_closed());
        assert_eq!(rec.close_time(), 20);

        rec.free(40);
        assert_eq!(rec.state(), RecorderState::Freed);
        assert_eq!(rec.get_handle(), 0);
        assert!(Recorder::from_handle(h).is_none());

        let closes = trace
            .events()
            .iter()
            .filter(|e| matches!(e, TraceEvent::Close { .. }))
            .count();
        assert_eq!(closes, 1);
        assert!(matches!(trace.events().last(), Some(TraceEvent::Free { time: 40, .. })));
    }

    #[test]
    fn free_closes_open_recorder() {
        let (mut rec, trace) = opened("tx");
        rec.free(5);
        let events = trace.events();
        assert!(matches!(events[1], TraceEvent::Close { time: 5, .. }));
        assert!(matches!(events[2], TraceEvent::Free { .. }));
        rec.free(6);
        assert_eq!(trace.events().len(), 3);
    }

    #[test]
    fn open_without_backend_is_error() {
        let mut rec = Recorder::new("tx");
        let err = rec.m_do_open(None, 0, "t").unwrap_err();
        assert!(matches!(err, RecordingError::NullStream(_)));
        assert_eq!(rec.state(), RecorderState::Freed);
        assert_eq!(rec.reporter().with_id("UVM/REC/NULL_STREAM").count(), 1);
    }

    #[test]
    fn reopen_is_error() {
        let (mut rec, _trace) = opened("tx");
        let err = rec
            .m_do_open(Some(Box::new(MemoryBackend::new())), 1, "t")
            .unwrap_err();
        assert!(matches!(err, RecordingError::Reinitialized(_)));
        rec.close(2);
        assert!(rec.m_do_open(Some(Box::new(MemoryBackend::new())), 3, "t").is_err());
        rec.free(4);
        assert!(rec.m_do_open(Some(Box::new(MemoryBackend::new())), 5, "t").is_ok());
    }

    #[test]
    fn handles_are_unique_and_resolvable() {
        let (a, _ta) = opened("a");
        let (b, _tb) = opened("b");
        assert_ne!(a.get_handle(), b.get_handle());
        let info = Recorder::from_handle(b.get_handle()).unwrap();
        assert_eq!(info.name, "b");
        assert_eq!(info.type_name, "bus_tx");
        assert!(Recorder::from_handle(0).is_none());
    }

    #[test]
    fn handle_released_on_drop() {
        let h = {
            let (rec, _t) = opened("tmp");
            rec.get_handle()
        };
        assert!(Recorder::from_handle(h).is_none());
    }

    #[test]
    fn fields_without_backend_are_dropped() {
        let mut rec = Recorder::new("tx");
        rec.record_field_int("addr", 1, 8, Radix::Hex);
        rec.record_string("s", "x");
        assert_eq!(rec.get_handle(), 0);
    }

    #[test]
    fn field_attributes() {
        let (mut rec, trace) = opened("tx");
        rec.record_field_int("addr", 0x1F, 16, Radix::NoRadix);
        rec.record_field_int("delta", 0xFF, 8, Radix::Dec);
        rec.record_field("wide", &(BigUint::from(1u8) << 70u32), 72, Radix::Hex);
        rec.record_field_real("ratio", 0.5);
        rec.record_string("kind", "rd");
        rec.record_time("stamp", 100);
        rec.record_generic("mode", "BURST", "mode_e");

        let attrs = trace.attributes();
        let h = rec.get_handle();
        assert!(attrs.iter().all(|a| a.handle == h));
        let pick = |n: &str| attrs.iter().find(|a| a.name == n).unwrap().clone();

        let addr = pick("addr");
        assert_eq!((addr.value.as_str(), addr.radix, addr.bits), ("1f", Radix::Hex, 16));
        assert_eq!(pick("delta").value, "-1");
        assert_eq!(pick("wide").value, "400000000000000000");
        assert_eq!(pick("ratio").value, "0.5");
        let kind = pick("kind");
        assert_eq!((kind.value.as_str(), kind.bits), ("rd", 16));
        assert_eq!(pick("stamp").radix, Radix::Time);
        assert_eq!(pick("mode").type_name.as_deref(), Some("mode_e"));
    }

    // ── Objects ────────────────────────────────────────────────────────

    struct Inner {
        core: ObjectCore,
        v: u8,
    }
    crate::impl_uvm_object!(Inner, core);
    impl Packable for Inner {}
    impl Comparable for Inner {}
    impl Copyable for Inner {}
    impl Recordable for Inner {
        fn do_record(&self, recorder: &mut Recorder) {
            recorder.record_field_int("v", self.v as u64, 8, Radix::Unsigned);
        }
    }

    struct Outer {
        core: ObjectCore,
        inner: Option<Inner>,
    }
    crate::impl_uvm_object!(Outer, core);
    impl Packable for Outer {}
    impl Comparable for Outer {}
    impl Copyable for Outer {}
    impl Recordable for Outer {
        fn do_record(&self, recorder: &mut Recorder) {
            recorder.record_object("inner", self.inner.as_ref().map(|i| i as &dyn UvmObject));
        }
    }

    fn outer(inner: Option<u8>) -> Outer {
        Outer {
            core: ObjectCore::new("outer"),
            inner: inner.map(|v| Inner {
                core: ObjectCore::new("inner"),
                v,
            }),
        }
    }

    #[test]
    fn record_object_writes_id_then_fields() {
        let (mut rec, trace) = opened("tx");
        let o = outer(Some(7));
        record(&o, &mut rec);
        let attrs = trace.attributes();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].name, "inner");
        assert_eq!(attrs[0].radix, Radix::Dec);
        assert_eq!(attrs[0].bits, 32);
        assert_eq!(attrs[0].value, o.inner.as_ref().unwrap().inst_id().to_string());
        assert_eq!(attrs[1].name, "inner.v");
        assert_eq!(attrs[1].value, "7");
        assert_eq!(rec.recording_depth(), 0);
        assert_eq!(rec.scope().depth(), 0);
    }

    #[test]
    fn record_null_object_writes_zero_id() {
        let (mut rec, trace) = opened("tx");
        record(&outer(None), &mut rec);
        let attrs = trace.attributes();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].value, "0");
    }

    /// Sub-object stored first, so it shares its parent's address.
    #[repr(C)]
    struct Leading {
        inner: Inner,
        core: ObjectCore,
    }
    crate::impl_uvm_object!(Leading, core);
    impl Packable for Leading {}
    impl Comparable for Leading {}
    impl Copyable for Leading {}
    impl Recordable for Leading {
        fn do_record(&self, recorder: &mut Recorder) {
            recorder.record_object("inner", Some(&self.inner as &dyn UvmObject));
        }
    }

    #[test]
    fn leading_sub_object_is_recorded() {
        let (mut rec, trace) = opened("tx");
        let o = Leading {
            inner: Inner {
                core: ObjectCore::new("inner"),
                v: 9,
            },
            core: ObjectCore::new("leading"),
        };
        rec.record_object("top", Some(&o as &dyn UvmObject));
        let names: Vec<String> = trace.attributes().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["top", "top.inner", "top.inner.v"]);
        assert_eq!(rec.reporter().with_id("CYCFND").count(), 0);
    }

    #[test]
    fn reference_policy_skips_fields() {
        let (mut rec, trace) = opened("tx");
        rec.config_mut().policy = RecursionPolicy::Reference;
        record(&outer(Some(1)), &mut rec);
        assert_eq!(trace.attributes().len(), 1);
    }

    #[test]
    fn identifier_off_records_only_fields() {
        let (mut rec, trace) = opened("tx");
        rec.config_mut().identifier = false;
        record(&outer(Some(1)), &mut rec);
        let attrs = trace.attributes();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name, "inner.v");
    }
}
