//! Text transaction database
//!
//! Line-oriented transcript backend. A [`TextDatabase`] owns one log file
//! opened in append mode; [`TextStream`]s group recorders under it, and every
//! recorder opened on a stream writes its lifecycle and attributes as lines:
//!
//! ```text
//! CREATE_STREAM @0 {NAME:bus T:bus_tx SCOPE:env.agent STREAM:1}
//! OPEN_RECORDER @5 {TXH:3 STREAM:1 NAME:rd TIME:5 TYPE="bus_tx"}
//! SET_ATTR @5 {TXH:3 NAME:addr VALUE:1f RADIX:UVM_HEX BITS:16}
//! CLOSE_RECORDER @9 {TXH:3 TIME=9}
//! FREE_RECORDER @9 {TXH:3}
//! ```
//!
//! Lines are only written while the database file is open.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::RecordingConfig;
use crate::error::RecordingError;
use crate::recorder::{Attribute, Recorder, RecordingBackend};

// ── Database ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct DbInner {
    file_name: PathBuf,
    file: Option<LineWriter<File>>,
    now: u64,
    last_stream: u64,
}

impl DbInner {
    fn write_line(&mut self, line: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(error) = writeln!(file, "{line}") {
            tracing::warn!(path = %self.file_name.display(), %error, "transcript write failed");
        }
    }
}

/// Shared handle to a text transcript file
#[derive(Debug, Clone)]
pub struct TextDatabase {
    inner: Rc<RefCell<DbInner>>,
}

impl Default for TextDatabase {
    fn default() -> Self {
        Self::from_config(&RecordingConfig::default())
    }
}

impl TextDatabase {
    pub fn new(file_name: impl Into<PathBuf>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DbInner {
                file_name: file_name.into(),
                file: None,
                now: 0,
                last_stream: 0,
            })),
        }
    }

    /// Build from the `[recording]` section
    pub fn from_config(config: &RecordingConfig) -> Self {
        Self::new(config.file_name.clone())
    }

    pub fn file_name(&self) -> PathBuf {
        self.inner.borrow().file_name.clone()
    }

    /// Change the transcript path. Refused while the file is open.
    pub fn set_file_name(&self, file_name: impl AsRef<Path>) -> Result<(), RecordingError> {
        let mut inner = self.inner.borrow_mut();
        if inner.file.is_some() {
            tracing::warn!(id = "UVM/TXT_DB/OPEN", "cannot change file name of an open database");
            return Err(RecordingError::DatabaseOpen);
        }
        inner.file_name = file_name.as_ref().to_path_buf();
        Ok(())
    }

    /// Open the transcript for appending. No-op if already open.
    pub fn open_db(&self) -> Result<(), RecordingError> {
        let mut inner = self.inner.borrow_mut();
        if inner.file.is_some() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&inner.file_name)?;
        tracing::debug!(path = %inner.file_name.display(), "transcript opened");
        inner.file = Some(LineWriter::new(file));
        Ok(())
    }

    /// Flush and close the transcript. No-op if not open.
    pub fn close_db(&self) -> Result<(), RecordingError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(mut file) = inner.file.take() {
            file.flush()?;
            tracing::debug!(path = %inner.file_name.display(), "transcript closed");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.inner.borrow().file.is_some()
    }

    /// Set the simulation time stamped on subsequent lines.
    pub fn set_time(&self, now: u64) {
        self.inner.borrow_mut().now = now;
    }

    pub fn now(&self) -> u64 {
        self.inner.borrow().now
    }

    fn write_event(&self, event: &str, body: &str) {
        let mut inner = self.inner.borrow_mut();
        let line = format!("{event} @{} {{{body}}}", inner.now);
        inner.write_line(&line);
    }

    /// Create and configure a stream, opening the database if needed.
    pub fn open_stream(&self, name: &str, scope: &str, type_name: &str) -> Result<TextStream, RecordingError> {
        let mut stream = TextStream {
            db: self.clone(),
            name: String::new(),
            scope: String::new(),
            type_name: String::new(),
            handle: 0,
            state: StreamState::Unconfigured,
        };
        stream.configure(name, scope, type_name)?;
        Ok(stream)
    }

    /// Write a `LINK` line relating two recorders.
    pub fn establish_link(&self, lhs: &Recorder, rhs: &Recorder, relation: &str) {
        let body = format!(
            "TXH1:{} TXH2:{} RELATION={relation}",
            lhs.get_handle(),
            rhs.get_handle()
        );
        self.write_event("LINK", &body);
    }
}

// ── Stream ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Unconfigured,
    Open,
    Closed,
    Freed,
}

/// Named group of recorders within a [`TextDatabase`]
#[derive(Debug)]
pub struct TextStream {
    db: TextDatabase,
    name: String,
    scope: String,
    type_name: String,
    handle: u64,
    state: StreamState,
}

impl TextStream {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_open(&self) -> bool {
        self.state == StreamState::Open
    }

    /// Stream handle, or 0 once freed
    pub fn get_handle(&self) -> u64 {
        match self.state {
            StreamState::Unconfigured | StreamState::Freed => 0,
            _ => self.handle,
        }
    }

    /// Name the stream and write its `CREATE_STREAM` line. Only allowed once.
    pub fn configure(&mut self, name: &str, scope: &str, type_name: &str) -> Result<(), RecordingError> {
        if self.state != StreamState::Unconfigured {
            let err = RecordingError::StreamReconfigured(self.name.clone());
            tracing::error!(id = "UVM/REC_STR/RE_CFG", "{err}");
            return Err(err);
        }
        self.db.open_db()?;
        self.name = String::from(name);
        self.scope = String::from(scope);
        self.type_name = String::from(type_name);
        self.handle = {
            let mut inner = self.db.inner.borrow_mut();
            inner.last_stream += 1;
            inner.last_stream
        };
        self.state = StreamState::Open;
        let body = format!(
            "NAME:{name} T:{type_name} SCOPE:{scope} STREAM:{}",
            self.handle
        );
        self.db.write_event("CREATE_STREAM", &body);
        Ok(())
    }

    /// Open a recorder writing into this stream. `None` unless the stream
    /// is open.
    pub fn open_recorder(&self, name: &str, open_time: u64, type_name: &str) -> Option<Recorder> {
        if self.state != StreamState::Open {
            return None;
        }
        let backend = TextBackend {
            db: self.db.clone(),
            stream: self.handle,
        };
        let mut recorder = Recorder::new(name);
        recorder
            .m_do_open(Some(Box::new(backend)), open_time, type_name)
            .ok()?;
        Some(recorder)
    }

    pub fn close(&mut self) {
        if self.state == StreamState::Open {
            self.state = StreamState::Closed;
        }
    }

    pub fn free(&mut self) {
        self.close();
        self.state = StreamState::Freed;
    }
}

// ── Backend ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct TextBackend {
    db: TextDatabase,
    stream: u64,
}

impl RecordingBackend for TextBackend {
    fn do_open(&mut self, handle: u64, name: &str, open_time: u64, type_name: &str) {
        let body = format!(
            "TXH:{handle} STREAM:{} NAME:{name} TIME:{open_time} TYPE=\"{type_name}\"",
            self.stream
        );
        self.db.write_event("OPEN_RECORDER", &body);
    }

    fn do_close(&mut self, handle: u64, close_time: u64) {
        self.db
            .write_event("CLOSE_RECORDER", &format!("TXH:{handle} TIME={close_time}"));
    }

    fn do_free(&mut self, handle: u64, _time: u64) {
        self.db.write_event("FREE_RECORDER", &format!("TXH:{handle}"));
    }

    fn do_record_attribute(&mut self, attr: &Attribute) {
        let body = format!(
            "TXH:{} NAME:{} VALUE:{} RADIX:{} BITS:{}",
            attr.handle, attr.name, attr.value, attr.radix, attr.bits
        );
        self.db.write_event("SET_ATTR", &body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Radix;

    fn lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn transcript_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tr_db.log");
        let db = TextDatabase::new(&path);
        let stream = db.open_stream("bus", "env.agent", "bus_tx").unwrap();
        assert!(db.is_open());
        assert_eq!(stream.get_handle(), 1);

        db.set_time(5);
        let mut rec = stream.open_recorder("rd", 5, "bus_tx").unwrap();
        let h = rec.get_handle();
        rec.record_field_int("addr", 0x1F, 16, Radix::Hex);
        db.set_time(9);
        rec.close(9);
        rec.close(10);
        rec.free(9);
        db.close_db().unwrap();

        assert_eq!(
            lines(&path),
            vec![
                String::from("CREATE_STREAM @0 {NAME:bus T:bus_tx SCOPE:env.agent STREAM:1}"),
                format!("OPEN_RECORDER @5 {{TXH:{h} STREAM:1 NAME:rd TIME:5 TYPE=\"bus_tx\"}}"),
                format!("SET_ATTR @5 {{TXH:{h} NAME:addr VALUE:1f RADIX:UVM_HEX BITS:16}}"),
                format!("CLOSE_RECORDER @9 {{TXH:{h} TIME=9}}"),
                format!("FREE_RECORDER @9 {{TXH:{h}}}"),
            ]
        );
    }

    #[test]
    fn link_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.log");
        let db = TextDatabase::new(&path);
        let stream = db.open_stream("s", "top", "t").unwrap();
        let a = stream.open_recorder("a", 0, "t").unwrap();
        let b = stream.open_recorder("b", 0, "t").unwrap();
        db.establish_link(&a, &b, "child");
        db.close_db().unwrap();
        let last = lines(&path).pop().unwrap();
        assert_eq!(
            last,
            format!("LINK @0 {{TXH1:{} TXH2:{} RELATION=child}}", a.get_handle(), b.get_handle())
        );
    }

    #[test]
    fn nothing_written_while_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiet.log");
        let db = TextDatabase::new(&path);
        let stream = db.open_stream("s", "top", "t").unwrap();
        db.close_db().unwrap();
        let mut rec = stream.open_recorder("r", 0, "t").unwrap();
        rec.record_string("k", "v");
        rec.free(1);
        assert_eq!(lines(&path).len(), 1);
    }

    #[test]
    fn file_name_locked_while_open() {
        let dir = tempfile::tempdir().unwrap();
        let db = TextDatabase::new(dir.path().join("a.log"));
        db.set_file_name(dir.path().join("b.log")).unwrap();
        db.open_db().unwrap();
        assert!(matches!(
            db.set_file_name(dir.path().join("c.log")),
            Err(RecordingError::DatabaseOpen)
        ));
        assert_eq!(db.file_name(), dir.path().join("b.log"));
        db.close_db().unwrap();
        assert!(dir.path().join("b.log").exists());
    }

    #[test]
    fn appends_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("append.log");
        let db = TextDatabase::new(&path);
        db.open_stream("one", "top", "t").unwrap();
        db.close_db().unwrap();
        db.open_stream("two", "top", "t").unwrap();
        db.close_db().unwrap();
        assert_eq!(lines(&path).len(), 2);
    }

    #[test]
    fn reconfigure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = TextDatabase::new(dir.path().join("cfg.log"));
        let mut stream = db.open_stream("s", "top", "t").unwrap();
        let err = stream.configure("s2", "top", "t").unwrap_err();
        assert!(matches!(err, RecordingError::StreamReconfigured(_)));
        assert_eq!(stream.name(), "s");
    }

    #[test]
    fn closed_stream_refuses_recorders() {
        let dir = tempfile::tempdir().unwrap();
        let db = TextDatabase::new(dir.path().join("st.log"));
        let mut stream = db.open_stream("s", "top", "t").unwrap();
        stream.close();
        assert!(stream.open_recorder("r", 0, "t").is_none());
        assert_ne!(stream.get_handle(), 0);
        stream.free();
        assert_eq!(stream.get_handle(), 0);
    }

    #[test]
    fn default_file_name() {
        assert_eq!(TextDatabase::default().file_name(), PathBuf::from("tr_db.log"));
    }
}
