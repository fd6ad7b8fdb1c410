//! Diagnostics collaborator
//!
//! Minimal stand-in for the UVM report server: every policy object owns a
//! [`Reporter`] that filters by verbosity, emits a `tracing` event and keeps
//! the report so callers can inspect what a traversal produced.

use serde::{Deserialize, Serialize};

// ── Severity / Verbosity ───────────────────────────────────────────────

/// Report severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

/// Verbosity level; only `Info` reports are filtered by it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u16)]
pub enum Verbosity {
    None = 0,
    Low = 100,
    Medium = 200,
    High = 300,
    Full = 400,
    Debug = 500,
}

// ── Report ─────────────────────────────────────────────────────────────

/// A single emitted diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub severity: Severity,
    pub verbosity: Verbosity,
    /// Message id, e.g. `MISCMP` or `PCKSZ`
    pub id: String,
    pub message: String,
}

/// Collects reports and forwards them to `tracing`.
#[derive(Debug, Clone)]
pub struct Reporter {
    max_verbosity: Verbosity,
    reports: Vec<Report>,
    counts: [usize; 4],
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Verbosity::Medium)
    }
}

impl Reporter {
    pub fn new(max_verbosity: Verbosity) -> Self {
        Self {
            max_verbosity,
            reports: Vec::new(),
            counts: [0; 4],
        }
    }

    pub fn max_verbosity(&self) -> Verbosity {
        self.max_verbosity
    }

    pub fn set_max_verbosity(&mut self, verbosity: Verbosity) {
        self.max_verbosity = verbosity;
    }

    /// Emit a report. Returns `false` if it was filtered out.
    pub fn report(&mut self, severity: Severity, verbosity: Verbosity, id: &str, message: String) -> bool {
        if severity == Severity::Info && verbosity > self.max_verbosity {
            return false;
        }
        match severity {
            Severity::Info => tracing::info!(id, "{message}"),
            Severity::Warning => tracing::warn!(id, "{message}"),
            Severity::Error | Severity::Fatal => tracing::error!(id, "{message}"),
        }
        self.counts[severity as usize] += 1;
        self.reports.push(Report {
            severity,
            verbosity,
            id: id.to_owned(),
            message,
        });
        true
    }

    pub fn info(&mut self, id: &str, verbosity: Verbosity, message: String) -> bool {
        self.report(Severity::Info, verbosity, id, message)
    }

    pub fn warning(&mut self, id: &str, message: String) -> bool {
        self.report(Severity::Warning, Verbosity::None, id, message)
    }

    pub fn error(&mut self, id: &str, message: String) -> bool {
        self.report(Severity::Error, Verbosity::None, id, message)
    }

    /// Reports retained so far, oldest first
    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// Reports carrying the given id
    pub fn with_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Report> + 'a {
        self.reports.iter().filter(move |r| r.id == id)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.counts[severity as usize]
    }

    pub fn clear(&mut self) {
        self.reports.clear();
        self.counts = [0; 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_above_threshold_is_dropped() {
        let mut r = Reporter::new(Verbosity::Low);
        assert!(!r.info("X", Verbosity::High, String::from("noise")));
        assert!(r.info("X", Verbosity::Low, String::from("kept")));
        assert_eq!(r.reports().len(), 1);
        assert_eq!(r.count(Severity::Info), 1);
    }

    #[test]
    fn warnings_and_errors_ignore_verbosity() {
        let mut r = Reporter::new(Verbosity::None);
        r.warning("W", String::from("w"));
        r.error("E", String::from("e"));
        assert_eq!(r.count(Severity::Warning), 1);
        assert_eq!(r.count(Severity::Error), 1);
    }

    #[test]
    fn with_id_filters() {
        let mut r = Reporter::default();
        r.error("A", String::from("1"));
        r.error("B", String::from("2"));
        r.error("A", String::from("3"));
        assert_eq!(r.with_id("A").count(), 2);
    }

    #[test]
    fn reports_under_installed_subscriber() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let mut r = Reporter::new(Verbosity::High);
        assert!(r.info("MISCMP", Verbosity::High, String::from("shown")));
        assert!(r.warning("CYCFND", String::from("cycle")));
        assert_eq!(r.reports()[1].severity, Severity::Warning);
    }

    #[test]
    fn clear_resets_counts() {
        let mut r = Reporter::default();
        r.error("A", String::from("1"));
        r.clear();
        assert!(r.reports().is_empty());
        assert_eq!(r.count(Severity::Error), 0);
    }
}
