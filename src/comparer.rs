//! Structural comparer
//!
//! Walks two object graphs in lockstep through their `do_compare` hooks.
//! Field primitives tally miscompares into `result` and append a line per
//! miscompare to `miscompares`; only the first `show_max` are reported.
//!
//! Cycles are broken by `compare_map`, which pairs each rhs object with the
//! lhs it was first compared against. A pair is descended into at most once
//! per comparison.

use std::collections::HashMap;

use num_bigint::BigUint;

use crate::config::{ComparerConfig, PolicyConfig};
use crate::object::{self, ObjectId, UvmObject};
use crate::policy::{format_int, format_real, format_value, mask64, mask_wide, Radix, RecursionPolicy};
use crate::report::Reporter;
use crate::scope::ScopeStack;

/// Field-by-field comparison policy
#[derive(Debug)]
pub struct Comparer {
    config: ComparerConfig,
    scope: ScopeStack,
    /// rhs identity -> lhs identity it was paired with
    compare_map: HashMap<ObjectId, ObjectId>,
    result: usize,
    miscompares: String,
    reporter: Reporter,
}

impl Default for Comparer {
    fn default() -> Self {
        Self::new()
    }
}

impl Comparer {
    pub fn new() -> Self {
        Self::with_config(ComparerConfig::default())
    }

    pub fn with_config(config: ComparerConfig) -> Self {
        Self {
            config,
            scope: ScopeStack::new(),
            compare_map: HashMap::new(),
            result: 0,
            miscompares: String::new(),
            reporter: Reporter::default(),
        }
    }

    /// Build from the `[comparer]` and `[report]` sections
    pub fn from_policy(policy: &PolicyConfig) -> Self {
        let mut comparer = Self::with_config(policy.comparer.clone());
        comparer.reporter.set_max_verbosity(policy.report.max_verbosity);
        comparer
    }

    pub fn config(&self) -> &ComparerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ComparerConfig {
        &mut self.config
    }

    /// Number of miscompares in the current comparison
    pub fn result(&self) -> usize {
        self.result
    }

    /// One `"<scope>: <msg>"` line per miscompare
    pub fn miscompares(&self) -> &str {
        &self.miscompares
    }

    pub fn compare_map_len(&self) -> usize {
        self.compare_map.len()
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

    pub fn reporter_mut(&mut self) -> &mut Reporter {
        &mut self.reporter
    }

    // ── Traversal State ────────────────────────────────────────────────

    pub(crate) fn begin(&mut self) {
        self.compare_map.clear();
        self.result = 0;
        self.miscompares.clear();
    }

    pub(crate) fn paired_with(&self, rhs: ObjectId) -> Option<ObjectId> {
        self.compare_map.get(&rhs).copied()
    }

    pub(crate) fn pair(&mut self, rhs: ObjectId, lhs: ObjectId) {
        self.compare_map.insert(rhs, lhs);
    }

    // ── Messages ───────────────────────────────────────────────────────

    /// Tally a miscompare at the current scope.
    pub fn print_msg(&mut self, msg: String) {
        self.result += 1;
        let scope = self.scope.get();
        if self.result <= self.config.show_max {
            self.reporter.report(
                self.config.severity,
                self.config.verbosity,
                "MISCMP",
                format!("Miscompare for {scope}: {msg}"),
            );
        }
        self.miscompares.push_str(&scope);
        self.miscompares.push_str(": ");
        self.miscompares.push_str(&msg);
        self.miscompares.push('\n');
    }

    /// Tally an object-identity miscompare.
    pub fn print_msg_object(&mut self, lhs: Option<&dyn UvmObject>, rhs: Option<&dyn UvmObject>) {
        self.print_msg(format!("lhs = {} : rhs = {}", handle_of(lhs), handle_of(rhs)));
    }

    pub(crate) fn print_rollup(&mut self, lhs: &dyn UvmObject, rhs: Option<&dyn UvmObject>) {
        if self.result == 0 {
            return;
        }
        let rhs_name = rhs.map_or("<null>", |r| r.name());
        let msg = format!(
            "{} Miscompare(s) for object {}@{} vs. {}@{}",
            self.result,
            lhs.name(),
            lhs.inst_id(),
            rhs_name,
            rhs.map_or(0, |r| r.inst_id()),
        );
        self.reporter
            .report(self.config.severity, self.config.verbosity, "MISCMP", msg);
    }

    fn miscompare_field(&mut self, name: &str, msg: String) -> bool {
        self.scope.set_arg(name);
        self.print_msg(msg);
        self.scope.unset_arg(name);
        false
    }

    // ── Field Comparison ───────────────────────────────────────────────

    /// Compare the low `size` bits (`size <= 64`) of two integers.
    pub fn compare_field_int(&mut self, name: &str, lhs: u64, rhs: u64, size: usize, radix: Radix) -> bool {
        let mask = mask64(size);
        let (lhs, rhs) = (lhs & mask, rhs & mask);
        if lhs == rhs {
            return true;
        }
        let msg = format!(
            "lhs = {} : rhs = {}",
            format_int(lhs, size, radix),
            format_int(rhs, size, radix)
        );
        self.miscompare_field(name, msg)
    }

    /// Compare the low `size` bits of two wide integers.
    pub fn compare_field(&mut self, name: &str, lhs: &BigUint, rhs: &BigUint, size: usize, radix: Radix) -> bool {
        if size <= 64 {
            let lo = |v: &BigUint| v.iter_u64_digits().next().unwrap_or(0);
            return self.compare_field_int(name, lo(lhs), lo(rhs), size, radix);
        }
        let (lhs, rhs) = (mask_wide(lhs, size), mask_wide(rhs, size));
        if lhs == rhs {
            return true;
        }
        let msg = format!(
            "lhs = {} : rhs = {}",
            format_value(&lhs, size, radix),
            format_value(&rhs, size, radix)
        );
        self.miscompare_field(name, msg)
    }

    pub fn compare_field_real(&mut self, name: &str, lhs: f64, rhs: f64) -> bool {
        if lhs == rhs {
            return true;
        }
        let msg = format!("lhs = {} : rhs = {}", format_real(lhs), format_real(rhs));
        self.miscompare_field(name, msg)
    }

    pub fn compare_string(&mut self, name: &str, lhs: &str, rhs: &str) -> bool {
        if lhs == rhs {
            return true;
        }
        self.miscompare_field(name, format!("lhs = \"{lhs}\" : rhs = \"{rhs}\""))
    }

    /// Compare two sub-objects under `name`.
    pub fn compare_object(
        &mut self,
        name: &str,
        lhs: Option<&dyn UvmObject>,
        rhs: Option<&dyn UvmObject>,
    ) -> bool {
        if self.scope.depth() == 0 {
            self.begin();
        }
        match (lhs, rhs) {
            (None, None) => true,
            (Some(l), Some(r)) if ObjectId::of(l) == ObjectId::of(r) => true,
            (Some(_), Some(_)) if self.config.policy == RecursionPolicy::Reference => {
                self.scope.set_arg(name);
                self.print_msg_object(lhs, rhs);
                self.scope.unset_arg(name);
                false
            }
            (Some(l), Some(r)) => {
                self.scope.down(name);
                let matched = object::compare(l, Some(r), self);
                self.scope.up();
                matched
            }
            _ => {
                self.scope.set_arg(name);
                self.print_msg_object(lhs, rhs);
                self.scope.unset_arg(name);
                false
            }
        }
    }
}

fn handle_of(obj: Option<&dyn UvmObject>) -> String {
    match obj {
        Some(o) => format!("@{}", o.inst_id()),
        None => String::from("<null>"),
    }
}
