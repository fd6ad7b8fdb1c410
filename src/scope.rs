//! Hierarchical scope names
//!
//! Path accumulator used while recursing through an object graph. Plain
//! segments are dot-joined; segments starting with `[`, `(` or `{` attach
//! directly, so `top`, `child`, `[3]` renders as `top.child[3]`.

/// Stack of path segments plus a pending terminal field name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeStack {
    stack: Vec<String>,
    arg: String,
}

#[inline]
fn is_indexed(segment: &str) -> bool {
    matches!(segment.as_bytes().first(), Some(b'[' | b'(' | b'{'))
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed segments
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Render the full path. No side effects.
    pub fn get(&self) -> String {
        let mut path = String::new();
        for (i, segment) in self.stack.iter().enumerate() {
            if i > 0 && !is_indexed(segment) {
                path.push('.');
            }
            path.push_str(segment);
        }
        if !self.arg.is_empty() {
            if !path.is_empty() && !self.arg.starts_with('[') {
                path.push('.');
            }
            path.push_str(&self.arg);
        }
        path
    }

    pub fn get_arg(&self) -> &str {
        &self.arg
    }

    /// Reset to a single segment
    pub fn set(&mut self, name: &str) {
        self.stack.clear();
        self.stack.push(String::from(name));
        self.arg.clear();
    }

    pub fn down(&mut self, name: &str) {
        self.stack.push(String::from(name));
        self.arg.clear();
    }

    pub fn down_element(&mut self, index: usize) {
        self.stack.push(format!("[{index}]"));
        self.arg.clear();
    }

    /// Pop segments until a plain (non-indexed) one has been removed.
    pub fn up(&mut self) {
        while let Some(segment) = self.stack.pop() {
            if !is_indexed(&segment) {
                break;
            }
        }
        self.arg.clear();
    }

    /// Pop the top segment only if it is an index.
    pub fn up_element(&mut self) {
        if self.stack.last().is_some_and(|s| s.starts_with('[')) {
            self.stack.pop();
        }
    }

    /// Stage a terminal field name. Empty names are ignored.
    pub fn set_arg(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        self.arg.clear();
        self.arg.push_str(name);
    }

    pub fn set_arg_element(&mut self, name: &str, index: usize) {
        self.arg = format!("{name}[{index}]");
    }

    pub fn unset_arg(&mut self, name: &str) {
        if self.arg == name {
            self.arg.clear();
        }
    }

    pub fn clear(&mut self) {
        self.stack.clear();
        self.arg.clear();
    }
}
