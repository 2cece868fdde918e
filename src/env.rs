use crate::history::HistoryLog;
use std::collections::HashMap;
use std::env as stdenv;

/// Process-wide shell state with lifecycle equal to the process duration.
///
/// The environment contains:
/// - `vars`: a map of environment variables visible to executed commands.
/// - `history`: the in-memory command history and its persisted offset.
/// - `should_exit`: a flag the interactive loop checks to know when to stop.
///
/// The working directory is deliberately not cached here; `pwd` and `cd`
/// delegate to the OS through `std::env`.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// Ordered record of submitted lines.
    pub history: HistoryLog,
    /// When set to true, indicates that the interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let mut vars = HashMap::new();
        for (k, v) in stdenv::vars() {
            vars.insert(k, v);
        }
        Self {
            vars,
            history: HistoryLog::new(),
            should_exit: false,
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
