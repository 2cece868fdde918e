//! Shared command types: exit codes, captured builtin output, and the
//! classification of a command name into builtin or external.

use crate::builtin::BuiltinKind;
use crate::env::Environment;
use crate::external;
use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Result of running a builtin: a status code plus optional captured text.
///
/// Captured text carries no trailing newline of its own; how the text is
/// terminated is the caller's presentation concern. Diagnostics belong to the
/// error stream and are routed separately, so a `2>` redirection can divert
/// them without touching the output text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub code: ExitCode,
    pub text: Option<String>,
    pub err: Option<String>,
}

impl Capture {
    /// Successful capture with output text.
    pub fn ok(text: impl Into<String>) -> Self {
        Capture {
            code: 0,
            text: Some(text.into()),
            err: None,
        }
    }

    /// Capture with a status code and no output at all.
    pub fn silent(code: ExitCode) -> Self {
        Capture {
            code,
            text: None,
            err: None,
        }
    }
}

/// A command resolved once per line, then dispatched exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    Builtin(BuiltinKind),
    External(PathBuf),
}

/// Classify a command name: the builtin table is consulted first with a
/// case-sensitive exact match, unmatched names fall through to PATH
/// resolution. `None` means the name resolves to nothing.
pub fn classify(name: &str, env: &Environment) -> Option<Program> {
    if let Some(kind) = BuiltinKind::from_name(name) {
        return Some(Program::Builtin(kind));
    }
    let dirs = external::search_dirs(env.get_var("PATH").as_deref());
    external::find_program(name, &dirs).map(Program::External)
}
