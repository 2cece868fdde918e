//! Discovery and execution of external programs.

use crate::command::ExitCode;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Search `path_dirs` in order for an executable regular file named `name`.
///
/// Directories that cannot be read are skipped silently. Returns the first
/// matching candidate, or `None` when the list is empty or nothing matches.
pub fn resolve(name: &str, path_dirs: &[PathBuf]) -> Option<PathBuf> {
    for dir in path_dirs {
        let candidate = dir.join(name);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Split a PATH-style value into its ordered directory list.
pub fn search_dirs(path_var: Option<&str>) -> Vec<PathBuf> {
    match path_var {
        Some(value) => std::env::split_paths(value).collect(),
        None => Vec::new(),
    }
}

/// Resolve a command the way a shell would: a name containing a path
/// separator is taken as-is when it points at an executable file, a bare
/// name is searched across `path_dirs`.
pub fn find_program(name: &str, path_dirs: &[PathBuf]) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let path = Path::new(name);
    if path.is_absolute() || path.components().count() > 1 {
        return is_executable_file(path).then(|| path.to_path_buf());
    }
    resolve(name, path_dirs)
}

pub(crate) fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    meta.is_file() && has_exec_bit(&meta)
}

#[cfg(unix)]
fn has_exec_bit(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_exec_bit(_meta: &fs::Metadata) -> bool {
    true
}

/// Map a child's exit status to a shell exit code, folding signal
/// termination into the conventional `128 + signal` range.
#[cfg(unix)]
pub fn exit_code(status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        None => match status.signal() {
            Some(signal) => 128 + signal,
            None => -1,
        },
    }
}

#[cfg(not(unix))]
pub fn exit_code(status: ExitStatus) -> ExitCode {
    status.code().unwrap_or(-1)
}
