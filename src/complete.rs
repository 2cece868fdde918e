//! Tab completion for the line editor.
//!
//! Candidates are drawn from the builtin table plus every executable found
//! across the PATH directories, ordered and duplicate-free. A single
//! candidate is completed with a trailing space to signal a finished word.

use crate::builtin::BuiltinKind;
use crate::external;
use rustyline::Context;
use rustyline::Helper;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use std::fs;
use std::path::PathBuf;

pub struct ShellHelper;

impl ShellHelper {
    pub fn new() -> Self {
        ShellHelper
    }
}

/// Collect command-name candidates matching `prefix` from the builtin table
/// and the given directories.
pub(crate) fn candidates_in(prefix: &str, dirs: &[PathBuf]) -> Vec<String> {
    let mut names: Vec<String> = BuiltinKind::NAMES
        .iter()
        .filter(|name| name.starts_with(prefix))
        .map(|name| name.to_string())
        .collect();
    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with(prefix) && external::is_executable_file(&entry.path()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    names.dedup();
    names
}

fn candidates(prefix: &str) -> Vec<String> {
    let dirs = external::search_dirs(std::env::var("PATH").ok().as_deref());
    candidates_in(prefix, &dirs)
}

pub(crate) fn to_pairs(matches: Vec<String>) -> Vec<Pair> {
    let single = matches.len() == 1;
    matches
        .into_iter()
        .map(|name| {
            let replacement = if single { format!("{name} ") } else { name.clone() };
            Pair {
                display: name,
                replacement,
            }
        })
        .collect()
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(char::is_whitespace)
            .map_or(0, |i| i + 1);
        let prefix = &line[start..pos];
        Ok((start, to_pairs(candidates(prefix))))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}
