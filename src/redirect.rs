//! Scans a token sequence for an output redirection and resolves its target.

use crate::lexer::{Operator, Token};
use anyhow::Context;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;

/// Which standard stream gets rerouted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// How the destination file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Truncate,
    Append,
}

/// One resolved redirection: stream, open mode and destination path.
/// Constructed per line, consumed by the executor, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectionSpec {
    pub stream: Stream,
    pub mode: Mode,
    pub path: String,
}

/// Errors raised while extracting a redirection from the token sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxError {
    /// The operator was the last token; there is no target to redirect into.
    MissingTarget(Operator),
    /// The token after the operator was another operator, not a path.
    BadTarget(Operator),
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxError::MissingTarget(op) => {
                write!(f, "syntax error: expected a path after `{}`", op.as_str())
            }
            SyntaxError::BadTarget(op) => {
                write!(f, "syntax error near `{}`", op.as_str())
            }
        }
    }
}

impl std::error::Error for SyntaxError {}

/// Fixed scan order. Each kind is searched in turn and the first kind present
/// anywhere in the tokens wins, not the leftmost operator occurrence. This
/// reproduces the behavior of the historical implementation; see DESIGN.md.
const SCAN_ORDER: [Operator; 6] = [
    Operator::Out,
    Operator::OutFd,
    Operator::Err,
    Operator::OutAppend,
    Operator::OutFdAppend,
    Operator::ErrAppend,
];

/// Extract at most one redirection from `tokens`.
///
/// Returns the residual command tokens (everything before the chosen
/// operator) and the redirection spec, if any. Tokens after the target path
/// are dropped, matching the historical behavior.
pub fn extract(tokens: &[Token]) -> Result<(Vec<Token>, Option<RedirectionSpec>), SyntaxError> {
    for op in SCAN_ORDER {
        let Some(idx) = tokens.iter().position(|t| *t == Token::Op(op)) else {
            continue;
        };
        let path = match tokens.get(idx + 1) {
            Some(Token::Word(path)) => path.clone(),
            Some(Token::Op(other)) => return Err(SyntaxError::BadTarget(*other)),
            None => return Err(SyntaxError::MissingTarget(op)),
        };
        let spec = RedirectionSpec {
            stream: match op {
                Operator::Err | Operator::ErrAppend => Stream::Stderr,
                _ => Stream::Stdout,
            },
            mode: match op {
                Operator::OutAppend | Operator::OutFdAppend | Operator::ErrAppend => Mode::Append,
                _ => Mode::Truncate,
            },
            path,
        };
        return Ok((tokens[..idx].to_vec(), Some(spec)));
    }
    Ok((tokens.to_vec(), None))
}

impl RedirectionSpec {
    /// Open the destination for writing, creating parent directories first.
    pub fn open(&self) -> anyhow::Result<File> {
        let path = Path::new(&self.path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create directory {}", parent.display()))?;
            }
        }
        let mut opts = OpenOptions::new();
        opts.create(true).write(true);
        match self.mode {
            Mode::Truncate => opts.truncate(true),
            Mode::Append => opts.append(true),
        };
        opts.open(path)
            .with_context(|| format!("cannot open {}", self.path))
    }
}
