//! The top-level driver: routes each input line to the plain, redirected or
//! pipeline execution path, and hosts the interactive loop.

use crate::builtin;
use crate::command::{self, Capture, ExitCode, Program};
use crate::complete::ShellHelper;
use crate::env::Environment;
use crate::external;
use crate::lexer::{self, Operator, Token};
use crate::redirect::{self, RedirectionSpec, Stream};
use anyhow::{Context as _, Result, anyhow};
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

/// One command within a pipeline (or a whole line, for the single-command
/// path): the resolved program, its arguments and an optional redirection.
struct Stage {
    program: Program,
    args: Vec<String>,
    redirect: Option<RedirectionSpec>,
}

/// The interactive command interpreter.
///
/// One line is fully processed before the next is read. Within a pipeline
/// the spawned processes run concurrently, but the driving thread only ever
/// performs synchronous blocking waits.
pub struct Interpreter {
    env: Environment,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// True once the `exit` builtin has run.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Process one submitted line: tokenize it and route it down the
    /// pipeline, redirection or plain dispatch path.
    ///
    /// Captured builtin output destined for the terminal is written to
    /// `out`; external programs write to their inherited streams. Errors are
    /// isolated to this line and never fatal to the caller's loop.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<ExitCode> {
        let tokens = lexer::tokenize(line)?;
        if tokens.is_empty() {
            return Ok(0);
        }
        if tokens.contains(&Token::Op(Operator::Pipe)) {
            self.run_pipeline(&tokens, out)
        } else {
            self.run_single(&tokens, out)
        }
    }

    /// Turn one token segment into a stage. `Ok(None)` means the segment was
    /// a bare redirection (`> file`): the target has been opened (and thus
    /// created) and there is nothing to run.
    fn build_stage(&self, tokens: &[Token]) -> Result<Option<Stage>> {
        let (residual, spec) = redirect::extract(tokens)?;
        // Leftover operator tokens in the residual become literal arguments,
        // matching the historical tokenizer-on-strings behavior.
        let mut words: Vec<String> = residual
            .into_iter()
            .map(|t| match t {
                Token::Word(w) => w,
                Token::Op(op) => op.as_str().to_string(),
            })
            .collect();
        if words.is_empty() {
            return match spec {
                Some(spec) => {
                    spec.open()?;
                    Ok(None)
                }
                None => Err(anyhow!("syntax error: missing command")),
            };
        }
        let name = words.remove(0);
        let program = command::classify(&name, &self.env)
            .ok_or_else(|| anyhow!("{name}: command not found"))?;
        Ok(Some(Stage {
            program,
            args: words,
            redirect: spec,
        }))
    }

    fn base_command(&self, path: &Path, args: &[String]) -> Command {
        let mut cmd = Command::new(path);
        cmd.args(args);
        cmd.envs(&self.env.vars);
        cmd
    }

    fn run_single(&mut self, tokens: &[Token], out: &mut dyn Write) -> Result<ExitCode> {
        let Some(stage) = self.build_stage(tokens)? else {
            return Ok(0);
        };
        match stage.program {
            Program::Builtin(kind) => {
                let args: Vec<&str> = stage.args.iter().map(String::as_str).collect();
                let mut stdin = io::stdin().lock();
                let capture = builtin::run(kind, &args, &mut stdin, &mut self.env)?;
                let (code, _) = deliver(capture, stage.redirect, None, true, out)?;
                Ok(code)
            }
            Program::External(path) => {
                let mut cmd = self.base_command(&path, &stage.args);
                apply_redirect(&mut cmd, stage.redirect.as_ref())?;
                let mut child = cmd
                    .spawn()
                    .with_context(|| format!("failed to run {}", path.display()))?;
                let status = child.wait().context("failed to wait for child")?;
                Ok(external::exit_code(status))
            }
        }
    }

    /// Execute an N-stage pipeline. Stage `i` reads from the previous
    /// stage's pipe (or the inherited input for the first stage) and writes
    /// into a fresh pipe (or the inherited output for the last stage).
    ///
    /// Builtins run in-process; their captured text goes directly into the
    /// stage's output descriptor, written from a helper thread so the stage
    /// loop never blocks on a full pipe, and the descriptor is closed so the
    /// next stage observes end-of-stream. Every stage is waited for in order
    /// and the last stage's status is reported. A failing stage is isolated:
    /// its neighbors still run.
    fn run_pipeline(&mut self, tokens: &[Token], out: &mut dyn Write) -> Result<ExitCode> {
        let segments: Vec<&[Token]> = tokens
            .split(|t| *t == Token::Op(Operator::Pipe))
            .collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(anyhow!("syntax error near `|`"));
        }

        let last = segments.len() - 1;
        let mut prev_reader: Option<PipeReader> = None;
        let mut children: Vec<(bool, Child)> = Vec::new();
        let mut writers: Vec<JoinHandle<()>> = Vec::new();
        let mut last_code = 0;

        for (i, segment) in segments.iter().enumerate() {
            let is_last = i == last;
            let (next_reader, mut writer) = if is_last {
                (None, None)
            } else {
                let (r, w) = io::pipe().context("cannot create pipe")?;
                (Some(r), Some(w))
            };
            let input = prev_reader.take();
            prev_reader = next_reader;

            let stage = match self.build_stage(segment) {
                Ok(Some(stage)) => stage,
                Ok(None) => continue,
                Err(e) => {
                    eprintln!("{e}");
                    if is_last {
                        last_code = 1;
                    }
                    continue;
                }
            };

            match stage.program {
                Program::External(path) => {
                    let mut cmd = self.base_command(&path, &stage.args);
                    match input {
                        Some(r) => {
                            cmd.stdin(Stdio::from(r));
                        }
                        None => {
                            cmd.stdin(Stdio::inherit());
                        }
                    }
                    let spawned = (|| -> Result<Child> {
                        let stdout_taken = apply_redirect(&mut cmd, stage.redirect.as_ref())?;
                        if !stdout_taken {
                            if let Some(w) = writer.take() {
                                cmd.stdout(Stdio::from(w));
                            }
                        }
                        cmd.spawn()
                            .with_context(|| format!("failed to run {}", path.display()))
                    })();
                    // `cmd` still holds the parent's copies of any handed-off
                    // descriptors; it is dropped at the end of this iteration,
                    // before the next stage runs.
                    match spawned {
                        Ok(child) => children.push((is_last, child)),
                        Err(e) => {
                            eprintln!("{e}");
                            if is_last {
                                last_code = 1;
                            }
                        }
                    }
                }
                Program::Builtin(kind) => {
                    let args: Vec<&str> = stage.args.iter().map(String::as_str).collect();
                    let capture = {
                        let mut stdin: Box<dyn Read> = match input {
                            Some(r) => Box::new(r),
                            None => Box::new(io::stdin().lock()),
                        };
                        builtin::run(kind, &args, &mut stdin, &mut self.env)
                    };
                    let capture = match capture {
                        Ok(capture) => capture,
                        Err(e) => {
                            eprintln!("{e}");
                            Capture::silent(1)
                        }
                    };
                    match deliver(capture, stage.redirect, writer.take(), is_last, out) {
                        Ok((code, handle)) => {
                            writers.extend(handle);
                            if is_last {
                                last_code = code;
                            }
                        }
                        Err(e) => {
                            eprintln!("{e}");
                            if is_last {
                                last_code = 1;
                            }
                        }
                    }
                }
            }
        }

        for (is_last, mut child) in children {
            let status = child
                .wait()
                .context("failed to wait for pipeline stage")?;
            if is_last {
                last_code = external::exit_code(status);
            }
        }
        // Every consumer has drained or closed its pipe by now, so the
        // helper writes cannot block anymore.
        for handle in writers {
            let _ = handle.join();
        }
        Ok(last_code)
    }

    /// The interactive Read-Eval-Print Loop.
    ///
    /// Reads one line at a time, records non-empty lines in the history, and
    /// dispatches them. Per-line errors are reported and the loop continues;
    /// only `exit` or end-of-input terminates it.
    pub fn repl(&mut self) -> Result<()> {
        let mut rl: Editor<ShellHelper, DefaultHistory> = Editor::new()?;
        rl.set_helper(Some(ShellHelper::new()));
        self.load_histfile(&mut rl);

        loop {
            match rl.readline("$ ") {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line.as_str());
                    self.env.history.append(line.as_str());
                    let mut stdout = io::stdout();
                    if let Err(e) = self.execute_line(&line, &mut stdout) {
                        eprintln!("{e}");
                    }
                    if self.env.should_exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Auto-load `HISTFILE` at startup, replaying the entries into the line
    /// editor so recall works across sessions.
    fn load_histfile(&mut self, rl: &mut Editor<ShellHelper, DefaultHistory>) {
        let Some(histfile) = self.env.get_var("HISTFILE") else {
            return;
        };
        let path = PathBuf::from(&histfile);
        if !path.exists() {
            return;
        }
        match self.env.history.load(&path) {
            Ok(()) => {
                for entry in self.env.history.entries() {
                    let _ = rl.add_history_entry(entry);
                }
            }
            Err(e) => tracing::warn!("failed to load history: {e}"),
        }
    }

    /// Session-end persistence: append the entries recorded since the last
    /// write to `HISTFILE`. Called by the surrounding program after the loop
    /// terminates.
    pub fn save_history(&mut self) {
        let Some(histfile) = self.env.get_var("HISTFILE") else {
            return;
        };
        if let Err(e) = self.env.history.append_new(Path::new(&histfile)) {
            tracing::warn!("failed to save history: {e}");
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire a redirection into an external command. Returns true when the
/// child's stdout was taken by the redirection.
fn apply_redirect(cmd: &mut Command, redirect: Option<&RedirectionSpec>) -> Result<bool> {
    let Some(spec) = redirect else {
        return Ok(false);
    };
    let file = spec.open()?;
    match spec.stream {
        Stream::Stdout => {
            cmd.stdout(Stdio::from(file));
            Ok(true)
        }
        Stream::Stderr => {
            cmd.stderr(Stdio::from(file));
            Ok(false)
        }
    }
}

/// Route a builtin's captured text and diagnostics to their destinations: a
/// redirection target, the next pipeline stage, or the caller's output for
/// the final stage.
///
/// When the destination is a pipe, the bytes are written from a helper thread
/// (the returned handle): the downstream consumer may not exist yet, and a
/// capture larger than the OS pipe buffer must not stall the spawn loop.
fn deliver(
    capture: Capture,
    redirect: Option<RedirectionSpec>,
    mut writer: Option<PipeWriter>,
    is_last: bool,
    out: &mut dyn Write,
) -> Result<(ExitCode, Option<JoinHandle<()>>)> {
    let payload = capture.text.map(render);
    let diagnostic = capture.err.map(render);

    let mut stdout_file = None;
    let mut stderr_file = None;
    if let Some(spec) = redirect {
        let file = spec.open()?;
        match spec.stream {
            Stream::Stdout => stdout_file = Some((file, spec.path)),
            Stream::Stderr => stderr_file = Some((file, spec.path)),
        }
    }

    match (stderr_file, &diagnostic) {
        (Some((mut file, path)), Some(bytes)) => {
            file.write_all(bytes)
                .with_context(|| format!("cannot write {path}"))?;
        }
        (None, Some(bytes)) => {
            let _ = io::stderr().write_all(bytes);
        }
        // A `2>` target with nothing to say is still created or truncated.
        _ => {}
    }

    let mut handle = None;
    if let Some((mut file, path)) = stdout_file {
        if let Some(bytes) = &payload {
            file.write_all(bytes)
                .with_context(|| format!("cannot write {path}"))?;
        }
        // The pipe writer, if any, is dropped unused: the next stage
        // observes end-of-stream.
        drop(writer.take());
    } else if let Some(w) = writer.take() {
        match payload {
            Some(bytes) => {
                handle = Some(std::thread::spawn(move || {
                    let mut w = w;
                    // A dead reader surfaces as a broken pipe; the bytes are
                    // simply lost, as with an external producer.
                    let _ = w.write_all(&bytes);
                }));
            }
            // Dropping `w` closes the write end.
            None => drop(w),
        }
    } else if is_last {
        if let Some(bytes) = &payload {
            out.write_all(bytes)?;
            out.flush()?;
        }
    }
    Ok((capture.code, handle))
}

/// Captured text is newline-terminated at presentation time; text already
/// ending in a newline is passed through untouched.
fn render(text: String) -> Vec<u8> {
    let mut bytes = text.into_bytes();
    if !bytes.ends_with(b"\n") {
        bytes.push(b'\n');
    }
    bytes
}
