//! Built-in commands executed in-process.
//!
//! Builtins are parsed using the [`argh`] crate (`FromArgs`) and follow a
//! uniform contract: arguments and an input source in, a status code plus
//! optional captured text out. Captured text is routed by the caller to the
//! terminal, a redirection target or a pipeline stage.

use crate::command::{Capture, ExitCode};
use crate::env::Environment;
use crate::external;
use anyhow::{Result, anyhow};
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// The closed set of builtin names, resolved once per command line and then
/// matched exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Exit,
    Pwd,
    Echo,
    Cd,
    Cat,
    Type,
    History,
}

impl BuiltinKind {
    pub const NAMES: [&'static str; 7] =
        ["exit", "pwd", "echo", "cd", "cat", "type", "history"];

    /// Case-sensitive exact match against the builtin table.
    pub fn from_name(name: &str) -> Option<BuiltinKind> {
        match name {
            "exit" => Some(BuiltinKind::Exit),
            "pwd" => Some(BuiltinKind::Pwd),
            "echo" => Some(BuiltinKind::Echo),
            "cd" => Some(BuiltinKind::Cd),
            "cat" => Some(BuiltinKind::Cat),
            "type" => Some(BuiltinKind::Type),
            "history" => Some(BuiltinKind::History),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Exit => "exit",
            BuiltinKind::Pwd => "pwd",
            BuiltinKind::Echo => "echo",
            BuiltinKind::Cd => "cd",
            BuiltinKind::Cat => "cat",
            BuiltinKind::Type => "type",
            BuiltinKind::History => "history",
        }
    }
}

/// Built-in commands known to the shell at compile time.
trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using the provided input source and environment.
    fn execute(self, stdin: &mut dyn Read, env: &mut Environment) -> Result<Capture>;
}

fn parse_and_run<T: BuiltinCommand>(
    args: &[&str],
    stdin: &mut dyn Read,
    env: &mut Environment,
) -> Result<Capture> {
    match T::from_args(&[T::name()], args) {
        Ok(cmd) => cmd.execute(stdin, env),
        Err(EarlyExit { output, status }) => Ok(Capture {
            code: if status.is_err() { 1 } else { 0 },
            text: Some(output.trim_end().to_string()),
            err: None,
        }),
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Run a builtin, matching the kind exhaustively.
///
/// `echo` and `cat` take arbitrary words as arguments, dash-prefixed ones
/// included, so they bypass option parsing entirely: `echo -n hi` echoes the
/// words and `cat -x` looks for a file named `-x`.
pub fn run(
    kind: BuiltinKind,
    args: &[&str],
    stdin: &mut dyn Read,
    env: &mut Environment,
) -> Result<Capture> {
    match kind {
        BuiltinKind::Exit => parse_and_run::<Exit>(args, stdin, env),
        BuiltinKind::Pwd => parse_and_run::<Pwd>(args, stdin, env),
        BuiltinKind::Echo => Echo { args: owned(args) }.execute(stdin, env),
        BuiltinKind::Cd => parse_and_run::<Cd>(args, stdin, env),
        BuiltinKind::Cat => Cat { files: owned(args) }.execute(stdin, env),
        BuiltinKind::Type => parse_and_run::<Type>(args, stdin, env),
        BuiltinKind::History => parse_and_run::<History>(args, stdin, env),
    }
}

#[derive(FromArgs)]
/// Terminate the interactive loop.
pub struct Exit {
    #[argh(positional, greedy)]
    /// surplus arguments are accepted and ignored
    pub args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdin: &mut dyn Read, env: &mut Environment) -> Result<Capture> {
        env.should_exit = true;
        Ok(Capture::silent(0))
    }
}

#[derive(FromArgs)]
/// Print the current working directory.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, _stdin: &mut dyn Read, _env: &mut Environment) -> Result<Capture> {
        let cwd = std::env::current_dir()?;
        Ok(Capture::ok(cwd.to_string_lossy()))
    }
}

#[derive(FromArgs)]
/// Write the arguments to the output, separated by single spaces.
pub struct Echo {
    #[argh(positional, greedy)]
    /// values to print as-is
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(self, _stdin: &mut dyn Read, _env: &mut Environment) -> Result<Capture> {
        Ok(Capture::ok(self.args.join(" ")))
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// With no target, changes to the directory named by HOME.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; a leading `~` expands to $HOME
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdin: &mut dyn Read, env: &mut Environment) -> Result<Capture> {
        let home = env.get_var("HOME");
        let target = match self.target.as_deref() {
            Some(t) if !t.is_empty() => expand_tilde(t, home.as_deref()),
            _ => PathBuf::from(home.ok_or_else(|| anyhow!("cd: HOME not set"))?),
        };
        std::env::set_current_dir(&target).map_err(|_| {
            anyhow!("cd: {}: No such file or directory", target.display())
        })?;
        Ok(Capture::silent(0))
    }
}

fn expand_tilde(target: &str, home: Option<&str>) -> PathBuf {
    if target == "~" {
        if let Some(home) = home {
            return PathBuf::from(home);
        }
    }
    if let Some(rest) = target.strip_prefix("~/") {
        if let Some(home) = home {
            return Path::new(home).join(rest);
        }
    }
    PathBuf::from(target)
}

#[derive(FromArgs)]
/// Concatenate files to the output; with no files, copy standard input.
pub struct Cat {
    #[argh(positional, greedy)]
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn execute(self, stdin: &mut dyn Read, _env: &mut Environment) -> Result<Capture> {
        let mut out = String::new();
        let mut errs = String::new();
        let mut code = 0;
        if self.files.is_empty() {
            stdin.read_to_string(&mut out)?;
        } else {
            for fname in &self.files {
                match fs::read(fname) {
                    Ok(bytes) => out.push_str(&String::from_utf8_lossy(&bytes)),
                    Err(_) => {
                        // One unreadable file does not abort the rest.
                        errs.push_str(&format!("cat: {}: No such file or directory\n", fname));
                        code = 1;
                    }
                }
            }
        }
        Ok(Capture {
            code,
            text: (!out.is_empty()).then_some(out),
            err: (!errs.is_empty()).then_some(errs),
        })
    }
}

#[derive(FromArgs)]
/// Classify a command name as builtin, external, or unknown.
pub struct Type {
    #[argh(positional)]
    /// command name to look up
    pub name: String,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn execute(self, _stdin: &mut dyn Read, env: &mut Environment) -> Result<Capture> {
        if BuiltinKind::from_name(&self.name).is_some() {
            return Ok(Capture::ok(format!("{} is a shell builtin", self.name)));
        }
        let dirs = external::search_dirs(env.get_var("PATH").as_deref());
        match external::resolve(&self.name, &dirs) {
            Some(path) => Ok(Capture::ok(format!("{} is {}", self.name, path.display()))),
            None => Ok(Capture {
                code: 1,
                text: Some(format!("{}: not found", self.name)),
                err: None,
            }),
        }
    }
}

#[derive(FromArgs)]
/// Show the command history, or persist it to a file.
pub struct History {
    #[argh(option, short = 'r')]
    /// replace the in-memory log with the contents of this file
    pub read: Option<String>,

    #[argh(option, short = 'w')]
    /// overwrite this file with the entire log
    pub write: Option<String>,

    #[argh(option, short = 'a')]
    /// append entries recorded since the last write to this file
    pub append: Option<String>,

    #[argh(positional)]
    /// show only the last N entries
    pub limit: Option<usize>,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, _stdin: &mut dyn Read, env: &mut Environment) -> Result<Capture> {
        if let Some(path) = &self.read {
            env.history.load(Path::new(path))?;
            return Ok(Capture::silent(0));
        }
        if let Some(path) = &self.write {
            env.history.write_all(Path::new(path))?;
            return Ok(Capture::silent(0));
        }
        if let Some(path) = &self.append {
            env.history.append_new(Path::new(path))?;
            return Ok(Capture::silent(0));
        }
        let listing = env.history.list(self.limit);
        if listing.is_empty() {
            // An empty log prints nothing, not a blank line.
            return Ok(Capture::silent(0));
        }
        Ok(Capture::ok(listing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryLog;
    use std::collections::HashMap;
    use std::env as stdenv;
    use std::io::Cursor;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    fn empty_env() -> Environment {
        Environment {
            vars: HashMap::new(),
            history: HistoryLog::new(),
            should_exit: false,
        }
    }

    fn no_stdin() -> Cursor<Vec<u8>> {
        Cursor::new(Vec::new())
    }

    fn make_unique_temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let p = stdenv::temp_dir().join(format!(
            "minish_builtin_{}_{}_{}",
            tag,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn test_echo_joins_args_with_single_spaces() {
        let mut env = empty_env();
        let capture = run(
            BuiltinKind::Echo,
            &["a", "b", "c"],
            &mut no_stdin(),
            &mut env,
        )
        .unwrap();
        assert_eq!(capture, Capture::ok("a b c"));
    }

    #[test]
    fn test_echo_with_no_args_is_empty_text() {
        let mut env = empty_env();
        let capture = run(BuiltinKind::Echo, &[], &mut no_stdin(), &mut env).unwrap();
        assert_eq!(capture, Capture::ok(""));
    }

    #[test]
    fn test_echo_keeps_dash_arguments_literal() {
        let mut env = empty_env();
        let capture = run(
            BuiltinKind::Echo,
            &["-n", "hi"],
            &mut no_stdin(),
            &mut env,
        )
        .unwrap();
        assert_eq!(capture, Capture::ok("-n hi"));

        let capture = run(BuiltinKind::Echo, &["--help"], &mut no_stdin(), &mut env).unwrap();
        assert_eq!(capture, Capture::ok("--help"));
    }

    #[test]
    fn test_pwd_reports_current_dir() {
        let _lock = lock_current_dir();
        let mut env = empty_env();
        let capture = run(BuiltinKind::Pwd, &[], &mut no_stdin(), &mut env).unwrap();
        let expected = stdenv::current_dir().unwrap().to_string_lossy().to_string();
        assert_eq!(capture, Capture::ok(expected));
    }

    #[test]
    fn test_exit_raises_the_flag_and_stays_silent() {
        let mut env = empty_env();
        let capture = run(BuiltinKind::Exit, &[], &mut no_stdin(), &mut env).unwrap();
        assert_eq!(capture, Capture::silent(0));
        assert!(env.should_exit);

        // Surplus arguments are tolerated.
        let capture = run(BuiltinKind::Exit, &["0"], &mut no_stdin(), &mut env).unwrap();
        assert_eq!(capture.code, 0);
    }

    #[test]
    fn test_cd_to_absolute_path_and_back() {
        let _lock = lock_current_dir();
        let temp = make_unique_temp_dir("cd_abs");
        let canonical = fs::canonicalize(&temp).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut env = empty_env();
        let capture = run(
            BuiltinKind::Cd,
            &[&canonical.to_string_lossy()],
            &mut no_stdin(),
            &mut env,
        )
        .unwrap();
        assert_eq!(capture, Capture::silent(0));
        assert_eq!(
            fs::canonicalize(stdenv::current_dir().unwrap()).unwrap(),
            canonical
        );

        stdenv::set_current_dir(orig).unwrap();
        let _ = fs::remove_dir_all(temp);
    }

    #[test]
    fn test_cd_nonexistent_names_the_target_and_keeps_cwd() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let mut env = empty_env();

        let err = run(
            BuiltinKind::Cd,
            &["/definitely/not/a/dir"],
            &mut no_stdin(),
            &mut env,
        )
        .unwrap_err();
        assert!(err.to_string().contains("/definitely/not/a/dir"));
        assert_eq!(stdenv::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_cd_with_no_target_goes_home() {
        let _lock = lock_current_dir();
        let temp = make_unique_temp_dir("cd_home");
        let canonical = fs::canonicalize(&temp).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut env = empty_env();
        env.set_var("HOME", canonical.to_string_lossy().to_string());
        run(BuiltinKind::Cd, &[], &mut no_stdin(), &mut env).unwrap();
        assert_eq!(
            fs::canonicalize(stdenv::current_dir().unwrap()).unwrap(),
            canonical
        );

        stdenv::set_current_dir(orig).unwrap();
        let _ = fs::remove_dir_all(temp);
    }

    #[test]
    fn test_tilde_expansion() {
        assert_eq!(expand_tilde("~", Some("/home/u")), PathBuf::from("/home/u"));
        assert_eq!(
            expand_tilde("~/src", Some("/home/u")),
            PathBuf::from("/home/u/src")
        );
        // No HOME: the target is taken literally.
        assert_eq!(expand_tilde("~/src", None), PathBuf::from("~/src"));
        // Only a leading tilde expands.
        assert_eq!(expand_tilde("a~b", Some("/home/u")), PathBuf::from("a~b"));
    }

    #[test]
    fn test_cat_reads_files_in_order() {
        let temp = make_unique_temp_dir("cat");
        let first = temp.join("first.txt");
        let second = temp.join("second.txt");
        fs::File::create(&first)
            .and_then(|mut f| f.write_all(b"hello\n"))
            .unwrap();
        fs::File::create(&second)
            .and_then(|mut f| f.write_all(b"world\n"))
            .unwrap();

        let mut env = empty_env();
        let capture = run(
            BuiltinKind::Cat,
            &[&first.to_string_lossy(), &second.to_string_lossy()],
            &mut no_stdin(),
            &mut env,
        )
        .unwrap();
        assert_eq!(capture.code, 0);
        assert_eq!(capture.text.as_deref(), Some("hello\nworld\n"));

        let _ = fs::remove_dir_all(temp);
    }

    #[test]
    fn test_cat_missing_file_does_not_abort_the_rest() {
        let temp = make_unique_temp_dir("cat_missing");
        let present = temp.join("present.txt");
        fs::File::create(&present)
            .and_then(|mut f| f.write_all(b"kept\n"))
            .unwrap();

        let mut env = empty_env();
        let capture = run(
            BuiltinKind::Cat,
            &["/no/such/file", &present.to_string_lossy()],
            &mut no_stdin(),
            &mut env,
        )
        .unwrap();
        assert_eq!(capture.code, 1);
        assert_eq!(capture.text.as_deref(), Some("kept\n"));
        assert_eq!(
            capture.err.as_deref(),
            Some("cat: /no/such/file: No such file or directory\n")
        );

        let _ = fs::remove_dir_all(temp);
    }

    #[test]
    fn test_cat_dash_argument_is_a_filename() {
        let mut env = empty_env();
        let capture = run(BuiltinKind::Cat, &["-x"], &mut no_stdin(), &mut env).unwrap();
        assert_eq!(capture.code, 1);
        assert_eq!(capture.text, None);
        assert_eq!(
            capture.err.as_deref(),
            Some("cat: -x: No such file or directory\n")
        );
    }

    #[test]
    fn test_cat_streams_stdin_with_no_args() {
        let mut env = empty_env();
        let mut stdin = Cursor::new(b"from stdin\nline2\n".to_vec());
        let capture = run(BuiltinKind::Cat, &[], &mut stdin, &mut env).unwrap();
        assert_eq!(capture.text.as_deref(), Some("from stdin\nline2\n"));
    }

    #[test]
    fn test_type_classifies_builtins() {
        let mut env = empty_env();
        let capture = run(BuiltinKind::Type, &["cd"], &mut no_stdin(), &mut env).unwrap();
        assert_eq!(capture, Capture::ok("cd is a shell builtin"));
    }

    #[test]
    fn test_type_reports_unknown_names() {
        let mut env = empty_env();
        env.set_var("PATH", "/definitely/not/a/dir");
        let capture = run(
            BuiltinKind::Type,
            &["nonexistent_xyz"],
            &mut no_stdin(),
            &mut env,
        )
        .unwrap();
        assert_eq!(capture.code, 1);
        assert_eq!(capture.text.as_deref(), Some("nonexistent_xyz: not found"));
    }

    #[test]
    #[cfg(unix)]
    fn test_type_resolves_externals_via_path() {
        let mut env = empty_env();
        env.set_var("PATH", "/bin:/usr/bin");
        let capture = run(BuiltinKind::Type, &["sh"], &mut no_stdin(), &mut env).unwrap();
        let text = capture.text.unwrap();
        assert!(text.starts_with("sh is /"), "got {text:?}");
    }

    #[test]
    fn test_history_on_empty_log_prints_nothing() {
        let mut env = empty_env();
        let capture = run(BuiltinKind::History, &[], &mut no_stdin(), &mut env).unwrap();
        assert_eq!(capture, Capture::silent(0));
    }

    #[test]
    fn test_history_lists_with_sequence_numbers() {
        let mut env = empty_env();
        env.history.append("echo a");
        env.history.append("pwd");
        env.history.append("echo b");

        let capture = run(BuiltinKind::History, &["2"], &mut no_stdin(), &mut env).unwrap();
        assert_eq!(capture.text.as_deref(), Some("    2  pwd\n    3  echo b"));
    }

    #[test]
    fn test_history_append_flag_writes_the_delta() {
        let temp = make_unique_temp_dir("history_a");
        let file = temp.join("histfile");
        let mut env = empty_env();
        env.history.append("one");
        env.history.append("two");

        run(
            BuiltinKind::History,
            &["-a", &file.to_string_lossy()],
            &mut no_stdin(),
            &mut env,
        )
        .unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "one\ntwo\n");

        // Immediately appending again writes nothing new.
        run(
            BuiltinKind::History,
            &["-a", &file.to_string_lossy()],
            &mut no_stdin(),
            &mut env,
        )
        .unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "one\ntwo\n");

        let _ = fs::remove_dir_all(temp);
    }

    #[test]
    fn test_history_read_flag_reports_missing_files() {
        let mut env = empty_env();
        let err = run(
            BuiltinKind::History,
            &["-r", "/no/such/histfile"],
            &mut no_stdin(),
            &mut env,
        )
        .unwrap_err();
        assert!(err.to_string().contains("/no/such/histfile"));
    }
}
