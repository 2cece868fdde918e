//! minish: a small interactive command interpreter.
//!
//! Input lines are tokenized with shell quoting rules, checked for an output
//! redirection, and dispatched either to an in-process builtin or to an
//! external program found through PATH. Pipelines connect stages with OS
//! pipes; builtin stages run in-process and write their captured output
//! straight into the stage's descriptor.

mod builtin;
pub mod command;
mod complete;
pub mod env;
mod external;
pub mod history;
mod interpreter;
mod lexer;
mod redirect;

pub use interpreter::Interpreter;
