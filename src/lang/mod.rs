//! The embedded expression language.
//!
//! A small dynamically typed language with Python-flavoured syntax:
//! literals, arithmetic, comparisons, containers, subscripts, builtin calls
//! and assignment statements. Evaluation happens against a [`Namespace`]
//! that persists across calls.

mod ast;
mod builtins;
mod exception;
mod interp;
mod lexer;
mod ops;
mod parser;
mod value;

pub use builtins::Builtin;
pub use exception::{EvalResult, Exception, ExceptionKind};
pub use interp::{evaluate, execute, Namespace};
pub use value::{Dict, Value};

/// Returns true if `source` parses as a single expression.
///
/// Never fails; syntax errors simply classify the input as a statement
/// sequence, which then reports them when executed.
pub fn is_expression(source: &str) -> bool {
    parser::parse_expression(source).is_ok()
}
