//! # Heavenly machine
//!
//! A small sandboxed interpreter for a JavaScript subset, wired to the
//! membrane through the [`heavenly_membrane::Machine`] trait:
//! - Persistent program: appended chunks share one global scope
//! - Host references are proxies; member reads, writes and calls go through
//!   the `getFromHeaven` / `sendToHeaven` / `prayToHeaven` natives
//! - Errors raised by host natives surface unchanged
//!
//! ## Example
//!
//! ```ignore
//! use heavenly_machine::JsMachine;
//! use heavenly_membrane::{compile, HostValue};
//!
//! let add = HostValue::function("add", |_, args| {
//!     Ok(HostValue::from(args[0].as_number().unwrap_or(0.0) + args[1].as_number().unwrap_or(0.0)))
//! });
//! let compiled = compile(JsMachine::new(), &["add"], &[add], "log(add(2, 3))", &[])?;
//! assert_eq!(compiled.session().take_logs(), vec!["5"]);
//! ```

pub mod ast;
pub mod error;
pub mod heaven;
pub mod interpreter;
pub mod lexer;
pub mod machine;
pub mod parser;
pub mod value;

pub use ast::{BinOp, DeclKind, Expr, ExprKind, FunctionDecl, Stmt, UnOp};
pub use error::{ErrorContext, MachineError, Result, Span};
pub use interpreter::Interpreter;
pub use lexer::{tokenize, tokenize_at, SpannedToken, Token};
pub use machine::JsMachine;
pub use parser::{parse, parse_at, Parser};
pub use value::{Proxy, Value};
