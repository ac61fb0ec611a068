//! Typed expression language (§4.3): lexer/parser, static type checker,
//! and stateful evaluator shared by `where`, `eval`, and `alert` nodes.

pub mod ast;
pub mod eval;
pub mod functions;
pub mod parser;
pub mod types;

pub use ast::{BinOp, Expr, UnOp};
pub use eval::Evaluator;
pub use functions::{EvalError, StatefulFunction};
pub use parser::{parse, ParseError};
pub use types::{static_check, Type, ValidationError};
