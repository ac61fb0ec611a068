//! Pipeline program parsing (§6): the line-oriented declarative format
//! that the compiler (`crate::compiler`) turns into a `Graph`.

pub mod ast;
pub mod parser;

pub use ast::{Dbrp, MethodArg, MethodCall, PipelineChain, Program, Root, Stage, VarDecl, VarType, VarValue};
pub use parser::{parse_program, ProgramParseError};
