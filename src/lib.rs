//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `combinators` provides the source cursor and the parser-combinator core.
//! - `parser` owns all syntactic knowledge and produces the AST.
//! - `typecheck` validates the tree against the static typing rules.
//! - `codegen` lowers the tree into 32-bit ARM assembly text.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod combinators;
pub mod error;
pub mod parser;
pub mod ty;
pub mod typecheck;

mod codegen;

use tracing::debug;

pub use error::{CompileError, CompileResult};

/// Compile a source string into 32-bit ARM assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let ast = parser::parse(source)?;
  if let parser::Ast::Block(statements) = &ast {
    debug!(statements = statements.len(), "parse finished");
  }
  typecheck::check(&ast)?;
  debug!("type check finished");
  let asm = codegen::generate(&ast)?;
  debug!(bytes = asm.len(), "emission finished");
  Ok(asm)
}
