//! Shared error utilities used across the compilation pipeline.
//!
//! Diagnostics are kept lightweight on purpose – parse failures point at
//! the offending byte with a caret under its source line, type failures
//! render the expected and actual types in source syntax.

use snafu::Snafu;

use crate::ty::Type;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("{source_line}\n{marker} {message}"))]
  WithLocation {
    source_line: String,
    marker: String,
    message: String,
  },

  #[snafu(display("type error: expected {expected} but got {actual}"))]
  TypeMismatch { expected: Type, actual: Type },

  #[snafu(display("type error: {message}"))]
  Type { message: String },

  #[snafu(display("codegen error: {message}"))]
  Emit { message: String },
}

impl CompileError {
  /// Construct an error anchored at a specific byte offset in the source.
  pub fn at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let safe_loc = loc.min(source.len());
    let line_start = source[..safe_loc].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[safe_loc..]
      .find('\n')
      .map(|i| safe_loc + i)
      .unwrap_or(source.len());
    let line_number = source[..line_start].matches('\n').count() + 1;
    let prefix = format!("line {line_number}: ");
    let source_line = format!("{prefix}{}", &source[line_start..line_end]);
    let char_offset = prefix.chars().count() + source[line_start..safe_loc].chars().count();
    let marker = format!("{}^", " ".repeat(char_offset));
    Self::WithLocation {
      source_line,
      marker,
      message: message.into(),
    }
  }

  pub fn type_error(message: impl Into<String>) -> Self {
    Self::Type {
      message: message.into(),
    }
  }

  pub fn mismatch(expected: &Type, actual: &Type) -> Self {
    Self::TypeMismatch {
      expected: expected.clone(),
      actual: actual.clone(),
    }
  }

  pub fn emit(message: impl Into<String>) -> Self {
    Self::Emit {
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn caret_points_at_the_offending_column() {
    let err = CompileError::at("var x = ;", 8, "expected an expression");
    assert_eq!(
      err.to_string(),
      "line 1: var x = ;\n                ^ expected an expression"
    );
  }

  #[test]
  fn caret_finds_the_line_in_multi_line_sources() {
    let err = CompileError::at("f();\ng(;\nh();", 7, "oops");
    assert!(err.to_string().starts_with("line 2: g(;"));
  }

  #[test]
  fn location_past_the_end_is_clamped() {
    let err = CompileError::at("ab", 99, "unexpected end of input");
    assert!(err.to_string().contains("unexpected end of input"));
  }

  #[test]
  fn mismatch_renders_both_types() {
    let err = CompileError::mismatch(&Type::Bool, &Type::Number);
    assert_eq!(err.to_string(), "type error: expected bool but got number");
  }
}
