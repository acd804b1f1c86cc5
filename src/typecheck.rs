//! Static type checking over the AST.
//!
//! The checker assigns a type to every expression and `Void` to every
//! statement. It threads three pieces of state: the function-local
//! variable environment, the program-global function signatures populated
//! as `Func` nodes are visited, and the enclosing declared return type.
//! Blocks share the enclosing function's environment – there is no block
//! scope, and shadowing silently rebinds.

use std::collections::HashMap;

use linked_hash_map::LinkedHashMap;

use crate::error::{CompileError, CompileResult};
use crate::parser::{Ast, BinaryOp};
use crate::ty::Type;

/// Validate a whole program.
pub fn check(ast: &Ast) -> CompileResult<()> {
  TypeChecker::new().check(ast)?;
  Ok(())
}

pub struct TypeChecker {
  locals: HashMap<String, Type>,
  functions: LinkedHashMap<String, Type>,
  return_type: Option<Type>,
}

impl TypeChecker {
  pub fn new() -> Self {
    // The C runtime provides putchar; there is no declaration syntax, so
    // its signature is registered up front.
    let mut putchar_parameters = LinkedHashMap::new();
    putchar_parameters.insert("c".to_string(), Type::Number);
    let mut functions = LinkedHashMap::new();
    functions.insert(
      "putchar".to_string(),
      Type::function(putchar_parameters, Type::Void),
    );
    Self {
      locals: HashMap::new(),
      functions,
      return_type: None,
    }
  }

  pub fn check(&mut self, node: &Ast) -> CompileResult<Type> {
    match node {
      Ast::Number(_) => Ok(Type::Number),
      Ast::Boolean(_) => Ok(Type::Bool),
      Ast::Undefined | Ast::Null => Ok(Type::Void),
      Ast::StringLiteral(_) => Ok(Type::array_of(Type::Number)),
      Ast::Id(name) => self
        .locals
        .get(name)
        .cloned()
        .ok_or_else(|| CompileError::type_error(format!("undefined variable '{name}'"))),
      Ast::Not(operand) => {
        let actual = self.check(operand)?;
        expect(&Type::Bool, &actual)?;
        Ok(Type::Bool)
      }
      Ast::Binary { op, left, right } => {
        let left_ty = self.check(left)?;
        let right_ty = self.check(right)?;
        match op {
          BinaryOp::Eq | BinaryOp::Ne => {
            expect(&left_ty, &right_ty)?;
            Ok(Type::Bool)
          }
          BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            expect(&Type::Number, &left_ty)?;
            expect(&Type::Number, &right_ty)?;
            Ok(Type::Number)
          }
        }
      }
      Ast::ArrayLiteral(elements) => {
        let Some(first) = elements.first() else {
          return Err(CompileError::type_error(
            "cannot infer the element type of an empty array literal",
          ));
        };
        let element_ty = self.check(first)?;
        for element in &elements[1..] {
          let actual = self.check(element)?;
          expect(&element_ty, &actual)?;
        }
        Ok(Type::array_of(element_ty))
      }
      Ast::ArrayLookup { array, index } => {
        let index_ty = self.check(index)?;
        expect(&Type::Number, &index_ty)?;
        match self.check(array)? {
          Type::Array(element) => Ok(*element),
          Type::String => Ok(Type::Number),
          other => Err(CompileError::type_error(format!(
            "expected an array or string, but got {other}"
          ))),
        }
      }
      Ast::Length(array) => match self.check(array)? {
        Type::Array(_) => Ok(Type::Number),
        other => Err(CompileError::type_error(format!(
          "expected an array, but got {other}"
        ))),
      },
      Ast::Call { callee, args } => {
        let signature = self
          .functions
          .get(callee)
          .cloned()
          .ok_or_else(|| CompileError::type_error(format!("undefined function '{callee}'")))?;
        let Type::Function {
          parameters,
          return_type,
        } = signature
        else {
          return Err(CompileError::type_error(format!(
            "'{callee}' is not a function"
          )));
        };
        if args.len() != parameters.len() {
          return Err(CompileError::type_error(format!(
            "'{callee}' expects {} arguments, but got {}",
            parameters.len(),
            args.len()
          )));
        }
        // Arguments are matched positionally, in declaration order.
        for (arg, (_, expected)) in args.iter().zip(parameters.iter()) {
          let actual = self.check(arg)?;
          expect(expected, &actual)?;
        }
        Ok(*return_type)
      }
      Ast::Return(value) => {
        let actual = self.check(value)?;
        let Some(expected) = self.return_type.clone() else {
          return Err(CompileError::type_error("return outside of a function"));
        };
        expect(&expected, &actual)?;
        Ok(Type::Void)
      }
      Ast::Block(statements) => {
        for statement in statements {
          self.check(statement)?;
        }
        Ok(Type::Void)
      }
      Ast::If {
        cond,
        consequence,
        alternative,
      } => {
        // Conditions are deliberately unconstrained.
        self.check(cond)?;
        self.check(consequence)?;
        self.check(alternative)?;
        Ok(Type::Void)
      }
      Ast::While { cond, body } => {
        self.check(cond)?;
        self.check(body)?;
        Ok(Type::Void)
      }
      Ast::For {
        init,
        cond,
        step,
        body,
      } => {
        self.check(init)?;
        self.check(cond)?;
        self.check(step)?;
        self.check(body)?;
        Ok(Type::Void)
      }
      Ast::Var {
        name,
        declared,
        value,
      } => {
        let actual = self.check(value)?;
        let bound = match declared {
          Some(expected) => {
            expect(expected, &actual)?;
            expected.clone()
          }
          None => actual,
        };
        self.locals.insert(name.clone(), bound);
        Ok(Type::Void)
      }
      Ast::Assign { name, value } => {
        let actual = self.check(value)?;
        let expected = self.locals.get(name).cloned().ok_or_else(|| {
          CompileError::type_error(format!("assignment to undefined variable '{name}'"))
        })?;
        expect(&expected, &actual)?;
        Ok(Type::Void)
      }
      Ast::Func {
        name,
        signature,
        body,
      } => {
        self.functions.insert(name.clone(), signature.clone());
        let Type::Function {
          parameters,
          return_type,
        } = signature
        else {
          return Err(CompileError::type_error(format!(
            "'{name}' has a malformed signature"
          )));
        };
        // Fresh environment per function; the caller's is restored after.
        let saved_locals = std::mem::take(&mut self.locals);
        let saved_return = self.return_type.take();
        for (param, ty) in parameters.iter() {
          self.locals.insert(param.clone(), ty.clone());
        }
        self.return_type = Some((**return_type).clone());
        let result = self.check(body);
        self.locals = saved_locals;
        self.return_type = saved_return;
        result?;
        Ok(Type::Void)
      }
    }
  }
}

fn expect(expected: &Type, actual: &Type) -> CompileResult<()> {
  if expected == actual {
    Ok(())
  } else {
    Err(CompileError::mismatch(expected, actual))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;

  fn check_source(source: &str) -> CompileResult<()> {
    check(&parse(source).unwrap())
  }

  #[test]
  fn assigning_across_types_is_a_mismatch() {
    let err =
      check_source("function main(){ var x: bool = true; var y: number = 1; x = y; }").unwrap_err();
    assert_eq!(err.to_string(), "type error: expected bool but got number");
  }

  #[test]
  fn declared_types_are_checked_against_initializers() {
    assert!(check_source("function main(){ var x: bool = true; }").is_ok());
    let err = check_source("function main(){ var x: number = true; }").unwrap_err();
    assert!(err.to_string().contains("expected number but got bool"));
  }

  #[test]
  fn arithmetic_requires_numbers() {
    let err = check_source("function main(){ var x = true + 1; }").unwrap_err();
    assert!(err.to_string().contains("expected number but got bool"));
  }

  #[test]
  fn equality_requires_matching_operand_types() {
    assert!(check_source("function main(){ var b = 1 == 2; }").is_ok());
    assert!(check_source("function main(){ var b = 1 == true; }").is_err());
  }

  #[test]
  fn not_requires_a_bool() {
    assert!(check_source("function main(){ var b = !true; }").is_ok());
    assert!(check_source("function main(){ var b = !1; }").is_err());
  }

  #[test]
  fn shadowing_rebinds_without_block_scope() {
    // The block shares the function environment, so the rebound type wins.
    let err =
      check_source("function main(){ var x = 1; { var x = true; } x = 2; }").unwrap_err();
    assert!(err.to_string().contains("expected bool but got number"));
  }

  #[test]
  fn undefined_variables_are_reported_by_name() {
    let err = check_source("function main(){ return missing; }").unwrap_err();
    assert!(err.to_string().contains("undefined variable 'missing'"));
  }

  #[test]
  fn putchar_is_preregistered() {
    assert!(check_source("function main(){ putchar(65); }").is_ok());
    let err = check_source("function main(){ putchar(true); }").unwrap_err();
    assert!(err.to_string().contains("expected number but got bool"));
  }

  #[test]
  fn unknown_functions_are_reported_by_name() {
    let err = check_source("function main(){ missing(); }").unwrap_err();
    assert!(err.to_string().contains("undefined function 'missing'"));
  }

  #[test]
  fn call_arity_must_match_the_declaration() {
    let err =
      check_source("function f(a, b){ return a; } function main(){ return f(1); }").unwrap_err();
    assert!(err.to_string().contains("expects 2 arguments, but got 1"));
  }

  #[test]
  fn argument_types_are_checked_in_declaration_order() {
    let source = "function f(a: number, b: bool){ return a; } function main(){ return f(1, 2); }";
    let err = check_source(source).unwrap_err();
    assert!(err.to_string().contains("expected bool but got number"));
  }

  #[test]
  fn return_must_match_the_declared_type() {
    let err = check_source("function f(): bool { return 1; }").unwrap_err();
    assert!(err.to_string().contains("expected bool but got number"));
  }

  #[test]
  fn return_outside_a_function_is_an_error() {
    let err = check_source("return 1;").unwrap_err();
    assert!(err.to_string().contains("return outside of a function"));
  }

  #[test]
  fn empty_array_literals_cannot_be_inferred() {
    let err = check_source("function main(){ var a = []; }").unwrap_err();
    assert!(err.to_string().contains("empty array literal"));
  }

  #[test]
  fn array_elements_must_share_one_type() {
    assert!(check_source("function main(){ var a = [1, 2, 3]; }").is_ok());
    assert!(check_source("function main(){ var a = [1, true]; }").is_err());
  }

  #[test]
  fn string_literals_are_arrays_of_numbers() {
    assert!(check_source("function main(){ var s = \"hi\"; var n: number = s[0]; }").is_ok());
  }

  #[test]
  fn lookups_on_string_typed_values_yield_numbers() {
    assert!(check_source("function f(s: string): number { return s[0]; }").is_ok());
  }

  #[test]
  fn lookups_require_an_array_or_string() {
    let err = check_source("function main(){ var n = 1; var x = n[0]; }").unwrap_err();
    assert!(err.to_string().contains("expected an array or string"));
  }

  #[test]
  fn length_requires_an_array() {
    assert!(check_source("function main(){ var a = [1]; var n = length(a); }").is_ok());
    let err = check_source("function main(){ var n = length(1); }").unwrap_err();
    assert!(err.to_string().contains("expected an array"));
  }

  #[test]
  fn undefined_and_null_type_to_void() {
    // Void is inert: no operator accepts it, so the literals only bind.
    assert!(check_source("function main(){ var u = undefined; var n = null; }").is_ok());
    assert!(check_source("function main(){ var u = undefined + 1; }").is_err());
  }

  #[test]
  fn conditions_are_unconstrained() {
    assert!(check_source("function main(){ if (1) { putchar(65); } else { putchar(66); } }").is_ok());
    assert!(check_source("function main(){ while (0) { putchar(65); } }").is_ok());
  }

  #[test]
  fn recursion_sees_its_own_signature() {
    let source =
      "function f(n){ if (n == 0) { return 1; } else { return n * f(n - 1); } }";
    assert!(check_source(source).is_ok());
  }
}
