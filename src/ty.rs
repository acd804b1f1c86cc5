//! Semantic types for the source language.
//!
//! Equality is the derived structural equality: two array types are equal
//! when their element types are, and two function types are equal when
//! their parameter lists and return types match pairwise. Call sites
//! compare arity and parameter types themselves, in declaration order.

use std::fmt;

use linked_hash_map::LinkedHashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
  Number,
  Bool,
  Void,
  String,
  Array(Box<Type>),
  Function {
    parameters: LinkedHashMap<String, Type>,
    return_type: Box<Type>,
  },
}

impl Type {
  pub fn array_of(element: Type) -> Self {
    Self::Array(Box::new(element))
  }

  pub fn function(parameters: LinkedHashMap<String, Type>, return_type: Type) -> Self {
    Self::Function {
      parameters,
      return_type: Box::new(return_type),
    }
  }

}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Type::Number => write!(f, "number"),
      Type::Bool => write!(f, "bool"),
      Type::Void => write!(f, "void"),
      Type::String => write!(f, "string"),
      Type::Array(element) => write!(f, "array<{element}>"),
      Type::Function {
        parameters,
        return_type,
      } => {
        let rendered: Vec<String> = parameters
          .iter()
          .map(|(name, ty)| format!("{name}: {ty}"))
          .collect();
        write!(f, "({}) -> {return_type}", rendered.join(", "))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn array_types_are_structurally_equal() {
    assert_eq!(Type::array_of(Type::Number), Type::array_of(Type::Number));
    assert_ne!(Type::array_of(Type::Number), Type::array_of(Type::Bool));
  }

  #[test]
  fn display_uses_source_syntax() {
    assert_eq!(Type::array_of(Type::Number).to_string(), "array<number>");

    let mut parameters = LinkedHashMap::new();
    parameters.insert("n".to_string(), Type::Number);
    let signature = Type::function(parameters, Type::Void);
    assert_eq!(signature.to_string(), "(n: number) -> void");
  }
}
