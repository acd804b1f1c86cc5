//! AST definitions and the concrete grammar.
//!
//! The grammar mirrors the layered-precedence structure of a classic
//! recursive-descent front-end, but each rule is a combinator value built
//! from `crate::combinators`. Three non-terminals (`expression`,
//! `statement`, `type`) are mutually recursive with the rest and are
//! declared as forward references patched once the dependent rules exist.
//! A shared `ignored` parser swallows whitespace and comments after every
//! token.

use linked_hash_map::LinkedHashMap;

use crate::combinators::{Parser, constant, error, forward, maybe, regexp, zero_or_more};
use crate::error::CompileResult;
use crate::ty::Type;

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
}

/// Expression and statement tree produced by the parser. Statements and
/// expressions share one closed enum; both walkers are a single `match`.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
  Number(i32),
  Boolean(bool),
  Undefined,
  Null,
  /// A string literal is an array literal whose elements are character
  /// codes; the checker types it `array<number>`.
  StringLiteral(String),
  ArrayLiteral(Vec<Ast>),
  Id(String),
  Not(Box<Ast>),
  Binary {
    op: BinaryOp,
    left: Box<Ast>,
    right: Box<Ast>,
  },
  ArrayLookup {
    array: Box<Ast>,
    index: Box<Ast>,
  },
  Length(Box<Ast>),
  Call {
    callee: String,
    args: Vec<Ast>,
  },
  Return(Box<Ast>),
  Block(Vec<Ast>),
  If {
    cond: Box<Ast>,
    consequence: Box<Ast>,
    alternative: Box<Ast>,
  },
  While {
    cond: Box<Ast>,
    body: Box<Ast>,
  },
  /// `init` and `step` are statement nodes: the header is parsed as three
  /// consecutive statements, so the step keeps its trailing semicolon.
  For {
    init: Box<Ast>,
    cond: Box<Ast>,
    step: Box<Ast>,
    body: Box<Ast>,
  },
  Var {
    name: String,
    declared: Option<Type>,
    value: Box<Ast>,
  },
  Assign {
    name: String,
    value: Box<Ast>,
  },
  Func {
    name: String,
    signature: Type,
    body: Box<Ast>,
  },
}

impl Ast {
  pub fn id(name: impl Into<String>) -> Self {
    Self::Id(name.into())
  }

  pub fn not(operand: Ast) -> Self {
    Self::Not(Box::new(operand))
  }

  pub fn binary(op: BinaryOp, left: Ast, right: Ast) -> Self {
    Self::Binary {
      op,
      left: Box::new(left),
      right: Box::new(right),
    }
  }

  pub fn lookup(array: Ast, index: Ast) -> Self {
    Self::ArrayLookup {
      array: Box::new(array),
      index: Box::new(index),
    }
  }

  pub fn length(array: Ast) -> Self {
    Self::Length(Box::new(array))
  }

  pub fn call(callee: impl Into<String>, args: Vec<Ast>) -> Self {
    Self::Call {
      callee: callee.into(),
      args,
    }
  }

  pub fn ret(value: Ast) -> Self {
    Self::Return(Box::new(value))
  }

  pub fn if_stmt(cond: Ast, consequence: Ast, alternative: Ast) -> Self {
    Self::If {
      cond: Box::new(cond),
      consequence: Box::new(consequence),
      alternative: Box::new(alternative),
    }
  }

  pub fn while_stmt(cond: Ast, body: Ast) -> Self {
    Self::While {
      cond: Box::new(cond),
      body: Box::new(body),
    }
  }

  pub fn for_stmt(init: Ast, cond: Ast, step: Ast, body: Ast) -> Self {
    Self::For {
      init: Box::new(init),
      cond: Box::new(cond),
      step: Box::new(step),
      body: Box::new(body),
    }
  }

  pub fn var(name: impl Into<String>, declared: Option<Type>, value: Ast) -> Self {
    Self::Var {
      name: name.into(),
      declared,
      value: Box::new(value),
    }
  }

  pub fn assign(name: impl Into<String>, value: Ast) -> Self {
    Self::Assign {
      name: name.into(),
      value: Box::new(value),
    }
  }

  pub fn func(name: impl Into<String>, signature: Type, body: Ast) -> Self {
    Self::Func {
      name: name.into(),
      signature,
      body: Box::new(body),
    }
  }
}

/// Parse a whole program; the result is a `Block` of top-level statements.
pub fn parse(source: &str) -> CompileResult<Ast> {
  grammar().parse_to_completion(source)
}

/// Fold a left-associative run of operator/term pairs onto a first term.
fn infix(operator: Parser<BinaryOp>, term: Parser<Ast>) -> Parser<Ast> {
  let rest = zero_or_more(operator.bind({
    let term = term.clone();
    move |op| term.clone().map(move |right| (op, right))
  }));
  term.bind(move |first| {
    rest.clone().map(move |pairs| {
      pairs
        .into_iter()
        .fold(first.clone(), |left, (op, right)| Ast::binary(op, left, right))
    })
  })
}

/// Build the full grammar. Construction is deterministic and the returned
/// parser is immutable; all forward references are patched before this
/// function returns.
fn grammar() -> Parser<Ast> {
  // ----- Lexical layer -----
  let whitespace = regexp(r"[ \t\r\n]+");
  let line_comment = regexp(r"//[^\n]*");
  let block_comment = regexp(r"(?s)/\*.*?\*/");
  let ignored = zero_or_more(whitespace.or(line_comment).or(block_comment));

  let token = {
    let ignored = ignored.clone();
    move |pattern: &str| {
      let ignored = ignored.clone();
      regexp(pattern).bind(move |text| ignored.and(constant(text)))
    }
  };

  let function_kw = token(r"function\b");
  let if_kw = token(r"if\b");
  let else_kw = token(r"else\b");
  let return_kw = token(r"return\b");
  let var_kw = token(r"var\b");
  let while_kw = token(r"while\b");
  let for_kw = token(r"for\b");
  let true_kw = token(r"true\b");
  let false_kw = token(r"false\b");
  let undefined_kw = token(r"undefined\b");
  let null_kw = token(r"null\b");
  let array_kw = token(r"array\b");
  let void_kw = token(r"void\b");
  let bool_kw = token(r"bool\b");
  let number_kw = token(r"number\b");
  let string_kw = token(r"string\b");

  let comma = token(",");
  let semicolon = token(";");
  let colon = token(":");
  let left_paren = token(r"\(");
  let right_paren = token(r"\)");
  let left_brace = token(r"\{");
  let right_brace = token(r"\}");
  let left_bracket = token(r"\[");
  let right_bracket = token(r"\]");
  let less_than = token("<");
  let greater_than = token(">");
  let assign_op = token("=");
  let not_op = token("!");

  let star = token(r"\*").map(|_| BinaryOp::Mul);
  let slash = token("/").map(|_| BinaryOp::Div);
  let plus = token(r"\+").map(|_| BinaryOp::Add);
  let minus = token("-").map(|_| BinaryOp::Sub);
  let equal_op = token("==").map(|_| BinaryOp::Eq);
  let not_equal_op = token("!=").map(|_| BinaryOp::Ne);

  let id = token("[a-zA-Z_][a-zA-Z0-9_]*");
  let number = token("[0-9]+").bind(|digits| match digits.parse::<i32>() {
    Ok(value) => constant(Ast::Number(value)),
    Err(_) => error("integer literal out of range"),
  });

  // ----- Forward references -----
  let (expression, expression_slot) = forward::<Ast>("expression used before the grammar is built");
  let (statement, statement_slot) = forward::<Ast>("statement used before the grammar is built");
  let (type_rule, type_slot) = forward::<Type>("type used before the grammar is built");

  // ----- Types -----
  let array_type = array_kw
    .and(less_than)
    .and(type_rule.clone())
    .bind(move |element| greater_than.and(constant(Type::array_of(element))));
  type_slot.define(
    void_kw
      .map(|_| Type::Void)
      .or(bool_kw.map(|_| Type::Bool))
      .or(number_kw.map(|_| Type::Number))
      .or(string_kw.map(|_| Type::String))
      .or(array_type),
  );

  let type_annotation = colon.and(type_rule);
  let optional_type =
    maybe(type_annotation.clone()).map(|annotation| annotation.unwrap_or(Type::Number));

  // ----- Expressions -----
  let args = expression
    .clone()
    .bind({
      let comma = comma.clone();
      let expression = expression.clone();
      move |first| {
        zero_or_more(comma.and(expression.clone())).map(move |rest| {
          let mut all = vec![first.clone()];
          all.extend(rest);
          all
        })
      }
    })
    .or(constant(Vec::new()));

  // A call whose callee is `length` with a single argument folds to the
  // dedicated length node.
  let call = id.clone().bind({
    let left_paren = left_paren.clone();
    let args = args.clone();
    let right_paren = right_paren.clone();
    move |callee| {
      let right_paren = right_paren.clone();
      left_paren.and(args.clone()).bind(move |mut arguments| {
        let node = if callee == "length" && arguments.len() == 1 {
          Ast::Length(Box::new(arguments.remove(0)))
        } else {
          Ast::Call {
            callee: callee.clone(),
            args: arguments,
          }
        };
        right_paren.and(constant(node))
      })
    }
  });

  let array_literal = left_bracket.clone().and(args).bind({
    let right_bracket = right_bracket.clone();
    move |elements| right_bracket.and(constant(Ast::ArrayLiteral(elements)))
  });

  // The quotes and body skip the ignored splice so spaces inside the body
  // survive; only the closing quote swallows trailing trivia.
  let string_literal = regexp("\"").and(regexp("[A-Za-z0-9 ]*")).bind({
    let closing_quote = token("\"");
    move |body| closing_quote.and(constant(Ast::StringLiteral(body)))
  });

  let array_lookup = id.clone().bind({
    let left_bracket = left_bracket.clone();
    let expression = expression.clone();
    let right_bracket = right_bracket.clone();
    move |name| {
      let right_bracket = right_bracket.clone();
      left_bracket.and(expression.clone()).bind(move |index| {
        right_bracket.and(constant(Ast::lookup(Ast::Id(name.clone()), index)))
      })
    }
  });

  let scalar = true_kw
    .map(|_| Ast::Boolean(true))
    .or(false_kw.map(|_| Ast::Boolean(false)))
    .or(undefined_kw.map(|_| Ast::Undefined))
    .or(null_kw.map(|_| Ast::Null))
    .or(id.clone().map(Ast::Id))
    .or(number);

  let parenthesized = left_paren.clone().and(expression.clone()).bind({
    let right_paren = right_paren.clone();
    move |node| right_paren.and(constant(node))
  });

  let atom = call
    .or(array_literal)
    .or(string_literal)
    .or(array_lookup)
    .or(scalar)
    .or(parenthesized);

  let unary = maybe(not_op).bind(move |negation| {
    let negated = negation.is_some();
    atom
      .clone()
      .map(move |term| if negated { Ast::not(term) } else { term })
  });

  let product = infix(star.or(slash), unary);
  let sum = infix(plus.or(minus), product);
  let comparison = infix(equal_op.or(not_equal_op), sum);
  expression_slot.define(comparison);

  // ----- Statements -----
  let return_stmt = return_kw.and(expression.clone()).bind({
    let semicolon = semicolon.clone();
    move |value| semicolon.and(constant(Ast::ret(value)))
  });

  let expression_stmt = expression.clone().bind({
    let semicolon = semicolon.clone();
    move |node| semicolon.and(constant(node))
  });

  let if_stmt = if_kw
    .and(left_paren.clone())
    .and(expression.clone())
    .bind({
      let right_paren = right_paren.clone();
      let statement = statement.clone();
      let else_kw = else_kw;
      move |cond| {
        let statement = statement.clone();
        let else_kw = else_kw.clone();
        right_paren.and(statement.clone()).bind(move |consequence| {
          let cond = cond.clone();
          else_kw.and(statement.clone()).map(move |alternative| {
            Ast::if_stmt(cond.clone(), consequence.clone(), alternative)
          })
        })
      }
    });

  let while_stmt = while_kw
    .and(left_paren.clone())
    .and(expression.clone())
    .bind({
      let right_paren = right_paren.clone();
      let statement = statement.clone();
      move |cond| {
        right_paren
          .and(statement.clone())
          .map(move |body| Ast::while_stmt(cond.clone(), body))
      }
    });

  let for_stmt = for_kw
    .and(left_paren.clone())
    .and(statement.clone())
    .bind({
      let statement = statement.clone();
      let right_paren = right_paren.clone();
      move |init| {
        let statement = statement.clone();
        let right_paren = right_paren.clone();
        statement.clone().bind(move |cond| {
          let statement = statement.clone();
          let right_paren = right_paren.clone();
          let init = init.clone();
          statement.clone().bind(move |step| {
            let init = init.clone();
            let cond = cond.clone();
            right_paren.and(statement.clone()).map(move |body| {
              Ast::for_stmt(init.clone(), cond.clone(), step.clone(), body)
            })
          })
        })
      }
    });

  let var_stmt = var_kw.and(id.clone()).bind({
    let annotation = maybe(type_annotation);
    let assign_op = assign_op.clone();
    let expression = expression.clone();
    let semicolon = semicolon.clone();
    move |name| {
      let assign_op = assign_op.clone();
      let expression = expression.clone();
      let semicolon = semicolon.clone();
      annotation.clone().bind(move |declared| {
        let name = name.clone();
        let semicolon = semicolon.clone();
        assign_op.and(expression.clone()).bind(move |value| {
          semicolon.and(constant(Ast::var(name.clone(), declared.clone(), value)))
        })
      })
    }
  });

  let assign_stmt = id.clone().bind({
    let assign_op = assign_op;
    let expression = expression.clone();
    let semicolon = semicolon.clone();
    move |name| {
      let semicolon = semicolon.clone();
      assign_op
        .and(expression.clone())
        .bind(move |value| semicolon.and(constant(Ast::assign(name.clone(), value))))
    }
  });

  let block_stmt = left_brace.and(zero_or_more(statement.clone())).bind({
    let right_brace = right_brace;
    move |statements| right_brace.and(constant(Ast::Block(statements)))
  });

  let parameter = id.clone().bind({
    let optional_type = optional_type.clone();
    move |name| optional_type.clone().map(move |ty| (name.clone(), ty))
  });
  let parameters = parameter
    .clone()
    .bind({
      let comma = comma;
      let parameter = parameter;
      move |first| {
        zero_or_more(comma.and(parameter.clone())).map(move |rest| {
          let mut all = vec![first.clone()];
          all.extend(rest);
          all
        })
      }
    })
    .or(constant(Vec::new()));

  let func_stmt = function_kw.and(id).bind({
    let left_paren = left_paren;
    let parameters = parameters;
    let right_paren = right_paren;
    let optional_type = optional_type;
    let block_stmt = block_stmt.clone();
    move |name| {
      let right_paren = right_paren.clone();
      let optional_type = optional_type.clone();
      let block_stmt = block_stmt.clone();
      left_paren.and(parameters.clone()).bind(move |params| {
        let mut parameter_types = LinkedHashMap::new();
        for (param, ty) in params {
          if parameter_types.insert(param.clone(), ty).is_some() {
            return error(format!("duplicate parameter '{param}'"));
          }
        }
        let name = name.clone();
        let block_stmt = block_stmt.clone();
        right_paren.and(optional_type.clone()).bind(move |return_type| {
          let name = name.clone();
          let signature = Type::function(parameter_types.clone(), return_type);
          block_stmt
            .clone()
            .map(move |body| Ast::func(name.clone(), signature.clone(), body))
        })
      })
    }
  });

  let statement_rule = return_stmt
    .or(func_stmt)
    .or(if_stmt)
    .or(while_stmt)
    .or(for_stmt)
    .or(var_stmt)
    .or(assign_stmt)
    .or(block_stmt)
    .or(expression_stmt);
  statement_slot.define(statement_rule);

  ignored.and(zero_or_more(statement)).map(Ast::Block)
}
