//! Parser combinators over an immutable source cursor.
//!
//! A `Parser<T>` wraps a function from cursor to parse result. `Ok(None)`
//! signals a backtrackable miss so `or` can retry its alternative from the
//! same cursor; `Err` aborts the whole parse and is reserved for the
//! `error` combinator, unpatched forward references, and malformed
//! literals. Grammars are built once and are immutable afterwards.

use std::cell::RefCell;
use std::rc::Rc;

use regex::Regex;

use crate::error::{CompileError, CompileResult};

/// Immutable cursor: the input text (shared, cheap to clone) plus a byte
/// index into it.
#[derive(Debug, Clone)]
pub struct Source {
  text: Rc<str>,
  pub index: usize,
}

impl Source {
  pub fn new(text: &str) -> Self {
    Self {
      text: Rc::from(text),
      index: 0,
    }
  }

  /// Attempt an anchored match at the current index. The pattern must have
  /// been compiled by `regexp`, which pins it to the start of the
  /// remaining input; the cursor never searches forward.
  pub fn matches(&self, pattern: &Regex) -> Option<(String, Source)> {
    let found = pattern.find(&self.text[self.index..])?;
    let advanced = Self {
      text: Rc::clone(&self.text),
      index: self.index + found.end(),
    };
    Some((found.as_str().to_string(), advanced))
  }

  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn at_end(&self) -> bool {
    self.index == self.text.len()
  }
}

/// Produced value and advanced cursor, or `None` when the parser missed.
pub type ParseResult<T> = CompileResult<Option<(T, Source)>>;

/// A composable parser yielding values of type `T`.
pub struct Parser<T> {
  run: Rc<dyn Fn(&Source) -> ParseResult<T>>,
}

impl<T> Clone for Parser<T> {
  fn clone(&self) -> Self {
    Self {
      run: Rc::clone(&self.run),
    }
  }
}

impl<T: 'static> Parser<T> {
  pub fn new(run: impl Fn(&Source) -> ParseResult<T> + 'static) -> Self {
    Self { run: Rc::new(run) }
  }

  pub fn parse(&self, source: &Source) -> ParseResult<T> {
    (self.run)(source)
  }

  /// Ordered choice: try `self`, fall back to `other` from the same cursor.
  pub fn or(&self, other: Parser<T>) -> Parser<T> {
    let first = self.clone();
    Parser::new(move |source| match first.parse(source)? {
      Some(result) => Ok(Some(result)),
      None => other.parse(source),
    })
  }

  /// Run `self`, feed its value to `callback`, and run the parser it
  /// returns from the advanced cursor.
  pub fn bind<U: 'static>(&self, callback: impl Fn(T) -> Parser<U> + 'static) -> Parser<U> {
    let parser = self.clone();
    Parser::new(move |source| match parser.parse(source)? {
      Some((value, next)) => callback(value).parse(&next),
      None => Ok(None),
    })
  }

  /// Sequence two parsers, discarding the first value.
  pub fn and<U: 'static>(&self, other: Parser<U>) -> Parser<U> {
    self.bind(move |_| other.clone())
  }

  pub fn map<U: Clone + 'static>(&self, callback: impl Fn(T) -> U + 'static) -> Parser<U> {
    self.bind(move |value| constant(callback(value)))
  }

  /// Run the parser over the whole buffer, requiring it to consume all
  /// input. The reported index is the furthest cursor position reached.
  pub fn parse_to_completion(&self, text: &str) -> CompileResult<T> {
    let source = Source::new(text);
    match self.parse(&source)? {
      Some((value, rest)) if rest.at_end() => Ok(value),
      Some((_, rest)) => Err(CompileError::at(
        text,
        rest.index,
        format!("parse error at index {}", rest.index),
      )),
      None => Err(CompileError::at(text, 0, "parse error at index 0")),
    }
  }
}

/// Match `pattern` anchored at the cursor, yielding the matched text.
pub fn regexp(pattern: &str) -> Parser<String> {
  match Regex::new(&format!(r"\A(?:{pattern})")) {
    Ok(compiled) => Parser::new(move |source| Ok(source.matches(&compiled))),
    Err(err) => error(format!("invalid token pattern: {err}")),
  }
}

/// Consume nothing and yield `value`.
pub fn constant<T: Clone + 'static>(value: T) -> Parser<T> {
  Parser::new(move |source| Ok(Some((value.clone(), source.clone()))))
}

/// Fail the entire parse with `message` when invoked. Serves as the body
/// of forward references until they are patched.
pub fn error<T: 'static>(message: impl Into<String>) -> Parser<T> {
  let message = message.into();
  Parser::new(move |source| {
    Err(CompileError::at(
      source.text(),
      source.index,
      message.clone(),
    ))
  })
}

/// Always succeeds, yielding `Some` of the value or `None` on a miss.
pub fn maybe<T: Clone + 'static>(parser: Parser<T>) -> Parser<Option<T>> {
  parser.map(Some).or(constant(None))
}

/// Greedily apply `parser` until it misses; yields the accumulated list.
pub fn zero_or_more<T: 'static>(parser: Parser<T>) -> Parser<Vec<T>> {
  Parser::new(move |source| {
    let mut values = Vec::new();
    let mut cursor = source.clone();
    while let Some((value, next)) = parser.parse(&cursor)? {
      values.push(value);
      cursor = next;
    }
    Ok(Some((values, cursor)))
  })
}

/// Declare a parser before it is defined. The returned placeholder fails
/// with `message` until the handle's `define` patches the shared slot;
/// patching is one-shot at grammar-construction time.
pub fn forward<T: 'static>(message: &str) -> (Parser<T>, ForwardRef<T>) {
  let slot = Rc::new(RefCell::new(error(message)));
  let parser = {
    let slot = Rc::clone(&slot);
    Parser::new(move |source| {
      let inner = slot.borrow().clone();
      inner.parse(source)
    })
  };
  (parser, ForwardRef { slot })
}

/// Handle used to patch a forward-declared parser exactly once.
pub struct ForwardRef<T> {
  slot: Rc<RefCell<Parser<T>>>,
}

impl<T: 'static> ForwardRef<T> {
  pub fn define(self, parser: Parser<T>) {
    *self.slot.borrow_mut() = parser;
  }
}
