//! Code generation: lower the AST into 32-bit ARM assembly text.
//!
//! The emitter keeps the most recently evaluated value in `r0` and spills
//! one operand of each binary operator with `push {r0, ip}` so the stack
//! stays 8-byte aligned. Locals live in the frame below `fp`; arrays live
//! on the heap behind `malloc` with their length in the first word.

use std::collections::HashMap;

use linked_hash_map::LinkedHashMap;

use crate::error::{CompileError, CompileResult};
use crate::parser::{Ast, BinaryOp};
use crate::ty::Type;

const MAX_CALL_ARGS: usize = 4;

/// Emit assembly for a whole program.
pub fn generate(ast: &Ast) -> CompileResult<String> {
  let mut generator = CodeGenerator::new();
  let mut frame = Frame::top_level();
  generator.emit(ast, &mut frame)?;
  Ok(generator.asm)
}

/// Per-function environment: local name to `fp`-relative offset, plus the
/// next free slot.
struct Frame {
  locals: HashMap<String, i32>,
  next_local_offset: i32,
}

impl Frame {
  fn top_level() -> Self {
    Self {
      locals: HashMap::new(),
      next_local_offset: 0,
    }
  }

  /// Argument registers are spilled right after the prologue, so parameter
  /// `i` sits at `4*i - 16` and locals start below the spill area.
  fn for_function(parameters: &LinkedHashMap<String, Type>) -> Self {
    let mut locals = HashMap::new();
    for (i, (name, _)) in parameters.iter().enumerate() {
      locals.insert(name.clone(), 4 * i as i32 - 16);
    }
    Self {
      locals,
      next_local_offset: -20,
    }
  }
}

/// Owns the append-only assembly sink and the label counter shared by all
/// control-flow constructs.
struct CodeGenerator {
  asm: String,
  label_count: usize,
}

impl CodeGenerator {
  fn new() -> Self {
    Self {
      asm: String::new(),
      label_count: 0,
    }
  }

  fn new_label(&mut self) -> String {
    let label = format!(".L{}", self.label_count);
    self.label_count += 1;
    label
  }

  fn emit(&mut self, node: &Ast, frame: &mut Frame) -> CompileResult<()> {
    match node {
      Ast::Number(value) => {
        self.asm.push_str(&format!("  ldr r0, ={value}\n"));
      }
      Ast::Boolean(value) => {
        self
          .asm
          .push_str(&format!("  mov r0, #{}\n", if *value { 1 } else { 0 }));
      }
      Ast::Undefined | Ast::Null => {
        self.asm.push_str("  mov r0, #0\n");
      }
      Ast::Not(operand) => {
        self.emit(operand, frame)?;
        self.asm.push_str("  cmp r0, #0\n");
        self.asm.push_str("  moveq r0, #1\n");
        self.asm.push_str("  movne r0, #0\n");
      }
      Ast::Binary { op, left, right } => self.emit_binary(*op, left, right, frame)?,
      Ast::Id(name) => {
        let Some(offset) = frame.locals.get(name) else {
          return Err(CompileError::emit(format!("undefined variable '{name}'")));
        };
        self.asm.push_str(&format!("  ldr r0, [fp, #{offset}]\n"));
      }
      Ast::Var { name, value, .. } => {
        self.emit(value, frame)?;
        self.asm.push_str("  push {r0, ip}\n");
        frame
          .locals
          .insert(name.clone(), frame.next_local_offset - 4);
        frame.next_local_offset -= 8;
      }
      Ast::Assign { name, value } => {
        self.emit(value, frame)?;
        let Some(offset) = frame.locals.get(name) else {
          return Err(CompileError::emit(format!(
            "assignment to undefined variable '{name}'"
          )));
        };
        self.asm.push_str(&format!("  str r0, [fp, #{offset}]\n"));
      }
      Ast::Block(statements) => {
        for statement in statements {
          self.emit(statement, frame)?;
        }
      }
      Ast::Return(value) => {
        self.emit(value, frame)?;
        self.asm.push_str("  mov sp, fp\n");
        self.asm.push_str("  pop {fp, pc}\n");
      }
      Ast::If {
        cond,
        consequence,
        alternative,
      } => {
        let false_label = self.new_label();
        let end_label = self.new_label();
        self.emit(cond, frame)?;
        self.asm.push_str("  cmp r0, #0\n");
        self.asm.push_str(&format!("  beq {false_label}\n"));
        self.emit(consequence, frame)?;
        self.asm.push_str(&format!("  b {end_label}\n"));
        self.asm.push_str(&format!("{false_label}:\n"));
        self.emit(alternative, frame)?;
        self.asm.push_str(&format!("{end_label}:\n"));
      }
      Ast::While { cond, body } => {
        let start_label = self.new_label();
        let end_label = self.new_label();
        self.asm.push_str(&format!("{start_label}:\n"));
        self.emit(cond, frame)?;
        self.asm.push_str("  cmp r0, #0\n");
        self.asm.push_str(&format!("  beq {end_label}\n"));
        self.emit(body, frame)?;
        self.asm.push_str(&format!("  b {start_label}\n"));
        self.asm.push_str(&format!("{end_label}:\n"));
      }
      Ast::For {
        init,
        cond,
        step,
        body,
      } => {
        self.emit(init, frame)?;
        let start_label = self.new_label();
        let end_label = self.new_label();
        self.asm.push_str(&format!("{start_label}:\n"));
        self.emit(cond, frame)?;
        self.asm.push_str("  cmp r0, #0\n");
        self.asm.push_str(&format!("  beq {end_label}\n"));
        self.emit(body, frame)?;
        self.emit(step, frame)?;
        self.asm.push_str(&format!("  b {start_label}\n"));
        self.asm.push_str(&format!("{end_label}:\n"));
      }
      Ast::Call { callee, args } => {
        if args.len() > MAX_CALL_ARGS {
          return Err(CompileError::emit(format!(
            "'{callee}' called with {} arguments, but at most {MAX_CALL_ARGS} are supported",
            args.len()
          )));
        }
        if args.is_empty() {
          self.asm.push_str(&format!("  bl {callee}\n"));
        } else if args.len() == 1 {
          self.emit(&args[0], frame)?;
          self.asm.push_str(&format!("  bl {callee}\n"));
        } else {
          // A 16-byte scratch block keeps evaluation order simple: store
          // each argument as it is produced, then pop all four registers.
          self.asm.push_str("  sub sp, sp, #16\n");
          for (i, arg) in args.iter().enumerate() {
            self.emit(arg, frame)?;
            self.asm.push_str(&format!("  str r0, [sp, #{}]\n", 4 * i));
          }
          self.asm.push_str("  pop {r0, r1, r2, r3}\n");
          self.asm.push_str(&format!("  bl {callee}\n"));
        }
      }
      Ast::Func {
        name,
        signature,
        body,
      } => {
        let Type::Function { parameters, .. } = signature else {
          return Err(CompileError::emit(format!(
            "'{name}' has a malformed signature"
          )));
        };
        if parameters.len() > MAX_CALL_ARGS {
          return Err(CompileError::emit(format!(
            "'{name}' declares {} parameters, but at most {MAX_CALL_ARGS} are supported",
            parameters.len()
          )));
        }
        self.asm.push('\n');
        self.asm.push_str(&format!(".global {name}\n"));
        self.asm.push_str(&format!("{name}:\n"));
        self.asm.push_str("  push {fp, lr}\n");
        self.asm.push_str("  mov fp, sp\n");
        self.asm.push_str("  push {r0, r1, r2, r3}\n");
        let mut inner = Frame::for_function(parameters);
        self.emit(body, &mut inner)?;
        self.asm.push_str("  mov sp, fp\n");
        self.asm.push_str("  mov r0, #0\n");
        self.asm.push_str("  pop {fp, pc}\n");
      }
      Ast::ArrayLiteral(elements) => {
        let length = elements.len();
        self.emit_array_header(length);
        for (i, element) in elements.iter().enumerate() {
          self.emit(element, frame)?;
          self
            .asm
            .push_str(&format!("  str r0, [r4, #{}]\n", 4 * (i + 1)));
        }
        self.emit_array_footer();
      }
      Ast::StringLiteral(text) => {
        // An array literal whose elements are character codes.
        self.emit_array_header(text.len());
        for (i, code) in text.bytes().enumerate() {
          self.asm.push_str(&format!("  ldr r0, ={code}\n"));
          self
            .asm
            .push_str(&format!("  str r0, [r4, #{}]\n", 4 * (i + 1)));
        }
        self.emit_array_footer();
      }
      Ast::ArrayLookup { array, index } => {
        self.emit(array, frame)?;
        self.asm.push_str("  push {r0, ip}\n");
        self.emit(index, frame)?;
        self.asm.push_str("  pop {r1, ip}\n");
        // Bounds check: out-of-range reads yield zero instead of trapping.
        self.asm.push_str("  ldr r2, [r1]\n");
        self.asm.push_str("  cmp r0, r2\n");
        self.asm.push_str("  movhs r0, #0\n");
        self.asm.push_str("  addlo r1, r1, #4\n");
        self.asm.push_str("  lsllo r0, r0, #2\n");
        self.asm.push_str("  ldrlo r0, [r1, r0]\n");
      }
      Ast::Length(array) => {
        self.emit(array, frame)?;
        self.asm.push_str("  ldr r0, [r0]\n");
      }
    }
    Ok(())
  }

  /// Operand order is uneven on purpose: `+` evaluates left first, the
  /// rest evaluate right first. Either way the popped operand lands in
  /// `r1` and the freshly computed one stays in `r0`.
  fn emit_binary(
    &mut self,
    op: BinaryOp,
    left: &Ast,
    right: &Ast,
    frame: &mut Frame,
  ) -> CompileResult<()> {
    match op {
      BinaryOp::Add => {
        self.emit(left, frame)?;
        self.asm.push_str("  push {r0, ip}\n");
        self.emit(right, frame)?;
        self.asm.push_str("  pop {r1, ip}\n");
        self.asm.push_str("  add r0, r0, r1\n");
      }
      BinaryOp::Sub => {
        self.emit_right_then_left(left, right, frame)?;
        self.asm.push_str("  sub r0, r0, r1\n");
      }
      BinaryOp::Mul => {
        self.emit_right_then_left(left, right, frame)?;
        self.asm.push_str("  mul r0, r0, r1\n");
      }
      BinaryOp::Div => {
        self.emit_right_then_left(left, right, frame)?;
        self.asm.push_str("  udiv r0, r0, r1\n");
      }
      BinaryOp::Eq => {
        self.emit_right_then_left(left, right, frame)?;
        self.asm.push_str("  cmp r0, r1\n");
        self.asm.push_str("  moveq r0, #1\n");
        self.asm.push_str("  movne r0, #0\n");
      }
      BinaryOp::Ne => {
        self.emit_right_then_left(left, right, frame)?;
        self.asm.push_str("  cmp r0, r1\n");
        self.asm.push_str("  movne r0, #1\n");
        self.asm.push_str("  moveq r0, #0\n");
      }
    }
    Ok(())
  }

  /// Evaluate the right operand, spill it, evaluate the left operand.
  /// Leaves left in `r0` and right in `r1`.
  fn emit_right_then_left(
    &mut self,
    left: &Ast,
    right: &Ast,
    frame: &mut Frame,
  ) -> CompileResult<()> {
    self.emit(right, frame)?;
    self.asm.push_str("  push {r0, ip}\n");
    self.emit(left, frame)?;
    self.asm.push_str("  pop {r1, ip}\n");
    Ok(())
  }

  /// Allocate `4 * (length + 1)` bytes, stash the pointer in `r4` (saved
  /// around the initialisation), and store the length word.
  fn emit_array_header(&mut self, length: usize) {
    self
      .asm
      .push_str(&format!("  ldr r0, ={}\n", 4 * (length + 1)));
    self.asm.push_str("  bl malloc\n");
    self.asm.push_str("  push {r4, ip}\n");
    self.asm.push_str("  mov r4, r0\n");
    self.asm.push_str(&format!("  ldr r0, ={length}\n"));
    self.asm.push_str("  str r0, [r4]\n");
  }

  fn emit_array_footer(&mut self) {
    self.asm.push_str("  mov r0, r4\n");
    self.asm.push_str("  pop {r4, ip}\n");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn emit_source(source: &str) -> String {
    let ast = crate::parser::parse(source).unwrap();
    crate::typecheck::check(&ast).unwrap();
    generate(&ast).unwrap()
  }

  #[test]
  fn functions_get_a_prologue_and_a_default_zero_epilogue() {
    let asm = emit_source("function main(){ putchar(65); }");
    assert!(asm.contains(".global main\n"));
    assert!(asm.contains("main:\n  push {fp, lr}\n  mov fp, sp\n  push {r0, r1, r2, r3}\n"));
    assert!(asm.ends_with("  mov sp, fp\n  mov r0, #0\n  pop {fp, pc}\n"));
  }

  #[test]
  fn addition_evaluates_left_first_and_the_rest_right_first() {
    let asm = emit_source("function main(){ return 2 + 3; }");
    assert!(asm.contains(
      "  ldr r0, =2\n  push {r0, ip}\n  ldr r0, =3\n  pop {r1, ip}\n  add r0, r0, r1\n"
    ));

    let asm = emit_source("function main(){ return 7 - 2; }");
    assert!(asm.contains(
      "  ldr r0, =2\n  push {r0, ip}\n  ldr r0, =7\n  pop {r1, ip}\n  sub r0, r0, r1\n"
    ));
  }

  #[test]
  fn division_is_unsigned() {
    let asm = emit_source("function main(){ return 6 / 2; }");
    assert!(asm.contains("  udiv r0, r0, r1\n"));
  }

  #[test]
  fn precedence_shows_up_in_emission_order() {
    let asm = emit_source("function main(){ return 2 + 3 * 4; }");
    let mul = asm.find("  mul r0, r0, r1\n").unwrap();
    let add = asm.find("  add r0, r0, r1\n").unwrap();
    assert!(mul < add);
  }

  #[test]
  fn equality_materialises_a_flag() {
    let asm = emit_source("function main(){ var b = 1 == 2; }");
    assert!(asm.contains("  cmp r0, r1\n  moveq r0, #1\n  movne r0, #0\n"));
    let asm = emit_source("function main(){ var b = 1 != 2; }");
    assert!(asm.contains("  cmp r0, r1\n  movne r0, #1\n  moveq r0, #0\n"));
  }

  #[test]
  fn explicit_returns_skip_the_default_zero() {
    let asm = emit_source("function main(){ return 1; }");
    assert!(asm.contains("  ldr r0, =1\n  mov sp, fp\n  pop {fp, pc}\n"));
  }

  #[test]
  fn if_branches_through_fresh_labels() {
    let asm = emit_source("function main(){ if (1) { putchar(65); } else { putchar(66); } }");
    assert!(asm.contains("  cmp r0, #0\n  beq .L0\n"));
    assert!(asm.contains("  b .L1\n.L0:\n"));
    assert!(asm.contains(".L1:\n"));
  }

  #[test]
  fn while_loops_test_at_the_top() {
    let asm = emit_source("function main(){ while (0) { putchar(65); } }");
    assert!(asm.contains(".L0:\n  ldr r0, =0\n  cmp r0, #0\n  beq .L1\n"));
    assert!(asm.contains("  b .L0\n.L1:\n"));
  }

  #[test]
  fn labels_are_unique_across_constructs() {
    let asm = emit_source(
      "function main(){ while (0) { putchar(65); } while (0) { putchar(66); } }",
    );
    assert!(asm.contains(".L0:\n"));
    assert!(asm.contains(".L2:\n"));
    assert_eq!(asm.matches(".L0:\n").count(), 1);
  }

  #[test]
  fn parameters_are_addressed_from_the_spill_area() {
    let asm = emit_source("function f(a, b){ return b; } function main(){ return f(1, 2); }");
    assert!(asm.contains("  ldr r0, [fp, #-12]\n"));
  }

  #[test]
  fn locals_descend_from_the_first_slot_below_the_spill_area() {
    let asm = emit_source("function main(){ var x = 1; var y = 2; return y; }");
    assert!(asm.contains("  ldr r0, [fp, #-32]\n"));
  }

  #[test]
  fn assignment_stores_back_into_the_slot() {
    let asm = emit_source("function main(){ var x = 1; x = 2; }");
    assert!(asm.contains("  str r0, [fp, #-24]\n"));
  }

  #[test]
  fn multi_argument_calls_stage_through_a_scratch_block() {
    let source = "function f(a, b){ return a; } function main(){ return f(1, 2); }";
    let asm = emit_source(source);
    assert!(asm.contains("  sub sp, sp, #16\n"));
    assert!(asm.contains("  str r0, [sp, #0]\n"));
    assert!(asm.contains("  str r0, [sp, #4]\n"));
    assert!(asm.contains("  pop {r0, r1, r2, r3}\n  bl f\n"));
  }

  #[test]
  fn single_argument_calls_go_straight_through_r0() {
    let asm = emit_source("function main(){ putchar(65); }");
    assert!(asm.contains("  ldr r0, =65\n  bl putchar\n"));
    assert!(!asm.contains("  sub sp, sp, #16\n"));
  }

  #[test]
  fn too_many_arguments_fail_at_emit_time() {
    let err = generate(&Ast::call(
      "f",
      vec![
        Ast::Number(1),
        Ast::Number(2),
        Ast::Number(3),
        Ast::Number(4),
        Ast::Number(5),
      ],
    ))
    .unwrap_err();
    assert!(err.to_string().contains("at most 4"));
  }

  #[test]
  fn too_many_parameters_fail_at_emit_time() {
    let mut parameters = LinkedHashMap::new();
    for name in ["a", "b", "c", "d", "e"] {
      parameters.insert(name.to_string(), Type::Number);
    }
    let func = Ast::func(
      "f",
      Type::function(parameters, Type::Number),
      Ast::Block(Vec::new()),
    );
    let err = generate(&func).unwrap_err();
    assert!(err.to_string().contains("at most 4"));
  }

  #[test]
  fn undefined_variables_fail_at_emit_time() {
    let err = generate(&Ast::id("ghost")).unwrap_err();
    assert!(err.to_string().contains("undefined variable 'ghost'"));
  }

  #[test]
  fn array_literals_allocate_and_store_the_length_first() {
    let asm = emit_source("function main(){ var a = [7, 8, 9]; return a[1]; }");
    assert!(asm.contains("  ldr r0, =16\n  bl malloc\n"));
    assert!(asm.contains("  push {r4, ip}\n  mov r4, r0\n  ldr r0, =3\n  str r0, [r4]\n"));
    assert!(asm.contains("  str r0, [r4, #4]\n"));
    assert!(asm.contains("  str r0, [r4, #12]\n"));
    assert!(asm.contains("  mov r0, r4\n  pop {r4, ip}\n"));
  }

  #[test]
  fn lookups_bounds_check_and_yield_zero_out_of_range() {
    let asm = emit_source("function main(){ var a = [1]; return a[7]; }");
    assert!(asm.contains(
      "  ldr r2, [r1]\n  cmp r0, r2\n  movhs r0, #0\n  addlo r1, r1, #4\n  lsllo r0, r0, #2\n  ldrlo r0, [r1, r0]\n"
    ));
  }

  #[test]
  fn string_literals_lower_to_character_code_arrays() {
    let asm = emit_source("function main(){ var s = \"hi\"; putchar(s[0]); }");
    assert!(asm.contains("  ldr r0, =12\n  bl malloc\n"));
    assert!(asm.contains("  ldr r0, =2\n  str r0, [r4]\n"));
    assert!(asm.contains("  ldr r0, =104\n  str r0, [r4, #4]\n"));
    assert!(asm.contains("  ldr r0, =105\n  str r0, [r4, #8]\n"));
  }

  #[test]
  fn length_reads_the_first_word() {
    let asm = emit_source("function main(){ var a = [1, 2]; return length(a); }");
    assert!(asm.contains("  ldr r0, [fp, #-24]\n  ldr r0, [r0]\n"));
  }

  #[test]
  fn undefined_and_null_emit_zero() {
    let asm = emit_source("function main(){ var u = undefined; var n = null; }");
    assert_eq!(asm.matches("  mov r0, #0\n").count(), 3);
  }
}
