//! Conditional prefixes: bytes in `0xE0..=0xEF` that precede an opcode.

use std::fmt::{Display, Formatter};

use crate::bytecode::is_conditional;

/**
  The prefixes read in front of one instruction, in the order they appear in the code page. An
  empty sequence means the instruction is unconditional.

  No instruction sets processor flags yet, so prefixes are decoded and carried but do not gate
  execution; see `Processor::admits`.
*/
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Conditionals {
  prefixes: Vec<u8>
}

impl Conditionals {
  pub fn new() -> Conditionals {
    Conditionals::default()
  }

  /// Returns `false`, and leaves `self` unchanged, if `byte` is not a prefix.
  pub fn push(&mut self, byte: u8) -> bool {
    if is_conditional(byte) {
      self.prefixes.push(byte);
      true
    } else {
      false
    }
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.prefixes
  }

  pub fn len(&self) -> usize {
    self.prefixes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.prefixes.is_empty()
  }
}

impl Display for Conditionals {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}",
      self.prefixes
          .iter()
          .map(|p| format!("?{:02X}", p))
          .collect::<Vec<String>>()
          .join(" ")
    )
  }
}
