/*!
  The value stack carries arguments from a program to the kernel calls its host provides. It is
  separate from any operand storage an instruction might use.

  Strings are framed length-last: the UTF-8 bytes are pushed in order and then a single length
  byte, so the length is always on top when a string is popped. Strings longer than 255 bytes
  can't be framed and are refused.

  Every operation either completes or leaves the stack untouched.
*/

use std::fmt::{Display, Formatter};

use crate::error::{Error, Result};

pub const DEFAULT_STACK_CAPACITY: usize = 256;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ValueStack {
  bytes    : Vec<u8>,
  capacity : usize
}

impl Default for ValueStack {
  fn default() -> ValueStack {
    ValueStack::new(DEFAULT_STACK_CAPACITY)
  }
}

impl ValueStack {

  pub fn new(capacity: usize) -> ValueStack {
    ValueStack { bytes: Vec::with_capacity(capacity), capacity }
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Contents from the bottom of the stack to the top.
  pub fn as_slice(&self) -> &[u8] {
    &self.bytes
  }

  pub fn clear(&mut self) {
    self.bytes.clear();
  }

  fn require_room(&self, needed: usize) -> Result<()> {
    if self.bytes.len() + needed > self.capacity {
      return Err(Error::StackOverflow(format!(
        "{} byte(s) pushed onto {} of {}", needed, self.bytes.len(), self.capacity
      )));
    }
    Ok(())
  }

  fn require_depth(&self, needed: usize) -> Result<()> {
    if needed > self.bytes.len() {
      return Err(Error::StackUnderflow { needed, available: self.bytes.len() });
    }
    Ok(())
  }

  pub fn push_byte(&mut self, byte: u8) -> Result<()> {
    self.require_room(1)?;
    self.bytes.push(byte);
    Ok(())
  }

  pub fn pop_byte(&mut self) -> Result<u8> {
    self.require_depth(1)?;
    // Checked above.
    Ok(self.bytes.pop().unwrap_or_default())
  }

  /// Pops `n` bytes, returned in the order they were pushed.
  pub fn pop_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
    self.require_depth(n)?;
    let start = self.bytes.len() - n;
    Ok(self.bytes.split_off(start))
  }

  pub fn push_string(&mut self, text: &str) -> Result<()> {
    let length = text.len();
    if length > u8::MAX as usize {
      return Err(Error::StackOverflow(format!(
        "a string of {} bytes is longer than the 255 a frame can hold", length
      )));
    }
    self.require_room(length + 1)?;
    self.bytes.extend_from_slice(text.as_bytes());
    self.bytes.push(length as u8);
    Ok(())
  }

  pub fn pop_string(&mut self) -> Result<String> {
    self.require_depth(1)?;
    let length = self.bytes[self.bytes.len() - 1] as usize;
    self.require_depth(length + 1)?;

    let end   = self.bytes.len() - 1;
    let start = end - length;
    let text  = String::from_utf8(self.bytes[start..end].to_vec())?;
    self.bytes.truncate(start);
    Ok(text)
  }

}

impl Display for ValueStack {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "[{}]",
      self.bytes
          .iter()
          .map(|b| format!("{:02X}", b))
          .collect::<Vec<String>>()
          .join(" ")
    )
  }
}
