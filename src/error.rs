//! Errors for every layer of the machine: the module file codec, the addressing layer, the
//! processor, the host loop, and the assembler.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or unexpected section header or framing in a module file.
  #[error("format error: {0}")]
  Format(String),

  /// An address width other than 1 or 2, or an unusable configuration value.
  #[error("configuration error: {0}")]
  Config(String),

  /// A decoded address outside its region, or too few bytes left to decode one.
  #[error("address error: {0}")]
  Address(String),

  #[error("invalid opcode 0x{opcode:02X} at pc {pc}")]
  InvalidOpcode { opcode: u8, pc: usize },

  #[error("value stack underflow: needed {needed} byte(s), {available} available")]
  StackUnderflow { needed: usize, available: usize },

  #[error("value stack overflow: {0}")]
  StackOverflow(String),

  #[error("unknown kernel call `{0}`")]
  UnknownKernelCall(String),

  /// `step` was called on a processor that has already halted or faulted.
  #[error("processor is not running ({0})")]
  NotRunning(String),

  #[error("step limit of {0} instructions reached")]
  StepLimit(u64),

  #[error("start symbol `{0}` is not exported by the module")]
  StartSymbol(String),

  #[error("line {line}: {message}")]
  Assembly { line: usize, message: String },

  #[error("invalid UTF-8 text: {0}")]
  Utf8(#[from] std::string::FromUtf8Error),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl Error {
  pub(crate) fn format(message: impl Into<String>) -> Error {
    Error::Format(message.into())
  }

  pub(crate) fn address(message: impl Into<String>) -> Error {
    Error::Address(message.into())
  }

  pub(crate) fn assembly(line: usize, message: impl Into<String>) -> Error {
    Error::Assembly { line, message: message.into() }
  }
}
