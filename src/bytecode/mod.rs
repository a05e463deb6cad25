/*!

  Instructions are variable length and decoded bytewise. An instruction is zero or more
  conditional prefix bytes, one opcode byte, then the operand:

    [Prefix:8]* [OpCode:8] [Operand:0..16]

  Prefixes occupy the range `0xE0..=0xEF`, which no opcode uses, so the decoder can tell them
  apart from the opcode without lookahead. The operand is either raw immediate bytes or a
  little-endian address whose width is the address width of the page it points into (one or two
  bytes, configured per page).

  The human readable form of the bytecode is assembly; see `assembly`.

*/

mod assembly;
mod instruction;

pub use assembly::{assemble, tokenize_line, Token};
pub use instruction::{
  is_conditional, Instruction, Opcode, Operand, Syscall, CONDITIONAL_FIRST, CONDITIONAL_LAST
};
