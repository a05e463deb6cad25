
use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::address::AddressWidth;

/// First and last byte values reserved for conditional prefixes. No opcode may fall in this range.
pub const CONDITIONAL_FIRST: u8 = 0xE0;
pub const CONDITIONAL_LAST : u8 = 0xEF;

pub fn is_conditional(byte: u8) -> bool {
  (CONDITIONAL_FIRST..=CONDITIONAL_LAST).contains(&byte)
}

/**
  Opcodes of the virtual processor. The discriminant is the byte in the instruction stream and
  the strum serialization is the assembly mnemonic, so `Opcode::from_str("PUSH.B")` and
  `Opcode::try_from(0x40)` name the same instruction.

  The mnemonic suffix gives the operand's addressing mode: `.B` a byte (immediate or taken from
  the stack), `.W` a two byte immediate, `.D` a direct data address, `.I` an indirect one.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,           Hash
)]
#[repr(u8)]
pub enum Opcode {
  #[strum(serialize = "EXIT")]    Exit        = 0x00,  // exit
  #[strum(serialize = "OUT.B")]   OutByte     = 0x13,  // out.b
  #[strum(serialize = "KCALL")]   KernelCall  = 0x14,  // kcall
  #[strum(serialize = "JMP")]     Jump        = 0x20,  // jmp( code address )
  #[strum(serialize = "PUSH.B")]  PushByte    = 0x40,  // push.b( byte )
  #[strum(serialize = "PUSH.D")]  PushDirect  = 0x41,  // push.d( data address )
  #[strum(serialize = "PUSH.I")]  PushIndirect = 0x42, // push.i( data address )
  #[strum(serialize = "PUSHS.D")] PushString  = 0x43,  // pushs.d( data address )
  #[strum(serialize = "PUSH.W")]  PushWord    = 0x44,  // push.w( word )
  #[strum(serialize = "POP.B")]   PopByte     = 0x51,  // pop.b
}

/// The kind of operand that follows an opcode in the instruction stream.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Operand {
  None,
  /// One raw byte.
  ImmediateByte,
  /// Two raw bytes, low byte first.
  ImmediateInt,
  /// An address into the code page, in the code address width.
  CodeAddress,
  /// An address into the data page, in the data address width.
  DataAddress,
}

impl Opcode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn mnemonic(&self) -> &'static str {
    self.into()
  }

  pub fn operand(&self) -> Operand {
    match self {
      | Opcode::Exit
      | Opcode::OutByte
      | Opcode::KernelCall
      | Opcode::PopByte      => Operand::None,

      Opcode::PushByte       => Operand::ImmediateByte,
      Opcode::PushWord       => Operand::ImmediateInt,
      Opcode::Jump           => Operand::CodeAddress,

      | Opcode::PushDirect
      | Opcode::PushIndirect
      | Opcode::PushString   => Operand::DataAddress,
    }
  }

  /// Number of operand bytes following the opcode byte.
  pub fn operand_len(&self, code_width: AddressWidth, data_width: AddressWidth) -> usize {
    match self.operand() {
      Operand::None          => 0,
      Operand::ImmediateByte => 1,
      Operand::ImmediateInt  => 2,
      Operand::CodeAddress   => code_width.bytes(),
      Operand::DataAddress   => data_width.bytes(),
    }
  }

  /// Length of the instruction in bytes, opcode included, prefixes excluded.
  pub fn len(&self, code_width: AddressWidth, data_width: AddressWidth) -> usize {
    1 + self.operand_len(code_width, data_width)
  }
}


/// Codes the processor hands back to its host when an instruction needs the outside world.
#[derive(
  StrumDisplay, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,             Eq, PartialEq, Debug, Hash
)]
#[repr(u8)]
pub enum Syscall {
  #[strum(serialize = "halt")]   Halt       = 0x04,
  /// Pop a function name off the value stack and dispatch it to the kernel.
  #[strum(serialize = "kernel")] KernelCall = 0x05,
  /// Pop one byte off the value stack and write it out.
  #[strum(serialize = "out")]    Out        = 0x08,
}

impl Syscall {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }
}


/// A decoded instruction, used for tracing and disassembly.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Instruction {
  pub prefixes : Vec<u8>,
  pub opcode   : Opcode,
  pub operand  : Vec<u8>
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for prefix in &self.prefixes {
      write!(f, "?{:02X} ", prefix)?;
    }
    write!(f, "{}", self.opcode)?;
    match self.opcode.operand() {
      Operand::None => Ok(()),
      Operand::ImmediateByte | Operand::ImmediateInt => {
        let value = self.operand
                        .iter()
                        .enumerate()
                        .fold(0usize, |acc, (i, b)| acc | ((*b as usize) << (8 * i)));
        write!(f, " {}", value)
      }
      Operand::CodeAddress | Operand::DataAddress => {
        write!(f, " 0x")?;
        for byte in self.operand.iter().rev() {
          write!(f, "{:02X}", byte)?;
        }
        Ok(())
      }
    }
  }
}
