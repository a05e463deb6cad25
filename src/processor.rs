//! The fetch-decode-execute engine.

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use prettytable::{format as TableFormat, Table};
use tracing::{trace, warn};

use crate::address::{Address, AddressNumberType};
use crate::bytecode::{Instruction, Opcode, Syscall};
use crate::conditionals::Conditionals;
use crate::error::{Error, Result};
use crate::module::Module;
use crate::stack::ValueStack;

/// The kind of error that stopped a processor.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Fault {
  Address,
  InvalidOpcode(u8),
  StackUnderflow,
  StackOverflow,
  /// A kernel call named a function the kernel doesn't provide.
  KernelCall,
  Other
}

impl Fault {
  fn of(error: &Error) -> Fault {
    match error {
      Error::Address(_)                  => Fault::Address,
      Error::InvalidOpcode { opcode, .. } => Fault::InvalidOpcode(*opcode),
      Error::StackUnderflow { .. }       => Fault::StackUnderflow,
      Error::StackOverflow(_)            => Fault::StackOverflow,
      Error::UnknownKernelCall(_)        => Fault::KernelCall,
      _                                  => Fault::Other
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum State {
  Running,
  Halted,
  Faulted(Fault)
}

impl Display for State {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      State::Running                             => write!(f, "running"),
      State::Halted                              => write!(f, "halted"),
      State::Faulted(Fault::InvalidOpcode(code)) => write!(f, "faulted: invalid opcode 0x{:02X}", code),
      State::Faulted(fault)                      => write!(f, "faulted: {:?}", fault),
    }
  }
}

/**
  One processor runs one module. The processor only borrows the module for the length of a
  step, so any number of processors can share a module image.

  Each step:

    1. collects the conditional prefixes at the program counter,
    2. fetches and decodes the opcode that follows them,
    3. reads the operand through the code page's addressing modes,
    4. performs the side effect on the value stack, or hands a syscall back to the caller,
    5. moves the program counter past the instruction, or to a jump target.

  Any error faults the processor and is returned to the caller; a faulted or halted processor
  refuses further steps.
*/
#[derive(Clone, Debug)]
pub struct Processor {
  pc    :  Address,
  state :  State,
  steps :  u64,
  last  :  Option<(Address, Instruction)>
}

impl Processor {

  // region Display methods

  fn make_stack_table(stack: &ValueStack) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Slot", ubl->"Contents"]);

    let top = stack.len().saturating_sub(1);
    for (i, byte) in stack.as_slice().iter().enumerate().rev() {
      let shown = match byte.is_ascii_graphic() {
        true  => format!("0x{:02X} '{}'", byte, *byte as char),
        false => format!("0x{:02X}", byte)
      };
      match i == top {

        true  => {
          table.add_row(row![r->format!("* --> S[{}] =", i), shown]);
        }

        false => {
          table.add_row(row![r->format!("S[{}] =", i), shown]);
        }

      } // end match on top
    } // end for
    table
  }

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    let last = match &self.last {
      Some((at, instruction)) => format!("{}: {}", at, instruction),
      None                    => "-".to_string()
    };
    table.add_row(row![r->"PC =", self.pc]);
    table.add_row(row![r->"State =", self.state]);
    table.add_row(row![r->"Steps =", self.steps]);
    table.add_row(row![r->"Last =", last]);
    table
  }

  /// The processor registers beside the value stack, for tracing.
  pub fn state_table(&self, stack: &ValueStack) -> Table {
    let p_table = self.make_register_table();
    let s_table = Processor::make_stack_table(stack);

    let mut combined_table = table!([p_table, s_table]);

    combined_table.set_titles(row![ub->"Processor", ub->"Value Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);
    combined_table
  }

  // endregion

  pub fn new(module: &Module, start: AddressNumberType) -> Result<Processor> {
    Ok(Processor {
      pc    :  module.code().program_counter(start)?,
      state :  State::Running,
      steps :  0,
      last  :  None
    })
  }

  pub fn pc(&self) -> Address {
    self.pc
  }

  pub fn state(&self) -> State {
    self.state
  }

  pub fn steps(&self) -> u64 {
    self.steps
  }

  /// The most recently executed instruction and where it started, prefixes included.
  pub fn last_instruction(&self) -> Option<&(Address, Instruction)> {
    self.last.as_ref()
  }

  /**
    Executes one instruction. Returns the syscall the instruction raised, if any; the caller is
    expected to service it before stepping again.
  */
  pub fn step(&mut self, module: &Module, stack: &mut ValueStack) -> Result<Option<Syscall>> {
    if self.state != State::Running {
      return Err(Error::NotRunning(self.state.to_string()));
    }

    let result = self.execute(module, stack);
    if let Err(error) = &result {
      self.fault(error);
    }

    #[cfg(feature = "trace_computation")]
    trace!("\n{}", self.state_table(stack));

    result
  }

  /**
    Stops the processor because of `error`. The host calls this when servicing a syscall the
    processor raised fails, so that a fatal kernel call can't be stepped past.
  */
  pub fn fault(&mut self, error: &Error) {
    self.state = State::Faulted(Fault::of(error));
    warn!(pc = %self.pc, %error, "processor faulted");
  }

  /**
    Reserved gate for conditional execution. No instruction sets flags for the prefixes to test,
    so every instruction is admitted.
  */
  fn admits(&self, _conditionals: &Conditionals) -> bool {
    true
  }

  fn execute(&mut self, module: &Module, stack: &mut ValueStack) -> Result<Option<Syscall>> {
    let code = module.code();
    let data = module.data();

    let (conditionals, at) = code.get_conditionals(&self.pc)?;
    let byte   = code.opcode(&at)?;
    let opcode = Opcode::try_from(byte).map_err(|_| {
      Error::InvalidOpcode { opcode: byte, pc: at.idx() }
    })?;

    let length  = opcode.len(code.width(), data.width());
    let mut next = at.increment(length)?;
    let operand  = code.contents()[at.idx() + 1 .. at.idx() + length].to_vec();

    trace!(pc = %self.pc, instruction = %opcode, prefixes = %conditionals, "execute");
    let instruction = Instruction {
      prefixes: conditionals.as_slice().to_vec(),
      opcode,
      operand
    };

    if !self.admits(&conditionals) {
      self.retire(instruction, next);
      return Ok(None);
    }

    let mut syscall = None;
    match opcode {

      Opcode::Exit => {
        self.state = State::Halted;
        syscall = Some(Syscall::Halt);
      }

      Opcode::OutByte    => syscall = Some(Syscall::Out),

      Opcode::KernelCall => syscall = Some(Syscall::KernelCall),

      Opcode::Jump => {
        next = code.jump_address(&at)?.rebound(code.len() + 1)?;
      }

      Opcode::PushByte => {
        stack.push_byte(code.immediate_byte(&at)?)?;
      }

      Opcode::PushWord => {
        let [low, high] = code.immediate_int(&at)?;
        stack.push_byte(low)?;
        stack.push_byte(high)?;
      }

      Opcode::PushDirect => {
        stack.push_byte(code.direct_byte(&at, data)?)?;
      }

      Opcode::PushIndirect => {
        stack.push_byte(code.indirect_byte(&at, data)?)?;
      }

      Opcode::PushString => {
        let address = code.direct_address(&at, data)?;
        stack.push_string(&data.string_at(&address)?)?;
      }

      Opcode::PopByte => {
        stack.pop_byte()?;
      }

    }

    self.retire(instruction, next);
    Ok(syscall)
  }

  /// Counts an instruction that ran to completion and moves past it. A faulting instruction is
  /// never retired, so `steps` and `last` only ever describe completed instructions.
  fn retire(&mut self, instruction: Instruction, next: Address) {
    self.last   = Some((self.pc, instruction));
    self.steps += 1;
    self.pc     = next;
  }

}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Processor {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.make_register_table())
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::page::{CodePage, DataPage};
  use crate::table::TextTable;

  fn module(code: &[u8], data: &[u8]) -> Module {
    Module::new(
      TextTable::new(),
      TextTable::new(),
      CodePage::new(TextTable::new(), code.to_vec()).unwrap(),
      DataPage::new(TextTable::new(), data.to_vec()).unwrap()
    )
  }

  /// Steps until halt, collecting syscalls and servicing `Out` by popping the byte.
  fn run(module: &Module, stack: &mut ValueStack) -> Result<(Processor, Vec<u8>)> {
    let mut processor = Processor::new(module, 0)?;
    let mut output = Vec::new();
    loop {
      match processor.step(module, stack)? {
        Some(Syscall::Halt) => return Ok((processor, output)),
        Some(Syscall::Out)  => output.push(stack.pop_byte()?),
        _                   => {}
      }
    }
  }

  #[test]
  fn push_out_exit() {
    let module = module(&[0x40, 0x41, 0x13, 0x00], &[]);
    let mut stack = ValueStack::default();
    let (processor, output) = run(&module, &mut stack).unwrap();
    assert_eq!(output, b"A");
    assert_eq!(processor.pc().idx(), 4);
    assert_eq!(processor.state(), State::Halted);
    assert_eq!(processor.steps(), 3);
    assert!(stack.is_empty());
  }

  #[test]
  fn invalid_opcode_faults() {
    let module = module(&[0xFF], &[]);
    let mut stack = ValueStack::default();
    let mut processor = Processor::new(&module, 0).unwrap();
    match processor.step(&module, &mut stack) {
      Err(Error::InvalidOpcode { opcode: 0xFF, pc: 0 }) => {}
      other => panic!("unexpected result: {:?}", other)
    }
    assert_eq!(processor.state(), State::Faulted(Fault::InvalidOpcode(0xFF)));
    assert!(matches!(processor.step(&module, &mut stack), Err(Error::NotRunning(_))));
  }

  #[test]
  fn halted_processor_refuses_to_step() {
    let module = module(&[0x00], &[]);
    let mut stack = ValueStack::default();
    let mut processor = Processor::new(&module, 0).unwrap();
    assert_eq!(processor.step(&module, &mut stack).unwrap(), Some(Syscall::Halt));
    assert!(matches!(processor.step(&module, &mut stack), Err(Error::NotRunning(_))));
  }

  #[test]
  fn prefixes_are_skipped_and_counted() {
    let module = module(&[0xE5, 0xE2, 0x40, 0x07, 0x00], &[]);
    let mut stack = ValueStack::default();
    let mut processor = Processor::new(&module, 0).unwrap();
    assert_eq!(processor.step(&module, &mut stack).unwrap(), None);
    assert_eq!(processor.pc().idx(), 4);
    assert_eq!(stack.as_slice(), &[0x07]);
    let (at, instruction) = processor.last_instruction().unwrap();
    assert_eq!(at.idx(), 0);
    assert_eq!(instruction.prefixes, vec![0xE5, 0xE2]);
    assert_eq!(instruction.opcode, Opcode::PushByte);
  }

  #[test]
  fn pop_discards() {
    let module = module(&[0x40, 0x01, 0x40, 0x02, 0x51, 0x00], &[]);
    let mut stack = ValueStack::default();
    run(&module, &mut stack).unwrap();
    assert_eq!(stack.as_slice(), &[0x01]);
  }

  #[test]
  fn pop_on_empty_stack_faults() {
    let module = module(&[0x51, 0x00], &[]);
    let mut stack = ValueStack::default();
    let mut processor = Processor::new(&module, 0).unwrap();
    assert!(matches!(processor.step(&module, &mut stack), Err(Error::StackUnderflow { .. })));
    assert_eq!(processor.state(), State::Faulted(Fault::StackUnderflow));
    assert_eq!(processor.pc().idx(), 0);
    assert_eq!(processor.steps(), 0);
    assert!(processor.last_instruction().is_none());
  }

  #[test]
  fn only_completed_instructions_are_counted() {
    // PUSH.B 1, POP.B, POP.B
    let module = module(&[0x40, 0x01, 0x51, 0x51], &[]);
    let mut stack = ValueStack::default();
    let mut processor = Processor::new(&module, 0).unwrap();
    processor.step(&module, &mut stack).unwrap();
    processor.step(&module, &mut stack).unwrap();
    assert!(processor.step(&module, &mut stack).is_err());
    assert_eq!(processor.steps(), 2);
    assert_eq!(processor.pc().idx(), 3);
    let (at, instruction) = processor.last_instruction().unwrap();
    assert_eq!(at.idx(), 2);
    assert_eq!(instruction.opcode, Opcode::PopByte);
  }

  #[test]
  fn host_can_fault_a_running_processor() {
    let module = module(&[0x13, 0x00], &[]);
    let mut stack = ValueStack::default();
    let mut processor = Processor::new(&module, 0).unwrap();
    assert_eq!(processor.step(&module, &mut stack).unwrap(), Some(Syscall::Out));
    processor.fault(&Error::UnknownKernelCall("beep".to_string()));
    assert_eq!(processor.state(), State::Faulted(Fault::KernelCall));
    assert!(matches!(processor.step(&module, &mut stack), Err(Error::NotRunning(_))));
  }

  #[test]
  fn push_past_capacity_faults() {
    let module = module(&[0x40, 0x01, 0x40, 0x02, 0x00], &[]);
    let mut stack = ValueStack::new(1);
    let mut processor = Processor::new(&module, 0).unwrap();
    processor.step(&module, &mut stack).unwrap();
    assert!(matches!(processor.step(&module, &mut stack), Err(Error::StackOverflow(_))));
    assert_eq!(processor.state(), State::Faulted(Fault::StackOverflow));
  }

  #[test]
  fn addressing_modes() {
    // PUSH.D 1, PUSH.I 0, PUSH.W 0x1234, EXIT
    let module = module(&[0x41, 0x01, 0x42, 0x00, 0x44, 0x34, 0x12, 0x00], &[0x01, 0x99]);
    let mut stack = ValueStack::default();
    run(&module, &mut stack).unwrap();
    assert_eq!(stack.as_slice(), &[0x99, 0x99, 0x34, 0x12]);
  }

  #[test]
  fn push_string_from_data() {
    let module = module(&[0x43, 0x02, 0x00], b"x\0out_s\0");
    let mut stack = ValueStack::default();
    run(&module, &mut stack).unwrap();
    assert_eq!(stack.pop_string().unwrap(), "out_s");
  }

  #[test]
  fn jump() {
    // JMP 4, PUSH.B 1, PUSH.B 2, EXIT
    let module = module(&[0x20, 0x04, 0x40, 0x01, 0x40, 0x02, 0x00], &[]);
    let mut stack = ValueStack::default();
    let (processor, _) = run(&module, &mut stack).unwrap();
    assert_eq!(stack.as_slice(), &[0x02]);
    assert_eq!(processor.steps(), 3);
  }

  #[test]
  fn jump_outside_code_faults() {
    let module = module(&[0x20, 0x09], &[]);
    let mut stack = ValueStack::default();
    let mut processor = Processor::new(&module, 0).unwrap();
    assert!(matches!(processor.step(&module, &mut stack), Err(Error::Address(_))));
    assert_eq!(processor.state(), State::Faulted(Fault::Address));
  }

  #[test]
  fn truncated_operand_faults_without_side_effects() {
    let module = module(&[0x40], &[]);
    let mut stack = ValueStack::default();
    let mut processor = Processor::new(&module, 0).unwrap();
    assert!(matches!(processor.step(&module, &mut stack), Err(Error::Address(_))));
    assert!(stack.is_empty());
  }

  #[test]
  fn running_off_the_end_faults() {
    let module = module(&[0x40, 0x01], &[]);
    let mut stack = ValueStack::default();
    let mut processor = Processor::new(&module, 0).unwrap();
    processor.step(&module, &mut stack).unwrap();
    assert!(matches!(processor.step(&module, &mut stack), Err(Error::Address(_))));
  }

  #[test]
  fn start_outside_code_is_rejected() {
    let module = module(&[0x00], &[]);
    assert!(matches!(Processor::new(&module, 5), Err(Error::Address(_))));
  }

  #[test]
  fn state_table_renders() {
    let module = module(&[0x40, 0x41, 0x00], &[]);
    let mut stack = ValueStack::default();
    let mut processor = Processor::new(&module, 0).unwrap();
    processor.step(&module, &mut stack).unwrap();
    let rendered = processor.state_table(&stack).to_string();
    assert!(rendered.contains("PUSH.B 65"));
    assert!(rendered.contains("'A'"));
  }
}
