/*!
  The host loop. A `Runner` owns the value stack and a `Kernel`, starts a processor at an
  exported symbol, and services the syscalls the processor raises until it halts.
*/

use std::io::Write;

use tracing::{debug, trace};

use crate::address::{Address, AddressNumberType};
use crate::bytecode::Syscall;
use crate::error::{Error, Result};
use crate::module::Module;
use crate::processor::Processor;
use crate::stack::{ValueStack, DEFAULT_STACK_CAPACITY};

/// Host services reachable from a program through syscalls.
pub trait Kernel {
  /// Syscall `0x08`: write one byte.
  fn out(&mut self, byte: u8) -> Result<()>;

  /**
    Syscall `0x05`: the function name has already been popped off `stack`; the function pops
    whatever arguments it takes. An unknown name is an `Error::UnknownKernelCall`.
  */
  fn call(&mut self, name: &str, stack: &mut ValueStack) -> Result<()>;
}

/**
  A kernel that writes program output to any `Write`. Provides

    out_b   pop one byte and write it
    out_s   pop a string and write it
*/
pub struct ConsoleKernel<W: Write> {
  writer: W
}

impl<W: Write> ConsoleKernel<W> {
  pub fn new(writer: W) -> ConsoleKernel<W> {
    ConsoleKernel { writer }
  }

  pub fn writer(&self) -> &W {
    &self.writer
  }

  pub fn into_inner(self) -> W {
    self.writer
  }
}

impl<W: Write> Kernel for ConsoleKernel<W> {
  fn out(&mut self, byte: u8) -> Result<()> {
    self.writer.write_all(&[byte])?;
    Ok(())
  }

  fn call(&mut self, name: &str, stack: &mut ValueStack) -> Result<()> {
    match name {
      "out_b" => {
        let byte = stack.pop_byte()?;
        self.out(byte)
      }
      "out_s" => {
        let text = stack.pop_string()?;
        self.writer.write_all(text.as_bytes())?;
        Ok(())
      }
      _ => Err(Error::UnknownKernelCall(name.to_string()))
    }
  }
}


#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct RunConfig {
  pub stack_capacity :  usize,
  /// Stop with `Error::StepLimit` after this many instructions.
  pub step_limit     :  Option<u64>
}

impl Default for RunConfig {
  fn default() -> RunConfig {
    RunConfig {
      stack_capacity :  DEFAULT_STACK_CAPACITY,
      step_limit     :  None
    }
  }
}

/// Where and when a run halted.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Outcome {
  pub pc    : Address,
  pub steps : u64
}

pub struct Runner<K: Kernel> {
  config :  RunConfig,
  stack  :  ValueStack,
  kernel :  K
}

impl<K: Kernel> Runner<K> {

  pub fn new(kernel: K, config: RunConfig) -> Runner<K> {
    Runner {
      config,
      stack: ValueStack::new(config.stack_capacity),
      kernel
    }
  }

  pub fn stack(&self) -> &ValueStack {
    &self.stack
  }

  pub fn kernel(&self) -> &K {
    &self.kernel
  }

  pub fn into_kernel(self) -> K {
    self.kernel
  }

  /// The code offset named by `symbol`, or the start of the code page when there is none.
  pub fn resolve_start(module: &Module, symbol: Option<&str>) -> Result<AddressNumberType> {
    match symbol {
      None         => Ok(0),
      Some(symbol) => module.export(symbol)?.ok_or_else(|| Error::StartSymbol(symbol.to_string()))
    }
  }

  /// A processor positioned at `symbol`, with an empty value stack.
  pub fn start(&mut self, module: &Module, symbol: Option<&str>) -> Result<Processor> {
    let entry = Runner::<K>::resolve_start(module, symbol)?;
    self.stack.clear();
    let processor = Processor::new(module, entry)?;
    debug!(entry = %processor.pc(), symbol = symbol.unwrap_or("-"), "starting processor");
    Ok(processor)
  }

  /**
    Executes one instruction and services its syscall. Returns the outcome once the processor
    halts and `None` while it is still running.
  */
  pub fn step(&mut self, module: &Module, processor: &mut Processor) -> Result<Option<Outcome>> {
    if let Some(limit) = self.config.step_limit {
      if processor.steps() >= limit {
        return Err(Error::StepLimit(limit));
      }
    }

    let syscall = match processor.step(module, &mut self.stack)? {
      None          => return Ok(None),
      Some(syscall) => syscall
    };

    if syscall == Syscall::Halt {
      let outcome = Outcome { pc: processor.pc(), steps: processor.steps() };
      debug!(pc = %outcome.pc, steps = outcome.steps, "processor halted");
      return Ok(Some(outcome));
    }

    if let Err(error) = self.service(syscall) {
      processor.fault(&error);
      return Err(error);
    }
    Ok(None)
  }

  /// Carries out a syscall other than halt. Any error is fatal to the program that raised it.
  fn service(&mut self, syscall: Syscall) -> Result<()> {
    match syscall {

      Syscall::Halt => Ok(()),

      Syscall::Out => {
        let byte = self.stack.pop_byte()?;
        self.kernel.out(byte)
      }

      Syscall::KernelCall => {
        let name = self.stack.pop_string()?;
        trace!(name = name.as_str(), "kernel call");
        self.kernel.call(&name, &mut self.stack)
      }

    }
  }

  /// Runs `module` from `symbol` until it halts.
  pub fn run(&mut self, module: &Module, symbol: Option<&str>) -> Result<Outcome> {
    let mut processor = self.start(module, symbol)?;
    loop {
      if let Some(outcome) = self.step(module, &mut processor)? {
        return Ok(outcome);
      }
    }
  }

}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::page::{CodePage, DataPage};
  use crate::processor::{Fault, State};
  use crate::table::TextTable;

  fn module(code: &[u8], data: &[u8], exports: &[(&str, &str)]) -> Module {
    let mut table = TextTable::new();
    for (name, value) in exports {
      table.push(*name, *value);
    }
    Module::new(
      TextTable::new(),
      table,
      CodePage::new(TextTable::new(), code.to_vec()).unwrap(),
      DataPage::new(TextTable::new(), data.to_vec()).unwrap()
    )
  }

  fn runner() -> Runner<ConsoleKernel<Vec<u8>>> {
    Runner::new(ConsoleKernel::new(Vec::new()), RunConfig::default())
  }

  #[test]
  fn prints_a_character() {
    let module = module(&[0x40, 0x41, 0x13, 0x00], &[], &[]);
    let mut runner = runner();
    let outcome = runner.run(&module, None).unwrap();
    assert_eq!(outcome.pc.idx(), 4);
    assert_eq!(outcome.steps, 3);
    assert_eq!(runner.into_kernel().into_inner(), b"A");
  }

  #[test]
  fn starts_at_exported_symbol() {
    // EXIT at 0, program at 1.
    let module = module(&[0x00, 0x40, 0x42, 0x13, 0x00], &[], &[("main", "1")]);
    let mut runner = runner();
    runner.run(&module, Some("main")).unwrap();
    assert_eq!(runner.kernel().writer(), b"B");
  }

  #[test]
  fn unknown_start_symbol() {
    let module = module(&[0x00], &[], &[("main", "0")]);
    let mut runner = runner();
    assert!(matches!(runner.run(&module, Some("nope")), Err(Error::StartSymbol(_))));
  }

  #[test]
  fn kernel_calls() {
    // PUSH.B 'k', PUSHS.D out_b, KCALL, PUSHS.D greeting, PUSHS.D out_s, KCALL, EXIT
    let data = b"out_b\0out_s\0ok \0";
    let code = [0x40, b'k', 0x43, 0x00, 0x14, 0x43, 0x0C, 0x43, 0x06, 0x14, 0x00];
    let module = module(&code, data, &[]);
    let mut runner = runner();
    runner.run(&module, None).unwrap();
    assert_eq!(runner.kernel().writer(), b"kok ");
    assert!(runner.stack().is_empty());
  }

  #[test]
  fn unknown_kernel_call_is_fatal() {
    let module = module(&[0x43, 0x00, 0x14, 0x00], b"beep\0", &[]);
    let mut runner = runner();
    match runner.run(&module, None) {
      Err(Error::UnknownKernelCall(name)) => assert_eq!(name, "beep"),
      other => panic!("unexpected result: {:?}", other)
    }
  }

  #[test]
  fn out_with_empty_stack_underflows() {
    let module = module(&[0x13, 0x00], &[], &[]);
    let mut runner = runner();
    assert!(matches!(runner.run(&module, None), Err(Error::StackUnderflow { .. })));
  }

  #[test]
  fn failed_syscall_faults_the_processor() {
    // OUT.B with nothing to print, then PUSH.B 'Z', OUT.B, EXIT.
    let module = module(&[0x13, 0x40, b'Z', 0x13, 0x00], &[], &[]);
    let mut runner = runner();
    let mut processor = runner.start(&module, None).unwrap();
    assert!(matches!(runner.step(&module, &mut processor), Err(Error::StackUnderflow { .. })));
    assert_eq!(processor.state(), State::Faulted(Fault::StackUnderflow));
    assert!(matches!(runner.step(&module, &mut processor), Err(Error::NotRunning(_))));
    assert!(runner.kernel().writer().is_empty());
  }

  #[test]
  fn unknown_kernel_call_faults_the_processor() {
    let module = module(&[0x43, 0x00, 0x14, 0x40, b'Z', 0x13, 0x00], b"beep\0", &[]);
    let mut runner = runner();
    let mut processor = runner.start(&module, None).unwrap();
    runner.step(&module, &mut processor).unwrap();
    assert!(matches!(runner.step(&module, &mut processor), Err(Error::UnknownKernelCall(_))));
    assert_eq!(processor.state(), State::Faulted(Fault::KernelCall));
    assert!(matches!(runner.step(&module, &mut processor), Err(Error::NotRunning(_))));
  }

  #[test]
  fn invalid_opcode_is_reported() {
    let module = module(&[0xFF], &[], &[]);
    let mut runner = runner();
    assert!(matches!(runner.run(&module, None), Err(Error::InvalidOpcode { opcode: 0xFF, pc: 0 })));
  }

  #[test]
  fn step_limit_stops_endless_loops() {
    let module = module(&[0x20, 0x00], &[], &[]);
    let config = RunConfig { step_limit: Some(10), ..RunConfig::default() };
    let mut runner = Runner::new(ConsoleKernel::new(Vec::new()), config);
    assert!(matches!(runner.run(&module, None), Err(Error::StepLimit(10))));
  }

  #[test]
  fn stack_capacity_is_configurable() {
    let module = module(&[0x40, 0x01, 0x40, 0x02, 0x00], &[], &[]);
    let config = RunConfig { stack_capacity: 1, ..RunConfig::default() };
    let mut runner = Runner::new(ConsoleKernel::new(Vec::new()), config);
    assert!(matches!(runner.run(&module, None), Err(Error::StackOverflow(_))));
  }
}
