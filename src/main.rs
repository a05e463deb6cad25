/*!
  `vrun`: loads a module file and runs it, printing program output to stdout.

    vrun [--start=SYMBOL] [--trace] [--stack-capacity=N] [--max-steps=N] <moduleFile>

  Exit codes: 0 on halt, 1 for bad arguments, 2 when the start symbol is not exported, 3 when the
  module can't be loaded, 4 when the program faults.
*/

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info};

use vproc::stack::DEFAULT_STACK_CAPACITY;
use vproc::{ConsoleKernel, Error, Kernel, Module, Outcome, Processor, Result, RunConfig, Runner};

const EXIT_USAGE : i32 = 1;
const EXIT_START : i32 = 2;
const EXIT_LOAD  : i32 = 3;
const EXIT_FAULT : i32 = 4;

#[derive(Parser, Debug)]
#[command(name = "vrun")]
#[command(about = "Run a virtual processor module")]
struct Args {
  /// Exported symbol to start at (the start of the code page when absent)
  #[arg(long, value_name = "SYMBOL")]
  start: Option<String>,

  /// Print every executed instruction and the processor state
  #[arg(long)]
  trace: bool,

  /// Size of the value stack in bytes
  #[arg(long, default_value_t = DEFAULT_STACK_CAPACITY)]
  stack_capacity: usize,

  /// Stop with an error after this many instructions
  #[arg(long)]
  max_steps: Option<u64>,

  /// Module file to run
  module: PathBuf,
}

/// Steps the processor until it halts, printing the state after each step when tracing.
fn execute<K: Kernel>(runner: &mut Runner<K>, module: &Module, processor: &mut Processor, trace: bool)
  -> Result<Outcome>
{
  loop {
    let result = runner.step(module, processor);
    if trace {
      if let Some((at, instruction)) = processor.last_instruction() {
        println!("{}: {}", at, instruction);
      }
      println!("{}", processor.state_table(runner.stack()));
    }
    if let Some(outcome) = result? {
      return Ok(outcome);
    }
  }
}

fn main() {
  vproc::init_logging();

  let args = match Args::try_parse() {
    Ok(args) => args,
    Err(e) => {
      let _ = e.print();
      process::exit(if e.use_stderr() { EXIT_USAGE } else { 0 });
    }
  };

  let module = match Module::read(&args.module) {
    Ok(module) => module,
    Err(e) => {
      error!("cannot load {}: {}", args.module.display(), e);
      eprintln!("vrun: cannot load {}: {}", args.module.display(), e);
      process::exit(EXIT_LOAD);
    }
  };

  let config = RunConfig {
    stack_capacity : args.stack_capacity,
    step_limit     : args.max_steps
  };
  let mut runner = Runner::new(ConsoleKernel::new(io::stdout()), config);

  let mut processor = match runner.start(&module, args.start.as_deref()) {
    Ok(processor) => processor,
    Err(e) => {
      eprintln!("vrun: {}", e);
      process::exit(match e {
        Error::StartSymbol(_) => EXIT_START,
        Error::Format(_)      => EXIT_LOAD,
        _                     => EXIT_FAULT
      });
    }
  };

  let result = execute(&mut runner, &module, &mut processor, args.trace);
  let _ = io::stdout().flush();
  match result {
    Ok(outcome) => {
      info!(pc = %outcome.pc, steps = outcome.steps, "halted");
    }
    Err(e) => {
      eprintln!("vrun: {} (pc {}, state {})", e, processor.pc(), processor.state());
      process::exit(EXIT_FAULT);
    }
  }
}
