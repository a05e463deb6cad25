/*!
  A minimal virtual processor.

  A program is a `Module`: module properties, a table of exported symbols, a code page and a data
  page, read from and written to a simple sectioned binary file. A `Processor` fetches and decodes
  instructions from the code page, resolving operands against the data page, and hands syscalls
  back to a `Runner`, which services them through a `Kernel`. Modules can be written by hand in
  assembly and built with `bytecode::assemble`.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod address;
pub mod bytecode;
pub mod codec;
pub mod conditionals;
pub mod error;
pub mod module;
pub mod page;
pub mod processor;
pub mod runner;
pub mod stack;
pub mod table;
mod symboltable;

use tracing_subscriber::{fmt, EnvFilter};

pub use crate::address::{Address, AddressNumberType, AddressWidth};
pub use crate::error::{Error, Result};
pub use crate::module::Module;
pub use crate::page::{CodePage, DataPage};
pub use crate::processor::{Fault, Processor, State};
pub use crate::runner::{ConsoleKernel, Kernel, Outcome, RunConfig, Runner};
pub use crate::stack::ValueStack;
pub use crate::table::{NameValue, TextTable};

/**
  Logs to stderr, filtered by `RUST_LOG`. Without it only warnings and errors are shown, so
  program output on stdout stays clean.
*/
pub fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}
