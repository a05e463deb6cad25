//! `vasm`: assembles a source file into a module file.
//!
//!     vasm <sourceFile> <moduleFile>
//!
//! Exits with 1 for bad arguments and 2 when the source can't be read, assembled, or written.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::info;

use vproc::bytecode::assemble;
use vproc::Result;

#[derive(Parser, Debug)]
#[command(name = "vasm")]
#[command(about = "Assemble a virtual processor module")]
struct Args {
  /// Assembly source to read
  source: PathBuf,

  /// Module file to write
  module: PathBuf,
}

fn build(args: &Args) -> Result<()> {
  let source = fs::read_to_string(&args.source)?;
  let module = assemble(&source)?;
  module.write(&args.module)?;
  info!(
    code = module.code().len(),
    data = module.data().len(),
    exports = module.exports.len(),
    "assembled {}", args.source.display()
  );
  Ok(())
}

fn main() {
  vproc::init_logging();

  let args = match Args::try_parse() {
    Ok(args) => args,
    Err(e) => {
      let _ = e.print();
      process::exit(if e.use_stderr() { 1 } else { 0 });
    }
  };

  if let Err(e) = build(&args) {
    eprintln!("vasm: {}: {}", args.source.display(), e);
    process::exit(2);
  }
}
