/*!
  The module file: everything the processor needs to run a program.

    "module"
    "properties"       text table
    "exports"          text table, symbol -> code address
    "code_properties"  text table
    "code"             binary block
    "data_properties"  text table
    "data"             binary block

  Sections appear in exactly this order. A page's properties come before its block, which lets
  an `address_width` property decide how wide the block's counts are.
*/

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::address::AddressNumberType;
use crate::codec::{read_binary_block, read_header, read_text_table, write_binary_block,
                   write_string, write_text_table};
use crate::error::{Error, Result};
use crate::page::{width_from_properties, CodePage, DataPage};
use crate::table::TextTable;

pub const MODULE_TAG              : &str = "module";
pub const PROPERTIES_SECTION      : &str = "properties";
pub const EXPORTS_SECTION         : &str = "exports";
pub const CODE_PROPERTIES_SECTION : &str = "code_properties";
pub const CODE_SECTION            : &str = "code";
pub const DATA_PROPERTIES_SECTION : &str = "data_properties";
pub const DATA_SECTION            : &str = "data";

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Module {
  pub properties :  TextTable,
  pub exports    :  TextTable,
  code           :  CodePage,
  data           :  DataPage
}

impl Module {

  pub fn new(properties: TextTable, exports: TextTable, code: CodePage, data: DataPage) -> Module {
    Module { properties, exports, code, data }
  }

  pub fn code(&self) -> &CodePage {
    &self.code
  }

  pub fn data(&self) -> &DataPage {
    &self.data
  }

  /**
    Resolves an exported symbol to its code offset. When a symbol is exported more than once the
    last entry wins. Values are decimal or `0x`-prefixed hexadecimal.
  */
  pub fn export(&self, symbol: &str) -> Result<Option<AddressNumberType>> {
    match self.exports.get(symbol) {
      None        => Ok(None),
      Some(value) => parse_number(value).map(Some).ok_or_else(|| {
        Error::format(format!("export `{}` has a malformed address {:?}", symbol, value))
      })
    }
  }

  // region Reading

  pub fn read<P: AsRef<Path>>(path: P) -> Result<Module> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let module = Module::read_from(&mut reader)?;
    debug!(
      path = %path.display(),
      code = module.code.len(),
      data = module.data.len(),
      exports = module.exports.len(),
      "loaded module"
    );
    Ok(module)
  }

  pub fn read_from<R: Read>(reader: &mut R) -> Result<Module> {
    read_header(reader, MODULE_TAG)?;
    let properties = read_text_table(reader, PROPERTIES_SECTION)?;
    let exports    = read_text_table(reader, EXPORTS_SECTION)?;

    let code_properties = read_text_table(reader, CODE_PROPERTIES_SECTION)?;
    let code_width      = width_from_properties(&code_properties)?;
    let code_contents   = read_binary_block(reader, CODE_SECTION, code_width)?;
    let code            = CodePage::new(code_properties, code_contents)?;

    let data_properties = read_text_table(reader, DATA_PROPERTIES_SECTION)?;
    let data_width      = width_from_properties(&data_properties)?;
    let data_contents   = read_binary_block(reader, DATA_SECTION, data_width)?;
    let data            = DataPage::new(data_properties, data_contents)?;

    Ok(Module { properties, exports, code, data })
  }

  // endregion

  // region Writing

  pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    self.write_to(&mut writer)?;
    writer.flush()?;
    debug!(path = %path.display(), "wrote module");
    Ok(())
  }

  pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
    write_string(writer, MODULE_TAG)?;
    write_text_table(writer, PROPERTIES_SECTION, &self.properties)?;
    write_text_table(writer, EXPORTS_SECTION, &self.exports)?;

    write_text_table(writer, CODE_PROPERTIES_SECTION, self.code.properties())?;
    write_binary_block(writer, CODE_SECTION, self.code.contents(), self.code.width())?;

    write_text_table(writer, DATA_PROPERTIES_SECTION, self.data.properties())?;
    write_binary_block(writer, DATA_SECTION, self.data.contents(), self.data.width())?;
    Ok(())
  }

  // endregion

}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(text: &str) -> Option<usize> {
  let text = text.trim();
  match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
    Some(hex) => usize::from_str_radix(hex, 16).ok(),
    None      => text.parse::<usize>().ok()
  }
}
