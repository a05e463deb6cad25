/*!
  Memory regions. A module has exactly two: the code page, which the processor fetches
  instructions and operands from, and the data page, which operands point into. The two are
  distinct types so that an address meant for one region can't be resolved against the other by
  accident: every addressing mode is a method of `CodePage` that names the `DataPage` it reads
  through as an explicit argument.

  Every access is bounds checked and reports an `Error::Address` rather than panicking.
*/

use std::convert::TryFrom;
use std::ops::Deref;

use crate::address::{Address, AddressNumberType, AddressWidth};
use crate::conditionals::Conditionals;
use crate::error::{Error, Result};
use crate::table::TextTable;

/// Name of the page property that selects a two byte address width.
pub const ADDRESS_WIDTH_PROPERTY: &str = "address_width";

/// Reads the address width a page's properties ask for. Absent means one byte.
pub fn width_from_properties(properties: &TextTable) -> Result<AddressWidth> {
  match properties.get(ADDRESS_WIDTH_PROPERTY) {
    None        => Ok(AddressWidth::One),
    Some(value) => {
      let width = value.trim().parse::<u8>().map_err(|_| {
        Error::Config(format!("{} must be 1 or 2, not {:?}", ADDRESS_WIDTH_PROPERTY, value))
      })?;
      AddressWidth::try_from(width)
    }
  }
}

/// Storage shared by both kinds of page.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Page {
  properties :  TextTable,
  contents   :  Vec<u8>,
  width      :  AddressWidth
}

impl Page {

  /**
    The address width comes from the `address_width` property, so the properties written to a
    module file always describe the page they precede. Fails if the contents are larger than
    that width can address.
  */
  pub fn new(properties: TextTable, contents: Vec<u8>) -> Result<Page> {
    let width = width_from_properties(&properties)?;
    if contents.len() > width.max_value() {
      return Err(Error::Config(format!(
        "a page with {} byte addresses holds at most {} bytes, not {}",
        width.bytes(), width.max_value(), contents.len()
      )));
    }
    Ok(Page { properties, contents, width })
  }

  pub fn properties(&self) -> &TextTable {
    &self.properties
  }

  pub fn contents(&self) -> &[u8] {
    &self.contents
  }

  pub fn width(&self) -> AddressWidth {
    self.width
  }

  pub fn len(&self) -> usize {
    self.contents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.contents.is_empty()
  }

  /// An address of a byte in this page.
  pub fn address(&self, value: AddressNumberType) -> Result<Address> {
    Address::new(value, self.width, self.len())
  }

  pub fn byte_at(&self, address: &Address) -> Result<u8> {
    self.byte(address.idx())
  }

  fn byte(&self, idx: usize) -> Result<u8> {
    self.contents.get(idx).copied().ok_or_else(|| {
      Error::address(format!("byte {} is outside a page of {} byte(s)", idx, self.len()))
    })
  }

  fn bytes(&self, start: usize, count: usize) -> Result<&[u8]> {
    start.checked_add(count)
         .and_then(|end| self.contents.get(start..end))
         .ok_or_else(|| {
           Error::address(format!(
             "{} byte(s) at {} run past the end of a page of {} byte(s)",
             count, start, self.len()
           ))
         })
  }

  /**
    Decodes `width` little-endian bytes found in this page at `at` into an address bounded by
    `maximum`, the extent of whichever region the address points into.
  */
  pub fn get_address(&self, at: usize, width: AddressWidth, maximum: AddressNumberType)
    -> Result<Address>
  {
    Address::from_bytes(self.bytes(at, width.bytes())?, width, maximum)
  }

}


#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct CodePage(Page);

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct DataPage(Page);

impl Deref for CodePage {
  type Target = Page;
  fn deref(&self) -> &Page {
    &self.0
  }
}

impl Deref for DataPage {
  type Target = Page;
  fn deref(&self) -> &Page {
    &self.0
  }
}

impl DataPage {
  pub fn new(properties: TextTable, contents: Vec<u8>) -> Result<DataPage> {
    Ok(DataPage(Page::new(properties, contents)?))
  }

  /// Reads the NUL-terminated text stored at `address`, excluding the terminator.
  pub fn string_at(&self, address: &Address) -> Result<String> {
    let tail = self.bytes(address.idx(), self.len().saturating_sub(address.idx()))?;
    match tail.iter().position(|b| *b == 0) {
      Some(end) => Ok(String::from_utf8(tail[..end].to_vec())?),
      None      => Err(Error::address(format!("string at {} has no terminator", address)))
    }
  }
}

impl CodePage {
  pub fn new(properties: TextTable, contents: Vec<u8>) -> Result<CodePage> {
    Ok(CodePage(Page::new(properties, contents)?))
  }

  /// The program counter position `value`. Unlike other addresses it may rest one past the last
  /// byte, which is where a program that ends in `EXIT` halts.
  pub fn program_counter(&self, value: AddressNumberType) -> Result<Address> {
    Address::new(value, self.width, self.len() + 1)
  }

  pub fn opcode(&self, pc: &Address) -> Result<u8> {
    self.byte_at(pc)
  }

  /// The byte right after the opcode.
  pub fn immediate_byte(&self, pc: &Address) -> Result<u8> {
    self.byte(operand_start(pc)?)
  }

  /// The two raw bytes after the opcode, in stream order.
  pub fn immediate_int(&self, pc: &Address) -> Result<[u8; 2]> {
    let bytes = self.bytes(operand_start(pc)?, 2)?;
    Ok([bytes[0], bytes[1]])
  }

  /// An address into this page, taken from the operand.
  pub fn jump_address(&self, pc: &Address) -> Result<Address> {
    self.get_address(operand_start(pc)?, self.width, self.len())
  }

  /// An address into `data`, taken from the operand.
  pub fn direct_address(&self, pc: &Address, data: &DataPage) -> Result<Address> {
    self.get_address(operand_start(pc)?, data.width, data.len())
  }

  pub fn direct_byte(&self, pc: &Address, data: &DataPage) -> Result<u8> {
    data.byte_at(&self.direct_address(pc, data)?)
  }

  /// The operand is the address of a location in `data` that holds the final address.
  pub fn indirect_address(&self, pc: &Address, data: &DataPage) -> Result<Address> {
    let pointer = self.direct_address(pc, data)?;
    data.get_address(pointer.idx(), data.width, data.len())
  }

  pub fn indirect_byte(&self, pc: &Address, data: &DataPage) -> Result<u8> {
    data.byte_at(&self.indirect_address(pc, data)?)
  }

  /**
    Collects the conditional prefixes starting at `pc`. Returns them together with the position
    of the opcode they precede. Running off the end of the page is an address error.
  */
  pub fn get_conditionals(&self, pc: &Address) -> Result<(Conditionals, Address)> {
    let mut conditionals = Conditionals::new();
    let mut cursor = pc.idx();
    while conditionals.push(self.byte(cursor)?) {
      cursor += 1;
    }
    Ok((conditionals, Address::new(cursor, pc.width(), pc.maximum())?))
  }
}

fn operand_start(pc: &Address) -> Result<usize> {
  pc.idx().checked_add(1).ok_or_else(|| Error::address("operand address overflows"))
}


#[cfg(test)]
mod tests {
  use super::*;

  fn code(bytes: &[u8]) -> CodePage {
    CodePage::new(TextTable::new(), bytes.to_vec()).unwrap()
  }

  fn data(bytes: &[u8]) -> DataPage {
    DataPage::new(TextTable::new(), bytes.to_vec()).unwrap()
  }

  fn wide() -> TextTable {
    let mut properties = TextTable::new();
    properties.push(ADDRESS_WIDTH_PROPERTY, "2");
    properties
  }

  #[test]
  fn width_comes_from_properties() {
    assert_eq!(code(&[]).width(), AddressWidth::One);
    assert_eq!(CodePage::new(wide(), vec![]).unwrap().width(), AddressWidth::Two);

    let mut properties = TextTable::new();
    properties.push(ADDRESS_WIDTH_PROPERTY, "4");
    assert!(matches!(CodePage::new(properties, vec![]), Err(Error::Config(_))));
  }

  #[test]
  fn contents_must_be_addressable() {
    assert!(matches!(DataPage::new(TextTable::new(), vec![0; 256]), Err(Error::Config(_))));
    assert!(DataPage::new(TextTable::new(), vec![0; 255]).is_ok());
    assert!(DataPage::new(wide(), vec![0; 256]).is_ok());
  }

  #[test]
  fn get_address_is_bounded() {
    let page = code(&[0x02, 0x07]);
    assert_eq!(page.get_address(0, AddressWidth::One, 3).unwrap().idx(), 2);
    assert!(matches!(page.get_address(1, AddressWidth::One, 3), Err(Error::Address(_))));
    assert!(matches!(page.get_address(1, AddressWidth::Two, 0x1000), Err(Error::Address(_))));
    assert_eq!(page.get_address(0, AddressWidth::Two, 0x1000).unwrap().idx(), 0x0702);
  }

  #[test]
  fn immediates() {
    let page = code(&[0x44, 0x34, 0x12]);
    let pc = page.program_counter(0).unwrap();
    assert_eq!(page.immediate_byte(&pc).unwrap(), 0x34);
    assert_eq!(page.immediate_int(&pc).unwrap(), [0x34, 0x12]);

    let pc = page.program_counter(2).unwrap();
    assert!(matches!(page.immediate_byte(&pc), Err(Error::Address(_))));
    assert!(matches!(page.immediate_int(&pc), Err(Error::Address(_))));
  }

  #[test]
  fn jump_address_uses_code_extent() {
    let page = code(&[0x20, 0x02, 0x00]);
    let pc = page.program_counter(0).unwrap();
    assert_eq!(page.jump_address(&pc).unwrap().idx(), 2);

    let page = code(&[0x20, 0x03, 0x00]);
    assert!(matches!(page.jump_address(&pc), Err(Error::Address(_))));
  }

  #[test]
  fn direct_addressing() {
    let page = code(&[0x41, 0x01]);
    let pc = page.program_counter(0).unwrap();
    let data = data(&[0x10, 0x20]);
    assert_eq!(page.direct_address(&pc, &data).unwrap().idx(), 1);
    assert_eq!(page.direct_byte(&pc, &data).unwrap(), 0x20);

    let short = DataPage::new(TextTable::new(), vec![0x10]).unwrap();
    assert!(matches!(page.direct_byte(&pc, &short), Err(Error::Address(_))));
  }

  #[test]
  fn indirect_addressing_dereferences_twice() {
    let page = code(&[0x42, 0x00]);
    let pc = page.program_counter(0).unwrap();
    let data = data(&[0x01, 0x99]);
    assert_eq!(page.indirect_address(&pc, &data).unwrap().idx(), 1);
    assert_eq!(page.indirect_byte(&pc, &data).unwrap(), 0x99);
  }

  #[test]
  fn indirect_pointer_out_of_range() {
    let page = code(&[0x42, 0x00]);
    let pc = page.program_counter(0).unwrap();
    let data = data(&[0x05, 0x99]);
    assert!(matches!(page.indirect_byte(&pc, &data), Err(Error::Address(_))));
  }

  #[test]
  fn wide_indirect_addressing() {
    let page = code(&[0x42, 0x00, 0x00]);
    let pc = page.program_counter(0).unwrap();
    let data = DataPage::new(wide(), vec![0x02, 0x00, 0x2A]).unwrap();
    assert_eq!(page.indirect_byte(&pc, &data).unwrap(), 0x2A);
  }

  #[test]
  fn conditionals_stop_at_opcode() {
    let page = code(&[0xE5, 0xE2, 0x00, 0x40]);
    let pc = page.program_counter(0).unwrap();
    let (conditionals, at) = page.get_conditionals(&pc).unwrap();
    assert_eq!(conditionals.as_slice(), &[0xE5, 0xE2]);
    assert_eq!(at.idx(), 2);
    assert_eq!(page.opcode(&at).unwrap(), 0x00);
  }

  #[test]
  fn unconditional_instruction() {
    let page = code(&[0x00]);
    let pc = page.program_counter(0).unwrap();
    let (conditionals, at) = page.get_conditionals(&pc).unwrap();
    assert!(conditionals.is_empty());
    assert_eq!(at, pc);
  }

  #[test]
  fn conditionals_running_off_the_page() {
    let page = code(&[0xE1, 0xE2, 0xE3]);
    let pc = page.program_counter(0).unwrap();
    assert!(matches!(page.get_conditionals(&pc), Err(Error::Address(_))));
  }

  #[test]
  fn program_counter_may_rest_past_the_end() {
    let page = code(&[0x00]);
    let pc = page.program_counter(1).unwrap();
    assert!(matches!(page.opcode(&pc), Err(Error::Address(_))));
    assert!(page.program_counter(2).is_err());
  }

  #[test]
  fn strings_in_data() {
    let data = data(b"out_s\0hi");
    assert_eq!(data.string_at(&data.address(0).unwrap()).unwrap(), "out_s");
    assert!(matches!(data.string_at(&data.address(6).unwrap()), Err(Error::Address(_))));
  }
}
