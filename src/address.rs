//! A validated position within a memory region, together with the number of bytes used to encode
//! it in the instruction stream.

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use crate::error::{Error, Result};

// `AddressNumberType` is `usize`, as it is naturally an index into a page's contents.
pub type AddressNumberType = usize;

/// The number of bytes an address occupies when it is encoded. Block counts in the module file
/// use the same width as the addresses of the page they hold.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum AddressWidth {
  One,
  Two
}

impl AddressWidth {
  pub fn bytes(&self) -> usize {
    match self {
      AddressWidth::One => 1,
      AddressWidth::Two => 2
    }
  }

  /// The largest value that can be encoded in this width.
  pub fn max_value(&self) -> AddressNumberType {
    match self {
      AddressWidth::One => u8::MAX as AddressNumberType,
      AddressWidth::Two => u16::MAX as AddressNumberType
    }
  }

  /// Little-endian encoding of `value`. Fails if `value` does not fit.
  pub fn encode(&self, value: AddressNumberType) -> Result<Vec<u8>> {
    if value > self.max_value() {
      return Err(Error::address(format!(
        "{} does not fit in {} byte(s)", value, self.bytes()
      )));
    }
    Ok(
      (0..self.bytes())
        .map(|i| ((value >> (8 * i)) & 0xFF) as u8)
        .collect()
    )
  }

  /// Little-endian decoding. `bytes` must hold exactly `self.bytes()` bytes.
  pub fn decode(&self, bytes: &[u8]) -> Result<AddressNumberType> {
    if bytes.len() != self.bytes() {
      return Err(Error::address(format!(
        "expected {} byte(s) of address, found {}", self.bytes(), bytes.len()
      )));
    }
    Ok(
      bytes.iter()
           .enumerate()
           .fold(0, |acc, (i, b)| acc | ((*b as AddressNumberType) << (8 * i)))
    )
  }
}

impl TryFrom<u8> for AddressWidth {
  type Error = Error;

  fn try_from(width: u8) -> Result<AddressWidth> {
    match width {
      1 => Ok(AddressWidth::One),
      2 => Ok(AddressWidth::Two),
      w => Err(Error::Config(format!("address width must be 1 or 2, not {}", w)))
    }
  }
}

impl Display for AddressWidth {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.bytes())
  }
}


/**
  An immutable, bounds-checked offset into a page. The address remembers the extent it was
  validated against, so that `increment` can check the result against the same region.

  Invariant: `value < maximum` and `value <= width.max_value()`.
*/
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Address {
  value   :  AddressNumberType,
  width   :  AddressWidth,
  maximum :  AddressNumberType
}

impl Address {

  pub fn new(value: AddressNumberType, width: AddressWidth, maximum: AddressNumberType)
    -> Result<Address>
  {
    if value > width.max_value() {
      return Err(Error::address(format!(
        "{} does not fit in a {} byte address", value, width.bytes()
      )));
    }
    if value >= maximum {
      return Err(Error::address(format!(
        "{} is outside a region of {} byte(s)", value, maximum
      )));
    }
    Ok(Address { value, width, maximum })
  }

  /// Decodes a little-endian address from `bytes`, bounded by `maximum`.
  pub fn from_bytes(bytes: &[u8], width: AddressWidth, maximum: AddressNumberType)
    -> Result<Address>
  {
    Address::new(width.decode(bytes)?, width, maximum)
  }

  /// A new address `n` bytes further into the same region.
  pub fn increment(&self, n: AddressNumberType) -> Result<Address> {
    let value = self.value.checked_add(n).ok_or_else(|| {
      Error::address(format!("{} + {} overflows", self.value, n))
    })?;
    Address::new(value, self.width, self.maximum)
  }

  /// The same position validated against a different extent.
  pub fn rebound(&self, maximum: AddressNumberType) -> Result<Address> {
    Address::new(self.value, self.width, maximum)
  }

  /// Converts the address to an index into the page contents.
  pub fn idx(&self) -> usize {
    self.value
  }

  pub fn width(&self) -> AddressWidth {
    self.width
  }

  pub fn maximum(&self) -> AddressNumberType {
    self.maximum
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    // The invariant guarantees the value fits.
    (0..self.width.bytes())
      .map(|i| ((self.value >> (8 * i)) & 0xFF) as u8)
      .collect()
  }

}


impl Display for Address {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.width {
      AddressWidth::One => write!(f, "0x{:02X}", self.value),
      AddressWidth::Two => write!(f, "0x{:04X}", self.value)
    }
  }
}
