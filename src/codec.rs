/*!
  Primitive encoders and decoders that the module file is built from:

    string:       <bytes> 0x00
    binary block: <name string> <count> <count bytes> <count>
    text table:   <name string> STX (<name> FS <value> RS)* ETX

  Counts are little-endian and one or two bytes wide, matching the address width of the page the
  block holds.
*/

use std::io::{ErrorKind, Read, Write};

use tracing::warn;

use crate::address::AddressWidth;
use crate::error::{Error, Result};
use crate::table::{NameValue, TextTable};

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const FS : u8 = 0x1C;
pub const RS : u8 = 0x1E;

const NUL: u8 = 0x00;

/// Reads one byte, or `None` at end of stream.
fn read_byte<R: Read>(reader: &mut R) -> Result<Option<u8>> {
  let mut buffer = [0u8; 1];
  loop {
    match reader.read(&mut buffer) {
      Ok(0)  => return Ok(None),
      Ok(_)  => return Ok(Some(buffer[0])),
      Err(e) if e.kind() == ErrorKind::Interrupted => continue,
      Err(e) => return Err(e.into())
    }
  }
}

fn read_exact<R: Read>(reader: &mut R, buffer: &mut [u8], what: &str) -> Result<()> {
  reader.read_exact(buffer).map_err(|e| {
    match e.kind() {
      ErrorKind::UnexpectedEof => Error::format(format!("unexpected end of file in {}", what)),
      _                        => Error::Io(e)
    }
  })
}

// region Strings

pub fn write_string<W: Write>(writer: &mut W, text: &str) -> Result<()> {
  if text.as_bytes().contains(&NUL) {
    return Err(Error::format(format!("string {:?} contains a NUL byte", text)));
  }
  writer.write_all(text.as_bytes())?;
  writer.write_all(&[NUL])?;
  Ok(())
}

pub fn read_string<R: Read>(reader: &mut R) -> Result<String> {
  let mut bytes = Vec::new();
  loop {
    match read_byte(reader)? {
      Some(NUL)  => break,
      Some(byte) => bytes.push(byte),
      None       => return Err(Error::format("unterminated string"))
    }
  }
  Ok(String::from_utf8(bytes)?)
}

/// Reads a section name and checks it against the one expected at this point in the file.
pub fn read_header<R: Read>(reader: &mut R, expected: &str) -> Result<()> {
  let found = read_string(reader).map_err(|e| {
    match e {
      Error::Format(_) | Error::Utf8(_) =>
        Error::format(format!("expected section `{}`: {}", expected, e)),
      e => e
    }
  })?;
  if found != expected {
    return Err(Error::format(format!("expected section `{}`, found `{}`", expected, found)));
  }
  Ok(())
}

// endregion

// region Binary blocks

pub fn write_binary_block<W: Write>(writer: &mut W, name: &str, bytes: &[u8], width: AddressWidth)
  -> Result<()>
{
  if bytes.len() > width.max_value() {
    return Err(Error::Config(format!(
      "block `{}` holds {} bytes, more than a {} byte count can express",
      name, bytes.len(), width.bytes()
    )));
  }
  let count = width.encode(bytes.len())?;
  write_string(writer, name)?;
  writer.write_all(&count)?;
  writer.write_all(bytes)?;
  writer.write_all(&count)?;
  Ok(())
}

pub fn read_binary_block<R: Read>(reader: &mut R, name: &str, width: AddressWidth)
  -> Result<Vec<u8>>
{
  read_header(reader, name)?;

  let mut count_bytes = vec![0u8; width.bytes()];
  read_exact(reader, &mut count_bytes, name)?;
  let count = width.decode(&count_bytes)?;

  let mut contents = vec![0u8; count];
  read_exact(reader, &mut contents, name)?;

  read_exact(reader, &mut count_bytes, name)?;
  if width.decode(&count_bytes)? != count {
    return Err(Error::format("Block count error"));
  }

  Ok(contents)
}

// endregion

// region Text tables

fn check_field(field: &str) -> Result<()> {
  match field.bytes().find(|b| [NUL, STX, ETX, FS, RS].contains(b)) {
    Some(b) => Err(Error::format(format!("table field {:?} contains control byte 0x{:02X}", field, b))),
    None    => Ok(())
  }
}

pub fn write_text_table<W: Write>(writer: &mut W, name: &str, table: &TextTable) -> Result<()> {
  write_string(writer, name)?;
  writer.write_all(&[STX])?;
  for record in table {
    check_field(&record.name)?;
    check_field(&record.value)?;
    writer.write_all(record.name.as_bytes())?;
    writer.write_all(&[FS])?;
    writer.write_all(record.value.as_bytes())?;
    writer.write_all(&[RS])?;
  }
  writer.write_all(&[ETX])?;
  Ok(())
}

fn field_text(table: &str, bytes: &[u8]) -> Result<String> {
  String::from_utf8(bytes.to_vec()).map_err(|e| {
    Error::format(format!("table `{}`: field is not UTF-8: {}", table, e))
  })
}

/**
  Reads a table framed by STX/ETX. Records that do not split into exactly one name and one
  value are dropped rather than failing the read.
*/
pub fn read_text_table<R: Read>(reader: &mut R, name: &str) -> Result<TextTable> {
  read_header(reader, name)?;

  match read_byte(reader)? {
    Some(STX) => {},
    Some(b)   => return Err(Error::format(format!("table `{}`: expected STX, found 0x{:02X}", name, b))),
    None      => return Err(Error::format(format!("table `{}`: missing STX", name)))
  }

  let mut body = Vec::new();
  loop {
    match read_byte(reader)? {
      Some(ETX)  => break,
      Some(byte) => body.push(byte),
      None       => return Err(Error::format(format!("table `{}`: missing ETX", name)))
    }
  }

  let mut records = Vec::new();
  for record in body.split(|b| *b == RS) {
    // The final RS leaves an empty trailing piece.
    if record.is_empty() {
      continue;
    }
    let fields: Vec<&[u8]> = record.split(|b| *b == FS).collect();
    if fields.len() != 2 {
      warn!(table = name, fields = fields.len(), "dropping malformed table record");
      continue;
    }
    records.push(NameValue::new(field_text(name, fields[0])?, field_text(name, fields[1])?));
  }

  Ok(records.into())
}

// endregion
