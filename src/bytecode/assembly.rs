/*!
  The human readable textual form of bytecode is called assembly. This module turns assembly
  source into a `Module`.

  One statement per line; `;` starts a comment:
    ```text
    <statement>  ::= <label>? <prefix>* <body>?
    <label>      ::= <identifier> ':'
    <prefix>     ::= '?' <hex digit> <hex digit>          conditional prefix, 0xE0..=0xEF
    <body>       ::= <mnemonic> <arguments>? | '.' <directive> <arguments>?
    <arguments>  ::= <argument> (',' <argument>)*
    <argument>   ::= <number> | <char> | <string> | <identifier>
    <number>     ::= <decimal> | '0x' <hex digits>
    ```

  Directives:
    ```text
    .code / .data           switch the page that following statements fill (code to begin with)
    .byte  a, b, ...        one byte each
    .word  a, b, ...        two bytes each, little-endian
    .addr  label, ...       an address in the current page's address width
    .string "text", ...     the text followed by a NUL byte
    .property name value    a property of the current page
    .module   name value    a property of the module
    .export label, ...      export code labels by name
    ```

  Lines are first tokenized into `Token`s, each line's tokens are then assigned to the fields of
  a `Statement`, and statements are assembled in two passes: the first lays out every page and
  defines the labels, the second emits bytes with every label resolved. The address widths of the
  pages come from their `address_width` properties, which are collected before either pass.
*/

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{tag, take_while_m_n},
  character::complete::{alpha1, alphanumeric1, anychar, char as one_char, digit1, hex_digit1, space0},
  combinator::{eof, map, map_opt, map_res, opt, recognize, rest, value},
  error::{Error as NomError, ErrorKind},
  multi::{many0, many0_count},
  sequence::{delimited, pair, preceded, terminated, tuple},
  Err as NomErr,
  IResult
};
use tracing::debug;

use crate::address::{AddressNumberType, AddressWidth};
use crate::bytecode::{is_conditional, Opcode, Operand};
use crate::error::{Error, Result};
use crate::module::Module;
use crate::page::{width_from_properties, CodePage, DataPage};
use crate::symboltable::{Section, Symbol, SymbolTable};
use crate::table::TextTable;

// region Tokens

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Token<'a> {
  /// `name:`
  Label(&'a str),
  /// `.name`
  Directive(&'a str),
  /// `?E5`
  Prefix(u8),
  /// A mnemonic or a label reference.
  Word(&'a str),
  Number(usize),
  Char(u8),
  Str(String),
  Comma
}

impl<'a> Display for Token<'a> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Token::Label(name)     => write!(f, "label `{}:`", name),
      Token::Directive(name) => write!(f, "directive `.{}`", name),
      Token::Prefix(byte)    => write!(f, "prefix `?{:02X}`", byte),
      Token::Word(word)      => write!(f, "`{}`", word),
      Token::Number(n)       => write!(f, "number {}", n),
      Token::Char(c)         => write!(f, "character {:?}", *c as char),
      Token::Str(text)       => write!(f, "string {:?}", text),
      Token::Comma           => write!(f, "`,`")
    }
  }
}

fn unescape(c: char) -> Option<char> {
  match c {
    'n'              => Some('\n'),
    't'              => Some('\t'),
    'r'              => Some('\r'),
    '0'              => Some('\0'),
    '\\' | '\'' | '"' => Some(c),
    _                => None
  }
}

fn identifier(input: &str) -> IResult<&str, &str> {
  recognize(pair(
    alt((alpha1, tag("_"))),
    many0_count(alt((alphanumeric1, tag("_"), tag("."))))
  ))(input)
}

fn number(input: &str) -> IResult<&str, usize> {
  alt((
    map_res(
      preceded(alt((tag("0x"), tag("0X"))), hex_digit1),
      |digits: &str| usize::from_str_radix(digits, 16)
    ),
    map_res(digit1, |digits: &str| digits.parse::<usize>())
  ))(input)
}

fn char_literal(input: &str) -> IResult<&str, u8> {
  map_opt(
    delimited(
      one_char('\''),
      alt((preceded(one_char('\\'), map_opt(anychar, unescape)), anychar)),
      one_char('\'')
    ),
    |c: char| if c.is_ascii() { Some(c as u8) } else { None }
  )(input)
}

/// A double quoted string. Once the opening quote is seen, a bad escape or a missing closing
/// quote is a failure rather than a backtrack.
fn string_literal(input: &str) -> IResult<&str, String> {
  let (mut remaining, _) = one_char('"')(input)?;
  let mut text = String::new();
  loop {
    let mut chars = remaining.chars();
    match chars.next() {
      Some('"')  => return Ok((chars.as_str(), text)),
      Some('\\') => {
        match chars.next().and_then(unescape) {
          Some(c) => text.push(c),
          None    => return Err(NomErr::Failure(NomError::new(remaining, ErrorKind::Escaped)))
        }
      }
      Some(c)    => text.push(c),
      None       => return Err(NomErr::Failure(NomError::new(input, ErrorKind::Char)))
    }
    remaining = chars.as_str();
  }
}

fn prefix(input: &str) -> IResult<&str, u8> {
  preceded(
    one_char('?'),
    map_res(
      take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
      |digits: &str| u8::from_str_radix(digits, 16)
    )
  )(input)
}

fn token(input: &str) -> IResult<&str, Token> {
  alt((
    map(string_literal, Token::Str),
    map(char_literal, Token::Char),
    map(preceded(one_char('.'), identifier), Token::Directive),
    map(prefix, Token::Prefix),
    map(terminated(identifier, one_char(':')), Token::Label),
    map(number, Token::Number),
    map(identifier, Token::Word),
    value(Token::Comma, one_char(','))
  ))(input)
}

/// Splits one line of source into tokens, dropping whitespace and any trailing comment.
pub fn tokenize_line(line: &str) -> IResult<&str, Vec<Token>> {
  terminated(
    many0(preceded(space0, token)),
    tuple((space0, opt(preceded(one_char(';'), rest)), eof))
  )(line)
}

fn lex(line: usize, text: &str) -> Result<Vec<Token>> {
  match tokenize_line(text) {
    Ok((_, tokens)) => Ok(tokens),
    Err(NomErr::Error(e)) | Err(NomErr::Failure(e)) => {
      Err(Error::assembly(line, format!("unexpected input `{}`", e.input.trim_end())))
    }
    Err(NomErr::Incomplete(_)) => Err(Error::assembly(line, "incomplete input"))
  }
}

// endregion

// region Statements

#[derive(Clone, Eq, PartialEq, Debug)]
enum Argument<'a> {
  Number(usize),
  Label(&'a str),
  Text(String)
}

#[derive(Clone, Eq, PartialEq, Debug)]
enum Body<'a> {
  Empty,
  Instruction { opcode: Opcode, arguments: Vec<Argument<'a>> },
  Directive { name: &'a str, arguments: Vec<Argument<'a>> }
}

#[derive(Clone, Eq, PartialEq, Debug)]
struct Statement<'a> {
  line     : usize,
  label    : Option<&'a str>,
  prefixes : Vec<u8>,
  body     : Body<'a>
}

fn parse_arguments<'a, I>(line: usize, tokens: I) -> Result<Vec<Argument<'a>>>
  where I: Iterator<Item = Token<'a>>
{
  let mut arguments = Vec::new();
  let mut expecting = true;
  for token in tokens {
    match (expecting, token) {
      (true, Token::Number(n))  => arguments.push(Argument::Number(n)),
      (true, Token::Char(c))    => arguments.push(Argument::Number(c as usize)),
      (true, Token::Str(text))  => arguments.push(Argument::Text(text)),
      (true, Token::Word(name)) => arguments.push(Argument::Label(name)),
      (false, Token::Comma)     => {
        expecting = true;
        continue;
      }
      (true, Token::Comma)      => return Err(Error::assembly(line, "missing argument before `,`")),
      (false, token)            => return Err(Error::assembly(line, format!("expected `,` before {}", token))),
      (true, token)             => return Err(Error::assembly(line, format!("{} is not an argument", token)))
    }
    expecting = false;
  }
  if expecting && !arguments.is_empty() {
    return Err(Error::assembly(line, "trailing `,`"));
  }
  Ok(arguments)
}

/// `name value` with no separator, the arguments of `.property` and `.module`.
fn parse_property<'a, I>(line: usize, mut tokens: I) -> Result<Vec<Argument<'a>>>
  where I: Iterator<Item = Token<'a>>
{
  let name = match tokens.next() {
    Some(Token::Word(name)) => name,
    _ => return Err(Error::assembly(line, "a property takes a name and a value"))
  };
  let value = match tokens.next() {
    Some(Token::Number(n))    => Argument::Number(n),
    Some(Token::Char(c))      => Argument::Number(c as usize),
    Some(Token::Str(text))    => Argument::Text(text),
    Some(Token::Word(word))   => Argument::Label(word),
    Some(token)               => {
      return Err(Error::assembly(line, format!("{} is not a property value", token)));
    }
    None                      => {
      return Err(Error::assembly(line, format!("property `{}` has no value", name)));
    }
  };
  if let Some(token) = tokens.next() {
    return Err(Error::assembly(line, format!("unexpected {} after the value of `{}`", token, name)));
  }
  Ok(vec![Argument::Label(name), value])
}

fn parse_statement(line: usize, tokens: Vec<Token>) -> Result<Statement> {
  let mut tokens = tokens.into_iter().peekable();

  let label = match tokens.peek() {
    Some(&Token::Label(name)) => {
      tokens.next();
      Some(name)
    }
    _ => None
  };

  let mut prefixes = Vec::new();
  while let Some(&Token::Prefix(byte)) = tokens.peek() {
    tokens.next();
    if !is_conditional(byte) {
      return Err(Error::assembly(line, format!("?{:02X} is not a conditional prefix", byte)));
    }
    prefixes.push(byte);
  }

  let body = match tokens.next() {
    None => Body::Empty,

    Some(Token::Word(mnemonic)) => {
      let opcode = Opcode::from_str(&mnemonic.to_ascii_uppercase()).map_err(|_| {
        Error::assembly(line, format!("{} is not an operation", mnemonic))
      })?;
      Body::Instruction { opcode, arguments: parse_arguments(line, tokens)? }
    }

    Some(Token::Directive(name)) => {
      let arguments = match name {
        "property" | "module" => parse_property(line, tokens)?,
        _                     => parse_arguments(line, tokens)?
      };
      Body::Directive { name, arguments }
    }

    Some(token) => {
      return Err(Error::assembly(line, format!("expected an operation or directive, found {}", token)));
    }
  };

  match body {
    Body::Instruction { .. } => {}
    _ if !prefixes.is_empty() => {
      return Err(Error::assembly(line, "conditional prefixes must precede an instruction"));
    }
    _ => {}
  }

  Ok(Statement { line, label, prefixes, body })
}

// endregion

// region Assembler

struct Assembler<'a> {
  statements        : Vec<Statement<'a>>,
  symbols           : SymbolTable,
  module_properties : TextTable,
  code_properties   : TextTable,
  data_properties   : TextTable,
  code_width        : AddressWidth,
  data_width        : AddressWidth
}

/// Which page the statements being processed fill.
fn switch_section(current: Section, statement: &Statement) -> Section {
  match &statement.body {
    Body::Directive { name: "code", .. } => Section::Code,
    Body::Directive { name: "data", .. } => Section::Data,
    _                                    => current
  }
}

fn property_record(line: usize, arguments: &[Argument]) -> Result<(String, String)> {
  match arguments {
    [Argument::Label(name), value] => {
      let value = match value {
        Argument::Number(n)   => n.to_string(),
        Argument::Label(word) => word.to_string(),
        Argument::Text(text)  => text.clone()
      };
      Ok((name.to_string(), value))
    }
    _ => Err(Error::assembly(line, "a property takes a name and a value"))
  }
}

impl<'a> Assembler<'a> {

  fn new(source: &'a str) -> Result<Assembler<'a>> {
    let mut statements = Vec::new();
    for (index, text) in source.lines().enumerate() {
      let line = index + 1;
      statements.push(parse_statement(line, lex(line, text)?)?);
    }

    let mut module_properties = TextTable::new();
    let mut code_properties   = TextTable::new();
    let mut data_properties   = TextTable::new();
    let mut section           = Section::Code;
    for statement in &statements {
      section = switch_section(section, statement);
      if let Body::Directive { name, arguments } = &statement.body {
        match *name {
          "module"   => {
            let (name, value) = property_record(statement.line, arguments)?;
            module_properties.push(name, value);
          }
          "property" => {
            let (name, value) = property_record(statement.line, arguments)?;
            match section {
              Section::Code => code_properties.push(name, value),
              Section::Data => data_properties.push(name, value)
            }
          }
          _ => {}
        }
      }
    }

    Ok(Assembler {
      statements,
      symbols     : SymbolTable::new(),
      code_width  : width_from_properties(&code_properties)?,
      data_width  : width_from_properties(&data_properties)?,
      module_properties,
      code_properties,
      data_properties,
    })
  }

  fn width(&self, section: Section) -> AddressWidth {
    match section {
      Section::Code => self.code_width,
      Section::Data => self.data_width
    }
  }

  fn statement_size(&self, section: Section, statement: &Statement) -> Result<usize> {
    match &statement.body {
      Body::Empty => Ok(0),

      Body::Instruction { opcode, .. } => {
        Ok(statement.prefixes.len() + opcode.len(self.code_width, self.data_width))
      }

      Body::Directive { name, arguments } => {
        match *name {
          "byte"   => Ok(arguments.len()),
          "word"   => Ok(2 * arguments.len()),
          "addr"   => Ok(self.width(section).bytes() * arguments.len()),
          "string" => {
            Ok(arguments.iter()
                        .map(|a| match a {
                          Argument::Text(text) => text.len() + 1,
                          _                    => 0
                        })
                        .sum())
          }
          "code" | "data" | "property" | "module" | "export" => Ok(0),
          _ => Err(Error::assembly(statement.line, format!("unknown directive `.{}`", name)))
        }
      }
    }
  }

  /// Pass one: assigns every label its page and offset.
  fn layout(&mut self) -> Result<()> {
    let mut symbols = SymbolTable::new();
    let mut section = Section::Code;
    let mut code_offset: AddressNumberType = 0;
    let mut data_offset: AddressNumberType = 0;

    for statement in &self.statements {
      section = switch_section(section, statement);
      let offset = match section {
        Section::Code => &mut code_offset,
        Section::Data => &mut data_offset
      };

      if let Some(label) = statement.label {
        let symbol = Symbol { section, offset: *offset, line: statement.line };
        if let Err(existing) = symbols.insert(label, symbol) {
          return Err(Error::assembly(
            statement.line,
            format!("label `{}` is already defined on line {}", label, existing.line)
          ));
        }
      }

      *offset += self.statement_size(section, statement)?;
      let limit = match section {
        Section::Code => self.code_width.max_value(),
        Section::Data => self.data_width.max_value()
      };
      if *offset > limit {
        return Err(Error::assembly(
          statement.line,
          format!("the {} page is full: {} bytes is more than {}", section, offset, limit)
        ));
      }
    }

    debug!(code = code_offset, data = data_offset, labels = symbols.len(), "laid out module");
    self.symbols = symbols;
    Ok(())
  }

  /// The value of a numeric or label argument. Labels must belong to `section` when one is given.
  fn resolve(&self, line: usize, argument: &Argument, section: Option<Section>)
    -> Result<AddressNumberType>
  {
    match argument {
      Argument::Number(n)  => Ok(*n),
      Argument::Text(text) => Err(Error::assembly(line, format!("expected a number, found {:?}", text))),
      Argument::Label(name) => {
        let symbol = self.symbols.get(name).ok_or_else(|| {
          Error::assembly(line, format!("undefined label `{}`", name))
        })?;
        match section {
          Some(section) if section != symbol.section => Err(Error::assembly(
            line,
            format!("label `{}` is in the {} page, not the {} page", name, symbol.section, section)
          )),
          _ => Ok(symbol.offset)
        }
      }
    }
  }

  fn emit_value(&self, line: usize, value: AddressNumberType, width: AddressWidth, out: &mut Vec<u8>)
    -> Result<()>
  {
    let bytes = width.encode(value).map_err(|_| {
      Error::assembly(line, format!("{} does not fit in {} byte(s)", value, width.bytes()))
    })?;
    out.extend_from_slice(&bytes);
    Ok(())
  }

  fn emit_instruction(&self, statement: &Statement, opcode: Opcode, arguments: &[Argument],
                      out: &mut Vec<u8>) -> Result<()>
  {
    let line = statement.line;
    let expected = match opcode.operand() {
      Operand::None => 0,
      _             => 1
    };
    if arguments.len() != expected {
      return Err(Error::assembly(line, format!(
        "{} requires {} argument(s) but was given {}", opcode, expected, arguments.len()
      )));
    }

    out.extend_from_slice(&statement.prefixes);
    out.push(opcode.code());
    match opcode.operand() {
      Operand::None          => Ok(()),
      Operand::ImmediateByte => {
        let value = self.resolve(line, &arguments[0], None)?;
        self.emit_value(line, value, AddressWidth::One, out)
      }
      Operand::ImmediateInt  => {
        let value = self.resolve(line, &arguments[0], None)?;
        self.emit_value(line, value, AddressWidth::Two, out)
      }
      Operand::CodeAddress   => {
        let value = self.resolve(line, &arguments[0], Some(Section::Code))?;
        self.emit_value(line, value, self.code_width, out)
      }
      Operand::DataAddress   => {
        let value = self.resolve(line, &arguments[0], Some(Section::Data))?;
        self.emit_value(line, value, self.data_width, out)
      }
    }
  }

  fn emit_directive(&self, section: Section, statement: &Statement, name: &str,
                    arguments: &[Argument], out: &mut Vec<u8>, exports: &mut TextTable)
    -> Result<()>
  {
    let line = statement.line;
    match name {
      "code" | "data" if !arguments.is_empty() => {
        Err(Error::assembly(line, format!("`.{}` takes no arguments", name)))
      }

      "byte" | "word" | "addr" | "string" | "export" if arguments.is_empty() => {
        Err(Error::assembly(line, format!("`.{}` needs at least one argument", name)))
      }

      "byte" => {
        for argument in arguments {
          let value = self.resolve(line, argument, None)?;
          self.emit_value(line, value, AddressWidth::One, out)?;
        }
        Ok(())
      }

      "word" => {
        for argument in arguments {
          let value = self.resolve(line, argument, None)?;
          self.emit_value(line, value, AddressWidth::Two, out)?;
        }
        Ok(())
      }

      "addr" => {
        for argument in arguments {
          let value = self.resolve(line, argument, None)?;
          self.emit_value(line, value, self.width(section), out)?;
        }
        Ok(())
      }

      "string" => {
        for argument in arguments {
          match argument {
            Argument::Text(text) => {
              out.extend_from_slice(text.as_bytes());
              out.push(0);
            }
            _ => return Err(Error::assembly(line, "`.string` takes quoted strings"))
          }
        }
        Ok(())
      }

      "export" => {
        for argument in arguments {
          match argument {
            Argument::Label(label) => {
              let offset = self.resolve(line, argument, Some(Section::Code))?;
              exports.push(*label, offset.to_string());
            }
            _ => return Err(Error::assembly(line, "`.export` takes label names"))
          }
        }
        Ok(())
      }

      // Collected before layout.
      _ => Ok(())
    }
  }

  /// Pass two: emits both pages and the exports.
  fn emit(self) -> Result<Module> {
    let mut code    = Vec::new();
    let mut data    = Vec::new();
    let mut exports = TextTable::new();
    let mut section = Section::Code;

    for statement in &self.statements {
      section = switch_section(section, statement);
      let out = match section {
        Section::Code => &mut code,
        Section::Data => &mut data
      };
      match &statement.body {
        Body::Empty => {}
        Body::Instruction { opcode, arguments } => {
          self.emit_instruction(statement, *opcode, arguments, out)?;
        }
        Body::Directive { name, arguments } => {
          self.emit_directive(section, statement, name, arguments, out, &mut exports)?;
        }
      }
    }

    Ok(Module::new(
      self.module_properties,
      exports,
      CodePage::new(self.code_properties, code)?,
      DataPage::new(self.data_properties, data)?
    ))
  }

}

/// Assembles source text into a module.
pub fn assemble(source: &str) -> Result<Module> {
  let mut assembler = Assembler::new(source)?;
  assembler.layout()?;
  assembler.emit()
}

// endregion
