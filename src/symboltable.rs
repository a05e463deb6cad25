use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use crate::address::AddressNumberType;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Section {
  Code,
  Data
}

impl Display for Section {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Section::Code => write!(f, "code"),
      Section::Data => write!(f, "data")
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Symbol {
  pub section : Section,
  pub offset  : AddressNumberType,
  /// Source line of the definition.
  pub line    : usize
}

/**
  Maps label names to the page and offset they mark. Names are interned, since every label is
  looked up once per reference during emission. Several labels may mark the same location, but
  a name can only be defined once.
*/
#[derive(Default)]
pub struct SymbolTable {
  table: HashMap<DefaultAtom, Symbol>
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable::default()
  }

  pub fn get(&self, name: &str) -> Option<Symbol> {
    self.table.get(&DefaultAtom::from(name)).copied()
  }

  /// Returns the existing definition instead of overwriting it.
  pub fn insert(&mut self, name: &str, symbol: Symbol) -> Result<(), Symbol> {
    let atom = DefaultAtom::from(name);
    match self.table.get(&atom) {
      Some(existing) => Err(*existing),
      None           => {
        self.table.insert(atom, symbol);
        Ok(())
      }
    }
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_no_overwrite() {
    let mut symbols = SymbolTable::new();
    let first = Symbol { section: Section::Code, offset: 0, line: 1 };
    assert!(symbols.insert("main", first).is_ok());
    assert!(symbols.insert("alias", first).is_ok());
    assert_eq!(
      symbols.insert("main", Symbol { section: Section::Data, offset: 4, line: 9 }),
      Err(first)
    );
    assert_eq!(symbols.get("main"), Some(first));
    assert_eq!(symbols.get("nothing"), None);
    assert_eq!(symbols.len(), 2);
  }
}
