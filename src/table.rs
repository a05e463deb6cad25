//! Name/value tables, used for module properties, page properties, and exports.

use std::fmt::{Display, Formatter};

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct NameValue {
  pub name  : String,
  pub value : String
}

impl NameValue {
  pub fn new(name: impl Into<String>, value: impl Into<String>) -> NameValue {
    NameValue { name: name.into(), value: value.into() }
  }
}

impl Display for NameValue {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}={}", self.name, self.value)
  }
}

/**
  An order-preserving list of records. Names are not required to be unique; `get` returns the
  value of the last record with a matching name.
*/
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct TextTable {
  records: Vec<NameValue>
}

impl TextTable {
  pub fn new() -> TextTable {
    TextTable::default()
  }

  pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.records.push(NameValue::new(name, value));
  }

  /// Last match wins.
  pub fn get(&self, name: &str) -> Option<&str> {
    self.records
        .iter()
        .rev()
        .find(|record| record.name == name)
        .map(|record| record.value.as_str())
  }

  pub fn iter(&self) -> std::slice::Iter<'_, NameValue> {
    self.records.iter()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

impl From<Vec<NameValue>> for TextTable {
  fn from(records: Vec<NameValue>) -> TextTable {
    TextTable { records }
  }
}

impl<'a> IntoIterator for &'a TextTable {
  type Item = &'a NameValue;
  type IntoIter = std::slice::Iter<'a, NameValue>;

  fn into_iter(self) -> Self::IntoIter {
    self.records.iter()
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn last_match_wins() {
    let mut table = TextTable::new();
    table.push("main", "0");
    table.push("other", "4");
    table.push("main", "7");
    assert_eq!(table.get("main"), Some("7"));
    assert_eq!(table.get("other"), Some("4"));
    assert_eq!(table.get("missing"), None);
    assert_eq!(table.len(), 3);
  }

  #[test]
  fn preserves_order() {
    let table: TextTable = vec![NameValue::new("b", "1"), NameValue::new("a", "2")].into();
    let names: Vec<&str> = table.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["b", "a"]);
  }
}
