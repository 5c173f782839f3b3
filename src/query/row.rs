//! Result rows of column queries

use std::fmt;
use std::ops::Index;
use std::rc::Rc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::Datum;

/// One row of a column query: values addressable by position or key
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    keys: Rc<[String]>,
    values: Vec<Datum>,
}

impl Row {
    pub(crate) fn new(keys: Rc<[String]>, values: Vec<Datum>) -> Self {
        Self { keys, values }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Datum> {
        self.values
    }

    /// Value by key (column name or label)
    pub fn get(&self, key: &str) -> Option<&Datum> {
        self.keys.iter().position(|k| k == key).and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Index<usize> for Row {
    type Output = Datum;

    fn index(&self, index: usize) -> &Datum {
        &self.values[index]
    }
}

/// Tuple form: `('chocolate chip', 12)`, `(3,)`
impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(Datum::repr).collect();
        if parts.len() == 1 {
            write!(f, "({},)", parts[0])
        } else {
            write!(f, "({})", parts.join(", "))
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (key, value) in self.keys.iter().zip(&self.values) {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
