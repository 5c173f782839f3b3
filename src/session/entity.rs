//! The mapping contract between a Rust struct and a table row

use std::fmt;
use std::rc::Rc;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use super::handle::Tracked;
use crate::schema::Table;
use crate::types::Datum;
use crate::{Error, Result};

/// A struct mapped onto one table.
///
/// Values are exchanged in the table's column declaration order:
/// `values` yields every column except the identity column, and
/// `from_values` receives every column including it.
pub trait Entity: fmt::Debug + Sized + 'static {
    fn table() -> &'static Table;

    /// Identity assigned by the store, `None` until flushed
    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: Option<i64>);

    /// Data column values, identity column excluded
    fn values(&self) -> Vec<Datum>;

    /// Rebuild from a full row
    fn from_values(values: Vec<Datum>) -> Result<Self>;

    /// Called right before the INSERT is issued
    fn before_insert(&mut self) {}

    /// Called right before an UPDATE is issued for a modified object
    fn before_update(&mut self) {}

    /// Many-to-one parents that must be inserted first (save-update cascade)
    fn parents(&self) -> Vec<Rc<dyn Tracked>> {
        Vec::new()
    }
}

/// Sequential typed access to the values of one row
pub struct ValueReader {
    table: &'static str,
    values: std::vec::IntoIter<Datum>,
}

impl ValueReader {
    pub fn new(table: &'static Table, values: Vec<Datum>) -> Result<Self> {
        if values.len() != table.columns.len() {
            return Err(Error::Decode(format!(
                "{} expects {} columns, got {}",
                table.name,
                table.columns.len(),
                values.len()
            )));
        }
        Ok(Self {
            table: table.name,
            values: values.into_iter(),
        })
    }

    fn next(&mut self) -> Result<Datum> {
        self.values
            .next()
            .ok_or_else(|| Error::Decode(format!("row for {} ended early", self.table)))
    }

    fn mismatch(&self, expected: &str, got: &Datum) -> Error {
        Error::Decode(format!("{}: expected {}, got {:?}", self.table, expected, got))
    }

    pub fn int(&mut self) -> Result<Option<i64>> {
        match self.next()? {
            Datum::Null => Ok(None),
            d => d.as_i64().map(Some).ok_or_else(|| self.mismatch("integer", &d)),
        }
    }

    pub fn text(&mut self) -> Result<Option<String>> {
        match self.next()? {
            Datum::Null => Ok(None),
            Datum::Text(s) => Ok(Some(s)),
            d => Err(self.mismatch("text", &d)),
        }
    }

    /// Text for a NOT NULL column
    pub fn required_text(&mut self) -> Result<String> {
        self.text()?
            .ok_or_else(|| Error::Decode(format!("{}: unexpected NULL", self.table)))
    }

    pub fn decimal(&mut self) -> Result<Option<Decimal>> {
        match self.next()? {
            Datum::Null => Ok(None),
            d => d.as_decimal().map(Some).ok_or_else(|| self.mismatch("decimal", &d)),
        }
    }

    pub fn boolean(&mut self) -> Result<Option<bool>> {
        match self.next()? {
            Datum::Null => Ok(None),
            d => d.as_bool().map(Some).ok_or_else(|| self.mismatch("boolean", &d)),
        }
    }

    pub fn datetime(&mut self) -> Result<Option<NaiveDateTime>> {
        match self.next()? {
            Datum::Null => Ok(None),
            d => d.as_datetime().map(Some).ok_or_else(|| self.mismatch("datetime", &d)),
        }
    }
}
