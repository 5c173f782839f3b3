//! Column types and dynamically typed values
//!
//! Every value crossing the SQLite boundary is a [`Datum`]. Decoding is driven
//! by the expected [`SqlType`] of the selected column or expression, so a
//! `NUMERIC(12, 2)` column comes back as a [`Decimal`] with two places and a
//! `BOOLEAN` column as a `bool`, even though SQLite stores them as REAL and
//! INTEGER.

use crate::{Error, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::fmt;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Integer,
    Numeric { precision: u8, scale: u8 },
    String { length: u16 },
    DateTime,
    Boolean,
}

impl SqlType {
    /// DDL spelling of the type
    pub fn ddl(&self) -> String {
        match self {
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::Numeric { precision, scale } => format!("NUMERIC({}, {})", precision, scale),
            SqlType::String { length } => format!("VARCHAR({})", length),
            SqlType::DateTime => "DATETIME".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ddl())
    }
}

/// A single SQL value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Datum {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Numeric(Decimal),
    Boolean(bool),
    DateTime(NaiveDateTime),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Integer(v) => Some(*v),
            Datum::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Datum::Numeric(d) => Some(*d),
            Datum::Integer(v) => Some(Decimal::from(*v)),
            Datum::Real(v) => Decimal::from_f64_retain(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Boolean(b) => Some(*b),
            Datum::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Datum::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Literal form used inside tuples: strings are quoted
    pub fn repr(&self) -> String {
        match self {
            Datum::Text(s) => quote(s),
            Datum::DateTime(dt) => format!("'{}'", dt.format(DATETIME_FORMAT)),
            other => other.to_string(),
        }
    }

    /// Encode for binding as a statement parameter
    pub fn to_sql_value(&self) -> Value {
        match self {
            Datum::Null => Value::Null,
            Datum::Integer(v) => Value::Integer(*v),
            Datum::Real(v) => Value::Real(*v),
            Datum::Text(s) => Value::Text(s.clone()),
            // NUMERIC affinity stores decimals as REAL; bind the same way so
            // comparisons and arithmetic stay numeric.
            Datum::Numeric(d) => d.to_f64().map_or(Value::Null, Value::Real),
            Datum::Boolean(b) => Value::Integer(i64::from(*b)),
            Datum::DateTime(dt) => Value::Text(dt.format(DATETIME_FORMAT).to_string()),
        }
    }

    /// Decode a raw SQLite value, guided by the expected type when known
    pub fn decode(value: Value, expected: Option<SqlType>) -> Result<Self> {
        let datum = match (value, expected) {
            (Value::Null, _) => Datum::Null,
            (Value::Integer(v), Some(SqlType::Boolean)) => Datum::Boolean(v != 0),
            (Value::Integer(v), Some(SqlType::Numeric { scale, .. })) => {
                Datum::Numeric(with_scale(Decimal::from(v), scale))
            }
            (Value::Real(v), Some(SqlType::Numeric { scale, .. })) => {
                let d = Decimal::from_f64_retain(v)
                    .ok_or_else(|| Error::Decode(format!("{} does not fit a decimal", v)))?;
                Datum::Numeric(with_scale(d, scale))
            }
            (Value::Real(v), Some(SqlType::Integer)) => Datum::Integer(v as i64),
            (Value::Text(s), Some(SqlType::DateTime)) => Datum::DateTime(parse_datetime(&s)?),
            (Value::Text(s), Some(SqlType::Numeric { scale, .. })) => {
                let d: Decimal = s
                    .parse()
                    .map_err(|e| Error::Decode(format!("invalid decimal {:?}: {}", s, e)))?;
                Datum::Numeric(with_scale(d, scale))
            }
            (Value::Integer(v), _) => Datum::Integer(v),
            (Value::Real(v), _) => Datum::Real(v),
            (Value::Text(s), _) => Datum::Text(s),
            (Value::Blob(_), _) => return Err(Error::Decode("blob values are not supported".into())),
        };
        Ok(datum)
    }
}

/// Quote like a Python string repr: single quotes unless the text holds a
/// single quote and no double quote
fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\");
    if s.contains('\'') && !s.contains('"') {
        format!("\"{}\"", escaped)
    } else {
        format!("'{}'", escaped.replace('\'', "\\'"))
    }
}

/// Floats keep a fractional part: `1.0`, not `1`
fn float_repr(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

fn with_scale(d: Decimal, scale: u8) -> Decimal {
    let mut d = d.round_dp(u32::from(scale));
    d.rescale(u32::from(scale));
    d
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| Error::Decode(format!("invalid datetime {:?}: {}", s, e)))
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "None"),
            Datum::Integer(v) => write!(f, "{}", v),
            Datum::Real(v) => write!(f, "{}", float_repr(*v)),
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Numeric(d) => write!(f, "{}", d),
            Datum::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Datum::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Integer(v)
    }
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Datum::Integer(i64::from(v))
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Real(v)
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Boolean(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Text(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::Text(v)
    }
}

impl From<Decimal> for Datum {
    fn from(v: Decimal) -> Self {
        Datum::Numeric(v)
    }
}

impl From<NaiveDateTime> for Datum {
    fn from(v: NaiveDateTime) -> Self {
        Datum::DateTime(v)
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map_or(Datum::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONEY: SqlType = SqlType::Numeric { precision: 12, scale: 2 };

    #[test]
    fn test_numeric_decodes_with_two_places() {
        let d = Datum::decode(Value::Real(0.5), Some(MONEY)).unwrap();
        assert_eq!(d.to_string(), "0.50");

        let d = Datum::decode(Value::Integer(6), Some(MONEY)).unwrap();
        assert_eq!(d.to_string(), "6.00");
    }

    #[test]
    fn test_boolean_and_null_decoding() {
        assert_eq!(Datum::decode(Value::Integer(0), Some(SqlType::Boolean)).unwrap(), Datum::Boolean(false));
        assert!(Datum::decode(Value::Null, Some(SqlType::Integer)).unwrap().is_null());
    }

    #[test]
    fn test_datetime_text_roundtrip() {
        let dt = NaiveDateTime::parse_from_str("2024-03-01 10:11:12", "%Y-%m-%d %H:%M:%S").unwrap();
        let encoded = Datum::DateTime(dt).to_sql_value();
        let decoded = Datum::decode(encoded, Some(SqlType::DateTime)).unwrap();
        assert_eq!(decoded.as_datetime(), Some(dt));
    }

    #[test]
    fn test_repr_quotes_text() {
        assert_eq!(Datum::from("chip").repr(), "'chip'");
        assert_eq!(Datum::from(12).repr(), "12");
        assert_eq!(Datum::Null.repr(), "None");
    }

    #[test]
    fn test_repr_quotes_like_python() {
        assert_eq!(Datum::from("O'Brien").repr(), "\"O'Brien\"");
        assert_eq!(Datum::from("say \"hi\" it's").repr(), "'say \"hi\" it\\'s'");
        assert_eq!(Datum::from("a\\b").repr(), "'a\\\\b'");
    }

    #[test]
    fn test_real_keeps_fraction() {
        assert_eq!(Datum::Real(1.0).to_string(), "1.0");
        assert_eq!(Datum::Real(-3.0).repr(), "-3.0");
        assert_eq!(Datum::Real(0.25).to_string(), "0.25");
    }

    #[test]
    fn test_ddl() {
        assert_eq!(MONEY.ddl(), "NUMERIC(12, 2)");
        assert_eq!(SqlType::String { length: 50 }.ddl(), "VARCHAR(50)");
    }
}
