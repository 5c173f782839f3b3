//! SQLite engine - the single connection every session talks through

use std::path::Path;
use std::rc::Rc;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};

use crate::Result;
use crate::config::CookiejarConfig;
use crate::types::{Datum, SqlType};

/// Target of logged statements when echo is on
pub const SQL_TARGET: &str = "cookiejar::sql";

struct Inner {
    conn: Connection,
    echo: bool,
}

/// A connection to the relational store
///
/// Cloning an engine shares the connection, which matters for `:memory:`
/// databases where every new connection would be a different database.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<Inner>,
}

impl Engine {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path, echo: bool) -> Result<Self> {
        Self::from_connection(Connection::open(path)?, echo)
    }

    /// Open an in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, false)
    }

    /// Open the database named by a config (`:memory:` or a file path)
    pub fn from_config(config: &CookiejarConfig) -> Result<Self> {
        let database = config.database.as_deref().unwrap_or(":memory:");
        let echo = config.echo.unwrap_or(false);
        if database == ":memory:" {
            Self::from_connection(Connection::open_in_memory()?, echo)
        } else {
            Self::open(Path::new(database), echo)
        }
    }

    fn from_connection(conn: Connection, echo: bool) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        tracing::debug!("Engine connected (echo: {})", echo);
        Ok(Self {
            inner: Rc::new(Inner {
                conn,
                echo,
            }),
        })
    }

    /// Whether statements are logged
    pub fn echo(&self) -> bool {
        self.inner.echo
    }

    fn log(&self, sql: &str, params: &[Datum]) {
        if self.inner.echo {
            let rendered: Vec<String> = params.iter().map(Datum::repr).collect();
            tracing::info!(target: SQL_TARGET, "{}", sql.trim());
            tracing::info!(target: SQL_TARGET, "[{}]", rendered.join(", "));
        } else {
            tracing::trace!(target: SQL_TARGET, "{}", sql.trim());
        }
    }

    /// Run one or more statements without parameters
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.log(sql, &[]);
        self.inner.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run one statement, returning the number of affected rows
    pub fn execute(&self, sql: &str, params: &[Datum]) -> Result<usize> {
        self.log(sql, params);
        let mut stmt = self.inner.conn.prepare_cached(sql)?;
        let changed = stmt.execute(params_from_iter(params.iter().map(Datum::to_sql_value)))?;
        Ok(changed)
    }

    /// Run an INSERT and return the generated rowid
    pub fn insert(&self, sql: &str, params: &[Datum]) -> Result<i64> {
        self.execute(sql, params)?;
        Ok(self.inner.conn.last_insert_rowid())
    }

    /// Run a SELECT, decoding each column by its expected type
    pub fn query(&self, sql: &str, params: &[Datum], types: &[Option<SqlType>]) -> Result<Vec<Vec<Datum>>> {
        self.log(sql, params);
        let mut stmt = self.inner.conn.prepare_cached(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter().map(Datum::to_sql_value)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let raw: Value = row.get(i)?;
                values.push(Datum::decode(raw, types.get(i).copied().flatten())?);
            }
            out.push(values);
        }
        Ok(out)
    }

    pub fn in_transaction(&self) -> bool {
        !self.inner.conn.is_autocommit()
    }

    pub fn begin(&self) -> Result<()> {
        if !self.in_transaction() {
            self.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        if self.in_transaction() {
            self.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        if self.in_transaction() {
            self.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Whether a table exists in the store
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let rows = self.query(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[Datum::from(name)],
            &[Some(SqlType::Integer)],
        )?;
        Ok(rows.first().and_then(|r| r.first()).and_then(Datum::as_i64).unwrap_or(0) > 0)
    }
}
