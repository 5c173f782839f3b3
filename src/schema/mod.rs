//! Schema layer - declarative table mappings
//!
//! Tables are declared as `static` [`Table`] values built from `const`
//! [`Column`]s, so a column can be used directly inside query expressions:
//! - `Column`: name, type, constraints and an optional foreign-key target
//! - `Table`: ordered columns, the first primary-key column is the identity
//! - `Metadata`: ordered registry that emits DDL (`create_all`)

pub mod ddl;

use crate::session::Engine;
use crate::types::SqlType;
use crate::{Error, Result};

/// Target of a foreign key (`table.column`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
}

/// A mapped column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    pub table: &'static str,
    pub name: &'static str,
    pub ty: SqlType,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
    pub index: bool,
    pub references: Option<ForeignKey>,
}

impl Column {
    /// A nullable column without constraints
    pub const fn new(table: &'static str, name: &'static str, ty: SqlType) -> Self {
        Self {
            table,
            name,
            ty,
            primary_key: false,
            nullable: true,
            unique: false,
            index: false,
            references: None,
        }
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn indexed(mut self) -> Self {
        self.index = true;
        self
    }

    pub const fn references(mut self, table: &'static str, column: &'static str) -> Self {
        self.references = Some(ForeignKey { table, column });
        self
    }

    /// Qualified name as rendered in SQL
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }
}

/// A mapped table
#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
}

impl Table {
    /// The identity column
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Find a column by its unqualified name
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownColumn(format!("{}.{}", self.name, name)))
    }

    /// Columns other than the identity column, in declaration order
    pub fn data_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    /// Foreign-key columns of this table pointing at `target`
    pub fn foreign_keys_to(&self, target: &str) -> Vec<(&Column, ForeignKey)> {
        self.columns
            .iter()
            .filter_map(|c| c.references.filter(|fk| fk.table == target).map(|fk| (c, fk)))
            .collect()
    }
}

/// Ordered registry of mapped tables
#[derive(Debug, Default)]
pub struct Metadata {
    tables: Vec<&'static Table>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table; registering the same table twice is a no-op
    pub fn register(&mut self, table: &'static Table) -> &mut Self {
        if !self.tables.iter().any(|t| t.name == table.name) {
            self.tables.push(table);
        }
        self
    }

    pub fn tables(&self) -> &[&'static Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&'static Table> {
        self.tables.iter().copied().find(|t| t.name == name)
    }

    /// All DDL statements, tables first then indexes
    pub fn ddl(&self) -> Vec<String> {
        let mut stmts: Vec<String> = self.tables.iter().map(|t| ddl::create_table(t)).collect();
        stmts.extend(self.tables.iter().flat_map(|t| ddl::create_indexes(t)));
        stmts
    }

    /// Create every registered table that does not exist yet
    pub fn create_all(&self, engine: &Engine) -> Result<()> {
        for stmt in self.ddl() {
            engine.execute_batch(&stmt)?;
        }
        tracing::debug!("Schema ready ({} tables)", self.tables.len());
        Ok(())
    }
}
