//! SELECT statement model and compiler

use crate::expr::{Expr, Operators, OrderBy, SelectItem, SqlWriter};
use crate::schema::Table;
use crate::types::{Datum, SqlType};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct Join {
    pub table: &'static str,
    pub on: Expr,
    pub outer: bool,
}

/// A SELECT statement under construction
#[derive(Debug, Clone, Default)]
pub struct Select {
    pub items: Vec<SelectItem>,
    /// Explicit root table; otherwise the first table the items mention
    pub root: Option<&'static str>,
    pub joins: Vec<Join>,
    pub filters: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Compiled statement with its parameters and expected result types
#[derive(Debug, Clone)]
pub struct Compiled {
    pub sql: String,
    pub params: Vec<Datum>,
    pub types: Vec<Option<SqlType>>,
}

impl Select {
    pub fn new(items: Vec<SelectItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Root table of the FROM clause
    pub fn root_table(&self) -> Option<&'static str> {
        self.root.or_else(|| {
            let mut tables = Vec::new();
            for item in &self.items {
                item.expr.tables(&mut tables);
            }
            tables.first().copied()
        })
    }

    /// Tables already part of the FROM clause (root and joins)
    fn joined_tables(&self) -> Vec<&'static str> {
        let mut tables: Vec<&'static str> = self.root_table().into_iter().collect();
        tables.extend(self.joins.iter().map(|j| j.table));
        tables
    }

    /// Join `target`, inferring the ON clause from declared foreign keys.
    ///
    /// `lookup` resolves table names already in the query to their mappings.
    pub fn join_inferred(
        &self,
        target: &'static Table,
        lookup: impl Fn(&str) -> Option<&'static Table>,
        outer: bool,
    ) -> Result<Self> {
        let mut candidates: Vec<Expr> = Vec::new();
        for existing in self.joined_tables() {
            // target -> existing
            for (column, fk) in target.foreign_keys_to(existing) {
                if let Some(parent) = lookup(existing) {
                    let referenced = parent.column(fk.column)?;
                    candidates.push((*column).equals(*referenced));
                }
            }
            // existing -> target
            if let Some(child) = lookup(existing) {
                for (column, fk) in child.foreign_keys_to(target.name) {
                    let referenced = target.column(fk.column)?;
                    candidates.push((*referenced).equals(*column));
                }
            }
        }

        match candidates.len() {
            1 => Ok(self.join_on(target.name, candidates.remove(0), outer)),
            0 => Err(Error::InvalidJoin(format!(
                "no foreign key links {} to {}",
                target.name,
                self.joined_tables().join(", ")
            ))),
            n => Err(Error::InvalidJoin(format!(
                "{} foreign keys link {} to the query; use an explicit ON clause",
                n, target.name
            ))),
        }
    }

    pub fn join_on(&self, table: &'static str, on: Expr, outer: bool) -> Self {
        let mut next = self.clone();
        next.joins.push(Join { table, on, outer });
        next
    }

    /// Tables mentioned anywhere but not joined; they are cross joined
    fn implicit_tables(&self) -> Vec<&'static str> {
        let mut mentioned = Vec::new();
        for item in &self.items {
            item.expr.tables(&mut mentioned);
        }
        for e in self.filters.iter().chain(&self.group_by) {
            e.tables(&mut mentioned);
        }
        for o in &self.order_by {
            o.expr.tables(&mut mentioned);
        }
        let joined = self.joined_tables();
        mentioned.retain(|t| !joined.contains(t));
        mentioned
    }

    pub fn compile(&self) -> Result<Compiled> {
        let root = self
            .root_table()
            .ok_or_else(|| Error::InvalidJoin("query selects from no table".into()))?;

        let mut w = SqlWriter::new();
        w.push("SELECT ");
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            item.expr.render(&mut w);
            if let Some(label) = &item.label {
                w.push(" AS ");
                w.push(label);
            }
        }

        w.push("\nFROM ");
        w.push(root);
        for join in &self.joins {
            w.push(if join.outer { " LEFT OUTER JOIN " } else { " JOIN " });
            w.push(join.table);
            w.push(" ON ");
            join.on.render(&mut w);
        }
        for table in self.implicit_tables() {
            w.push(", ");
            w.push(table);
        }

        if !self.filters.is_empty() {
            w.push("\nWHERE ");
            let condition = if self.filters.len() == 1 {
                self.filters[0].clone()
            } else {
                Expr::And(self.filters.clone())
            };
            condition.render(&mut w);
        }

        if !self.group_by.is_empty() {
            w.push("\nGROUP BY ");
            for (i, e) in self.group_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                e.render(&mut w);
            }
        }

        if !self.order_by.is_empty() {
            w.push("\nORDER BY ");
            for (i, o) in self.order_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                o.expr.render(&mut w);
                if o.descending {
                    w.push(" DESC");
                }
            }
        }

        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                w.push("\nLIMIT ");
                w.bind(Datum::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
                if let Some(offset) = offset {
                    w.push(" OFFSET ");
                    w.bind(Datum::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
                }
            }
            (None, Some(offset)) => {
                w.push("\nLIMIT -1 OFFSET ");
                w.bind(Datum::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
            }
            (None, None) => {}
        }

        Ok(Compiled {
            sql: w.sql,
            params: w.params,
            types: self.items.iter().map(|i| i.expr.sql_type()).collect(),
        })
    }

    /// `SELECT count(*)` over this statement
    pub fn compile_count(&self) -> Result<Compiled> {
        let inner = self.compile()?;
        Ok(Compiled {
            sql: format!("SELECT count(*) FROM (\n{}\n) AS anon_1", inner.sql),
            params: inner.params,
            types: vec![Some(SqlType::Integer)],
        })
    }
}
