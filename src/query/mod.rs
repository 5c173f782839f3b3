//! Query facade
//!
//! Queries are generative: every refining method borrows the query and
//! returns a new one, so a base query can be kept and refined several ways.
//! Nothing touches the store until an action (`all`, `first`, `one`,
//! `scalar`, `count`) runs; `Display` shows the SQL that would be sent.

pub mod row;
pub mod select;

pub use row::Row;
pub use select::{Compiled, Join, Select};

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::expr::{Expr, Operators, OrderBy, SelectItem};
use crate::models;
use crate::schema::Table;
use crate::session::{Entity, Handle, Session};
use crate::types::Datum;
use crate::{Error, Result};

/// Query returning mapped objects of type `E`
pub struct Query<'s, E> {
    session: &'s Session,
    select: Select,
    _entity: PhantomData<E>,
}

impl<E> Clone for Query<'_, E> {
    fn clone(&self) -> Self {
        Self {
            session: self.session,
            select: self.select.clone(),
            _entity: PhantomData,
        }
    }
}

impl<'s, E: Entity> Query<'s, E> {
    pub(crate) fn new(session: &'s Session) -> Self {
        let table = E::table();
        let mut select = Select::new(table.columns.iter().map(|c| SelectItem::from(*c)).collect());
        select.root = Some(table.name);
        Self {
            session,
            select,
            _entity: PhantomData,
        }
    }

    fn refine(&self, f: impl FnOnce(&mut Select)) -> Self {
        let mut next = self.clone();
        f(&mut next.select);
        next
    }

    pub fn filter(&self, condition: Expr) -> Self {
        self.refine(|s| s.filters.push(condition))
    }

    /// Equality filter on a column of `E`, by name
    pub fn filter_by(&self, column: &str, value: impl Into<Datum>) -> Result<Self> {
        let column = *E::table().column(column)?;
        Ok(self.filter(column.equals(Expr::Literal(value.into()))))
    }

    pub fn order_by(&self, order: impl Into<OrderBy>) -> Self {
        let order = order.into();
        self.refine(|s| s.order_by.push(order))
    }

    pub fn limit(&self, limit: u64) -> Self {
        self.refine(|s| s.limit = Some(limit))
    }

    pub fn offset(&self, offset: u64) -> Self {
        self.refine(|s| s.offset = Some(offset))
    }

    /// Inner join, ON clause inferred from foreign keys
    pub fn join<T: Entity>(&self) -> Result<Self> {
        self.join_with::<T>(false)
    }

    /// Left outer join, ON clause inferred from foreign keys
    pub fn outerjoin<T: Entity>(&self) -> Result<Self> {
        self.join_with::<T>(true)
    }

    fn join_with<T: Entity>(&self, outer: bool) -> Result<Self> {
        let select = self.select.join_inferred(T::table(), mapped_table, outer)?;
        Ok(Self {
            select,
            ..self.clone()
        })
    }

    pub fn join_on(&self, table: &'static Table, on: Expr) -> Self {
        Self {
            select: self.select.join_on(table.name, on, false),
            ..self.clone()
        }
    }

    pub fn to_sql(&self) -> Result<Compiled> {
        self.select.compile()
    }

    /// Matching objects in row order; rows repeated by a join yield the
    /// object once
    pub fn all(&self) -> Result<Vec<Handle<E>>> {
        self.session.autoflush()?;
        let compiled = self.select.compile()?;
        let rows = self
            .session
            .engine()
            .query(&compiled.sql, &compiled.params, &compiled.types)?;

        let mut seen = HashSet::new();
        let mut handles = Vec::with_capacity(rows.len());
        for values in rows {
            let handle = self.session.resolve::<E>(values)?;
            if seen.insert(handle.id()) {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    /// First result, or `None` when nothing matches
    pub fn first(&self) -> Result<Option<Handle<E>>> {
        Ok(self.limit(1).all()?.into_iter().next())
    }

    /// Exactly one result
    pub fn one(&self) -> Result<Handle<E>> {
        exactly_one(self.all()?, &self.select)
    }

    pub fn count(&self) -> Result<i64> {
        self.session.autoflush()?;
        count(self.session, &self.select)
    }
}

impl<E: Entity> fmt::Display for Query<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_select(&self.select, f)
    }
}

/// Query returning rows of columns and expressions
#[derive(Clone)]
pub struct ColumnQuery<'s> {
    session: &'s Session,
    select: Select,
}

impl<'s> ColumnQuery<'s> {
    pub(crate) fn new(session: &'s Session, items: Vec<SelectItem>) -> Self {
        Self {
            session,
            select: Select::new(items),
        }
    }

    fn refine(&self, f: impl FnOnce(&mut Select)) -> Self {
        let mut next = self.clone();
        f(&mut next.select);
        next
    }

    pub fn filter(&self, condition: Expr) -> Self {
        self.refine(|s| s.filters.push(condition))
    }

    pub fn order_by(&self, order: impl Into<OrderBy>) -> Self {
        let order = order.into();
        self.refine(|s| s.order_by.push(order))
    }

    pub fn group_by(&self, expr: impl Into<Expr>) -> Self {
        let expr = expr.into();
        self.refine(|s| s.group_by.push(expr))
    }

    pub fn limit(&self, limit: u64) -> Self {
        self.refine(|s| s.limit = Some(limit))
    }

    pub fn offset(&self, offset: u64) -> Self {
        self.refine(|s| s.offset = Some(offset))
    }

    /// Select from a specific table instead of the first one mentioned
    pub fn select_from(&self, table: &'static Table) -> Self {
        self.refine(|s| s.root = Some(table.name))
    }

    pub fn join<T: Entity>(&self) -> Result<Self> {
        self.join_with::<T>(false)
    }

    pub fn outerjoin<T: Entity>(&self) -> Result<Self> {
        self.join_with::<T>(true)
    }

    fn join_with<T: Entity>(&self, outer: bool) -> Result<Self> {
        let select = self.select.join_inferred(T::table(), mapped_table, outer)?;
        Ok(Self {
            session: self.session,
            select,
        })
    }

    pub fn join_on(&self, table: &'static Table, on: Expr) -> Self {
        Self {
            session: self.session,
            select: self.select.join_on(table.name, on, false),
        }
    }

    pub fn to_sql(&self) -> Result<Compiled> {
        self.select.compile()
    }

    /// Keys rows are exposed under
    pub fn keys(&self) -> Vec<String> {
        self.select.items.iter().map(SelectItem::key).collect()
    }

    pub fn all(&self) -> Result<Vec<Row>> {
        self.session.autoflush()?;
        let compiled = self.select.compile()?;
        let rows = self
            .session
            .engine()
            .query(&compiled.sql, &compiled.params, &compiled.types)?;
        let keys: Rc<[String]> = Rc::from(self.keys());
        Ok(rows.into_iter().map(|values| Row::new(Rc::clone(&keys), values)).collect())
    }

    pub fn first(&self) -> Result<Option<Row>> {
        Ok(self.limit(1).all()?.into_iter().next())
    }

    pub fn one(&self) -> Result<Row> {
        exactly_one(self.all()?, &self.select)
    }

    /// First column of the single result row.
    ///
    /// `None` when there is no row or the value is NULL; more than one row
    /// is an error.
    pub fn scalar(&self) -> Result<Option<Datum>> {
        let mut rows = self.all()?;
        if rows.len() > 1 {
            return Err(Error::MultipleResultsFound(rows.len()));
        }
        Ok(rows
            .pop()
            .and_then(|row| row.into_values().into_iter().next())
            .filter(|d| !d.is_null()))
    }

    pub fn count(&self) -> Result<i64> {
        self.session.autoflush()?;
        count(self.session, &self.select)
    }
}

impl fmt::Display for ColumnQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_select(&self.select, f)
    }
}

/// Mapped table by name, independent of what the engine has created
fn mapped_table(name: &str) -> Option<&'static Table> {
    models::metadata().table(name)
}

fn exactly_one<T>(mut rows: Vec<T>, select: &Select) -> Result<T> {
    match rows.len() {
        0 => Err(Error::NoResultFound(
            select.root_table().unwrap_or("query").to_string(),
        )),
        1 => Ok(rows.remove(0)),
        n => Err(Error::MultipleResultsFound(n)),
    }
}

fn count(session: &Session, select: &Select) -> Result<i64> {
    let compiled = select.compile_count()?;
    let rows = session.engine().query(&compiled.sql, &compiled.params, &compiled.types)?;
    Ok(rows
        .first()
        .and_then(|r| r.first())
        .and_then(Datum::as_i64)
        .unwrap_or(0))
}

fn display_select(select: &Select, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match select.compile() {
        Ok(compiled) => f.write_str(&compiled.sql),
        Err(e) => write!(f, "<invalid query: {}>", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{desc, func, not_, or_};
    use crate::models::{Cookie, LineItem, Order, User};
    use crate::session::Engine;
    use rust_decimal::Decimal;

    fn session() -> Session {
        let engine = Engine::in_memory().unwrap();
        models::metadata().create_all(&engine).unwrap();
        Session::new(&engine)
    }

    fn seeded() -> Session {
        let session = session();
        session.bulk_save_objects(&crate::walkthrough::sample_cookies()).unwrap();
        session.commit().unwrap();
        session
    }

    fn names(cookies: &[Handle<Cookie>]) -> Vec<String> {
        cookies
            .iter()
            .map(|c| c.borrow().cookie_name.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_base_query_is_reusable() {
        let session = seeded();
        let base = session.query::<Cookie>();
        let chip = base.filter(Cookie::COOKIE_NAME.contains("chip"));
        let many = base.filter(Cookie::QUANTITY.gt(50));

        assert_eq!(base.count().unwrap(), 3);
        assert_eq!(names(&chip.all().unwrap()), ["chocolate chip"]);
        assert_eq!(names(&many.all().unwrap()), ["oatmeal raisin"]);
        assert!(!base.to_string().contains("WHERE"));
    }

    #[test]
    fn test_ordering_and_limits() {
        let session = seeded();
        let by_sku = session.query::<Cookie>().order_by(Cookie::COOKIE_SKU);
        assert_eq!(
            names(&by_sku.all().unwrap()),
            ["chocolate chip", "oatmeal raisin", "peanut butter"]
        );

        let top = session.query::<Cookie>().order_by(desc(Cookie::QUANTITY)).limit(1);
        assert_eq!(names(&top.all().unwrap()), ["oatmeal raisin"]);

        let rest = by_sku.offset(1);
        assert_eq!(names(&rest.all().unwrap()), ["oatmeal raisin", "peanut butter"]);
        assert_eq!(names(&by_sku.limit(1).offset(2).all().unwrap()), ["peanut butter"]);
    }

    #[test]
    fn test_filter_by_unknown_column() {
        let session = seeded();
        let result = session.query::<Cookie>().filter_by("flavour", "mint");
        assert!(matches!(result, Err(Error::UnknownColumn(_))));
    }

    #[test]
    fn test_conjunctions() {
        let session = seeded();
        let either = session
            .query::<Cookie>()
            .filter(or_([
                Cookie::QUANTITY.between(10, 30),
                Cookie::COOKIE_NAME.contains("chip"),
            ]))
            .order_by(Cookie::COOKIE_ID);
        assert_eq!(names(&either.all().unwrap()), ["chocolate chip", "peanut butter"]);

        let listed = session
            .query::<Cookie>()
            .filter(Cookie::COOKIE_SKU.in_list(["EWW01", "PB01"]))
            .order_by(Cookie::COOKIE_ID);
        assert_eq!(names(&listed.all().unwrap()), ["peanut butter", "oatmeal raisin"]);

        let shouting = session
            .query::<Cookie>()
            .filter(Cookie::COOKIE_NAME.ilike("OATMEAL%"));
        assert_eq!(shouting.count().unwrap(), 1);
    }

    #[test]
    fn test_scalar_is_none_without_rows() {
        let session = session();
        let total = session.query_columns([func::sum(Cookie::QUANTITY)]);
        assert_eq!(total.scalar().unwrap(), None);

        let name = session
            .query_columns([Cookie::COOKIE_NAME])
            .filter(Cookie::COOKIE_SKU.equals("nope"));
        assert_eq!(name.scalar().unwrap(), None);
    }

    #[test]
    fn test_scalar_values() {
        let session = seeded();
        let total = session.query_columns([func::sum(Cookie::QUANTITY)]).scalar().unwrap();
        assert_eq!(total, Some(Datum::Integer(124)));

        let cheapest = session.query_columns([func::min(Cookie::UNIT_COST)]).scalar().unwrap();
        assert_eq!(cheapest, Some(Datum::Numeric(Decimal::new(25, 2))));

        let names = session.query_columns([Cookie::COOKIE_NAME]);
        assert!(matches!(names.scalar(), Err(Error::MultipleResultsFound(3))));
    }

    #[test]
    fn test_one_requires_exactly_one_row() {
        let session = seeded();
        let query = session.query::<Cookie>();
        assert!(matches!(query.one(), Err(Error::MultipleResultsFound(3))));
        assert!(matches!(
            query.filter(Cookie::COOKIE_SKU.equals("XX")).one(),
            Err(Error::NoResultFound(_))
        ));
        assert!(query.filter(Cookie::COOKIE_SKU.equals("CC01")).one().is_ok());
    }

    #[test]
    fn test_labelled_rows() {
        let session = seeded();
        let query = session.query_columns([func::sum(Cookie::QUANTITY).label("inventory_count")]);
        assert_eq!(query.keys(), ["inventory_count"]);
        let row = query.one().unwrap();
        assert_eq!(row.get("inventory_count"), Some(&Datum::Integer(124)));
    }

    #[test]
    fn test_outer_join_counts_users_without_orders() {
        let session = session();
        let cookiemon = Handle::new(User::new("cookiemon", "mon@cookie.com", "111-111-1111", "password"));
        let cakeeater = Handle::new(User::new("cakeeater", "cake@cake.com", "222-222-2222", "password"));
        session.add_all(&[cookiemon.clone(), cakeeater.clone()]);
        session.add(&Handle::new(Order::new(&cookiemon)));
        session.add(&Handle::new(Order::new(&cookiemon)));
        session.commit().unwrap();

        let per_user = session
            .query_columns(vec![
                SelectItem::from(User::USERNAME),
                SelectItem::from(func::count(Order::ORDER_ID)),
            ])
            .outerjoin::<Order>()
            .unwrap()
            .group_by(User::USERNAME)
            .order_by(User::USERNAME);
        let rows: Vec<String> = per_user.all().unwrap().iter().map(Row::to_string).collect();
        assert_eq!(rows, ["('cakeeater', 0)", "('cookiemon', 2)"]);

        let inner = session
            .query_columns([User::USERNAME])
            .join::<Order>()
            .unwrap();
        assert_eq!(inner.count().unwrap(), 2);
    }

    #[test]
    fn test_pattern_and_comparison_filters() {
        let session = seeded();
        let mystery = Cookie {
            cookie_name: Some("mystery".into()),
            ..Cookie::default()
        };
        session.bulk_save_objects(&[mystery]).unwrap();
        let cookies = session.query::<Cookie>().order_by(Cookie::COOKIE_ID);

        let starts = cookies.filter(Cookie::COOKIE_NAME.startswith("oat"));
        assert_eq!(names(&starts.all().unwrap()), ["oatmeal raisin"]);
        let ends = cookies.filter(Cookie::COOKIE_NAME.endswith("butter"));
        assert_eq!(names(&ends.all().unwrap()), ["peanut butter"]);

        let no_chip = cookies.filter(not_(Cookie::COOKIE_NAME.contains("chip")));
        assert_eq!(
            names(&no_chip.all().unwrap()),
            ["peanut butter", "oatmeal raisin", "mystery"]
        );
        assert!(no_chip.to_string().contains("NOT (cookies.cookie_name LIKE ?)"));

        assert_eq!(cookies.filter(Cookie::COOKIE_SKU.is_not_null()).count().unwrap(), 3);
        assert_eq!(cookies.filter(Cookie::COOKIE_SKU.is_null()).count().unwrap(), 1);
        // NULL never compares unequal
        let not_cc = cookies.filter(Cookie::COOKIE_SKU.not_equals("CC01"));
        assert_eq!(names(&not_cc.all().unwrap()), ["peanut butter", "oatmeal raisin"]);

        let small = cookies.filter(Cookie::QUANTITY.lte(12));
        assert_eq!(names(&small.all().unwrap()), ["chocolate chip", "peanut butter"]);
        let large = cookies.filter(Cookie::QUANTITY.gte(100));
        assert_eq!(names(&large.all().unwrap()), ["oatmeal raisin"]);
    }

    #[test]
    fn test_avg_max_and_count_star() {
        let session = seeded();
        let avg = session.query_columns([func::avg(Cookie::QUANTITY)]);
        assert_eq!(avg.to_string(), "SELECT avg(cookies.quantity)\nFROM cookies");
        match avg.scalar().unwrap() {
            Some(Datum::Real(v)) => assert!((v - 124.0 / 3.0).abs() < 1e-9),
            other => panic!("unexpected average {:?}", other),
        }

        let dearest = session.query_columns([func::max(Cookie::UNIT_COST)]).scalar().unwrap();
        assert_eq!(dearest, Some(Datum::Numeric(Decimal::new(100, 2))));

        // count(*) names no table, so the FROM clause comes from select_from
        let rows = session.query_columns([func::count_star()]);
        assert!(matches!(rows.to_sql(), Err(Error::InvalidJoin(_))));
        let rows = rows.select_from(Cookie::table());
        assert_eq!(rows.to_string(), "SELECT count(*)\nFROM cookies");
        assert_eq!(rows.scalar().unwrap(), Some(Datum::Integer(3)));
    }

    #[test]
    fn test_explicit_join_on() {
        let session = session();
        let cookiemon = Handle::new(User::new("cookiemon", "mon@cookie.com", "111-111-1111", "password"));
        session.add(&Handle::new(Order::new(&cookiemon)));
        session.commit().unwrap();

        let query = session
            .query_columns([User::USERNAME, Order::ORDER_ID])
            .join_on(Order::table(), Order::USER_ID.equals(User::USER_ID));
        assert!(
            query
                .to_string()
                .contains("FROM users JOIN orders ON orders.user_id = users.user_id")
        );
        let rows: Vec<String> = query.all().unwrap().iter().map(Row::to_string).collect();
        assert_eq!(rows, ["('cookiemon', 1)"]);
    }

    #[test]
    fn test_entity_rows_repeated_by_join_are_merged() {
        let session = seeded();
        let cookiemon = Handle::new(User::new("cookiemon", "mon@cookie.com", "111-111-1111", "password"));
        let order = Handle::new(Order::new(&cookiemon));
        for cookie in session.query::<Cookie>().limit(2).all().unwrap() {
            Order::add_line_item(&order, &session, LineItem::new(&cookie, 1, Decimal::new(100, 2)));
        }
        session.commit().unwrap();

        let orders = session.query::<Order>().join::<LineItem>().unwrap();
        let all = orders.all().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].ptr_eq(&order));
        assert!(orders.one().unwrap().ptr_eq(&order));
    }

    #[test]
    fn test_join_after_reopening_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");
        {
            let engine = Engine::open(&path, false).unwrap();
            models::metadata().create_all(&engine).unwrap();
            let session = Session::new(&engine);
            let cookiemon = Handle::new(User::new("cookiemon", "mon@cookie.com", "111-111-1111", "password"));
            session.add(&Handle::new(Order::new(&cookiemon)));
            session.commit().unwrap();
        }

        let engine = Engine::open(&path, false).unwrap();
        let session = Session::new(&engine);
        let orders = session
            .query::<Order>()
            .join::<User>()
            .unwrap()
            .filter(User::USERNAME.equals("cookiemon"));
        assert_eq!(orders.all().unwrap().len(), 1);
    }

    #[test]
    fn test_join_without_foreign_key_fails() {
        let session = session();
        let result = session.query::<Cookie>().join::<User>();
        assert!(matches!(result, Err(Error::InvalidJoin(_))));
    }

    #[test]
    fn test_display_shows_sql() {
        let session = session();
        let query = session
            .query::<Cookie>()
            .filter(Cookie::COOKIE_NAME.equals("chocolate chip"))
            .limit(2);
        let sql = query.to_string();
        assert!(sql.starts_with("SELECT "));
        assert!(sql.contains("FROM cookies"));
        assert!(sql.contains("WHERE"));
        assert!(sql.contains("LIMIT ?"));
        assert_eq!(query.to_sql().unwrap().params.len(), 2);
    }
}
