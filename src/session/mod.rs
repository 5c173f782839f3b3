//! Session - unit of work and identity map
//!
//! A session batches pending work and writes it out on `flush`:
//! - deletes of persistent objects
//! - inserts of pending objects, parents first
//! - updates of persistent objects whose values changed since load
//!
//! The first write opens a transaction; `commit` flushes and commits it,
//! `rollback` discards it and resynchronises tracked objects with the store.

pub mod engine;
pub mod entity;
pub mod handle;
pub mod reference;

pub use engine::Engine;
pub use entity::{Entity, ValueReader};
pub use handle::{Handle, Tracked};
pub use reference::Reference;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use crate::expr::SelectItem;
use crate::query::{ColumnQuery, Query};
use crate::schema::Table;
use crate::types::Datum;
use crate::{Error, Result};

type IdentityKey = (&'static str, i64);

#[derive(Default)]
struct UnitOfWork {
    new: Vec<Rc<dyn Tracked>>,
    deleted: Vec<Rc<dyn Tracked>>,
    identity: BTreeMap<IdentityKey, Rc<dyn Tracked>>,
    /// Objects inserted by the open transaction
    inserted_in_tx: Vec<Rc<dyn Tracked>>,
    /// Objects deleted by the open transaction
    deleted_in_tx: Vec<Rc<dyn Tracked>>,
}

/// Flush statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Gateway to the store for one unit of work at a time
pub struct Session {
    engine: Engine,
    state: RefCell<UnitOfWork>,
}

impl Session {
    pub fn new(engine: &Engine) -> Self {
        Self {
            engine: engine.clone(),
            state: RefCell::new(UnitOfWork::default()),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    // ========== Pending work ==========

    /// Mark an object for insertion on the next flush
    pub fn add<E: Entity>(&self, handle: &Handle<E>) {
        self.add_tracked(handle.tracked());
    }

    pub fn add_all<E: Entity>(&self, handles: &[Handle<E>]) {
        for handle in handles {
            self.add(handle);
        }
    }

    fn add_tracked(&self, tracked: Rc<dyn Tracked>) {
        let mut state = self.state.borrow_mut();
        let addr = tracked.addr();
        let known = state.new.iter().any(|t| t.addr() == addr)
            || state.identity.values().any(|t| t.addr() == addr);
        if !known {
            state.new.push(tracked);
        }
    }

    /// Insert plain objects right away without tracking them.
    ///
    /// Generated primary keys are not read back: the given objects keep their
    /// `None` ids and never enter the identity map. Objects that already carry
    /// an id are written as UPDATEs.
    pub fn bulk_save_objects<E: Entity + Clone>(&self, objects: &[E]) -> Result<usize> {
        self.engine.begin()?;
        match self.bulk_save_inner(objects) {
            Ok(saved) => Ok(saved),
            Err(e) => {
                tracing::warn!("Bulk save failed, rolling back: {}", e);
                self.rollback()?;
                Err(e)
            }
        }
    }

    fn bulk_save_inner<E: Entity + Clone>(&self, objects: &[E]) -> Result<usize> {
        let table = E::table();
        let pk = primary_key(table)?;
        let insert_sql = insert_sql(table);
        let update_sql = update_sql(table, pk.name);

        for object in objects {
            let mut row = object.clone();
            match row.id() {
                Some(id) => {
                    row.before_update();
                    let mut params = row.values();
                    params.push(Datum::Integer(id));
                    self.engine.execute(&update_sql, &params)?;
                }
                None => {
                    row.before_insert();
                    self.engine.execute(&insert_sql, &row.values())?;
                }
            }
        }
        tracing::debug!("Bulk saved {} {} rows", objects.len(), table.name);
        Ok(objects.len())
    }

    /// Mark a persistent object for deletion on the next flush
    pub fn delete<E: Entity>(&self, handle: &Handle<E>) -> Result<()> {
        if handle.id().is_none() {
            return Err(Error::NotPersisted(format!("{:?}", handle)));
        }
        let tracked = handle.tracked();
        let mut state = self.state.borrow_mut();
        if !state.deleted.iter().any(|t| t.addr() == tracked.addr()) {
            state.deleted.push(tracked);
        }
        Ok(())
    }

    /// Stop tracking an object; pending work for it is dropped
    pub fn expunge<E: Entity>(&self, handle: &Handle<E>) {
        let addr = handle.tracked().addr();
        let mut state = self.state.borrow_mut();
        state.new.retain(|t| t.addr() != addr);
        state.deleted.retain(|t| t.addr() != addr);
        state.identity.retain(|_, t| t.addr() != addr);
    }

    /// Whether any pending work would be written by a flush
    pub fn is_dirty(&self) -> bool {
        let state = self.state.borrow();
        !state.new.is_empty() || !state.deleted.is_empty() || state.identity.values().any(|t| t.is_modified())
    }

    /// Whether a tracked object changed since it was loaded or flushed
    pub fn is_modified<E: Entity>(&self, handle: &Handle<E>) -> bool {
        handle.is_modified()
    }

    // ========== Flush / commit ==========

    /// Write all pending work inside the current transaction.
    ///
    /// Any failure rolls the whole transaction back.
    pub fn flush(&self) -> Result<FlushStats> {
        match self.flush_inner() {
            Ok(stats) => Ok(stats),
            Err(e) => {
                tracing::warn!("Flush failed, rolling back: {}", e);
                self.rollback()?;
                Err(e)
            }
        }
    }

    fn flush_inner(&self) -> Result<FlushStats> {
        let mut stats = FlushStats::default();
        if !self.is_dirty() {
            return Ok(stats);
        }
        self.engine.begin()?;

        let deleted = std::mem::take(&mut self.state.borrow_mut().deleted);
        for tracked in deleted {
            let table = tracked.table();
            let pk = primary_key(table)?;
            let Some(id) = tracked.id() else { continue };
            self.engine.execute(
                &format!("DELETE FROM {} WHERE {} = ?", table.name, pk.name),
                &[Datum::Integer(id)],
            )?;
            let mut state = self.state.borrow_mut();
            state.identity.remove(&(table.name, id));
            state.deleted_in_tx.push(tracked);
            stats.deleted += 1;
        }

        let pending = std::mem::take(&mut self.state.borrow_mut().new);
        let mut visited = HashSet::new();
        for tracked in pending {
            stats.inserted += self.insert_cascade(tracked, &mut visited)?;
        }

        let dirty: Vec<Rc<dyn Tracked>> = self
            .state
            .borrow()
            .identity
            .values()
            .filter(|t| t.is_modified())
            .cloned()
            .collect();
        // Parents newly referenced by persistent objects
        for tracked in &dirty {
            for parent in tracked.parents() {
                stats.inserted += self.insert_cascade(parent, &mut visited)?;
            }
        }
        for tracked in dirty {
            let table = tracked.table();
            let pk = primary_key(table)?;
            let Some(id) = tracked.id() else { continue };
            let mut params = tracked.prepare_update();
            params.push(Datum::Integer(id));
            self.engine.execute(&update_sql(table, pk.name), &params)?;
            tracked.mark_clean();
            stats.updated += 1;
        }

        tracing::debug!(
            "Flushed: {} inserted, {} updated, {} deleted",
            stats.inserted,
            stats.updated,
            stats.deleted
        );
        Ok(stats)
    }

    /// Insert an object after any pending parents it references
    fn insert_cascade(&self, tracked: Rc<dyn Tracked>, visited: &mut HashSet<usize>) -> Result<usize> {
        if tracked.id().is_some() || !visited.insert(tracked.addr()) {
            return Ok(0);
        }
        let mut inserted = 0;
        for parent in tracked.parents() {
            inserted += self.insert_cascade(parent, visited)?;
        }

        let table = tracked.table();
        let values = tracked.prepare_insert();
        let id = self.engine.insert(&insert_sql(table), &values)?;
        tracked.set_id(Some(id));
        tracked.mark_clean();

        let mut state = self.state.borrow_mut();
        state.identity.insert((table.name, id), Rc::clone(&tracked));
        state.inserted_in_tx.push(tracked);
        Ok(inserted + 1)
    }

    /// Flush pending work and commit the transaction
    pub fn commit(&self) -> Result<FlushStats> {
        let stats = self.flush()?;
        if let Err(e) = self.engine.commit() {
            self.rollback()?;
            return Err(e);
        }
        let mut state = self.state.borrow_mut();
        state.inserted_in_tx.clear();
        state.deleted_in_tx.clear();
        Ok(stats)
    }

    /// Discard the open transaction and all pending work.
    ///
    /// Objects inserted by the transaction become transient again (ids
    /// cleared), objects deleted by it become persistent again, and every
    /// persistent object is reloaded from the store.
    pub fn rollback(&self) -> Result<()> {
        self.engine.rollback()?;

        let (inserted, deleted) = {
            let mut state = self.state.borrow_mut();
            state.new.clear();
            state.deleted.clear();
            (
                std::mem::take(&mut state.inserted_in_tx),
                std::mem::take(&mut state.deleted_in_tx),
            )
        };

        for tracked in inserted {
            if let Some(id) = tracked.id() {
                self.state.borrow_mut().identity.remove(&(tracked.table().name, id));
            }
            tracked.set_id(None);
        }
        for tracked in deleted {
            if let Some(id) = tracked.id() {
                self.state.borrow_mut().identity.insert((tracked.table().name, id), tracked);
            }
        }

        let persistent: Vec<(IdentityKey, Rc<dyn Tracked>)> = self
            .state
            .borrow()
            .identity
            .iter()
            .map(|(k, t)| (*k, Rc::clone(t)))
            .collect();
        for (key, tracked) in persistent {
            match self.fetch_row(tracked.table(), key.1)? {
                Some(values) => tracked.reload(values)?,
                None => {
                    self.state.borrow_mut().identity.remove(&key);
                }
            }
        }
        tracing::debug!("Session rolled back");
        Ok(())
    }

    // ========== Loading ==========

    /// Look up an object by primary key, identity map first
    pub fn get<E: Entity>(&self, id: i64) -> Result<Option<Handle<E>>> {
        let table = E::table();
        if let Some(handle) = self.identity_lookup::<E>(id) {
            return Ok(Some(handle));
        }
        match self.fetch_row(table, id)? {
            Some(values) => self.resolve::<E>(values).map(Some),
            None => Ok(None),
        }
    }

    fn identity_lookup<E: Entity>(&self, id: i64) -> Option<Handle<E>> {
        let state = self.state.borrow();
        state
            .identity
            .get(&(E::table().name, id))
            .and_then(|t| t.as_any().downcast_ref::<Handle<E>>().cloned())
    }

    fn fetch_row(&self, table: &'static Table, id: i64) -> Result<Option<Vec<Datum>>> {
        let pk = primary_key(table)?;
        let columns: Vec<&str> = table.columns.iter().map(|c| c.name).collect();
        let types: Vec<_> = table.columns.iter().map(|c| Some(c.ty)).collect();
        let rows = self.engine.query(
            &format!(
                "SELECT {} FROM {} WHERE {} = ?",
                columns.join(", "),
                table.name,
                pk.name
            ),
            &[Datum::Integer(id)],
            &types,
        )?;
        Ok(rows.into_iter().next())
    }

    /// Map a full row onto its tracked handle, creating one if needed
    pub(crate) fn resolve<E: Entity>(&self, values: Vec<Datum>) -> Result<Handle<E>> {
        let table = E::table();
        let pk_index = table
            .columns
            .iter()
            .position(|c| c.primary_key)
            .ok_or_else(|| Error::Decode(format!("{} has no primary key", table.name)))?;
        let id = values.get(pk_index).and_then(Datum::as_i64);

        if let Some(handle) = id.and_then(|id| self.identity_lookup::<E>(id)) {
            return Ok(handle);
        }
        let handle = Handle::loaded(E::from_values(values)?);
        if let Some(id) = id {
            self.state
                .borrow_mut()
                .identity
                .insert((table.name, id), handle.tracked());
        }
        Ok(handle)
    }

    /// Flush before reading so queries see pending work
    pub(crate) fn autoflush(&self) -> Result<()> {
        if self.is_dirty() {
            self.flush()?;
        }
        Ok(())
    }

    // ========== Queries ==========

    /// Query returning mapped objects
    pub fn query<E: Entity>(&self) -> Query<'_, E> {
        Query::new(self)
    }

    /// Query returning rows of individual columns or expressions
    pub fn query_columns<I, T>(&self, items: I) -> ColumnQuery<'_>
    where
        I: IntoIterator<Item = T>,
        T: Into<SelectItem>,
    {
        ColumnQuery::new(self, items.into_iter().map(Into::into).collect())
    }
}

fn primary_key(table: &'static Table) -> Result<&'static crate::schema::Column> {
    table
        .primary_key()
        .ok_or_else(|| Error::Decode(format!("{} has no primary key", table.name)))
}

fn insert_sql(table: &Table) -> String {
    let columns: Vec<&str> = table.data_columns().map(|c| c.name).collect();
    let placeholders = vec!["?"; columns.len()];
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn update_sql(table: &Table, pk: &str) -> String {
    let assignments: Vec<String> = table.data_columns().map(|c| format!("{} = ?", c.name)).collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table.name,
        assignments.join(", "),
        pk
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Operators;
    use crate::models::{self, Cookie, LineItem, Order, User};
    use rust_decimal::Decimal;

    fn session() -> Session {
        let engine = Engine::in_memory().unwrap();
        models::metadata().create_all(&engine).unwrap();
        Session::new(&engine)
    }

    fn chocolate_chip() -> Cookie {
        Cookie::new("chocolate chip", "http://abc.com/cookie", "CC01", 12, Decimal::new(50, 2))
    }

    fn cookiemon() -> User {
        User::new("cookiemon", "mon@cookie.com", "111-111-1111", "password")
    }

    #[test]
    fn test_primary_key_assigned_on_commit() {
        let session = session();
        let cookie = Handle::new(chocolate_chip());
        session.add(&cookie);
        assert_eq!(cookie.id(), None);

        let stats = session.commit().unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(cookie.id(), Some(1));
    }

    #[test]
    fn test_bulk_save_does_not_return_ids() {
        let session = session();
        let cookies = vec![
            Cookie::new("peanut butter", "http://abc.com/cookie1", "PB01", 12, Decimal::new(25, 2)),
            Cookie::new("oatmeal raisin", "http://abc.com/co1okie", "EWW01", 100, Decimal::new(100, 2)),
        ];
        assert_eq!(session.bulk_save_objects(&cookies).unwrap(), 2);
        session.commit().unwrap();

        assert!(cookies.iter().all(|c| c.cookie_id.is_none()));
        assert_eq!(session.query::<Cookie>().count().unwrap(), 2);
    }

    #[test]
    fn test_failed_bulk_save_keeps_nothing() {
        let session = session();
        let users = vec![
            User::new("a", "a@cookie.com", "1", "pw"),
            User::new("b", "b@cookie.com", "2", "pw"),
            User::new("a", "a2@cookie.com", "3", "pw"),
        ];
        let err = session.bulk_save_objects(&users).unwrap_err();
        assert!(err.is_constraint_violation());
        assert!(!session.engine().in_transaction());

        session.commit().unwrap();
        let other = Session::new(session.engine());
        assert_eq!(other.query::<User>().count().unwrap(), 0);
    }

    #[test]
    fn test_identity_map_returns_same_handle() {
        let session = session();
        let cookie = Handle::new(chocolate_chip());
        session.add(&cookie);
        session.commit().unwrap();

        let fetched = session.get::<Cookie>(1).unwrap().unwrap();
        assert!(fetched.ptr_eq(&cookie));
        let queried = session.query::<Cookie>().one().unwrap();
        assert!(queried.ptr_eq(&cookie));
    }

    #[test]
    fn test_modified_object_is_updated_on_commit() {
        let session = session();
        let cookie = Handle::new(chocolate_chip());
        session.add(&cookie);
        session.commit().unwrap();

        cookie.borrow_mut().quantity = Some(132);
        assert!(session.is_modified(&cookie));
        let stats = session.commit().unwrap();
        assert_eq!(stats.updated, 1);
        assert!(!session.is_modified(&cookie));

        let other = Session::new(session.engine());
        let reloaded = other.get::<Cookie>(1).unwrap().unwrap();
        assert_eq!(reloaded.borrow().quantity, Some(132));
    }

    #[test]
    fn test_delete_removes_row() {
        let session = session();
        let cookie = Handle::new(chocolate_chip());
        session.add(&cookie);
        session.commit().unwrap();

        session.delete(&cookie).unwrap();
        let stats = session.commit().unwrap();
        assert_eq!(stats.deleted, 1);
        assert!(session.get::<Cookie>(1).unwrap().is_none());
    }

    #[test]
    fn test_delete_transient_fails() {
        let session = session();
        let cookie = Handle::new(chocolate_chip());
        assert!(matches!(session.delete(&cookie), Err(Error::NotPersisted(_))));
    }

    #[test]
    fn test_unique_violation_rolls_back_whole_unit() {
        let session = session();
        session.add(&Handle::new(cookiemon()));
        session.commit().unwrap();

        let cookie = Handle::new(chocolate_chip());
        let duplicate = Handle::new(cookiemon());
        session.add(&cookie);
        session.add(&duplicate);
        let err = session.commit().unwrap_err();
        assert!(err.is_constraint_violation());

        // the cookie from the failed unit of work was rolled back too
        assert_eq!(cookie.id(), None);
        assert_eq!(duplicate.id(), None);
        assert_eq!(session.query::<Cookie>().count().unwrap(), 0);
        assert_eq!(session.query::<User>().count().unwrap(), 1);
    }

    #[test]
    fn test_rollback_restores_persistent_state() {
        let session = session();
        let cookie = Handle::new(chocolate_chip());
        session.add(&cookie);
        session.commit().unwrap();

        cookie.borrow_mut().quantity = Some(0);
        session.flush().unwrap();
        session.rollback().unwrap();
        assert_eq!(cookie.borrow().quantity, Some(12));
    }

    #[test]
    fn test_parents_cascade_into_flush() {
        let session = session();
        let user = Handle::new(cookiemon());
        let cookie = Handle::new(chocolate_chip());
        let order = Handle::new(Order::new(&user));
        Order::add_line_item(&order, &session, LineItem::new(&cookie, 2, Decimal::new(100, 2)));

        let stats = session.commit().unwrap();
        assert_eq!(stats.inserted, 4);
        assert!(user.id().is_some());
        assert_eq!(order.borrow().user.id(), user.id());

        let items = Order::line_items(&order, &session).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].borrow().cookie.id(), cookie.id());
        assert_eq!(User::orders(&user, &session).unwrap().len(), 1);
    }

    #[test]
    fn test_repointed_reference_inserts_new_parent() {
        let session = session();
        let alice = Handle::new(User::new("alice", "alice@cookie.com", "1", "pw"));
        let order = Handle::new(Order::new(&alice));
        session.add(&order);
        session.commit().unwrap();

        let bob = Handle::new(User::new("bob", "bob@cookie.com", "2", "pw"));
        order.borrow_mut().user = Reference::to(&bob);
        let stats = session.commit().unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.updated, 1);
        assert!(bob.id().is_some());

        let other = Session::new(session.engine());
        let stored = other.get::<Order>(order.id().unwrap()).unwrap().unwrap();
        assert_eq!(stored.borrow().user.id(), bob.id());
    }

    #[test]
    fn test_rollback_restores_deleted_object() {
        let session = session();
        let cookie = Handle::new(chocolate_chip());
        session.add(&cookie);
        session.commit().unwrap();

        session.delete(&cookie).unwrap();
        session.flush().unwrap();
        assert!(session.get::<Cookie>(1).unwrap().is_none());

        session.rollback().unwrap();
        let restored = session.get::<Cookie>(1).unwrap().unwrap();
        assert!(restored.ptr_eq(&cookie));
        assert_eq!(cookie.borrow().quantity, Some(12));
        assert_eq!(session.query::<Cookie>().count().unwrap(), 1);
    }

    #[test]
    fn test_foreign_key_must_exist() {
        let session = session();
        let item = LineItem {
            cookie: Reference::from_id(Some(42)),
            quantity: Some(1),
            ..LineItem::default()
        };
        session.add(&Handle::new(item));
        assert!(session.commit().unwrap_err().is_constraint_violation());
    }

    #[test]
    fn test_reference_load_through_identity_map() {
        let session = session();
        let cookie = Handle::new(chocolate_chip());
        session.add(&cookie);
        session.commit().unwrap();

        let line = Reference::<Cookie>::from_id(cookie.id());
        let loaded = line.load(&session).unwrap().unwrap();
        assert!(loaded.ptr_eq(&cookie));
    }

    #[test]
    fn test_expunge_drops_pending_insert() {
        let session = session();
        let cookie = Handle::new(chocolate_chip());
        session.add(&cookie);
        session.expunge(&cookie);
        assert!(!session.is_dirty());
        session.commit().unwrap();
        assert_eq!(cookie.id(), None);
    }

    #[test]
    fn test_autoflush_before_query() {
        let session = session();
        session.add(&Handle::new(chocolate_chip()));
        let found = session
            .query::<Cookie>()
            .filter(Cookie::COOKIE_SKU.equals("CC01"))
            .first()
            .unwrap();
        assert!(found.is_some());
    }
}
