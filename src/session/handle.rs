//! Shared entity handles and their type-erased tracking interface

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use super::entity::Entity;
use crate::Result;
use crate::schema::Table;
use crate::types::Datum;

struct Slot<E> {
    entity: RefCell<E>,
    /// Column values as last seen in the store, `None` while transient
    snapshot: RefCell<Option<Vec<Datum>>>,
}

/// A shared, mutable reference to a mapped object.
///
/// Clones point at the same object. The session hands out exactly one handle
/// per row (identity map), so `a.ptr_eq(&b)` holds for two lookups of the
/// same primary key.
pub struct Handle<E> {
    slot: Rc<Slot<E>>,
}

impl<E> Clone for Handle<E> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<E: Entity> Handle<E> {
    /// Wrap a transient object
    pub fn new(entity: E) -> Self {
        Self {
            slot: Rc::new(Slot {
                entity: RefCell::new(entity),
                snapshot: RefCell::new(None),
            }),
        }
    }

    /// Wrap an object freshly loaded from the store
    pub(crate) fn loaded(entity: E) -> Self {
        let handle = Self::new(entity);
        handle.mark_clean();
        handle
    }

    pub fn borrow(&self) -> Ref<'_, E> {
        self.slot.entity.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, E> {
        self.slot.entity.borrow_mut()
    }

    pub fn id(&self) -> Option<i64> {
        self.borrow().id()
    }

    /// Whether both handles point at the same object
    pub fn ptr_eq(&self, other: &Handle<E>) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }

    /// Type-erased view for the unit of work
    pub fn tracked(&self) -> Rc<dyn Tracked> {
        Rc::new(self.clone())
    }

    /// Whether the object differs from its last persisted state
    pub fn is_modified(&self) -> bool {
        match self.slot.snapshot.borrow().as_ref() {
            Some(snapshot) => *snapshot != self.borrow().values(),
            None => false,
        }
    }
}

impl<E: Entity> fmt::Debug for Handle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.entity.try_borrow() {
            Ok(entity) => fmt::Debug::fmt(&*entity, f),
            Err(_) => write!(f, "Handle<{}>(<borrowed>)", E::table().name),
        }
    }
}

/// What the unit of work needs from any tracked object
pub trait Tracked {
    fn table(&self) -> &'static Table;

    fn id(&self) -> Option<i64>;

    /// Pointer identity of the underlying object
    fn addr(&self) -> usize;

    fn parents(&self) -> Vec<Rc<dyn Tracked>>;

    /// Run the insert hook and return the data column values
    fn prepare_insert(&self) -> Vec<Datum>;

    /// Run the update hook and return the data column values
    fn prepare_update(&self) -> Vec<Datum>;

    fn set_id(&self, id: Option<i64>);

    /// Record current values as the persisted state
    fn mark_clean(&self);

    fn is_modified(&self) -> bool;

    /// Overwrite the object with a full row from the store
    fn reload(&self, values: Vec<Datum>) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

impl<E: Entity> Tracked for Handle<E> {
    fn table(&self) -> &'static Table {
        E::table()
    }

    fn id(&self) -> Option<i64> {
        Handle::id(self)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.slot) as *const () as usize
    }

    fn parents(&self) -> Vec<Rc<dyn Tracked>> {
        self.borrow().parents()
    }

    fn prepare_insert(&self) -> Vec<Datum> {
        let mut entity = self.borrow_mut();
        entity.before_insert();
        entity.values()
    }

    fn prepare_update(&self) -> Vec<Datum> {
        let mut entity = self.borrow_mut();
        entity.before_update();
        entity.values()
    }

    fn set_id(&self, id: Option<i64>) {
        self.borrow_mut().set_id(id);
    }

    fn mark_clean(&self) {
        let values = self.borrow().values();
        *self.slot.snapshot.borrow_mut() = Some(values);
    }

    fn is_modified(&self) -> bool {
        Handle::is_modified(self)
    }

    fn reload(&self, values: Vec<Datum>) -> Result<()> {
        let fresh = E::from_values(values)?;
        *self.borrow_mut() = fresh;
        self.mark_clean();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
