//! Many-to-one links between mapped objects

use std::fmt;
use std::rc::Rc;

use super::Session;
use super::entity::Entity;
use super::handle::{Handle, Tracked};
use crate::Result;

/// A foreign key seen from the child side.
///
/// Either a plain id (as loaded from the store) or a handle to the parent
/// object, which may still be pending. In the latter case the id is read from
/// the parent at flush time, after the parent has been inserted.
pub struct Reference<E> {
    id: Option<i64>,
    target: Option<Handle<E>>,
}

impl<E> Clone for Reference<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            target: self.target.clone(),
        }
    }
}

impl<E> Default for Reference<E> {
    fn default() -> Self {
        Self { id: None, target: None }
    }
}

impl<E: Entity> Reference<E> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_id(id: Option<i64>) -> Self {
        Self { id, target: None }
    }

    /// Point at a parent object
    pub fn to(parent: &Handle<E>) -> Self {
        Self {
            id: parent.id(),
            target: Some(parent.clone()),
        }
    }

    /// Current foreign-key value
    pub fn id(&self) -> Option<i64> {
        match &self.target {
            Some(parent) => parent.id(),
            None => self.id,
        }
    }

    pub fn target(&self) -> Option<&Handle<E>> {
        self.target.as_ref()
    }

    /// Load the parent through the session's identity map
    pub fn load(&self, session: &Session) -> Result<Option<Handle<E>>> {
        if let Some(parent) = &self.target {
            return Ok(Some(parent.clone()));
        }
        match self.id {
            Some(id) => session.get::<E>(id),
            None => Ok(None),
        }
    }

    /// Parent to cascade into the flush, if it is held by handle
    pub fn cascade(&self) -> Option<Rc<dyn Tracked>> {
        self.target.as_ref().map(Handle::tracked)
    }
}

impl<E: Entity> fmt::Debug for Reference<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}#{}", E::table().name, id),
            None if self.target.is_some() => write!(f, "{}#pending", E::table().name),
            None => write!(f, "None"),
        }
    }
}
