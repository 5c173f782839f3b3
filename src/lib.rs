//! # Cookiejar - an ORM walkthrough over SQLite
//!
//! A small object-relational mapping layer and the walkthrough that exercises it.
//!
//! Cookiejar provides:
//! - Declarative entity-to-table mappings with typed columns and foreign keys
//! - A session with an identity map and a transactional unit of work
//! - Generative queries: filters, ordering, limits, joins, aggregates
//! - One-to-many relationships loaded lazily through the session
//! - A walkthrough that runs the whole feature surface end to end

pub mod config;
pub mod expr;
pub mod models;
pub mod query;
pub mod schema;
pub mod session;
pub mod types;
pub mod ui;
pub mod walkthrough;

// Re-exports for convenient access
pub use models::{Cookie, LineItem, Order, User};
pub use query::{ColumnQuery, Query, Row};
pub use session::{Engine, Entity, Handle, Reference, Session};
pub use types::{Datum, SqlType};

/// Everything needed to declare queries
pub mod prelude {
    pub use crate::expr::{Expr, Operators, and_, cast, desc, func, not_, or_};
    pub use crate::models::{Cookie, LineItem, MONEY, Order, User};
    pub use crate::session::{Engine, Entity, Handle, Reference, Session};
    pub use crate::types::{Datum, SqlType};
}

/// Result type alias for Cookiejar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Cookiejar operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("No row was found for one() on {0}")]
    NoResultFound(String),

    #[error("Multiple rows were found for one(): {0}")]
    MultipleResultsFound(usize),

    #[error("Instance is not persisted: {0}")]
    NotPersisted(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Invalid join: {0}")]
    InvalidJoin(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the store rejected a write because of a constraint
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Storage(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
