//! Mapped entities of the cookie shop
//!
//! - `Cookie` (cookies): inventory items
//! - `User` (users): customers, one-to-many with `Order`
//! - `Order` (orders): belongs to a `User`, one-to-many with `LineItem`
//! - `LineItem` (line_items): belongs to an `Order`, references a `Cookie`

pub mod cookie;
pub mod line_item;
pub mod order;
pub mod user;

pub use cookie::Cookie;
pub use line_item::LineItem;
pub use order::Order;
pub use user::User;

use std::fmt::Display;

use crate::schema::Metadata;
use crate::session::Entity;
use crate::types::SqlType;

/// `NUMERIC(12, 2)` money columns
pub const MONEY: SqlType = SqlType::Numeric { precision: 12, scale: 2 };

/// Registry with every shop table, parents before children
pub fn metadata() -> Metadata {
    let mut metadata = Metadata::new();
    metadata
        .register(Cookie::table())
        .register(User::table())
        .register(Order::table())
        .register(LineItem::table());
    metadata
}

/// `None` for absent values, like the repr of a nullable attribute
pub(crate) fn show<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "None".to_string(), ToString::to_string)
}
