use std::fmt;
use std::rc::Rc;

use super::{LineItem, User, show};
use crate::Result;
use crate::expr::Operators;
use crate::schema::{Column, Table};
use crate::session::{Entity, Handle, Reference, Session, Tracked, ValueReader};
use crate::types::{Datum, SqlType};

const TABLE: &str = "orders";

/// An order placed by a user
#[derive(Clone, Default)]
pub struct Order {
    pub order_id: Option<i64>,
    pub user: Reference<User>,
    pub shipped: Option<bool>,
}

impl Order {
    pub const ORDER_ID: Column = Column::new(TABLE, "order_id", SqlType::Integer).primary_key();
    pub const USER_ID: Column = Column::new(TABLE, "user_id", SqlType::Integer).references("users", "user_id");
    pub const SHIPPED: Column = Column::new(TABLE, "shipped", SqlType::Boolean);

    /// A new, unshipped order for `user`
    pub fn new(user: &Handle<User>) -> Self {
        Self {
            order_id: None,
            user: Reference::to(user),
            shipped: Some(false),
        }
    }

    /// Line items of `order`, lazily loaded
    pub fn line_items(order: &Handle<Order>, session: &Session) -> Result<Vec<Handle<LineItem>>> {
        session.autoflush()?;
        match order.id() {
            Some(id) => session
                .query::<LineItem>()
                .filter(LineItem::ORDER_ID.equals(id))
                .order_by(LineItem::LINE_ITEM_ID)
                .all(),
            None => Ok(Vec::new()),
        }
    }

    /// Attach `item` to `order` and add it to the session
    pub fn add_line_item(order: &Handle<Order>, session: &Session, mut item: LineItem) -> Handle<LineItem> {
        item.order = Reference::to(order);
        let handle = Handle::new(item);
        session.add(&handle);
        handle
    }
}

static ORDERS: Table = Table {
    name: TABLE,
    columns: &[Order::ORDER_ID, Order::USER_ID, Order::SHIPPED],
};

impl Entity for Order {
    fn table() -> &'static Table {
        &ORDERS
    }

    fn id(&self) -> Option<i64> {
        self.order_id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.order_id = id;
    }

    fn values(&self) -> Vec<Datum> {
        vec![self.user.id().into(), self.shipped.into()]
    }

    fn from_values(values: Vec<Datum>) -> Result<Self> {
        let mut r = ValueReader::new(&ORDERS, values)?;
        Ok(Self {
            order_id: r.int()?,
            user: Reference::from_id(r.int()?),
            shipped: r.boolean()?,
        })
    }

    fn before_insert(&mut self) {
        self.shipped.get_or_insert(false);
    }

    fn parents(&self) -> Vec<Rc<dyn Tracked>> {
        self.user.cascade().into_iter().collect()
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order(order_id={}, user_id={}, shipped={})",
            show(&self.order_id),
            show(&self.user.id()),
            self.shipped.map_or("None", |s| if s { "True" } else { "False" })
        )
    }
}
