use std::fmt;
use std::rc::Rc;

use rust_decimal::Decimal;

use super::{Cookie, MONEY, Order, show};
use crate::Result;
use crate::schema::{Column, Table};
use crate::session::{Entity, Handle, Reference, Tracked, ValueReader};
use crate::types::{Datum, SqlType};

const TABLE: &str = "line_items";

/// One cookie line of an order
#[derive(Clone, Default)]
pub struct LineItem {
    pub line_item_id: Option<i64>,
    pub order: Reference<Order>,
    pub cookie: Reference<Cookie>,
    pub quantity: Option<i64>,
    pub extended_cost: Option<Decimal>,
}

impl LineItem {
    pub const LINE_ITEM_ID: Column = Column::new(TABLE, "line_item_id", SqlType::Integer).primary_key();
    pub const ORDER_ID: Column = Column::new(TABLE, "order_id", SqlType::Integer).references("orders", "order_id");
    pub const COOKIE_ID: Column = Column::new(TABLE, "cookie_id", SqlType::Integer).references("cookies", "cookie_id");
    pub const QUANTITY: Column = Column::new(TABLE, "quantity", SqlType::Integer);
    pub const EXTENDED_COST: Column = Column::new(TABLE, "extended_cost", MONEY);

    /// A line not yet attached to an order
    pub fn new(cookie: &Handle<Cookie>, quantity: i64, extended_cost: Decimal) -> Self {
        Self {
            line_item_id: None,
            order: Reference::none(),
            cookie: Reference::to(cookie),
            quantity: Some(quantity),
            extended_cost: Some(extended_cost),
        }
    }
}

static LINE_ITEMS: Table = Table {
    name: TABLE,
    columns: &[
        LineItem::LINE_ITEM_ID,
        LineItem::ORDER_ID,
        LineItem::COOKIE_ID,
        LineItem::QUANTITY,
        LineItem::EXTENDED_COST,
    ],
};

impl Entity for LineItem {
    fn table() -> &'static Table {
        &LINE_ITEMS
    }

    fn id(&self) -> Option<i64> {
        self.line_item_id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.line_item_id = id;
    }

    fn values(&self) -> Vec<Datum> {
        vec![
            self.order.id().into(),
            self.cookie.id().into(),
            self.quantity.into(),
            self.extended_cost.into(),
        ]
    }

    fn from_values(values: Vec<Datum>) -> Result<Self> {
        let mut r = ValueReader::new(&LINE_ITEMS, values)?;
        Ok(Self {
            line_item_id: r.int()?,
            order: Reference::from_id(r.int()?),
            cookie: Reference::from_id(r.int()?),
            quantity: r.int()?,
            extended_cost: r.decimal()?,
        })
    }

    fn parents(&self) -> Vec<Rc<dyn Tracked>> {
        self.order.cascade().into_iter().chain(self.cookie.cascade()).collect()
    }
}

impl fmt::Debug for LineItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LineItem(line_item_id={}, order_id={}, cookie_id={}, quantity={}, extended_cost={})",
            show(&self.line_item_id),
            show(&self.order.id()),
            show(&self.cookie.id()),
            show(&self.quantity),
            show(&self.extended_cost)
        )
    }
}
