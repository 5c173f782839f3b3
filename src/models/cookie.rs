use std::fmt;

use rust_decimal::Decimal;

use super::{MONEY, show};
use crate::Result;
use crate::schema::{Column, Table};
use crate::session::{Entity, ValueReader};
use crate::types::{Datum, SqlType};

const TABLE: &str = "cookies";

/// A cookie in the inventory
#[derive(Clone, Default, PartialEq)]
pub struct Cookie {
    pub cookie_id: Option<i64>,
    pub cookie_name: Option<String>,
    pub cookie_recipe_url: Option<String>,
    pub cookie_sku: Option<String>,
    pub quantity: Option<i64>,
    pub unit_cost: Option<Decimal>,
}

impl Cookie {
    pub const COOKIE_ID: Column = Column::new(TABLE, "cookie_id", SqlType::Integer).primary_key();
    pub const COOKIE_NAME: Column = Column::new(TABLE, "cookie_name", SqlType::String { length: 50 }).indexed();
    pub const COOKIE_RECIPE_URL: Column = Column::new(TABLE, "cookie_recipe_url", SqlType::String { length: 255 });
    pub const COOKIE_SKU: Column = Column::new(TABLE, "cookie_sku", SqlType::String { length: 55 });
    pub const QUANTITY: Column = Column::new(TABLE, "quantity", SqlType::Integer);
    pub const UNIT_COST: Column = Column::new(TABLE, "unit_cost", MONEY);

    pub fn new(
        name: impl Into<String>,
        recipe_url: impl Into<String>,
        sku: impl Into<String>,
        quantity: i64,
        unit_cost: Decimal,
    ) -> Self {
        Self {
            cookie_id: None,
            cookie_name: Some(name.into()),
            cookie_recipe_url: Some(recipe_url.into()),
            cookie_sku: Some(sku.into()),
            quantity: Some(quantity),
            unit_cost: Some(unit_cost),
        }
    }

    /// Quantity times unit cost, when both are known
    pub fn inventory_cost(&self) -> Option<Decimal> {
        Some(Decimal::from(self.quantity?) * self.unit_cost?)
    }
}

static COOKIES: Table = Table {
    name: TABLE,
    columns: &[
        Cookie::COOKIE_ID,
        Cookie::COOKIE_NAME,
        Cookie::COOKIE_RECIPE_URL,
        Cookie::COOKIE_SKU,
        Cookie::QUANTITY,
        Cookie::UNIT_COST,
    ],
};

impl Entity for Cookie {
    fn table() -> &'static Table {
        &COOKIES
    }

    fn id(&self) -> Option<i64> {
        self.cookie_id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.cookie_id = id;
    }

    fn values(&self) -> Vec<Datum> {
        vec![
            self.cookie_name.clone().into(),
            self.cookie_recipe_url.clone().into(),
            self.cookie_sku.clone().into(),
            self.quantity.into(),
            self.unit_cost.into(),
        ]
    }

    fn from_values(values: Vec<Datum>) -> Result<Self> {
        let mut r = ValueReader::new(&COOKIES, values)?;
        Ok(Self {
            cookie_id: r.int()?,
            cookie_name: r.text()?,
            cookie_recipe_url: r.text()?,
            cookie_sku: r.text()?,
            quantity: r.int()?,
            unit_cost: r.decimal()?,
        })
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cookie(cookie_name={}, cookie_recipe_url={}, cookie_sku={}, unit_cost={}, quantity={})",
            show(&self.cookie_name),
            show(&self.cookie_recipe_url),
            show(&self.cookie_sku),
            show(&self.unit_cost),
            show(&self.quantity)
        )
    }
}
