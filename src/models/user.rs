use std::fmt;

use chrono::{Local, NaiveDateTime, SubsecRound};

use super::{Order, show};
use crate::Result;
use crate::expr::Operators;
use crate::schema::{Column, Table};
use crate::session::{Entity, Handle, Session, ValueReader};
use crate::types::{Datum, SqlType};

const TABLE: &str = "users";

/// A shop customer
#[derive(Clone, Default, PartialEq)]
pub struct User {
    pub user_id: Option<i64>,
    pub username: String,
    pub email_address: String,
    pub phone: String,
    pub password: String,
    pub created_on: Option<NaiveDateTime>,
    pub updated_on: Option<NaiveDateTime>,
}

impl User {
    pub const USER_ID: Column = Column::new(TABLE, "user_id", SqlType::Integer).primary_key();
    pub const USERNAME: Column = Column::new(TABLE, "username", SqlType::String { length: 15 }).not_null().unique();
    pub const EMAIL_ADDRESS: Column = Column::new(TABLE, "email_address", SqlType::String { length: 255 }).not_null();
    pub const PHONE: Column = Column::new(TABLE, "phone", SqlType::String { length: 20 }).not_null();
    pub const PASSWORD: Column = Column::new(TABLE, "password", SqlType::String { length: 25 }).not_null();
    pub const CREATED_ON: Column = Column::new(TABLE, "created_on", SqlType::DateTime);
    pub const UPDATED_ON: Column = Column::new(TABLE, "updated_on", SqlType::DateTime);

    pub fn new(
        username: impl Into<String>,
        email_address: impl Into<String>,
        phone: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            user_id: None,
            username: username.into(),
            email_address: email_address.into(),
            phone: phone.into(),
            password: password.into(),
            created_on: None,
            updated_on: None,
        }
    }

    /// Orders placed by `user`, lazily loaded
    pub fn orders(user: &Handle<User>, session: &Session) -> Result<Vec<Handle<Order>>> {
        session.autoflush()?;
        match user.id() {
            Some(id) => session
                .query::<Order>()
                .filter(Order::USER_ID.equals(id))
                .order_by(Order::ORDER_ID)
                .all(),
            None => Ok(Vec::new()),
        }
    }
}

static USERS: Table = Table {
    name: TABLE,
    columns: &[
        User::USER_ID,
        User::USERNAME,
        User::EMAIL_ADDRESS,
        User::PHONE,
        User::PASSWORD,
        User::CREATED_ON,
        User::UPDATED_ON,
    ],
};

impl Entity for User {
    fn table() -> &'static Table {
        &USERS
    }

    fn id(&self) -> Option<i64> {
        self.user_id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.user_id = id;
    }

    fn values(&self) -> Vec<Datum> {
        vec![
            self.username.clone().into(),
            self.email_address.clone().into(),
            self.phone.clone().into(),
            self.password.clone().into(),
            self.created_on.into(),
            self.updated_on.into(),
        ]
    }

    fn from_values(values: Vec<Datum>) -> Result<Self> {
        let mut r = ValueReader::new(&USERS, values)?;
        Ok(Self {
            user_id: r.int()?,
            username: r.required_text()?,
            email_address: r.required_text()?,
            phone: r.required_text()?,
            password: r.required_text()?,
            created_on: r.datetime()?,
            updated_on: r.datetime()?,
        })
    }

    fn before_insert(&mut self) {
        let now = now();
        self.created_on.get_or_insert(now);
        self.updated_on.get_or_insert(now);
    }

    fn before_update(&mut self) {
        self.updated_on = Some(now());
    }
}

/// Local time at the precision the store keeps
fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "User(user_id={}, username={}, email_address={}, phone={})",
            show(&self.user_id),
            self.username,
            self.email_address,
            self.phone
        )
    }
}
