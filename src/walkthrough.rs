//! End-to-end tour of the mapping layer
//!
//! Runs the cookie shop script against an engine and records what every step
//! printed. Steps are plain data so the CLI can render them as text or JSON.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::expr::{Operators, SelectItem, cast, desc, func, or_};
use crate::models::{self, Cookie, LineItem, MONEY, Order, User, show};
use crate::query::Row;
use crate::schema::Metadata;
use crate::session::{Engine, Entity, Handle, Session};
use crate::types::{Datum, SqlType};
use crate::{Error, Result};

/// What one step of the walkthrough printed
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub title: String,
    pub lines: Vec<String>,
}

impl Step {
    fn new<I, S>(title: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.to_string(),
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

/// The three cookies the shop starts with
pub fn sample_cookies() -> Vec<Cookie> {
    vec![
        Cookie::new("chocolate chip", "http://abc.com/cookie", "CC01", 12, Decimal::new(50, 2)),
        Cookie::new("peanut butter", "http://abc.com/cookie1", "PB01", 12, Decimal::new(25, 2)),
        Cookie::new("oatmeal raisin", "http://abc.com/co1okie", "EWW01", 100, Decimal::new(100, 2)),
    ]
}

/// Name, quantity, unit cost and `inv_cost` of every cookie
pub fn inventory(session: &Session) -> Result<Vec<Row>> {
    session
        .query_columns(vec![
            SelectItem::from(Cookie::COOKIE_NAME),
            SelectItem::from(Cookie::QUANTITY),
            SelectItem::from(Cookie::UNIT_COST),
            cast(Cookie::QUANTITY * Cookie::UNIT_COST, MONEY).label("inv_cost"),
        ])
        .order_by(Cookie::COOKIE_ID)
        .all()
}

/// Seed the sample cookies unless the inventory already has some
pub fn seed_inventory(session: &Session) -> Result<usize> {
    models::metadata().create_all(session.engine())?;
    if session.query::<Cookie>().count()? > 0 {
        return Ok(0);
    }
    let saved = session.bulk_save_objects(&sample_cookies())?;
    session.commit()?;
    Ok(saved)
}

/// Run every step in order; the engine must not hold shop data yet
pub fn run(engine: &Engine) -> Result<Vec<Step>> {
    ensure_empty(engine)?;

    // Cookies first, the relationship tables are created later on
    let mut cookies_only = Metadata::new();
    cookies_only.register(Cookie::table());
    cookies_only.create_all(engine)?;

    let session = Session::new(engine);
    let mut steps = Vec::new();

    let cc_cookie = unit_of_work(&session, &mut steps)?;
    ordering(&session, &mut steps)?;
    aggregates(&session, &mut steps)?;
    filtering(&session, &mut steps)?;
    updating(&session, &cc_cookie, &mut steps)?;
    relationships(&session, &mut steps)?;

    tracing::info!("Walkthrough finished with {} steps", steps.len());
    Ok(steps)
}

fn ensure_empty(engine: &Engine) -> Result<()> {
    for table in models::metadata().tables() {
        if !engine.table_exists(table.name)? {
            continue;
        }
        let rows = engine.query(
            &format!("SELECT COUNT(*) FROM {}", table.name),
            &[],
            &[Some(SqlType::Integer)],
        )?;
        let count = rows.first().and_then(|r| r.first()).and_then(Datum::as_i64).unwrap_or(0);
        if count > 0 {
            return Err(Error::Config(format!(
                "walkthrough needs an empty database, {} already has {} rows",
                table.name, count
            )));
        }
    }
    Ok(())
}

fn unit_of_work(session: &Session, steps: &mut Vec<Step>) -> Result<Handle<Cookie>> {
    let mut samples = sample_cookies().into_iter();
    let cc_cookie = Handle::new(samples.next().unwrap_or_default());
    session.add(&cc_cookie);
    session.commit()?;
    steps.push(Step::new(
        "Add and commit",
        [format!("cookie_id after commit: {}", show(&cc_cookie.id()))],
    ));

    let bulk: Vec<Cookie> = samples.collect();
    session.bulk_save_objects(&bulk)?;
    session.commit()?;
    steps.push(Step::new(
        "Bulk save (primary keys are not returned)",
        bulk.iter().map(|c| format!("{}: cookie_id = {}", show(&c.cookie_name), show(&c.cookie_id))),
    ));

    let cookies = session.query::<Cookie>().all()?;
    steps.push(Step::new("All cookies", cookies.iter().map(|c| format!("{:?}", c))));

    let first = session
        .query_columns([Cookie::COOKIE_NAME, Cookie::QUANTITY])
        .first()?;
    steps.push(Step::new("First name and quantity", [show(&first)]));
    Ok(cc_cookie)
}

fn ordering(session: &Session, steps: &mut Vec<Step>) -> Result<()> {
    let line = |c: &Handle<Cookie>| {
        let c = c.borrow();
        format!("{} {} {}", show(&c.cookie_sku), show(&c.quantity), show(&c.cookie_name))
    };

    let ascending = session.query::<Cookie>().order_by(Cookie::QUANTITY).all()?;
    steps.push(Step::new("Cookie quantity ascending", ascending.iter().map(line)));

    let descending = session.query::<Cookie>().order_by(desc(Cookie::QUANTITY)).all()?;
    steps.push(Step::new("Cookie quantity descending", descending.iter().map(line)));

    let limited = session.query::<Cookie>().order_by(Cookie::QUANTITY).limit(2).all()?;
    let names: Vec<String> = limited
        .iter()
        .map(|c| format!("'{}'", show(&c.borrow().cookie_name)))
        .collect();
    steps.push(Step::new(
        "Cookie quantity ascending, limited to 2",
        [format!("[{}]", names.join(", "))],
    ));
    Ok(())
}

fn aggregates(session: &Session, steps: &mut Vec<Step>) -> Result<()> {
    let total = session.query_columns([func::sum(Cookie::QUANTITY)]);
    steps.push(Step::new("Sum of quantity via scalar", [show(&total.scalar()?)]));
    steps.push(Step::new("Sum of quantity via first", [show(&total.first()?)]));

    let kinds = session
        .query_columns([func::count(Cookie::QUANTITY)])
        .first()?;
    steps.push(Step::new("Count of cookie kinds", [show(&kinds)]));

    let labelled = session.query_columns([func::sum(Cookie::QUANTITY).label("inventory_count")]);
    let row = labelled.first()?;
    let keys: Vec<String> = labelled.keys().iter().map(|k| format!("'{}'", k)).collect();
    steps.push(Step::new(
        "Labelled sum",
        [format!("keys: [{}]", keys.join(", ")), show(&row)],
    ));
    Ok(())
}

fn filtering(session: &Session, steps: &mut Vec<Step>) -> Result<()> {
    let by_keyword = session
        .query::<Cookie>()
        .filter_by("cookie_name", "chocolate chip")?
        .first()?;
    steps.push(Step::new("filter_by on name", [format!("{:?}", by_keyword)]));

    let by_expr = session
        .query::<Cookie>()
        .filter(Cookie::COOKIE_NAME.equals("chocolate chip"))
        .first()?;
    steps.push(Step::new("filter on name", [format!("{:?}", by_expr)]));

    let like = session
        .query::<Cookie>()
        .filter(Cookie::COOKIE_NAME.like("%chocolate%"))
        .all()?;
    steps.push(Step::new("like '%chocolate%'", names(&like)));

    let column = session.query_columns([Cookie::COOKIE_NAME]).all()?;
    steps.push(Step::new("Single column", column.iter().map(Row::to_string)));

    let costs = session
        .query_columns(vec![
            SelectItem::from(Cookie::COOKIE_NAME),
            cast(Cookie::QUANTITY * Cookie::UNIT_COST, MONEY).label("inv_cost"),
        ])
        .all()?;
    steps.push(Step::new(
        "Inventory cost",
        costs.iter().map(|r| {
            format!(
                "{} - {}",
                show(&r.get("cookie_name")),
                show(&r.get("inv_cost"))
            )
        }),
    ));

    let either = session
        .query::<Cookie>()
        .filter(or_([
            Cookie::QUANTITY.between(10, 30),
            Cookie::COOKIE_NAME.contains("chip"),
        ]))
        .all()?;
    steps.push(Step::new("or_ of between and contains", names(&either)));
    Ok(())
}

fn updating(session: &Session, cc_cookie: &Handle<Cookie>, steps: &mut Vec<Step>) -> Result<()> {
    let query = session.query::<Cookie>();
    let found = query
        .filter(Cookie::COOKIE_NAME.equals("chocolate chip"))
        .first()?;
    if let Some(found) = &found {
        tracing::debug!("Identity map returned the added object: {}", found.ptr_eq(cc_cookie));
    }
    {
        let mut cookie = cc_cookie.borrow_mut();
        cookie.quantity = cookie.quantity.map(|q| q + 120);
    }
    session.commit()?;
    steps.push(Step::new(
        "Update quantity",
        [show(&cc_cookie.borrow().quantity)],
    ));

    let peanut_butter = query.filter(Cookie::COOKIE_NAME.equals("peanut butter"));
    let doomed = peanut_butter.one()?;
    session.delete(&doomed)?;
    session.commit()?;
    let gone = peanut_butter.first()?;
    steps.push(Step::new("Delete peanut butter", [format!("{:?}", gone)]));
    Ok(())
}

fn relationships(session: &Session, steps: &mut Vec<Step>) -> Result<()> {
    models::metadata().create_all(session.engine())?;

    let cookiemon = Handle::new(User::new("cookiemon", "mon@cookie.com", "111-111-1111", "password"));
    session.add(&cookiemon);
    session.commit()?;

    let o1 = Handle::new(Order::new(&cookiemon));
    session.add(&o1);

    let cc = session
        .query::<Cookie>()
        .filter(Cookie::COOKIE_NAME.equals("chocolate chip"))
        .one()?;
    let oatmeal = session
        .query::<Cookie>()
        .filter(Cookie::COOKIE_NAME.equals("oatmeal raisin"))
        .one()?;
    Order::add_line_item(&o1, session, LineItem::new(&cc, 2, Decimal::new(100, 2)));
    Order::add_line_item(&o1, session, LineItem::new(&oatmeal, 12, Decimal::new(200, 2)));
    let stats = session.commit()?;
    steps.push(Step::new(
        "Create an order with two line items",
        [
            format!("{:?}", o1),
            format!("inserted {} rows", stats.inserted),
        ],
    ));

    let report = session
        .query_columns([
            Order::ORDER_ID,
            User::USERNAME,
            User::PHONE,
            Cookie::COOKIE_NAME,
            LineItem::QUANTITY,
            LineItem::EXTENDED_COST,
        ])
        .join::<User>()?
        .join::<LineItem>()?
        .join::<Cookie>()?
        .filter(User::USERNAME.equals("cookiemon"))
        .order_by(LineItem::LINE_ITEM_ID)
        .all()?;
    steps.push(Step::new(
        "Order report for cookiemon",
        report.iter().map(Row::to_string),
    ));

    let per_user = session
        .query_columns(vec![
            SelectItem::from(User::USERNAME),
            SelectItem::from(func::count(Order::ORDER_ID)),
        ])
        .outerjoin::<Order>()?
        .group_by(User::USERNAME)
        .all()?;
    steps.push(Step::new("Orders by user", per_user.iter().map(Row::to_string)));
    Ok(())
}

fn names(cookies: &[Handle<Cookie>]) -> Vec<String> {
    cookies.iter().map(|c| show(&c.borrow().cookie_name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines<'a>(steps: &'a [Step], title: &str) -> &'a [String] {
        &steps
            .iter()
            .find(|s| s.title == title)
            .unwrap_or_else(|| panic!("missing step {}", title))
            .lines
    }

    #[test]
    fn test_walkthrough_steps() {
        let engine = Engine::in_memory().unwrap();
        let steps = run(&engine).unwrap();

        assert_eq!(lines(&steps, "Add and commit"), ["cookie_id after commit: 1"]);
        assert_eq!(
            lines(&steps, "Bulk save (primary keys are not returned)"),
            ["peanut butter: cookie_id = None", "oatmeal raisin: cookie_id = None"]
        );
        assert_eq!(lines(&steps, "All cookies").len(), 3);
        assert_eq!(lines(&steps, "First name and quantity"), ["('chocolate chip', 12)"]);
        assert_eq!(
            lines(&steps, "Cookie quantity descending")[0],
            "EWW01 100 oatmeal raisin"
        );
        assert_eq!(lines(&steps, "Sum of quantity via scalar"), ["124"]);
        assert_eq!(lines(&steps, "Sum of quantity via first"), ["(124,)"]);
        assert_eq!(lines(&steps, "Count of cookie kinds"), ["(3,)"]);
        assert_eq!(
            lines(&steps, "Labelled sum"),
            ["keys: ['inventory_count']", "(124,)"]
        );
        assert_eq!(lines(&steps, "like '%chocolate%'"), ["chocolate chip"]);
        assert_eq!(
            lines(&steps, "Inventory cost"),
            [
                "chocolate chip - 6.00",
                "peanut butter - 3.00",
                "oatmeal raisin - 100.00"
            ]
        );
        assert_eq!(
            lines(&steps, "or_ of between and contains"),
            ["chocolate chip", "peanut butter"]
        );
        assert_eq!(lines(&steps, "Update quantity"), ["132"]);
        assert_eq!(lines(&steps, "Delete peanut butter"), ["None"]);
        assert_eq!(
            lines(&steps, "Order report for cookiemon"),
            [
                "(1, 'cookiemon', '111-111-1111', 'chocolate chip', 2, 1.00)",
                "(1, 'cookiemon', '111-111-1111', 'oatmeal raisin', 12, 2.00)"
            ]
        );
        assert_eq!(lines(&steps, "Orders by user"), ["('cookiemon', 1)"]);
    }

    #[test]
    fn test_walkthrough_refuses_used_database() {
        let engine = Engine::in_memory().unwrap();
        run(&engine).unwrap();
        assert!(matches!(run(&engine), Err(Error::Config(_))));
    }

    #[test]
    fn test_seed_inventory_once() {
        let engine = Engine::in_memory().unwrap();
        let session = Session::new(&engine);
        assert_eq!(seed_inventory(&session).unwrap(), 3);
        assert_eq!(seed_inventory(&session).unwrap(), 0);

        let rows = inventory(&session).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("inv_cost"), Some(&Datum::Numeric(Decimal::new(600, 2))));
        assert_eq!(rows[2].get("cookie_name"), Some(&Datum::from("oatmeal raisin")));
    }
}
