//! Query expressions
//!
//! Expressions are plain values built from columns and literals:
//!
//! ```ignore
//! use cookiejar::prelude::*;
//!
//! let cheap = or_([
//!     Cookie::QUANTITY.between(10, 30),
//!     Cookie::COOKIE_NAME.contains("chip"),
//! ]);
//! let inv_cost = cast(Cookie::QUANTITY * Cookie::UNIT_COST, MONEY).label("inv_cost");
//! ```
//!
//! Rendering never interpolates values; every literal becomes a positional
//! `?` parameter collected by [`SqlWriter`].

use crate::schema::Column;
use crate::types::{Datum, SqlType};
use rust_decimal::Decimal;
use std::ops::{Add, Div, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    fn is_arithmetic(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
    }
}

/// SQL aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl Func {
    fn as_str(&self) -> &'static str {
        match self {
            Func::Sum => "sum",
            Func::Count => "count",
            Func::Avg => "avg",
            Func::Min => "min",
            Func::Max => "max",
        }
    }
}

/// A SQL expression tree
#[derive(Debug, Clone)]
pub enum Expr {
    Column(Column),
    Literal(Datum),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        case_insensitive: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    InList {
        expr: Box<Expr>,
        items: Vec<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    /// `arg == None` renders `count(*)`
    Func {
        func: Func,
        arg: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        ty: SqlType,
    },
}

/// Accumulates SQL text and its positional parameters
#[derive(Debug, Default)]
pub struct SqlWriter {
    pub sql: String,
    pub params: Vec<Datum>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    pub fn bind(&mut self, value: Datum) {
        self.sql.push('?');
        self.params.push(value);
    }
}

impl Expr {
    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Name the expression in a column selection
    pub fn label(self, name: impl Into<String>) -> SelectItem {
        SelectItem {
            expr: self,
            label: Some(name.into()),
        }
    }

    pub fn asc(self) -> OrderBy {
        OrderBy {
            expr: self,
            descending: false,
        }
    }

    pub fn desc(self) -> OrderBy {
        OrderBy {
            expr: self,
            descending: true,
        }
    }

    /// Result type, when it can be inferred
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Expr::Column(c) => Some(c.ty),
            Expr::Literal(_) => None,
            Expr::Binary { op, left, right } if op.is_arithmetic() => {
                match (left.sql_type(), right.sql_type()) {
                    (Some(t @ SqlType::Numeric { .. }), _) | (_, Some(t @ SqlType::Numeric { .. })) => Some(t),
                    (Some(SqlType::Integer), Some(SqlType::Integer)) => Some(SqlType::Integer),
                    _ => None,
                }
            }
            Expr::Func { func: Func::Count, .. } => Some(SqlType::Integer),
            Expr::Func { func: Func::Avg, .. } => None,
            Expr::Func { arg, .. } => arg.as_ref().and_then(|a| a.sql_type()),
            Expr::Cast { ty, .. } => Some(*ty),
            _ => Some(SqlType::Boolean),
        }
    }

    /// Tables referenced by the expression, in first-seen order
    pub fn tables(&self, out: &mut Vec<&'static str>) {
        match self {
            Expr::Column(c) => {
                if !out.contains(&c.table) {
                    out.push(c.table);
                }
            }
            Expr::Literal(_) => {}
            Expr::Binary { left, right, .. } => {
                left.tables(out);
                right.tables(out);
            }
            Expr::And(items) | Expr::Or(items) => items.iter().for_each(|e| e.tables(out)),
            Expr::Not(e) | Expr::IsNull { expr: e, .. } | Expr::Cast { expr: e, .. } => e.tables(out),
            Expr::Like { expr, pattern, .. } => {
                expr.tables(out);
                pattern.tables(out);
            }
            Expr::Between { expr, low, high } => {
                expr.tables(out);
                low.tables(out);
                high.tables(out);
            }
            Expr::InList { expr, items } => {
                expr.tables(out);
                items.iter().for_each(|e| e.tables(out));
            }
            Expr::Func { arg, .. } => {
                if let Some(a) = arg {
                    a.tables(out);
                }
            }
        }
    }

    fn is_compound(&self) -> bool {
        matches!(
            self,
            Expr::Binary { .. } | Expr::And(_) | Expr::Or(_) | Expr::Between { .. } | Expr::Like { .. }
        )
    }

    fn render_operand(&self, w: &mut SqlWriter) {
        if self.is_compound() {
            w.push("(");
            self.render(w);
            w.push(")");
        } else {
            self.render(w);
        }
    }

    fn render_joined(items: &[Expr], sep: &str, w: &mut SqlWriter) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                w.push(sep);
            }
            if matches!(item, Expr::And(_) | Expr::Or(_)) {
                w.push("(");
                item.render(w);
                w.push(")");
            } else {
                item.render(w);
            }
        }
    }

    /// Render into `w`
    pub fn render(&self, w: &mut SqlWriter) {
        match self {
            Expr::Column(c) => w.push(&c.qualified()),
            Expr::Literal(value) => w.bind(value.clone()),
            Expr::Binary { op, left, right } => {
                // `col = NULL` never matches; render IS NULL like the ORM does.
                if let Expr::Literal(Datum::Null) = right.as_ref() {
                    if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
                        left.render_operand(w);
                        w.push(if *op == BinaryOp::Eq { " IS NULL" } else { " IS NOT NULL" });
                        return;
                    }
                }
                left.render_operand(w);
                w.push(" ");
                w.push(op.as_str());
                w.push(" ");
                right.render_operand(w);
            }
            Expr::And(items) => Self::render_joined(items, " AND ", w),
            Expr::Or(items) => Self::render_joined(items, " OR ", w),
            Expr::Not(e) => {
                w.push("NOT (");
                e.render(w);
                w.push(")");
            }
            Expr::Like { expr, pattern, case_insensitive } => {
                if *case_insensitive {
                    w.push("lower(");
                    expr.render(w);
                    w.push(") LIKE lower(");
                    pattern.render(w);
                    w.push(")");
                } else {
                    expr.render_operand(w);
                    w.push(" LIKE ");
                    pattern.render_operand(w);
                }
            }
            Expr::Between { expr, low, high } => {
                expr.render_operand(w);
                w.push(" BETWEEN ");
                low.render_operand(w);
                w.push(" AND ");
                high.render_operand(w);
            }
            Expr::InList { expr, items } => {
                expr.render_operand(w);
                w.push(" IN (");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    item.render(w);
                }
                w.push(")");
            }
            Expr::IsNull { expr, negated } => {
                expr.render_operand(w);
                w.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::Func { func, arg } => {
                w.push(func.as_str());
                w.push("(");
                match arg {
                    Some(a) => a.render(w),
                    None => w.push("*"),
                }
                w.push(")");
            }
            Expr::Cast { expr, ty } => {
                w.push("CAST(");
                expr.render(w);
                w.push(" AS ");
                w.push(&ty.ddl());
                w.push(")");
            }
        }
    }
}

/// Comparison, pattern and null-test operators shared by columns and expressions
pub trait Operators: Into<Expr> + Sized {
    fn equals(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Eq, self.into(), other.into())
    }

    fn not_equals(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::NotEq, self.into(), other.into())
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Lt, self.into(), other.into())
    }

    fn lte(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::LtEq, self.into(), other.into())
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Gt, self.into(), other.into())
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::GtEq, self.into(), other.into())
    }

    /// SQL `LIKE`, `%` and `_` are wildcards
    fn like(self, pattern: &str) -> Expr {
        Expr::Like {
            expr: Box::new(self.into()),
            pattern: Box::new(Expr::from(pattern)),
            case_insensitive: false,
        }
    }

    fn ilike(self, pattern: &str) -> Expr {
        Expr::Like {
            expr: Box::new(self.into()),
            pattern: Box::new(Expr::from(pattern)),
            case_insensitive: true,
        }
    }

    fn contains(self, fragment: &str) -> Expr {
        self.like(&format!("%{}%", fragment))
    }

    fn startswith(self, prefix: &str) -> Expr {
        self.like(&format!("{}%", prefix))
    }

    fn endswith(self, suffix: &str) -> Expr {
        self.like(&format!("%{}", suffix))
    }

    fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        Expr::Between {
            expr: Box::new(self.into()),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
        }
    }

    fn in_list<I, T>(self, items: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Expr::InList {
            expr: Box::new(self.into()),
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into()),
            negated: false,
        }
    }

    fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into()),
            negated: true,
        }
    }
}

impl Operators for Expr {}
impl Operators for Column {}

impl Column {
    pub fn label(self, name: impl Into<String>) -> SelectItem {
        Expr::from(self).label(name)
    }

    pub fn asc(self) -> OrderBy {
        Expr::from(self).asc()
    }

    pub fn desc(self) -> OrderBy {
        Expr::from(self).desc()
    }
}

macro_rules! arithmetic {
    ($($trait:ident, $method:ident, $op:expr;)*) => {
        $(
            impl<R: Into<Expr>> $trait<R> for Expr {
                type Output = Expr;

                fn $method(self, rhs: R) -> Expr {
                    Expr::binary($op, self, rhs.into())
                }
            }

            impl<R: Into<Expr>> $trait<R> for Column {
                type Output = Expr;

                fn $method(self, rhs: R) -> Expr {
                    Expr::binary($op, Expr::Column(self), rhs.into())
                }
            }
        )*
    };
}

arithmetic! {
    Add, add, BinaryOp::Add;
    Sub, sub, BinaryOp::Sub;
    Mul, mul, BinaryOp::Mul;
    Div, div, BinaryOp::Div;
}

impl From<Column> for Expr {
    fn from(c: Column) -> Self {
        Expr::Column(c)
    }
}

impl From<Datum> for Expr {
    fn from(d: Datum) -> Self {
        Expr::Literal(d)
    }
}

macro_rules! literal {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Literal(Datum::from(v))
                }
            }
        )*
    };
}

literal!(i64, i32, f64, bool, &str, String, Decimal);

/// All of the given conditions
pub fn and_(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::And(items.into_iter().collect())
}

/// Any of the given conditions
pub fn or_(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Or(items.into_iter().collect())
}

pub fn not_(expr: impl Into<Expr>) -> Expr {
    Expr::Not(Box::new(expr.into()))
}

pub fn cast(expr: impl Into<Expr>, ty: SqlType) -> Expr {
    Expr::Cast {
        expr: Box::new(expr.into()),
        ty,
    }
}

/// Descending order for a column or expression
pub fn desc(expr: impl Into<Expr>) -> OrderBy {
    expr.into().desc()
}

/// Aggregate functions
pub mod func {
    use super::{Expr, Func};

    fn call(func: Func, arg: impl Into<Expr>) -> Expr {
        Expr::Func {
            func,
            arg: Some(Box::new(arg.into())),
        }
    }

    pub fn sum(arg: impl Into<Expr>) -> Expr {
        call(Func::Sum, arg)
    }

    pub fn count(arg: impl Into<Expr>) -> Expr {
        call(Func::Count, arg)
    }

    pub fn count_star() -> Expr {
        Expr::Func { func: Func::Count, arg: None }
    }

    pub fn avg(arg: impl Into<Expr>) -> Expr {
        call(Func::Avg, arg)
    }

    pub fn min(arg: impl Into<Expr>) -> Expr {
        call(Func::Min, arg)
    }

    pub fn max(arg: impl Into<Expr>) -> Expr {
        call(Func::Max, arg)
    }
}

/// One entry of a column selection
#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: Expr,
    pub label: Option<String>,
}

impl SelectItem {
    /// Name the row key is exposed under
    pub fn key(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.expr {
            Expr::Column(c) => c.name.to_string(),
            Expr::Func { func, arg } => match arg.as_deref() {
                Some(Expr::Column(c)) => format!("{}_{}", func.as_str(), c.name),
                _ => func.as_str().to_string(),
            },
            _ => "anon".to_string(),
        }
    }
}

impl From<Expr> for SelectItem {
    fn from(expr: Expr) -> Self {
        Self { expr, label: None }
    }
}

impl From<Column> for SelectItem {
    fn from(c: Column) -> Self {
        Self {
            expr: Expr::Column(c),
            label: None,
        }
    }
}

/// An ORDER BY term
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

impl From<Column> for OrderBy {
    fn from(c: Column) -> Self {
        c.asc()
    }
}

impl From<Expr> for OrderBy {
    fn from(e: Expr) -> Self {
        e.asc()
    }
}
