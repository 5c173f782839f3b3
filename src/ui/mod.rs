pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{header, info, section, sql, step, success};
pub use table::{TableBuilder, rows_table, summary_table};
pub use theme::{Theme, theme};
