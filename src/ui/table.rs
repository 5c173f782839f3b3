use tabled::{Table, Tabled, builder::Builder, settings::Style};

use crate::query::Row;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn summary_table(stats: &[(&str, String)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

/// Column-query rows under their keys
pub fn rows_table(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let mut builder = Builder::default();
    builder.push_record(first.keys().iter().cloned());
    for row in rows {
        builder.push_record(row.values().iter().map(ToString::to_string));
    }
    builder.build().with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{self, Cookie};
    use crate::session::{Engine, Session};

    #[test]
    fn test_rows_table_has_keys_and_values() {
        let engine = Engine::in_memory().unwrap();
        models::metadata().create_all(&engine).unwrap();
        let session = Session::new(&engine);
        session.bulk_save_objects(&crate::walkthrough::sample_cookies()).unwrap();

        let rows = session
            .query_columns([Cookie::COOKIE_NAME, Cookie::QUANTITY])
            .all()
            .unwrap();
        let table = rows_table(&rows);
        assert!(table.contains("cookie_name"));
        assert!(table.contains("oatmeal raisin"));
        assert!(rows_table(&[]).is_empty());
    }

    #[test]
    fn test_summary_table() {
        let table = summary_table(&[("cookies", "6".to_string())]);
        assert!(table.contains("Metric"));
        assert!(table.contains("cookies"));
        assert!(TableBuilder::new().build().is_empty());
    }
}
