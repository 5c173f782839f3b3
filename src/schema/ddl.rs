//! DDL generation for mapped tables

use super::Table;

/// `CREATE TABLE IF NOT EXISTS` for a table
pub fn create_table(table: &Table) -> String {
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut line = format!("    {} {}", c.name, c.ty.ddl());
            if c.primary_key {
                line.push_str(" PRIMARY KEY");
            } else if !c.nullable {
                line.push_str(" NOT NULL");
            }
            if c.unique {
                line.push_str(" UNIQUE");
            }
            line
        })
        .collect();

    for c in table.columns {
        if let Some(fk) = c.references {
            lines.push(format!(
                "    FOREIGN KEY({}) REFERENCES {} ({})",
                c.name, fk.table, fk.column
            ));
        }
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        table.name,
        lines.join(",\n")
    )
}

/// `CREATE INDEX IF NOT EXISTS` for every indexed column
pub fn create_indexes(table: &Table) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|c| c.index)
        .map(|c| {
            format!(
                "CREATE INDEX IF NOT EXISTS ix_{}_{} ON {} ({})",
                table.name, c.name, table.name, c.name
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cookie, LineItem, User};
    use crate::session::Entity;

    #[test]
    fn test_create_table_renders_constraints() {
        let sql = create_table(User::table());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS users ("));
        assert!(sql.contains("user_id INTEGER PRIMARY KEY"));
        assert!(sql.contains("username VARCHAR(15) NOT NULL UNIQUE"));
    }

    #[test]
    fn test_foreign_keys_rendered() {
        let sql = create_table(LineItem::table());
        assert!(sql.contains("FOREIGN KEY(order_id) REFERENCES orders (order_id)"));
        assert!(sql.contains("FOREIGN KEY(cookie_id) REFERENCES cookies (cookie_id)"));
    }

    #[test]
    fn test_index_on_cookie_name() {
        let stmts = create_indexes(Cookie::table());
        assert_eq!(stmts, vec!["CREATE INDEX IF NOT EXISTS ix_cookies_cookie_name ON cookies (cookie_name)".to_string()]);
    }
}
