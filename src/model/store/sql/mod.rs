pub mod users;
pub mod photos;
pub mod people;
pub mod faces;

use rusqlite::{params_from_iter, ParamsFromIter, ToSql};
use tokio_rusqlite::Connection;

use crate::tools::log::{log_info, LogServiceType};

use super::super::error::Result;


pub async fn migrate_database(connection: &Connection) -> Result<usize> {
    let version = connection.call(|conn| {
        let version: usize = conn.query_row(
            "SELECT user_version FROM pragma_user_version;",
            [],
            |row| row.get(0),
        )?;

        if version < 1 {
            let initial = String::from_utf8_lossy(include_bytes!("001 - INITIAL.sql"));
            conn.execute_batch(&initial)?;
            conn.pragma_update(None, "user_version", 1)?;
            log_info(LogServiceType::Database, "Updated database schema to version 1".to_string());
        }

        Ok(version)
    }).await?;

    Ok(version)
}


pub enum QueryWhereType<'a> {
    Like(&'a str, &'a dyn ToSql),
    Equal(&'a str, &'a dyn ToSql),
    After(&'a str, &'a dyn ToSql),
    Before(&'a str, &'a dyn ToSql),
    Custom(&'a str, &'a dyn ToSql),
    Static(String),
}

impl<'a> QueryWhereType<'a> {
    pub fn expand(&'a self) -> (String, Vec<&'a dyn ToSql>) {
        let mut values: Vec<&'a dyn ToSql> = vec![];
        let text = match self {
            QueryWhereType::Equal(name, value) => {
                values.push(*value);
                format!("{} = ?", name)
            },
            QueryWhereType::Like(name, value) => {
                values.push(*value);
                format!("{} like ?", name)
            },
            QueryWhereType::Custom(custom, value) => {
                values.push(*value);
                custom.to_string()
            },
            QueryWhereType::After(name, value) => {
                values.push(*value);
                format!("{} > ?", name)
            },
            QueryWhereType::Before(name, value) => {
                values.push(*value);
                format!("{} < ?", name)
            },
            QueryWhereType::Static(s) => s.to_string(),
        };
        (text, values)
    }
}

pub enum SqlOrder {
    ASC,
    DESC
}

pub struct OrderBuilder {
    column: String,
    order: SqlOrder
}

impl OrderBuilder {
    pub fn new(column: String, order: SqlOrder) -> Self {
        OrderBuilder { column, order }
    }
    pub fn format(&self) -> String {
        match self.order {
            SqlOrder::ASC => self.column.clone(),
            SqlOrder::DESC => format!("{} DESC", self.column),
        }
    }
}

pub struct QueryBuilder<'a> {
    wheres: Vec<QueryWhereType<'a>>,

    columns_update: Vec<String>,
    values_update: Vec<&'a dyn ToSql>,

    columns_orders: Vec<OrderBuilder>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new() -> Self {
        Self {
            wheres: Vec::new(),
            columns_update: Vec::new(),
            values_update: Vec::new(),
            columns_orders: Vec::new()
        }
    }

    pub fn add_update<T: ToSql>(&mut self, optional: &'a Option<T>, column: &str) {
        if let Some(value) = optional {
            self.columns_update.push(format!("{} = ?", column));
            self.values_update.push(value);
        }
    }

    pub fn add_where(&mut self, kind: QueryWhereType<'a>) {
        self.wheres.push(kind);
    }

    pub fn has_updates(&self) -> bool {
        !self.columns_update.is_empty()
    }

    pub fn format_update(&self) -> String {
        self.columns_update.join(", ")
    }

    pub fn format(&self) -> String {
        if !self.wheres.is_empty() {
            let mut columns = vec![];
            for w in &self.wheres {
                let (t, _) = w.expand();
                columns.push(t);
            }
            format!(" WHERE {}", columns.join(" and "))
        } else {
            "".to_string()
        }
    }

    pub fn add_order(&mut self, order: OrderBuilder) {
        self.columns_orders.push(order);
    }

    pub fn format_order(&self) -> String {
        if !self.columns_orders.is_empty() {
            format!(" ORDER BY {}", self.columns_orders.iter().map(|o| o.format()).collect::<Vec<String>>().join(", "))
        } else {
            "".to_string()
        }
    }

    pub fn values(&'a self) -> ParamsFromIter<Vec<&'a dyn ToSql>> {
        let mut all_values: Vec<&'a dyn ToSql> = Vec::new();
        all_values.extend(self.values_update.iter().copied());
        for w in &self.wheres {
            let (_, mut v) = w.expand();
            all_values.append(&mut v);
        }
        params_from_iter(all_values)
    }
}
