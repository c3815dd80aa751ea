use rusqlite::{params, OptionalExtension, Row};

use crate::domain::people::Person;
use crate::model::people::{PeopleQuery, PersonForInsert, PersonForUpdate};
use crate::model::store::SqliteStore;

use super::{OrderBuilder, QueryBuilder, QueryWhereType, SqlOrder};
use super::super::super::error::Result;


impl SqliteStore {

    pub(crate) fn row_to_person(row: &Row) -> rusqlite::Result<Person> {
        Ok(Person {
            id: row.get(0)?,
            user: row.get(1)?,
            name: row.get(2)?,
            auto_created: row.get(3)?,
            added: row.get(4)?,
            modified: row.get(5)?,
        })
    }

    pub async fn get_people(&self, user_id: &str, query: PeopleQuery) -> Result<Vec<Person>> {
        let user_id = user_id.to_string();
        let people = self.connection.call(move |conn| {
            let mut where_query = QueryBuilder::new();
            where_query.add_where(QueryWhereType::Equal("user_ref", &user_id));
            let name_like = query.name.as_ref().map(|n| format!("%{}%", n));
            if let Some(name_like) = &name_like {
                where_query.add_where(QueryWhereType::Like("name", name_like));
            }
            if let Some(after) = &query.after {
                where_query.add_where(QueryWhereType::After("modified", after));
            }
            if let Some(auto_created) = &query.auto_created {
                where_query.add_where(QueryWhereType::Equal("auto_created", auto_created));
            }
            where_query.add_order(OrderBuilder::new("added".to_string(), SqlOrder::DESC));

            let mut query = conn.prepare(&format!("SELECT id, user_ref, name, auto_created, added, modified FROM people{}{}", where_query.format(), where_query.format_order()))?;
            let rows = query.query_map(where_query.values(), Self::row_to_person)?;
            let people: Vec<Person> = rows.collect::<std::result::Result<Vec<Person>, rusqlite::Error>>()?;
            Ok(people)
        }).await?;
        Ok(people)
    }

    pub async fn get_person(&self, person_id: &str) -> Result<Option<Person>> {
        let person_id = person_id.to_string();
        let person = self.connection.call(move |conn| {
            let mut query = conn.prepare("SELECT id, user_ref, name, auto_created, added, modified FROM people WHERE id = ?")?;
            let row = query.query_row([person_id], Self::row_to_person).optional()?;
            Ok(row)
        }).await?;
        Ok(person)
    }

    pub async fn add_person(&self, person: PersonForInsert) -> Result<()> {
        self.connection.call(move |conn| {
            conn.execute("INSERT INTO people (id, user_ref, name, auto_created)
            VALUES (?, ?, ?, ?)", params![
                person.id,
                person.user,
                person.name,
                person.auto_created,
            ])?;
            Ok(())
        }).await?;
        Ok(())
    }

    pub async fn update_person(&self, person_id: &str, update: PersonForUpdate) -> Result<()> {
        let id = person_id.to_string();
        self.connection.call(move |conn| {
            let mut where_query = QueryBuilder::new();
            where_query.add_update(&update.name, "name");
            where_query.add_update(&update.auto_created, "auto_created");
            if !where_query.has_updates() {
                return Ok(());
            }
            where_query.add_where(QueryWhereType::Equal("id", &id));

            let update_sql = format!("UPDATE people SET {}, modified = strftime('%s', 'now'){}", where_query.format_update(), where_query.format());
            conn.execute(&update_sql, where_query.values())?;
            Ok(())
        }).await?;
        Ok(())
    }

    pub async fn remove_person(&self, person_id: String) -> Result<()> {
        self.connection.call(move |conn| {
            conn.execute("DELETE FROM people WHERE id = ?", [&person_id])?;
            Ok(())
        }).await?;
        Ok(())
    }

    /// Number of auto-created people a user currently has. Drives the
    /// "Unknown Person N" naming: recomputed on every resolve, never reserved.
    pub async fn count_auto_created_people(&self, user_id: &str) -> Result<u64> {
        let user_id = user_id.to_string();
        let count = self.connection.call(move |conn| {
            let count: u64 = conn.query_row("SELECT COUNT(*) FROM people WHERE user_ref = ? and auto_created = 1", [user_id], |row| row.get(0))?;
            Ok(count)
        }).await?;
        Ok(count)
    }

    pub async fn count_people(&self, user_id: &str) -> Result<(u64, u64)> {
        let user_id = user_id.to_string();
        let counts = self.connection.call(move |conn| {
            let total: u64 = conn.query_row("SELECT COUNT(*) FROM people WHERE user_ref = ?", [&user_id], |row| row.get(0))?;
            let auto: u64 = conn.query_row("SELECT COUNT(*) FROM people WHERE user_ref = ? and auto_created = 1", [&user_id], |row| row.get(0))?;
            Ok((total, auto))
        }).await?;
        Ok(counts)
    }
}
