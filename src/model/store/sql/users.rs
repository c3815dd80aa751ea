use rusqlite::{params, OptionalExtension, Row};

use crate::model::{store::SqliteStore, users::ServerUser};

use super::super::super::error::Result;


impl SqliteStore {

    fn row_to_user(row: &Row) -> rusqlite::Result<ServerUser> {
        Ok(ServerUser {
            id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            password: row.get(3)?,
            added: row.get(4)?,
        })
    }

    pub async fn get_users(&self) -> Result<Vec<ServerUser>> {
        let users = self.connection.call(|conn| {
            let mut query = conn.prepare("SELECT id, name, role, password, added FROM users")?;
            let rows = query.query_map([], Self::row_to_user)?;
            let users: Vec<ServerUser> = rows.collect::<std::result::Result<Vec<ServerUser>, rusqlite::Error>>()?;
            Ok(users)
        }).await?;
        Ok(users)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<ServerUser>> {
        let user_id = user_id.to_string();
        let user = self.connection.call(move |conn| {
            let mut query = conn.prepare("SELECT id, name, role, password, added FROM users WHERE id = ?")?;
            let row = query.query_row([user_id], Self::row_to_user).optional()?;
            Ok(row)
        }).await?;
        Ok(user)
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<ServerUser>> {
        let name = name.to_string();
        let user = self.connection.call(move |conn| {
            let mut query = conn.prepare("SELECT id, name, role, password, added FROM users WHERE name = ?")?;
            let row = query.query_row([name], Self::row_to_user).optional()?;
            Ok(row)
        }).await?;
        Ok(user)
    }

    pub async fn add_user(&self, user: ServerUser) -> Result<()> {
        self.connection.call(move |conn| {
            conn.execute("INSERT INTO users (id, name, role, password)
            VALUES (?, ?, ?, ?)", params![
                user.id,
                user.name,
                user.role,
                user.password,
            ])?;
            Ok(())
        }).await?;
        Ok(())
    }

}
