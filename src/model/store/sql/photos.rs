use rusqlite::{params, OptionalExtension, Row};

use crate::domain::photo::Photo;
use crate::model::photos::PhotoQuery;
use crate::model::store::SqliteStore;

use super::{OrderBuilder, QueryBuilder, QueryWhereType, SqlOrder};
use super::super::super::error::Result;


impl SqliteStore {

    fn row_to_photo(row: &Row) -> rusqlite::Result<Photo> {
        Ok(Photo {
            id: row.get(0)?,
            user: row.get(1)?,
            name: row.get(2)?,
            source_hash: row.get(3)?,
            mimetype: row.get(4)?,
            size: row.get(5)?,
            added: row.get(6)?,
        })
    }

    pub async fn get_photos(&self, user_id: &str, query: PhotoQuery) -> Result<Vec<Photo>> {
        let user_id = user_id.to_string();
        let photos = self.connection.call(move |conn| {
            let mut where_query = QueryBuilder::new();
            where_query.add_where(QueryWhereType::Equal("user_ref", &user_id));
            let name_like = query.name.as_ref().map(|n| format!("%{}%", n));
            if let Some(name_like) = &name_like {
                where_query.add_where(QueryWhereType::Like("name", name_like));
            }
            if let Some(after) = &query.after {
                where_query.add_where(QueryWhereType::After("added", after));
            }
            where_query.add_order(OrderBuilder::new("added".to_string(), SqlOrder::DESC));

            let mut query = conn.prepare(&format!("SELECT id, user_ref, name, source_hash, mimetype, size, added FROM photos{}{}", where_query.format(), where_query.format_order()))?;
            let rows = query.query_map(where_query.values(), Self::row_to_photo)?;
            let photos: Vec<Photo> = rows.collect::<std::result::Result<Vec<Photo>, rusqlite::Error>>()?;
            Ok(photos)
        }).await?;
        Ok(photos)
    }

    pub async fn get_photo(&self, photo_id: &str) -> Result<Option<Photo>> {
        let photo_id = photo_id.to_string();
        let photo = self.connection.call(move |conn| {
            let mut query = conn.prepare("SELECT id, user_ref, name, source_hash, mimetype, size, added FROM photos WHERE id = ?")?;
            let row = query.query_row([photo_id], Self::row_to_photo).optional()?;
            Ok(row)
        }).await?;
        Ok(photo)
    }

    pub async fn get_photo_by_hash(&self, user_id: &str, hash: &str) -> Result<Option<Photo>> {
        let user_id = user_id.to_string();
        let hash = hash.to_string();
        let photo = self.connection.call(move |conn| {
            let mut query = conn.prepare("SELECT id, user_ref, name, source_hash, mimetype, size, added FROM photos WHERE user_ref = ? and source_hash = ?")?;
            let row = query.query_row([user_id, hash], Self::row_to_photo).optional()?;
            Ok(row)
        }).await?;
        Ok(photo)
    }

    /// All photos containing at least one face of a person, most recent first.
    pub async fn get_photos_for_person(&self, person_id: &str) -> Result<Vec<Photo>> {
        let person_id = person_id.to_string();
        let photos = self.connection.call(move |conn| {
            let mut query = conn.prepare(
                "SELECT DISTINCT p.id, p.user_ref, p.name, p.source_hash, p.mimetype, p.size, p.added
                 FROM photos p JOIN faces f ON f.photo_ref = p.id
                 WHERE f.person_ref = ? ORDER BY p.added DESC")?;
            let rows = query.query_map([person_id], Self::row_to_photo)?;
            let photos: Vec<Photo> = rows.collect::<std::result::Result<Vec<Photo>, rusqlite::Error>>()?;
            Ok(photos)
        }).await?;
        Ok(photos)
    }

    pub async fn add_photo(&self, photo: Photo) -> Result<()> {
        self.connection.call(move |conn| {
            conn.execute("INSERT INTO photos (id, user_ref, name, source_hash, mimetype, size)
            VALUES (?, ?, ?, ?, ?, ?)", params![
                photo.id,
                photo.user,
                photo.name,
                photo.source_hash,
                photo.mimetype,
                photo.size,
            ])?;
            Ok(())
        }).await?;
        Ok(())
    }

    pub async fn remove_photo(&self, photo_id: String) -> Result<()> {
        self.connection.call(move |conn| {
            conn.execute("DELETE FROM photos WHERE id = ?", [&photo_id])?;
            Ok(())
        }).await?;
        Ok(())
    }

    pub async fn count_photos(&self, user_id: &str) -> Result<u64> {
        let user_id = user_id.to_string();
        let count = self.connection.call(move |conn| {
            let count: u64 = conn.query_row("SELECT COUNT(*) FROM photos WHERE user_ref = ?", [user_id], |row| row.get(0))?;
            Ok(count)
        }).await?;
        Ok(count)
    }
}
