use rusqlite::{params, types::FromSqlError, OptionalExtension, Row};
use serde_json::Value;

use crate::domain::face::{FaceBBox, FaceRecord};
use crate::model::people::PersonForInsert;
use crate::model::store::SqliteStore;
use crate::tools::recognition::PersonEmbedding;

use super::super::super::error::Result;


impl SqliteStore {

    fn row_to_face(row: &Row) -> rusqlite::Result<FaceRecord> {
        let landmarks: Option<Value> = row.get(7)?;
        let embedding: Value = row.get(9)?;
        Ok(FaceRecord {
            id: row.get(0)?,
            photo: row.get(1)?,
            person: row.get(2)?,
            bbox: FaceBBox {
                x: row.get(3)?,
                y: row.get(4)?,
                width: row.get(5)?,
                height: row.get(6)?,
            },
            landmarks: landmarks
                .map(|l| serde_json::from_value(l).map_err(|_| FromSqlError::InvalidType))
                .transpose()?
                .unwrap_or_default(),
            confidence: row.get(8)?,
            embedding: serde_json::from_value(embedding).map_err(|_| FromSqlError::InvalidType)?,
            model_version: row.get(10)?,
            added: row.get(11)?,
        })
    }

    const FACE_COLUMNS: &'static str = "id, photo_ref, person_ref, x, y, width, height, landmarks, confidence, embedding, model_version, added";

    pub async fn get_face(&self, face_id: &str) -> Result<Option<FaceRecord>> {
        let face_id = face_id.to_string();
        let face = self.connection.call(move |conn| {
            let mut query = conn.prepare(&format!("SELECT {} FROM faces WHERE id = ?", Self::FACE_COLUMNS))?;
            let row = query.query_row([face_id], Self::row_to_face).optional()?;
            Ok(row)
        }).await?;
        Ok(face)
    }

    pub async fn get_faces_for_photo(&self, photo_id: &str) -> Result<Vec<FaceRecord>> {
        let photo_id = photo_id.to_string();
        let faces = self.connection.call(move |conn| {
            let mut query = conn.prepare(&format!("SELECT {} FROM faces WHERE photo_ref = ? ORDER BY added", Self::FACE_COLUMNS))?;
            let rows = query.query_map([photo_id], Self::row_to_face)?;
            let faces: Vec<FaceRecord> = rows.collect::<std::result::Result<Vec<FaceRecord>, rusqlite::Error>>()?;
            Ok(faces)
        }).await?;
        Ok(faces)
    }

    pub async fn get_faces_for_person(&self, person_id: &str) -> Result<Vec<FaceRecord>> {
        let person_id = person_id.to_string();
        let faces = self.connection.call(move |conn| {
            let mut query = conn.prepare(&format!("SELECT {} FROM faces WHERE person_ref = ? ORDER BY added", Self::FACE_COLUMNS))?;
            let rows = query.query_map([person_id], Self::row_to_face)?;
            let faces: Vec<FaceRecord> = rows.collect::<std::result::Result<Vec<FaceRecord>, rusqlite::Error>>()?;
            Ok(faces)
        }).await?;
        Ok(faces)
    }

    /// All `{person, embedding}` pairs for one user, in stable store order.
    /// This is the embedding cache's populate query; matching never reads
    /// faces any other way.
    pub async fn get_person_embeddings(&self, user_id: &str) -> Result<Vec<PersonEmbedding>> {
        let user_id = user_id.to_string();
        let embeddings = self.connection.call(move |conn| {
            let mut query = conn.prepare(
                "SELECT p.id, p.user_ref, p.name, p.auto_created, p.added, p.modified, f.embedding
                 FROM people p JOIN faces f ON f.person_ref = p.id
                 WHERE p.user_ref = ? ORDER BY p.added, f.added")?;
            let rows = query.query_map([user_id], |row| {
                let person = Self::row_to_person(row)?;
                let embedding: Value = row.get(6)?;
                let embedding: Vec<f32> = serde_json::from_value(embedding).map_err(|_| FromSqlError::InvalidType)?;
                Ok(PersonEmbedding { person, embedding })
            })?;
            let embeddings: Vec<PersonEmbedding> = rows.collect::<std::result::Result<Vec<PersonEmbedding>, rusqlite::Error>>()?;
            Ok(embeddings)
        }).await?;
        Ok(embeddings)
    }

    /// Insert all face records of one photo as a single transaction: either
    /// every record commits or none do. A retried pipeline run can therefore
    /// never observe a partially stored photo.
    pub async fn add_faces(&self, faces: Vec<FaceRecord>) -> Result<()> {
        self.add_faces_with_people(vec![], faces).await
    }

    /// One commit unit per processed photo: the auto-created people of a run
    /// and all of its face records land together, or not at all. A failed
    /// commit therefore leaves no orphaned "Unknown Person" rows behind for
    /// the retry to duplicate.
    pub async fn add_faces_with_people(&self, people: Vec<PersonForInsert>, faces: Vec<FaceRecord>) -> Result<()> {
        self.connection.call(move |conn| {
            let tx = conn.transaction()?;
            for person in &people {
                tx.execute("INSERT INTO people (id, user_ref, name, auto_created)
                VALUES (?, ?, ?, ?)", params![
                    person.id,
                    person.user,
                    person.name,
                    person.auto_created,
                ])?;
            }
            for face in &faces {
                let landmarks = serde_json::to_string(&face.landmarks).map_err(|_| rusqlite::Error::from(FromSqlError::InvalidType))?;
                let embedding = serde_json::to_string(&face.embedding).map_err(|_| rusqlite::Error::from(FromSqlError::InvalidType))?;
                tx.execute("INSERT INTO faces (id, photo_ref, person_ref, x, y, width, height, landmarks, confidence, embedding, model_version)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)", params![
                    face.id,
                    face.photo,
                    face.person,
                    face.bbox.x,
                    face.bbox.y,
                    face.bbox.width,
                    face.bbox.height,
                    landmarks,
                    face.confidence,
                    embedding,
                    face.model_version,
                ])?;
            }
            tx.commit()?;
            Ok(())
        }).await?;
        Ok(())
    }

    pub async fn remove_face(&self, face_id: String) -> Result<()> {
        self.connection.call(move |conn| {
            conn.execute("DELETE FROM faces WHERE id = ?", [&face_id])?;
            Ok(())
        }).await?;
        Ok(())
    }

    /// Reassign every face of `from_person` to `to_person` (person merge).
    pub async fn move_faces(&self, from_person: &str, to_person: &str) -> Result<usize> {
        let from_person = from_person.to_string();
        let to_person = to_person.to_string();
        let moved = self.connection.call(move |conn| {
            let moved = conn.execute("UPDATE faces SET person_ref = ? WHERE person_ref = ?", [&to_person, &from_person])?;
            Ok(moved)
        }).await?;
        Ok(moved)
    }

    pub async fn count_faces(&self, user_id: &str) -> Result<u64> {
        let user_id = user_id.to_string();
        let count = self.connection.call(move |conn| {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*) FROM faces f JOIN photos p ON f.photo_ref = p.id WHERE p.user_ref = ?",
                [user_id], |row| row.get(0))?;
            Ok(count)
        }).await?;
        Ok(count)
    }
}
