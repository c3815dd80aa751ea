use tokio_rusqlite::Connection;

use crate::server::get_server_file_path_array;
use crate::tools::log::{log_info, LogServiceType};

use self::sql::migrate_database;

use super::error::{Error, Result};

pub mod sql;


pub struct SqliteStore {
    connection: Connection,
}

// Constructor
impl SqliteStore {
    pub async fn new() -> Result<Self> {
        let server_db_path = get_server_file_path_array(vec!["dbs", "database.db"]).await.map_err(|_| Error::CannotOpenDatabase)?;
        let connection = Connection::open(server_db_path).await?;
        Self::init(connection).await
    }

    /// In-memory store for tests.
    pub async fn new_memory() -> Result<Self> {
        let connection = Connection::open(":memory:").await?;
        Self::init(connection).await
    }

    async fn init(connection: Connection) -> Result<Self> {
        connection.call(|conn| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        }).await?;
        let version = migrate_database(&connection).await?;
        log_info(LogServiceType::Database, format!("Current database version: {}", version));
        Ok(Self { connection })
    }
}
