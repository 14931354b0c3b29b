//! Module configuration storage.
//!
//! The host CMS owns the configuration record; [`ConfigStore`] is the seam
//! through which the widget reads it and writes back the two location
//! fields. [`SqliteStore`] is a standalone adapter keeping each module's
//! params as a JSON document in a single table.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::params::ModuleParams;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("module {0} not found")]
    NotFound(i64),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("stored params are not valid JSON: {0}")]
    Params(#[from] serde_json::Error),
    #[error("store connection poisoned")]
    Poisoned,
}

pub trait ConfigStore: Send + Sync {
    /// Loads the params of module `module_id`.
    fn load(&self, module_id: i64) -> Result<ModuleParams, StoreError>;

    /// Updates the location fields of one module in a single write.
    /// `auto_location` is left untouched when `None`.
    fn write_location(
        &self,
        module_id: i64,
        location: &str,
        auto_location: Option<bool>,
    ) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        // Create Schema
        conn.execute(
            "CREATE TABLE IF NOT EXISTS modules (
                id INTEGER PRIMARY KEY,
                params TEXT NOT NULL DEFAULT '{}'
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates or replaces the params record of a module.
    pub fn save(&self, module_id: i64, module_params: &ModuleParams) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO modules (id, params) VALUES (?1, ?2)",
            params![module_id, module_params.to_json()],
        )?;
        Ok(())
    }

    /// Makes sure a record exists for `module_id`, leaving existing params alone.
    pub fn ensure(&self, module_id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT OR IGNORE INTO modules (id, params) VALUES (?1, '{}')",
            params![module_id],
        )?;
        Ok(())
    }
}

impl ConfigStore for SqliteStore {
    fn load(&self, module_id: i64) -> Result<ModuleParams, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT params FROM modules WHERE id = ?1",
                [module_id],
                |row| row.get(0),
            )
            .optional()?;

        let raw = raw.ok_or(StoreError::NotFound(module_id))?;
        Ok(ModuleParams::from_json(&raw)?)
    }

    fn write_location(
        &self,
        module_id: i64,
        location: &str,
        auto_location: Option<bool>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let updated = match auto_location {
            Some(auto) => conn.execute(
                "UPDATE modules
                 SET params = json_set(COALESCE(NULLIF(params, ''), '{}'),
                                       '$.location', ?1, '$.auto_location', ?2)
                 WHERE id = ?3",
                params![location, i64::from(auto), module_id],
            )?,
            None => conn.execute(
                "UPDATE modules
                 SET params = json_set(COALESCE(NULLIF(params, ''), '{}'), '$.location', ?1)
                 WHERE id = ?2",
                params![location, module_id],
            )?,
        };

        if updated == 0 {
            return Err(StoreError::NotFound(module_id));
        }
        Ok(())
    }
}
