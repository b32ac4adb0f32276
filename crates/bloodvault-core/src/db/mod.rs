//! Database layer for BloodVault.

mod donors;
mod inventory;
mod requests;
mod schema;

#[allow(unused_imports)]
pub use donors::*;
#[allow(unused_imports)]
pub use inventory::*;
#[allow(unused_imports)]
pub use requests::*;
pub use schema::*;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;
use tracing::info;

use crate::allocation::StoreError;
use crate::config::Config;
use crate::models::ModelError;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    Invalid(#[from] ModelError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Conflict(msg) => StoreError::Conflict(msg),
            DbError::NotFound(msg) => StoreError::NotFound(msg),
            DbError::Invalid(e) => StoreError::Invalid(e),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Database connection wrapper.
///
/// One `Database` owns one connection. Open one per thread to share a
/// database file; writers serialize on SQLite's lock and wait up to the
/// configured busy timeout.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self { conn };
        db.initialize()?;
        info!(path = %path.as_ref().display(), "database opened");
        Ok(db)
    }

    /// Open the database named by `config`, applying its busy timeout.
    pub fn open_with_config(config: &Config) -> DbResult<Self> {
        let db = Self::open(&config.database_path)?;
        db.conn
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(s: &str) -> DbResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DbError::Constraint(format!("Bad date {:?}: {}", s, e)))
}

/// Fixed-width RFC 3339 so stored timestamps sort as text.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DbError::Constraint(format!("Bad timestamp {:?}: {}", s, e)))
}

pub(crate) fn volume_from_db(volume: i64) -> DbResult<u32> {
    u32::try_from(volume)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| DbError::Constraint(format!("Bad volume: {}", volume)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        // Check that tables exist
        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"donors".to_string()));
        assert!(tables.contains(&"donations".to_string()));
        assert!(tables.contains(&"inventory_units".to_string()));
        assert!(tables.contains(&"requests".to_string()));
        assert!(tables.contains(&"allocations".to_string()));
    }

    #[test]
    fn test_open_with_config_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: dir.path().join("vault.db").to_string_lossy().into_owned(),
            ..Config::default()
        };

        let db = Database::open_with_config(&config);
        assert!(db.is_ok());
        assert!(dir.path().join("vault.db").exists());
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = parse_timestamp("2025-01-01T10:00:00Z").unwrap();
        let b = parse_timestamp("2025-01-01T10:00:00.5Z").unwrap();
        assert_eq!(format_timestamp(a).len(), format_timestamp(b).len());
        assert!(format_timestamp(a) < format_timestamp(b));
    }

    #[test]
    fn test_volume_from_db() {
        assert_eq!(volume_from_db(450).unwrap(), 450);
        assert!(volume_from_db(0).is_err());
        assert!(volume_from_db(-1).is_err());
    }
}
