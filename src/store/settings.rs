//! Key/value operator settings.
//!
//! Holds the globally visible bits that belong to no single entity, such as
//! the last successful sync time.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::employees::ignore_no_rows;
use super::{parse_ts, Database};
use crate::error::Result;

pub const LAST_SYNC_TIME: &str = "last_sync_time";

#[derive(Clone)]
pub struct SettingsStore {
    db: Database,
}

impl SettingsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.lock();
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(ignore_no_rows)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db.lock().execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Stamps `last_sync_time` with the current instant.
    pub fn touch_last_sync(&self) -> Result<()> {
        self.set(LAST_SYNC_TIME, &Utc::now().to_rfc3339())
    }

    pub fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        match self.get(LAST_SYNC_TIME)? {
            Some(s) => Ok(Some(parse_ts(&s)?)),
            None => Ok(None),
        }
    }
}
