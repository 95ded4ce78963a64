//! Relational store for employees, tokens, snapshots and sync history.
//!
//! One SQLite database behind a shared connection, with a facade per entity:
//!
//! - [`EmployeeStore`] — employee CRUD and auth-status transitions
//! - [`TokenStore`] — the 1:1 employee → OAuth credential mapping
//! - [`SnapshotStore`] — append-only dated metric snapshots
//! - [`VideoStore`] — per-employee video rows, replaced wholesale each sync
//! - [`SyncRecordStore`] — one row per sync invocation
//! - [`SettingsStore`] — key/value operator settings
//!
//! The facades are cheap to clone (they share the connection handle) and are
//! constructed once at startup, then passed explicitly into whatever needs
//! them. Configuration selects a file path for durability or `:memory:` as
//! the throwaway fallback mode.

use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod employees;
pub mod encryption;
pub mod settings;
pub mod snapshots;
pub mod sync_records;
pub mod tokens;
pub mod videos;

pub use employees::EmployeeStore;
pub use settings::SettingsStore;
pub use snapshots::SnapshotStore;
pub use sync_records::SyncRecordStore;
pub use tokens::{StoredToken, TokenData, TokenStore};
pub use videos::VideoStore;

/// Authorization state of an employee's Douyin account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Pending,
    Authorized,
    Expired,
    Revoked,
}

impl AuthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthStatus::Pending => "pending",
            AuthStatus::Authorized => "authorized",
            AuthStatus::Expired => "expired",
            AuthStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(AuthStatus::Pending),
            "authorized" => Ok(AuthStatus::Authorized),
            "expired" => Ok(AuthStatus::Expired),
            "revoked" => Ok(AuthStatus::Revoked),
            other => Err(Error::Internal(format!(
                "unknown auth status in database: '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six cumulative engagement counters tracked per employee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCounters {
    pub fans_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub home_pv: i64,
    pub video_count: i64,
}

/// An employee record with its current ("live") counters.
///
/// The counters answer "current value" queries; history and trends come from
/// the immutable snapshots instead.
#[derive(Debug, Clone, Serialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub department: String,
    pub position: String,
    pub douyin_account: String,
    pub auth_status: AuthStatus,
    #[serde(flatten)]
    pub counters: MetricCounters,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an employee.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewEmployee {
    pub name: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub position: String,
    pub douyin_account: String,
}

/// Explicit partial update for an employee.
///
/// Enumerates every mutable field; unknown keys are rejected at the API
/// boundary rather than silently dropped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmployeeUpdate {
    pub name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub douyin_account: Option<String>,
    pub auth_status: Option<AuthStatus>,
    pub fans_count: Option<i64>,
    pub like_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub share_count: Option<i64>,
    pub home_pv: Option<i64>,
    pub video_count: Option<i64>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl EmployeeUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.department.is_none()
            && self.position.is_none()
            && self.douyin_account.is_none()
            && self.auth_status.is_none()
            && self.fans_count.is_none()
            && self.like_count.is_none()
            && self.comment_count.is_none()
            && self.share_count.is_none()
            && self.home_pv.is_none()
            && self.video_count.is_none()
            && self.last_sync_time.is_none()
    }
}

/// Shared SQLite handle.
///
/// The connection is wrapped in a Mutex for safe concurrent access; SQLite
/// itself runs in serialized mode. Cloning is cheap and every clone talks to
/// the same database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at `path` and ensures the schema.
    ///
    /// `":memory:"` selects the in-memory fallback mode.
    pub fn open(path: &str) -> AnyResult<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path))?;
        conn.pragma_update(None, "foreign_keys", true)
            .context("Failed to enable foreign keys")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_schema()?;
        Ok(db)
    }

    fn create_schema(&self) -> AnyResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS employees (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                department      TEXT NOT NULL DEFAULT '',
                position        TEXT NOT NULL DEFAULT '',
                douyin_account  TEXT NOT NULL UNIQUE,
                auth_status     TEXT NOT NULL DEFAULT 'pending',
                fans_count      INTEGER NOT NULL DEFAULT 0,
                like_count      INTEGER NOT NULL DEFAULT 0,
                comment_count   INTEGER NOT NULL DEFAULT 0,
                share_count     INTEGER NOT NULL DEFAULT 0,
                home_pv         INTEGER NOT NULL DEFAULT 0,
                video_count     INTEGER NOT NULL DEFAULT 0,
                last_sync_time  TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_employees_auth_status
                ON employees(auth_status);

            CREATE TABLE IF NOT EXISTS auth_tokens (
                employee_id         TEXT PRIMARY KEY
                                    REFERENCES employees(id) ON DELETE CASCADE,
                access_token        TEXT NOT NULL,
                access_token_nonce  TEXT NOT NULL,
                refresh_token       TEXT NOT NULL,
                refresh_token_nonce TEXT NOT NULL,
                open_id             TEXT NOT NULL DEFAULT '',
                scope               TEXT NOT NULL DEFAULT '',
                expires_in          INTEGER NOT NULL DEFAULT 0,
                refresh_expires_in  INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metric_snapshots (
                id            INTEGER PRIMARY KEY,
                employee_id   TEXT NOT NULL
                              REFERENCES employees(id) ON DELETE CASCADE,
                fans_count    INTEGER NOT NULL DEFAULT 0,
                like_count    INTEGER NOT NULL DEFAULT 0,
                comment_count INTEGER NOT NULL DEFAULT 0,
                share_count   INTEGER NOT NULL DEFAULT 0,
                home_pv       INTEGER NOT NULL DEFAULT 0,
                video_count   INTEGER NOT NULL DEFAULT 0,
                data_date     TEXT NOT NULL,
                created_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_employee_date
                ON metric_snapshots(employee_id, data_date);

            CREATE TABLE IF NOT EXISTS video_records (
                id            INTEGER PRIMARY KEY,
                employee_id   TEXT NOT NULL
                              REFERENCES employees(id) ON DELETE CASCADE,
                video_id      TEXT NOT NULL DEFAULT '',
                title         TEXT NOT NULL DEFAULT '',
                cover_url     TEXT NOT NULL DEFAULT '',
                play_count    INTEGER NOT NULL DEFAULT 0,
                like_count    INTEGER NOT NULL DEFAULT 0,
                comment_count INTEGER NOT NULL DEFAULT 0,
                share_count   INTEGER NOT NULL DEFAULT 0,
                create_time   INTEGER NOT NULL DEFAULT 0,
                duration      INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_videos_employee
                ON video_records(employee_id);

            CREATE TABLE IF NOT EXISTS sync_records (
                id            INTEGER PRIMARY KEY,
                employee_id   TEXT,
                sync_type     TEXT NOT NULL,
                status        TEXT NOT NULL,
                start_time    TEXT NOT NULL,
                end_time      TEXT,
                success_count INTEGER NOT NULL DEFAULT 0,
                failed_count  INTEGER NOT NULL DEFAULT 0,
                error_message TEXT
            );

            CREATE TABLE IF NOT EXISTS settings (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create database schema")?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Dumps every table as JSON, keyed by table name. Used by the export
    /// endpoint.
    pub fn export_all(&self) -> Result<serde_json::Value> {
        let conn = self.lock();
        let mut out = serde_json::Map::new();
        for table in TABLES {
            out.insert(table.to_string(), table_to_json(&conn, table)?);
        }
        Ok(serde_json::Value::Object(out))
    }

    /// Deletes every row from every table. Children first so the cascade
    /// order never matters.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.lock();
        for table in TABLES.iter().rev() {
            conn.execute(&format!("DELETE FROM {}", table), [])?;
        }
        Ok(())
    }
}

/// Tables in parent-before-child order.
const TABLES: &[&str] = &[
    "employees",
    "auth_tokens",
    "metric_snapshots",
    "video_records",
    "sync_records",
    "settings",
];

fn table_to_json(conn: &Connection, table: &str) -> Result<serde_json::Value> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", table))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let rows = stmt.query_map([], |row| {
        let mut obj = serde_json::Map::new();
        for (i, name) in columns.iter().enumerate() {
            let value = match row.get_ref(i)? {
                rusqlite::types::ValueRef::Null => serde_json::Value::Null,
                rusqlite::types::ValueRef::Integer(n) => serde_json::Value::from(n),
                rusqlite::types::ValueRef::Real(f) => serde_json::Value::from(f),
                rusqlite::types::ValueRef::Text(t) => {
                    serde_json::Value::from(String::from_utf8_lossy(t).into_owned())
                }
                rusqlite::types::ValueRef::Blob(_) => serde_json::Value::Null,
            };
            obj.insert(name.clone(), value);
        }
        Ok(serde_json::Value::Object(obj))
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(serde_json::Value::Array(out))
}

/// Parse an rfc3339 timestamp stored as TEXT.
pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("invalid timestamp in database: {}", e)))
}
