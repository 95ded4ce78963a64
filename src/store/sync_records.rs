//! Sync invocation history.
//!
//! One row per sync run. Append-only except for the single
//! `running → success | failed` transition when the run completes.

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::employees::collect_rows;
use super::{parse_ts, Database};
use crate::error::{Error, Result};

/// How a sync run was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Manual,
    Scheduled,
}

impl SyncType {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncType::Manual => "manual",
            SyncType::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(SyncStatus::Running),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(Error::Internal(format!(
                "unknown sync status in database: '{}'",
                other
            ))),
        }
    }
}

/// A persisted sync run. `employee_id` is None for batch runs.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRecord {
    pub id: i64,
    pub employee_id: Option<String>,
    pub sync_type: String,
    pub status: SyncStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub success_count: i64,
    pub failed_count: i64,
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct SyncRecordStore {
    db: Database,
}

impl SyncRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens a run in the `running` state; returns its id.
    pub fn begin(&self, employee_id: Option<&str>, sync_type: SyncType) -> Result<i64> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO sync_records (employee_id, sync_type, status, start_time)
             VALUES (?1, ?2, 'running', ?3)",
            params![employee_id, sync_type.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Closes a run: stamps the end time, counts and error summary.
    pub fn finish(
        &self,
        id: i64,
        status: SyncStatus,
        success_count: i64,
        failed_count: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        let changed = self.db.lock().execute(
            "UPDATE sync_records
             SET status = ?1, end_time = ?2, success_count = ?3,
                 failed_count = ?4, error_message = ?5
             WHERE id = ?6",
            params![
                status.as_str(),
                Utc::now().to_rfc3339(),
                success_count,
                failed_count,
                error_message,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found(format!("sync record {} not found", id)));
        }
        Ok(())
    }

    /// Most recent runs first.
    pub fn history(&self, limit: u32) -> Result<Vec<SyncRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM sync_records ORDER BY start_time DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_record)?;
        collect_rows(rows)
    }

    pub fn get(&self, id: i64) -> Result<Option<SyncRecord>> {
        let conn = self.db.lock();
        conn.query_row(
            "SELECT * FROM sync_records WHERE id = ?1",
            params![id],
            row_to_record,
        )
        .map(Some)
        .or_else(super::employees::ignore_no_rows)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SyncRecord> {
    let status: String = row.get("status")?;
    let start: String = row.get("start_time")?;
    let end: Option<String> = row.get("end_time")?;

    let conv = |e: Error| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    };

    Ok(SyncRecord {
        id: row.get("id")?,
        employee_id: row.get("employee_id")?,
        sync_type: row.get("sync_type")?,
        status: SyncStatus::parse(&status).map_err(conv)?,
        start_time: parse_ts(&start).map_err(conv)?,
        end_time: end.map(|s| parse_ts(&s).map_err(conv)).transpose()?,
        success_count: row.get("success_count")?,
        failed_count: row.get("failed_count")?,
        error_message: row.get("error_message")?,
    })
}
