//! Employee CRUD and auth-status transitions.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Row, ToSql};
use serde::Serialize;
use uuid::Uuid;

use super::{parse_ts, AuthStatus, Database, Employee, EmployeeUpdate, MetricCounters, NewEmployee};
use crate::error::{Error, Result};

/// Aggregate numbers for the statistics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_employees: i64,
    pub authorized_employees: i64,
    pub total_fans: i64,
    pub total_videos: i64,
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// CRUD over employee records.
///
/// Owns the `douyin_account` uniqueness rule and the auth-status column;
/// other components (token store, sync orchestrator) drive transitions
/// through it.
#[derive(Clone)]
pub struct EmployeeStore {
    db: Database,
}

impl EmployeeStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Registers a new employee with status `pending`.
    ///
    /// Rejects an empty name/account and a `douyin_account` that is already
    /// registered; nothing is written in either case.
    pub fn add(&self, new: NewEmployee) -> Result<Employee> {
        if new.name.trim().is_empty() {
            return Err(Error::validation("employee name must not be empty"));
        }
        if new.douyin_account.trim().is_empty() {
            return Err(Error::validation("douyin account must not be empty"));
        }

        let conn = self.db.lock();
        let taken: Option<String> = conn
            .query_row(
                "SELECT id FROM employees WHERE douyin_account = ?1",
                params![new.douyin_account],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(ignore_no_rows)?;
        if taken.is_some() {
            return Err(Error::validation(format!(
                "douyin account '{}' is already registered",
                new.douyin_account
            )));
        }

        let id = format!("emp_{}", Uuid::new_v4().simple());
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO employees (id, name, department, position, douyin_account,
                                   auth_status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)
            "#,
            params![id, new.name, new.department, new.position, new.douyin_account, now],
        )?;
        drop(conn);

        self.get(&id)?
            .ok_or_else(|| Error::Internal("employee vanished after insert".to_string()))
    }

    pub fn get(&self, id: &str) -> Result<Option<Employee>> {
        let conn = self.db.lock();
        conn.query_row(
            "SELECT * FROM employees WHERE id = ?1",
            params![id],
            row_to_employee,
        )
        .map(Some)
        .or_else(ignore_no_rows)
    }

    /// Like [`get`](Self::get) but a missing employee is a typed `NotFound`.
    pub fn require(&self, id: &str) -> Result<Employee> {
        self.get(id)?
            .ok_or_else(|| Error::not_found(format!("employee {} not found", id)))
    }

    /// All employees, newest first.
    pub fn list(&self) -> Result<Vec<Employee>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare("SELECT * FROM employees ORDER BY created_at DESC")?;
        let rows = stmt.query_map([], row_to_employee)?;
        collect_rows(rows)
    }

    /// Employees currently in the `authorized` state — the default batch-sync
    /// target set.
    pub fn list_authorized(&self) -> Result<Vec<Employee>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM employees WHERE auth_status = 'authorized' ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_employee)?;
        collect_rows(rows)
    }

    /// Applies a partial update. An update with no fields set is a
    /// validation error, as is changing `douyin_account` to a taken value.
    pub fn update(&self, id: &str, update: &EmployeeUpdate) -> Result<Employee> {
        if update.is_empty() {
            return Err(Error::validation("no updatable fields provided"));
        }
        // Existence check first so a bad id is NotFound, not a silent no-op
        self.require(id)?;

        if let Some(account) = &update.douyin_account {
            let conn = self.db.lock();
            let taken: Option<String> = conn
                .query_row(
                    "SELECT id FROM employees WHERE douyin_account = ?1 AND id != ?2",
                    params![account, id],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(ignore_no_rows)?;
            if taken.is_some() {
                return Err(Error::validation(format!(
                    "douyin account '{}' is already registered",
                    account
                )));
            }
        }

        let mut fields: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        macro_rules! push_field {
            ($name:literal, $value:expr) => {
                if let Some(v) = $value {
                    fields.push(concat!($name, " = ?"));
                    values.push(Box::new(v));
                }
            };
        }

        push_field!("name", update.name.clone());
        push_field!("department", update.department.clone());
        push_field!("position", update.position.clone());
        push_field!("douyin_account", update.douyin_account.clone());
        push_field!("auth_status", update.auth_status.map(|s| s.as_str().to_string()));
        push_field!("fans_count", update.fans_count);
        push_field!("like_count", update.like_count);
        push_field!("comment_count", update.comment_count);
        push_field!("share_count", update.share_count);
        push_field!("home_pv", update.home_pv);
        push_field!("video_count", update.video_count);
        push_field!("last_sync_time", update.last_sync_time.map(|t| t.to_rfc3339()));

        fields.push("updated_at = ?");
        values.push(Box::new(Utc::now().to_rfc3339()));
        values.push(Box::new(id.to_string()));

        // Positional '?' placeholders bind in push order; id is last
        let sql = format!(
            "UPDATE employees SET {} WHERE id = ?",
            fields.join(", ")
        );
        self.db
            .lock()
            .execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;

        self.require(id)
    }

    /// Auth-status transition, driven by the auth flow and orchestrator.
    pub fn set_auth_status(&self, id: &str, status: AuthStatus) -> Result<()> {
        let changed = self.db.lock().execute(
            "UPDATE employees SET auth_status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(Error::not_found(format!("employee {} not found", id)));
        }
        Ok(())
    }

    /// Deletes the employee. Token, snapshots and video rows go with it
    /// (foreign-key cascade). Returns false when the id does not exist.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self
            .db
            .lock()
            .execute("DELETE FROM employees WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn statistics(&self) -> Result<Statistics> {
        let conn = self.db.lock();
        conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN auth_status = 'authorized' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(fans_count), 0),
                   COALESCE(SUM(video_count), 0)
            FROM employees
            "#,
            [],
            |row| {
                Ok(Statistics {
                    total_employees: row.get(0)?,
                    authorized_employees: row.get(1)?,
                    total_fans: row.get(2)?,
                    total_videos: row.get(3)?,
                    last_sync_time: None,
                })
            },
        )
        .map_err(Error::from)
    }
}

fn row_to_employee(row: &Row<'_>) -> rusqlite::Result<Employee> {
    let status: String = row.get("auth_status")?;
    let last_sync: Option<String> = row.get("last_sync_time")?;
    let created: String = row.get("created_at")?;
    let updated: String = row.get("updated_at")?;

    Ok(Employee {
        id: row.get("id")?,
        name: row.get("name")?,
        department: row.get("department")?,
        position: row.get("position")?,
        douyin_account: row.get("douyin_account")?,
        // Timestamp/status parse failures surface through FromSqlConversionFailure
        auth_status: AuthStatus::parse(&status).map_err(to_sql_err)?,
        counters: MetricCounters {
            fans_count: row.get("fans_count")?,
            like_count: row.get("like_count")?,
            comment_count: row.get("comment_count")?,
            share_count: row.get("share_count")?,
            home_pv: row.get("home_pv")?,
            video_count: row.get("video_count")?,
        },
        last_sync_time: last_sync
            .map(|s| parse_ts(&s).map_err(to_sql_err))
            .transpose()?,
        created_at: parse_ts(&created).map_err(to_sql_err)?,
        updated_at: parse_ts(&updated).map_err(to_sql_err)?,
    })
}

fn to_sql_err(e: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
    )
}

pub(crate) fn ignore_no_rows<T>(e: rusqlite::Error) -> Result<Option<T>> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other.into()),
    }
}

pub(crate) fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
