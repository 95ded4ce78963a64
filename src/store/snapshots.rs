//! Append-only dated metric snapshots.
//!
//! One row per employee per fetch, never mutated after insert. History and
//! trend queries read these; "current value" queries read the employee
//! counters instead.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use super::employees::{collect_rows, ignore_no_rows};
use super::{parse_ts, Database, MetricCounters};
use crate::error::Result;

/// An immutable record of the six metric values at fetch time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub id: i64,
    pub employee_id: String,
    #[serde(flatten)]
    pub counters: MetricCounters,
    pub data_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SnapshotStore {
    db: Database,
}

impl SnapshotStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Appends a snapshot row dated `data_date`.
    pub fn append(
        &self,
        employee_id: &str,
        counters: &MetricCounters,
        data_date: NaiveDate,
    ) -> Result<i64> {
        let conn = self.db.lock();
        conn.execute(
            r#"
            INSERT INTO metric_snapshots (
                employee_id, fans_count, like_count, comment_count,
                share_count, home_pv, video_count, data_date, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                employee_id,
                counters.fans_count,
                counters.like_count,
                counters.comment_count,
                counters.share_count,
                counters.home_pv,
                counters.video_count,
                data_date.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent snapshot for an employee, if any.
    pub fn latest(&self, employee_id: &str) -> Result<Option<MetricSnapshot>> {
        let conn = self.db.lock();
        conn.query_row(
            "SELECT * FROM metric_snapshots WHERE employee_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![employee_id],
            row_to_snapshot,
        )
        .map(Some)
        .or_else(ignore_no_rows)
    }

    /// Snapshots from the last `days` days, newest first.
    pub fn history(&self, employee_id: &str, days: i64) -> Result<Vec<MetricSnapshot>> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM metric_snapshots
             WHERE employee_id = ?1 AND created_at >= ?2
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![employee_id, cutoff], row_to_snapshot)?;
        collect_rows(rows)
    }
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<MetricSnapshot> {
    let date: String = row.get("data_date")?;
    let created: String = row.get("created_at")?;
    Ok(MetricSnapshot {
        id: row.get("id")?,
        employee_id: row.get("employee_id")?,
        counters: MetricCounters {
            fans_count: row.get("fans_count")?,
            like_count: row.get("like_count")?,
            comment_count: row.get("comment_count")?,
            share_count: row.get("share_count")?,
            home_pv: row.get("home_pv")?,
            video_count: row.get("video_count")?,
        },
        data_date: date.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?,
        created_at: parse_ts(&created).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
            )
        })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EmployeeStore, NewEmployee};

    fn setup() -> (EmployeeStore, SnapshotStore, String) {
        let db = Database::open(":memory:").unwrap();
        let employees = EmployeeStore::new(db.clone());
        let snapshots = SnapshotStore::new(db);
        let emp = employees
            .add(NewEmployee {
                name: "Zhang".to_string(),
                department: String::new(),
                position: String::new(),
                douyin_account: "zhang_dy".to_string(),
            })
            .unwrap();
        (employees, snapshots, emp.id)
    }

    fn counters(fans: i64) -> MetricCounters {
        MetricCounters {
            fans_count: fans,
            like_count: 2,
            comment_count: 3,
            share_count: 4,
            home_pv: 5,
            video_count: 6,
        }
    }

    #[test]
    fn test_append_and_latest() {
        let (_, snapshots, emp_id) = setup();
        let today = Utc::now().date_naive();

        snapshots.append(&emp_id, &counters(100), today).unwrap();
        snapshots.append(&emp_id, &counters(150), today).unwrap();

        let latest = snapshots.latest(&emp_id).unwrap().unwrap();
        assert_eq!(latest.counters.fans_count, 150);
        assert_eq!(latest.data_date, today);
    }

    #[test]
    fn test_latest_missing_is_none() {
        let (_, snapshots, _) = setup();
        assert!(snapshots.latest("emp_ghost").unwrap().is_none());
    }

    #[test]
    fn test_history_ordered_newest_first() {
        let (_, snapshots, emp_id) = setup();
        let today = Utc::now().date_naive();

        snapshots.append(&emp_id, &counters(1), today).unwrap();
        snapshots.append(&emp_id, &counters(2), today).unwrap();
        snapshots.append(&emp_id, &counters(3), today).unwrap();

        let history = snapshots.history(&emp_id, 30).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].counters.fans_count, 3);
        assert_eq!(history[2].counters.fans_count, 1);
    }

    #[test]
    fn test_history_cascades_with_employee_delete() {
        let (employees, snapshots, emp_id) = setup();
        let today = Utc::now().date_naive();
        snapshots.append(&emp_id, &counters(1), today).unwrap();

        employees.delete(&emp_id).unwrap();
        assert!(snapshots.history(&emp_id, 30).unwrap().is_empty());
    }
}
