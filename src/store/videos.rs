//! Per-employee video rows.
//!
//! The upstream video list is authoritative: each sync replaces the
//! employee's rows wholesale (delete then insert, one transaction).

use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::employees::collect_rows;
use super::Database;
use crate::error::Result;

/// One video as persisted for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub cover_url: String,
    pub play_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    /// Publish time, unix seconds as reported upstream.
    pub create_time: i64,
    pub duration: i64,
}

#[derive(Clone)]
pub struct VideoStore {
    db: Database,
}

impl VideoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Replaces the employee's video rows with `videos`.
    pub fn replace_all(&self, employee_id: &str, videos: &[VideoRecord]) -> Result<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM video_records WHERE employee_id = ?1",
            params![employee_id],
        )?;
        for video in videos {
            tx.execute(
                r#"
                INSERT INTO video_records (
                    employee_id, video_id, title, cover_url,
                    play_count, like_count, comment_count, share_count,
                    create_time, duration
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    employee_id,
                    video.video_id,
                    video.title,
                    video.cover_url,
                    video.play_count,
                    video.like_count,
                    video.comment_count,
                    video.share_count,
                    video.create_time,
                    video.duration,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Newest videos first, capped at `limit`.
    pub fn list(&self, employee_id: &str, limit: u32) -> Result<Vec<VideoRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM video_records WHERE employee_id = ?1
             ORDER BY create_time DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![employee_id, limit], row_to_video)?;
        collect_rows(rows)
    }
}

fn row_to_video(row: &Row<'_>) -> rusqlite::Result<VideoRecord> {
    Ok(VideoRecord {
        video_id: row.get("video_id")?,
        title: row.get("title")?,
        cover_url: row.get("cover_url")?,
        play_count: row.get("play_count")?,
        like_count: row.get("like_count")?,
        comment_count: row.get("comment_count")?,
        share_count: row.get("share_count")?,
        create_time: row.get("create_time")?,
        duration: row.get("duration")?,
    })
}
