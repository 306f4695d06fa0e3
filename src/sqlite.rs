// src/sqlite.rs
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{Job, JobId, Result, SoloqError, Storage};

/// SQLite-backed durable [`Storage`].
///
/// One row per job; the autoincrement id is the FIFO ordering key, so a
/// retried job keeps its queue position. The `active` column marks the
/// single in-flight job. Opening a database resets any stale active
/// marker left by a crashed process, so an interrupted job is fetched
/// again on the next run.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) a job database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task TEXT NOT NULL,
                data TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_task ON jobs(task);",
        )?;
        // A row still marked active belongs to a previous process that
        // died mid-job; put it back in the pending set.
        conn.execute("UPDATE jobs SET active = 0 WHERE active != 0", [])?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<(Job, String)> {
    let id: i64 = row.get(0)?;
    let task: String = row.get(1)?;
    let data: String = row.get(2)?;
    let attempts: u32 = row.get(3)?;
    let created_at: DateTime<Utc> = row.get(4)?;
    Ok((
        Job {
            id: JobId(id),
            task,
            data: serde_json::Value::Null,
            attempts,
            created_at,
        },
        data,
    ))
}

fn decode(raw: Option<(Job, String)>) -> Result<Option<Job>> {
    match raw {
        Some((mut job, data)) => {
            job.data = serde_json::from_str(&data)?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

const JOB_COLUMNS: &str = "id, task, data, attempts, created_at";

impl Storage for SqliteStorage {
    fn persist(&self, task: &str, data: serde_json::Value) -> Result<Job> {
        if task.is_empty() {
            return Err(SoloqError::InvalidJob("empty task name".into()));
        }
        let created_at = Utc::now();
        let encoded = serde_json::to_string(&data)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO jobs (task, data, attempts, active, created_at)
             VALUES (?1, ?2, 0, 0, ?3)",
            params![task, encoded, created_at],
        )?;
        Ok(Job {
            id: JobId(conn.last_insert_rowid()),
            task: task.to_string(),
            data,
            attempts: 0,
            created_at,
        })
    }

    fn next_pending(&self) -> Result<Option<Job>> {
        let raw = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE active = 0 ORDER BY id ASC LIMIT 1"
                ),
                [],
                job_from_row,
            )
            .optional()?;
        decode(raw)
    }

    fn update_attempt_count(&self, id: JobId, attempts: u32) -> Result<()> {
        self.conn().execute(
            "UPDATE jobs SET attempts = ?1 WHERE id = ?2",
            params![attempts, id.0],
        )?;
        Ok(())
    }

    fn remove(&self, id: JobId) -> Result<()> {
        self.conn()
            .execute("DELETE FROM jobs WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        self.conn().execute("DELETE FROM jobs", [])?;
        Ok(())
    }

    fn exists(&self, task: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM jobs WHERE task = ?1",
            params![task],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn mark_active(&self, id: JobId) -> Result<()> {
        let conn = self.conn();
        conn.execute("UPDATE jobs SET active = 0 WHERE active != 0", [])?;
        conn.execute("UPDATE jobs SET active = 1 WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    fn clear_active(&self, id: JobId) -> Result<()> {
        self.conn()
            .execute("UPDATE jobs SET active = 0 WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    fn active_job(&self) -> Result<Option<Job>> {
        let raw = self
            .conn()
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE active = 1 LIMIT 1"),
                [],
                job_from_row,
            )
            .optional()?;
        decode(raw)
    }

    fn pending_jobs(&self, task: &str) -> Result<Vec<Job>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE task = ?1 AND active = 0 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![task], job_from_row)?;

        let mut jobs = Vec::new();
        for row in rows {
            if let Some(job) = decode(Some(row?))? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }
}
