//! SQLite ledger of ingestion jobs.

use chrono::{SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::JobError;
use crate::models::{IngestJob, JobStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ingest_jobs (
    id TEXT PRIMARY KEY,
    pdf_path TEXT NOT NULL,
    text_path TEXT NOT NULL,
    collection TEXT NOT NULL,
    chunk_size INTEGER NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    chunks_stored INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ingest_jobs_status ON ingest_jobs(status);
CREATE INDEX IF NOT EXISTS idx_ingest_jobs_created_at ON ingest_jobs(created_at);
"#;

const COLUMNS: &str = "id, pdf_path, text_path, collection, chunk_size, status, attempts, \
                       chunks_stored, last_error, created_at, updated_at";

pub struct JobStore {
    conn: Mutex<Connection>,
}

impl JobStore {
    pub fn open(path: &Path) -> Result<Self, JobError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, JobError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, JobError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, JobError> {
        self.conn.lock().map_err(|_| JobError::LockPoisoned)
    }

    /// Persist a new `queued` job.
    pub fn insert(
        &self,
        pdf_path: &Path,
        text_path: &Path,
        collection: &str,
        chunk_size: usize,
    ) -> Result<IngestJob, JobError> {
        let now = now();
        let job = IngestJob {
            id: Uuid::new_v4().to_string(),
            pdf_path: pdf_path.to_path_buf(),
            text_path: text_path.to_path_buf(),
            collection: collection.to_string(),
            chunk_size,
            status: JobStatus::Queued,
            attempts: 0,
            chunks_stored: 0,
            last_error: None,
            created_at: now.clone(),
            updated_at: now,
        };

        self.conn()?.execute(
            &format!("INSERT INTO ingest_jobs ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                job.id,
                job.pdf_path.to_string_lossy(),
                job.text_path.to_string_lossy(),
                job.collection,
                job.chunk_size as i64,
                job.status.as_str(),
                job.attempts,
                job.chunks_stored as i64,
                job.last_error,
                job.created_at,
                job.updated_at,
            ],
        )?;

        Ok(job)
    }

    pub fn mark_running(&self, id: &str) -> Result<(), JobError> {
        self.update(
            id,
            "UPDATE ingest_jobs SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, JobStatus::Running.as_str(), now()],
        )
    }

    pub fn mark_succeeded(&self, id: &str, attempts: u32, chunks_stored: u64) -> Result<(), JobError> {
        self.update(
            id,
            "UPDATE ingest_jobs
             SET status = ?2, attempts = attempts + ?3, chunks_stored = ?4, last_error = NULL, updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                JobStatus::Succeeded.as_str(),
                attempts,
                chunks_stored as i64,
                now()
            ],
        )
    }

    pub fn mark_failed(
        &self,
        id: &str,
        attempts: u32,
        chunks_stored: u64,
        error: &str,
    ) -> Result<(), JobError> {
        self.update(
            id,
            "UPDATE ingest_jobs
             SET status = ?2, attempts = attempts + ?3, chunks_stored = ?4, last_error = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                JobStatus::Failed.as_str(),
                attempts,
                chunks_stored as i64,
                error,
                now()
            ],
        )
    }

    /// Put a failed job back in the queue.
    pub fn requeue(&self, id: &str) -> Result<IngestJob, JobError> {
        let job = self.get(id)?;
        if job.status != JobStatus::Failed {
            return Err(JobError::NotRetryable {
                id: id.to_string(),
                status: job.status.to_string(),
            });
        }

        self.update(
            id,
            "UPDATE ingest_jobs SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, JobStatus::Queued.as_str(), now()],
        )?;
        self.get(id)
    }

    pub fn get(&self, id: &str) -> Result<IngestJob, JobError> {
        self.conn()?
            .query_row(
                &format!("SELECT {COLUMNS} FROM ingest_jobs WHERE id = ?1"),
                params![id],
                row_to_job,
            )
            .optional()?
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Full id of the single job whose id starts with `prefix`.
    pub fn resolve_id(&self, prefix: &str) -> Result<String, JobError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM ingest_jobs WHERE substr(id, 1, length(?1)) = ?1 LIMIT 2")?;
        let ids = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        match ids.as_slice() {
            [id] => Ok(id.clone()),
            [] => Err(JobError::NotFound(prefix.to_string())),
            _ => Err(JobError::AmbiguousId(prefix.to_string())),
        }
    }

    /// Most recent jobs first.
    pub fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<IngestJob>, JobError> {
        let conn = self.conn()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let jobs = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM ingest_jobs WHERE status = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ))?;
                stmt.query_map(params![status.as_str(), limit], row_to_job)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM ingest_jobs ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ))?;
                stmt.query_map(params![limit], row_to_job)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(jobs)
    }

    /// Jobs left `queued` or `running`, oldest first.
    pub fn unfinished(&self) -> Result<Vec<IngestJob>, JobError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM ingest_jobs WHERE status IN (?1, ?2)
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let jobs = stmt
            .query_map(
                params![JobStatus::Queued.as_str(), JobStatus::Running.as_str()],
                row_to_job,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    pub fn counts(&self) -> Result<HashMap<JobStatus, u64>, JobError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM ingest_jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            if let Ok(status) = status.parse::<JobStatus>() {
                counts.insert(status, count.max(0) as u64);
            }
        }
        Ok(counts)
    }

    fn update(&self, id: &str, sql: &str, params: impl rusqlite::Params) -> Result<(), JobError> {
        let changed = self.conn()?.execute(sql, params)?;
        if changed == 0 {
            return Err(JobError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<IngestJob> {
    let status: String = row.get(5)?;
    let status = status.parse::<JobStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into())
    })?;
    let pdf_path: String = row.get(1)?;
    let text_path: String = row.get(2)?;
    let chunk_size: i64 = row.get(4)?;
    let chunks_stored: i64 = row.get(7)?;

    Ok(IngestJob {
        id: row.get(0)?,
        pdf_path: PathBuf::from(pdf_path),
        text_path: PathBuf::from(text_path),
        collection: row.get(3)?,
        chunk_size: chunk_size.max(0) as usize,
        status,
        attempts: row.get(6)?,
        chunks_stored: chunks_stored.max(0) as u64,
        last_error: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(store: &JobStore, name: &str) -> IngestJob {
        let pdf = PathBuf::from(format!("/uploads/{name}.pdf"));
        store
            .insert(&pdf, &pdf.with_extension("txt"), "knowledgebase", 512)
            .unwrap()
    }

    #[test]
    fn test_resolve_id_by_prefix() {
        let store = JobStore::open_in_memory().unwrap();
        let job = insert(&store, "a");

        assert_eq!(store.resolve_id(&job.id[..8]).unwrap(), job.id);
        assert_eq!(store.resolve_id(&job.id).unwrap(), job.id);
        assert!(matches!(store.resolve_id("zzzz"), Err(JobError::NotFound(_))));

        insert(&store, "b");
        assert!(matches!(store.resolve_id(""), Err(JobError::AmbiguousId(_))));
    }

    #[test]
    fn test_insert_and_get() {
        let store = JobStore::open_in_memory().unwrap();
        let job = insert(&store, "a");

        let loaded = store.get(&job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Queued);
        assert_eq!(loaded.pdf_path, PathBuf::from("/uploads/a.pdf"));
        assert_eq!(loaded.text_path, PathBuf::from("/uploads/a.txt"));
        assert_eq!(loaded.chunk_size, 512);
        assert_eq!(loaded.attempts, 0);
    }

    #[test]
    fn test_lifecycle_success() {
        let store = JobStore::open_in_memory().unwrap();
        let job = insert(&store, "a");

        store.mark_running(&job.id).unwrap();
        assert_eq!(store.get(&job.id).unwrap().status, JobStatus::Running);

        store.mark_succeeded(&job.id, 2, 17).unwrap();
        let done = store.get(&job.id).unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.attempts, 2);
        assert_eq!(done.chunks_stored, 17);
        assert!(done.last_error.is_none());
    }

    #[test]
    fn test_failure_requeue_accumulates_attempts() {
        let store = JobStore::open_in_memory().unwrap();
        let job = insert(&store, "a");

        store.mark_failed(&job.id, 3, 4, "store unavailable").unwrap();
        let failed = store.get(&job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("store unavailable"));

        let requeued = store.requeue(&job.id).unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);

        store.mark_succeeded(&job.id, 1, 9).unwrap();
        assert_eq!(store.get(&job.id).unwrap().attempts, 4);
    }

    #[test]
    fn test_requeue_rejects_unfailed_jobs() {
        let store = JobStore::open_in_memory().unwrap();
        let job = insert(&store, "a");
        store.mark_succeeded(&job.id, 1, 1).unwrap();

        assert!(matches!(
            store.requeue(&job.id),
            Err(JobError::NotRetryable { .. })
        ));
        assert!(matches!(store.requeue("missing"), Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_list_unfinished_and_counts() {
        let store = JobStore::open_in_memory().unwrap();
        let a = insert(&store, "a");
        let b = insert(&store, "b");
        let c = insert(&store, "c");
        store.mark_running(&b.id).unwrap();
        store.mark_failed(&c.id, 1, 0, "bad pdf").unwrap();

        let unfinished: Vec<String> = store.unfinished().unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(unfinished, vec![a.id.clone(), b.id.clone()]);

        let failed = store.list(Some(JobStatus::Failed), 10).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, c.id);

        let recent = store.list(None, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, c.id);

        let counts = store.counts().unwrap();
        assert_eq!(counts.get(&JobStatus::Queued), Some(&1));
        assert_eq!(counts.get(&JobStatus::Running), Some(&1));
        assert_eq!(counts.get(&JobStatus::Failed), Some(&1));
        assert_eq!(counts.get(&JobStatus::Succeeded), None);
    }

    #[test]
    fn test_update_missing_job() {
        let store = JobStore::open_in_memory().unwrap();
        assert!(matches!(store.mark_running("nope"), Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_open_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("jobs.db");

        let id = {
            let store = JobStore::open(&path).unwrap();
            insert(&store, "a").id
        };

        let reopened = JobStore::open(&path).unwrap();
        assert_eq!(reopened.get(&id).unwrap().status, JobStatus::Queued);
    }
}
