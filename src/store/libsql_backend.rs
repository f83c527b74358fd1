//! libSQL backend for the `JobStore` trait.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::jobs::model::{JobRecord, JobStatus};
use crate::store::migrations;
use crate::store::traits::JobStore;

/// libSQL job store.
///
/// Holds a single connection reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlJobStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlJobStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Job database opened");
        Ok(store)
    }

    /// In-memory database, for tests.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    async fn query_one(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<JobRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| map_query_error(op, e))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(map_query_error(op, e)),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

const JOB_COLUMNS: &str = "id, name, status, created_at, updated_at";

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_job(row: &libsql::Row) -> Result<JobRecord, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("job row parse: {e}"));

    let id: i64 = row.get(0).map_err(read)?;
    let name: String = row.get(1).map_err(read)?;
    let status_str: String = row.get(2).map_err(read)?;
    let created_str: String = row.get(3).map_err(read)?;
    let updated_str: String = row.get(4).map_err(read)?;

    let status: JobStatus = status_str
        .parse()
        .map_err(|e: String| DatabaseError::Serialization(format!("job {id}: {e}")))?;

    Ok(JobRecord {
        id: Some(id),
        name,
        status,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// UNIQUE violations become `Constraint`; everything else is a query failure.
fn map_query_error(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl JobStore for LibSqlJobStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<JobRecord>, DatabaseError> {
        self.query_one(
            "find_by_name",
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE name = ?1"),
            params![name],
        )
        .await
    }

    async fn save(&self, job: JobRecord) -> Result<JobRecord, DatabaseError> {
        let now = Utc::now().to_rfc3339();

        let saved = match job.id {
            None => {
                self.query_one(
                    "save(insert)",
                    &format!(
                        "INSERT INTO jobs (name, status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(name) DO UPDATE
                         SET status = excluded.status, updated_at = excluded.updated_at
                         RETURNING {JOB_COLUMNS}"
                    ),
                    params![
                        job.name.as_str(),
                        job.status.as_str(),
                        job.created_at.to_rfc3339(),
                        now
                    ],
                )
                .await?
            }
            Some(id) => {
                self.query_one(
                    "save(update)",
                    &format!(
                        "UPDATE jobs SET name = ?1, status = ?2, updated_at = ?3 WHERE id = ?4
                         RETURNING {JOB_COLUMNS}"
                    ),
                    params![job.name.as_str(), job.status.as_str(), now, id],
                )
                .await?
            }
        };

        let saved = saved.ok_or_else(|| DatabaseError::NotFound {
            entity: "job".into(),
            id: job.id.map(|id| id.to_string()).unwrap_or_default(),
        })?;
        debug!(job_id = ?saved.id, name = %saved.name, status = %saved.status, "Job saved");
        Ok(saved)
    }

    async fn get(&self, id: i64) -> Result<Option<JobRecord>, DatabaseError> {
        self.query_one(
            "get",
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            params![id],
        )
        .await
    }

    async fn list(&self) -> Result<Vec<JobRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY id"), ())
            .await
            .map_err(|e| map_query_error("list", e))?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| map_query_error("list", e))? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    async fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        let affected = self
            .conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![id])
            .await
            .map_err(|e| map_query_error("delete", e))?;
        Ok(affected > 0)
    }

    async fn delete_all(&self) -> Result<usize, DatabaseError> {
        let affected = self
            .conn
            .execute("DELETE FROM jobs", ())
            .await
            .map_err(|e| map_query_error("delete_all", e))?;
        Ok(affected as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_find_by_name() {
        let store = LibSqlJobStore::new_memory().await.unwrap();
        let saved = store
            .save(JobRecord::new("Acme", JobStatus::Interview))
            .await
            .unwrap();
        assert!(saved.id.is_some());

        let found = store.find_by_name("Acme").await.unwrap().unwrap();
        assert_eq!(found.id, saved.id);
        assert_eq!(found.status, JobStatus::Interview);
        assert!(store.find_by_name("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_with_existing_name_upserts() {
        let store = LibSqlJobStore::new_memory().await.unwrap();
        let first = store
            .save(JobRecord::new("Acme", JobStatus::Waiting))
            .await
            .unwrap();
        let second = store
            .save(JobRecord::new("Acme", JobStatus::Rejected))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, JobStatus::Rejected);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_by_id() {
        let store = LibSqlJobStore::new_memory().await.unwrap();
        let mut job = store
            .save(JobRecord::new("Acme", JobStatus::Waiting))
            .await
            .unwrap();
        job.status = JobStatus::Interview;
        let updated = store.save(job.clone()).await.unwrap();
        assert_eq!(updated.id, job.id);
        assert_eq!(updated.status, JobStatus::Interview);

        job.id = Some(999);
        let err = store.save(job).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rename_collision_is_constraint_error() {
        let store = LibSqlJobStore::new_memory().await.unwrap();
        store
            .save(JobRecord::new("Acme", JobStatus::Waiting))
            .await
            .unwrap();
        let mut globex = store
            .save(JobRecord::new("Globex", JobStatus::Waiting))
            .await
            .unwrap();
        globex.name = "Acme".into();
        let err = store.save(globex).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn list_delete_delete_all() {
        let store = LibSqlJobStore::new_memory().await.unwrap();
        let a = store
            .save(JobRecord::new("Acme", JobStatus::Waiting))
            .await
            .unwrap();
        store
            .save(JobRecord::new("Globex", JobStatus::Interview))
            .await
            .unwrap();

        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.name)
            .collect();
        assert_eq!(names, vec!["Acme", "Globex"]);

        assert!(store.delete(a.id.unwrap()).await.unwrap());
        assert!(!store.delete(a.id.unwrap()).await.unwrap());
        assert_eq!(store.delete_all().await.unwrap(), 1);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_file_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.db");
        {
            let store = LibSqlJobStore::new_local(&path).await.unwrap();
            store
                .save(JobRecord::new("Acme", JobStatus::Rejected))
                .await
                .unwrap();
        }
        let store = LibSqlJobStore::new_local(&path).await.unwrap();
        let found = store.find_by_name("Acme").await.unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Rejected);
    }
}
