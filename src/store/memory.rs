//! In-memory `JobStore`, used by tests and when no database path is set.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::jobs::model::JobRecord;
use crate::store::traits::JobStore;

#[derive(Default)]
struct Inner {
    next_id: i64,
    jobs: BTreeMap<i64, JobRecord>,
}

/// `JobStore` backed by a `BTreeMap` behind an async lock.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<JobRecord>, DatabaseError> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.values().find(|j| j.name == name).cloned())
    }

    async fn save(&self, mut job: JobRecord) -> Result<JobRecord, DatabaseError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        match job.id {
            Some(id) => {
                if name_taken(&inner.jobs, &job.name, id) {
                    return Err(DatabaseError::Constraint(format!(
                        "job name '{}' already exists",
                        job.name
                    )));
                }
                let existing = inner.jobs.get_mut(&id).ok_or_else(|| DatabaseError::NotFound {
                    entity: "job".into(),
                    id: id.to_string(),
                })?;
                existing.name = job.name;
                existing.status = job.status;
                existing.updated_at = now;
                Ok(existing.clone())
            }
            None => {
                // Same-name insert behaves like the UNIQUE upsert in the SQL backend.
                if let Some(existing) = inner.jobs.values_mut().find(|j| j.name == job.name) {
                    existing.status = job.status;
                    existing.updated_at = now;
                    return Ok(existing.clone());
                }
                inner.next_id += 1;
                let id = inner.next_id;
                job.id = Some(id);
                job.updated_at = now;
                inner.jobs.insert(id, job.clone());
                Ok(job)
            }
        }
    }

    async fn get(&self, id: i64) -> Result<Option<JobRecord>, DatabaseError> {
        Ok(self.inner.read().await.jobs.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<JobRecord>, DatabaseError> {
        Ok(self.inner.read().await.jobs.values().cloned().collect())
    }

    async fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        Ok(self.inner.write().await.jobs.remove(&id).is_some())
    }

    async fn delete_all(&self) -> Result<usize, DatabaseError> {
        let mut inner = self.inner.write().await;
        let count = inner.jobs.len();
        inner.jobs.clear();
        Ok(count)
    }
}

fn name_taken(jobs: &BTreeMap<i64, JobRecord>, name: &str, except: i64) -> bool {
    jobs.iter().any(|(id, j)| *id != except && j.name == name)
}
