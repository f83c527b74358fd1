//! Job service — create-or-update by company name on top of a `JobStore`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::jobs::model::{JobRecord, JobStatus};
use crate::store::JobStore;

/// Whether an upsert inserted a new record or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Created,
    Updated,
}

/// Record operations shared by the ingestion pipeline and the REST surface.
///
/// Upserts on the same name are serialized through a per-name async lock, so
/// concurrent writers never both take the insert branch and the last one to
/// finish determines the stored status.
pub struct JobService {
    store: Arc<dyn JobStore>,
    name_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Overwrite the status of the record named `name`, or create it.
    pub async fn create_or_update(
        &self,
        name: &str,
        status: JobStatus,
    ) -> Result<(JobRecord, UpsertKind), DatabaseError> {
        let lease = self.lease_name(name);
        let result = {
            let _guard = lease.lock.lock().await;
            self.upsert_locked(name, status).await
        };
        drop(lease);

        let (job, kind) = result?;
        info!(name = %job.name, status = %job.status, ?kind, "Job upserted");
        Ok((job, kind))
    }

    async fn upsert_locked(
        &self,
        name: &str,
        status: JobStatus,
    ) -> Result<(JobRecord, UpsertKind), DatabaseError> {
        match self.store.find_by_name(name).await? {
            Some(mut existing) => {
                existing.status = status;
                let saved = self.store.save(existing).await?;
                Ok((saved, UpsertKind::Updated))
            }
            None => {
                let saved = self.store.save(JobRecord::new(name, status)).await?;
                Ok((saved, UpsertKind::Created))
            }
        }
    }

    fn lease_name<'a>(&'a self, name: &'a str) -> NameLease<'a> {
        let lock = self
            .lock_table()
            .entry(name.to_string())
            .or_default()
            .clone();
        NameLease {
            service: self,
            name,
            lock,
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.name_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn get(&self, id: i64) -> Result<Option<JobRecord>, DatabaseError> {
        self.store.get(id).await
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<JobRecord>, DatabaseError> {
        self.store.find_by_name(name).await
    }

    pub async fn list(&self) -> Result<Vec<JobRecord>, DatabaseError> {
        self.store.list().await
    }

    /// Set the status of an existing record. Returns `None` if `id` is unknown.
    pub async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
    ) -> Result<Option<JobRecord>, DatabaseError> {
        let Some(mut job) = self.store.get(id).await? else {
            return Ok(None);
        };
        job.status = status;
        match self.store.save(job).await {
            Ok(saved) => {
                debug!(job_id = id, status = %saved.status, "Job status updated");
                Ok(Some(saved))
            }
            Err(DatabaseError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        self.store.delete(id).await
    }

    pub async fn delete_all(&self) -> Result<usize, DatabaseError> {
        let removed = self.store.delete_all().await?;
        info!(removed, "All jobs deleted");
        Ok(removed)
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.lock_table().len()
    }
}

/// A writer's handle on the per-name lock.
///
/// Dropping it removes the table entry once no other writer holds one, also
/// when the upsert future is cancelled mid-way.
struct NameLease<'a> {
    service: &'a JobService,
    name: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for NameLease<'_> {
    fn drop(&mut self) {
        let service = self.service;
        let mut locks = service.lock_table();
        // Release our handle under the table lock so the count below is exact.
        drop(std::mem::take(&mut self.lock));
        if locks
            .get(self.name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::store::InMemoryJobStore;

    fn service() -> JobService {
        JobService::new(Arc::new(InMemoryJobStore::new()))
    }

    /// Store whose lookups never complete.
    struct StuckStore;

    #[async_trait]
    impl JobStore for StuckStore {
        async fn find_by_name(&self, _: &str) -> Result<Option<JobRecord>, DatabaseError> {
            std::future::pending().await
        }
        async fn save(&self, job: JobRecord) -> Result<JobRecord, DatabaseError> {
            Ok(job)
        }
        async fn get(&self, _: i64) -> Result<Option<JobRecord>, DatabaseError> {
            Ok(None)
        }
        async fn list(&self) -> Result<Vec<JobRecord>, DatabaseError> {
            Ok(vec![])
        }
        async fn delete(&self, _: i64) -> Result<bool, DatabaseError> {
            Ok(false)
        }
        async fn delete_all(&self) -> Result<usize, DatabaseError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn create_then_update() {
        let svc = service();
        let (created, kind) = svc
            .create_or_update("Acme", JobStatus::Waiting)
            .await
            .unwrap();
        assert_eq!(kind, UpsertKind::Created);

        let (updated, kind) = svc
            .create_or_update("Acme", JobStatus::Interview)
            .await
            .unwrap();
        assert_eq!(kind, UpsertKind::Updated);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.status, JobStatus::Interview);
        assert_eq!(svc.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_upsert_is_idempotent() {
        let svc = service();
        for _ in 0..3 {
            svc.create_or_update("Acme", JobStatus::Rejected)
                .await
                .unwrap();
        }
        let jobs = svc.list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Rejected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_leave_one_record() {
        let svc = Arc::new(service());
        let mut handles = Vec::new();
        for i in 0..32 {
            let svc = Arc::clone(&svc);
            let status = if i % 2 == 0 {
                JobStatus::Interview
            } else {
                JobStatus::Waiting
            };
            handles.push(tokio::spawn(async move {
                svc.create_or_update("Acme", status).await.unwrap()
            }));
        }

        let mut created = 0;
        for handle in handles {
            let (_, kind) = handle.await.unwrap();
            if kind == UpsertKind::Created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(svc.list().await.unwrap().len(), 1);
        assert_eq!(svc.lock_entries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_upserts_release_their_lock_entry() {
        let svc = Arc::new(JobService::new(Arc::new(StuckStore)));

        // One task holds the name lock inside the store call, one waits on it.
        let mut tasks = Vec::new();
        for _ in 0..2 {
            let svc = Arc::clone(&svc);
            tasks.push(tokio::spawn(async move {
                svc.create_or_update("Acme", JobStatus::Waiting).await
            }));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(svc.lock_entries(), 1);

        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            assert!(task.await.unwrap_err().is_cancelled());
        }
        assert_eq!(svc.lock_entries(), 0);
    }

    #[tokio::test]
    async fn update_status_unknown_id() {
        let svc = service();
        assert!(svc
            .update_status(42, JobStatus::Waiting)
            .await
            .unwrap()
            .is_none());

        let (job, _) = svc
            .create_or_update("Acme", JobStatus::Waiting)
            .await
            .unwrap();
        let updated = svc
            .update_status(job.id.unwrap(), JobStatus::Rejected)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, JobStatus::Rejected);
    }
}
