//! `JobStore` trait — single async interface for job record persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::jobs::model::JobRecord;

/// Backend-agnostic record store for job applications.
///
/// Names are unique: saving an unsaved record whose name already exists
/// overwrites that record instead of creating a second one.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Look up a record by its unique name.
    async fn find_by_name(&self, name: &str) -> Result<Option<JobRecord>, DatabaseError>;

    /// Insert (`id == None`) or update (`id == Some`) a record and return
    /// the stored version.
    async fn save(&self, job: JobRecord) -> Result<JobRecord, DatabaseError>;

    /// Get a record by id.
    async fn get(&self, id: i64) -> Result<Option<JobRecord>, DatabaseError>;

    /// All records, ordered by id.
    async fn list(&self) -> Result<Vec<JobRecord>, DatabaseError>;

    /// Delete a record. Returns `false` if it did not exist.
    async fn delete(&self, id: i64) -> Result<bool, DatabaseError>;

    /// Delete every record. Returns how many were removed.
    async fn delete_all(&self) -> Result<usize, DatabaseError>;
}
