//! Persistence layer for job records.
//!
//! `JobStore` is the seam; `LibSqlJobStore` is the durable backend and
//! `InMemoryJobStore` backs tests and database-less runs.

pub mod libsql_backend;
pub mod memory;
pub(crate) mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlJobStore;
pub use memory::InMemoryJobStore;
pub use traits::JobStore;
