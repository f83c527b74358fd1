//! Job application records, the create-or-update service and its REST routes.

pub mod model;
pub mod routes;
pub mod service;

pub use model::{JobRecord, JobStatus};
pub use routes::{AppState, jobs_routes};
pub use service::{JobService, UpsertKind};
