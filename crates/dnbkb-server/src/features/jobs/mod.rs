//! Jobs feature module
//!
//! Read-only job status. Reading a job first refreshes its completion state
//! from the statuses of its assets.

pub mod queries;
pub mod routes;


pub use queries::{GetJobQuery, JobSnapshot};
pub use routes::jobs_routes;
