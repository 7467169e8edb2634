// Background jobs: a generic queue + worker pool hosting registered
// handlers with persisted progress.

pub mod handlers;
pub mod models;
pub mod repository;
pub mod runner;

pub use models::{Job, JobStatus};
pub use repository::JobRepository;
pub use runner::{JobHandler, JobRunner, ProgressReporter};
