// Clustering jobs: queue, worker pool, and the per-job pipeline.

pub mod context;
pub mod error;
pub mod runner;

pub use context::{JobOutcome, WorkerContext};
pub use error::{JobError, TriggerError};
pub use runner::{JobRunner, JobStatus, JobTicket, RunnerConfig};
