// Background job runner: a bounded FIFO queue drained by a small worker pool.
//
// `trigger` never waits for clustering: it enqueues and returns a ticket. A
// topic that already has a job waiting in the queue isn't queued twice; the
// waiting job reads the latest opinions when it starts, so the second trigger
// rides along with it. Workers share one receiver behind an async mutex and
// take one job at a time. A failing job only affects its own topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::context::WorkerContext;
use super::error::TriggerError;
use crate::db::models::{JobRun, JobState};

/// Sizing for the runner.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_capacity: 64,
        }
    }
}

/// Handle returned by `trigger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobTicket {
    pub job_id: u64,
    pub topic_id: i64,
    /// True when the trigger joined a job that was already queued.
    pub coalesced: bool,
}

/// Live view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: u64,
    pub topic_id: i64,
    pub state: JobState,
    pub error: Option<String>,
    pub cluster_count: Option<usize>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl JobStatus {
    fn queued(job_id: u64, topic_id: i64) -> Self {
        Self {
            job_id,
            topic_id,
            state: JobState::Queued,
            error: None,
            cluster_count: None,
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug)]
struct QueuedJob {
    job_id: u64,
    topic_id: i64,
}

#[derive(Default)]
struct Shared {
    statuses: RwLock<HashMap<u64, JobStatus>>,
    /// topic -> job still sitting in the queue
    queued_topics: Mutex<HashMap<i64, u64>>,
    next_id: AtomicU64,
}

pub struct JobRunner {
    sender: Mutex<Option<mpsc::Sender<QueuedJob>>>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobRunner {
    /// Start the worker pool. Must be called inside a tokio runtime.
    pub fn start(context: WorkerContext, config: RunnerConfig) -> Self {
        let worker_count = config.worker_count.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(1),
            ..Shared::default()
        });

        let workers = (0..worker_count)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let shared = Arc::clone(&shared);
                let context = context.clone();
                tokio::spawn(worker_loop(worker, rx, shared, context))
            })
            .collect();

        info!(workers = worker_count, capacity = config.queue_capacity, "Job runner started");

        Self {
            sender: Mutex::new(Some(tx)),
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Queue a clustering job for a topic and return immediately.
    pub async fn trigger(&self, topic_id: i64) -> Result<JobTicket, TriggerError> {
        let mut queued = self.shared.queued_topics.lock().await;
        if let Some(&job_id) = queued.get(&topic_id) {
            info!(job_id, topic_id, "Trigger coalesced into queued job");
            return Ok(JobTicket {
                job_id,
                topic_id,
                coalesced: true,
            });
        }

        let sender = self.sender.lock().await;
        let Some(sender) = sender.as_ref() else {
            return Err(TriggerError::Stopped);
        };

        let job_id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .statuses
            .write()
            .await
            .insert(job_id, JobStatus::queued(job_id, topic_id));

        if let Err(e) = sender.try_send(QueuedJob { job_id, topic_id }) {
            self.shared.statuses.write().await.remove(&job_id);
            let err = match e {
                mpsc::error::TrySendError::Full(_) => TriggerError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => TriggerError::Stopped,
            };
            warn!(topic_id, error = %err, "Trigger rejected");
            return Err(err);
        }

        queued.insert(topic_id, job_id);
        info!(job_id, topic_id, "Job queued");
        Ok(JobTicket {
            job_id,
            topic_id,
            coalesced: false,
        })
    }

    /// Current status of a job, if the runner knows it.
    pub async fn status(&self, job_id: u64) -> Option<JobStatus> {
        self.shared.statuses.read().await.get(&job_id).cloned()
    }

    /// Poll until a job reaches Done or Failed.
    pub async fn wait(&self, job_id: u64) -> Option<JobStatus> {
        loop {
            let status = self.status(job_id).await?;
            if status.state.is_terminal() {
                return Some(status);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Stop accepting triggers, let workers drain the queue, and wait for them.
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }
        info!("Job runner stopped");
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    shared: Arc<Shared>,
    context: WorkerContext,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else { break };

        {
            let mut queued = shared.queued_topics.lock().await;
            if queued.get(&job.topic_id) == Some(&job.job_id) {
                queued.remove(&job.topic_id);
            }
        }

        run_job(worker, job, &shared, &context).await;
    }
}

async fn run_job(worker: usize, job: QueuedJob, shared: &Shared, context: &WorkerContext) {
    let started_at = chrono::Utc::now().to_rfc3339();
    update(shared, job.job_id, |s| {
        s.state = JobState::Running;
        s.started_at = Some(started_at.clone());
    })
    .await;
    info!(worker, job_id = job.job_id, topic_id = job.topic_id, "Job started");

    let result = context.process(job.topic_id).await;
    let finished_at = chrono::Utc::now().to_rfc3339();

    let run = match &result {
        Ok(outcome) => {
            info!(
                job_id = job.job_id,
                topic_id = job.topic_id,
                opinions = outcome.opinion_count,
                clusters = outcome.cluster_count,
                "Job done"
            );
            JobRun {
                job_id: job.job_id,
                topic_id: job.topic_id,
                state: JobState::Done,
                error: None,
                cluster_count: Some(outcome.cluster_count),
                started_at,
                finished_at: Some(finished_at),
            }
        }
        Err(e) => {
            error!(job_id = job.job_id, topic_id = job.topic_id, error = %e, "Job failed");
            JobRun {
                job_id: job.job_id,
                topic_id: job.topic_id,
                state: JobState::Failed,
                error: Some(e.to_string()),
                cluster_count: None,
                started_at,
                finished_at: Some(finished_at),
            }
        }
    };

    if let Err(e) = context.db.record_job_run(&run).await {
        warn!(job_id = job.job_id, error = %e, "Failed to record job run");
    }

    update(shared, job.job_id, |s| {
        s.state = run.state;
        s.error = run.error.clone();
        s.cluster_count = run.cluster_count;
        s.finished_at = run.finished_at.clone();
    })
    .await;
}

async fn update(shared: &Shared, job_id: u64, apply: impl FnOnce(&mut JobStatus)) {
    if let Some(status) = shared.statuses.write().await.get_mut(&job_id) {
        apply(status);
    }
}
