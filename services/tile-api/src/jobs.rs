//! Background area-of-interest computations.
//!
//! A submitted job runs on its own task: it announces itself on the progress
//! channel, runs the compute engine under a deadline and a cancellation
//! token, then announces the outcome. The HTTP request that submitted it has
//! long returned by then.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scene_common::{BoundingBox, TimeWindow};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics::MetricsCollector;
use crate::progress::ProgressRegistry;

pub const STARTING_MESSAGE: &str = "Starting processing...";

/// Parameters of one area computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeRequest {
    pub bbox: BoundingBox,
    pub window: TimeWindow,
    pub cloud_cover: u32,
    pub formula: String,
    pub band1: String,
    pub band2: String,
    /// Temporal aggregation applied by the engine (`mean`, `median`, ...)
    pub operation: String,
    /// Band exported as imagery alongside the aggregate
    pub export_band: String,
    pub output_dir: String,
}

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("failed to start compute engine: {0}")]
    Spawn(String),

    #[error("compute engine failed: {0}")]
    Failed(String),

    #[error("cancelled")]
    Cancelled,
}

/// The area-of-interest engine. Results go to `request.output_dir`.
#[async_trait]
pub trait AreaCompute: Send + Sync {
    async fn compute(
        &self,
        request: &ComputeRequest,
        cancel: CancellationToken,
    ) -> Result<(), ComputeError>;
}

/// Runs an external program as the compute engine.
///
/// The request is passed as command-line flags. The child is killed when
/// the job is cancelled or times out.
#[derive(Debug, Clone)]
pub struct CommandCompute {
    program: String,
}

impl CommandCompute {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn args(request: &ComputeRequest) -> Vec<String> {
        let b = &request.bbox;
        vec![
            "--bbox".into(),
            format!("{},{},{},{}", b.min_x, b.min_y, b.max_x, b.max_y),
            "--start-date".into(),
            request.window.start.to_string(),
            "--end-date".into(),
            request.window.end.to_string(),
            "--cloud-cover".into(),
            request.cloud_cover.to_string(),
            "--formula".into(),
            request.formula.clone(),
            "--band1".into(),
            request.band1.clone(),
            "--band2".into(),
            request.band2.clone(),
            "--operation".into(),
            request.operation.clone(),
            "--export-band".into(),
            request.export_band.clone(),
            "--output-dir".into(),
            request.output_dir.clone(),
        ]
    }
}

#[async_trait]
impl AreaCompute for CommandCompute {
    async fn compute(
        &self,
        request: &ComputeRequest,
        cancel: CancellationToken,
    ) -> Result<(), ComputeError> {
        let child = Command::new(&self.program)
            .args(Self::args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ComputeError::Spawn(format!("{}: {e}", self.program)))?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            out = child.wait_with_output() => out.map_err(|e| ComputeError::Failed(e.to_string()))?,
            _ = cancel.cancelled() => return Err(ComputeError::Cancelled),
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().last().unwrap_or("").trim();
            Err(ComputeError::Failed(format!("{} {last_line}", output.status).trim().to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::TimedOut => "timed_out",
        }
    }
}

/// Status of a job, running or finished.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub state: JobState,
    pub request: ComputeRequest,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

/// Response for the job listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobList {
    pub active: Vec<JobInfo>,
    pub recent: Vec<JobInfo>,
}

struct ActiveJob {
    info: JobInfo,
    cancel: CancellationToken,
}

#[derive(Default)]
struct JobTable {
    active: HashMap<Uuid, ActiveJob>,
    completed: VecDeque<JobInfo>,
}

/// Spawns and tracks compute jobs.
pub struct JobRunner {
    engine: Arc<dyn AreaCompute>,
    progress: Arc<ProgressRegistry>,
    metrics: Arc<MetricsCollector>,
    timeout: Duration,
    max_completed: usize,
    jobs: Arc<Mutex<JobTable>>,
}

impl JobRunner {
    pub fn new(
        engine: Arc<dyn AreaCompute>,
        progress: Arc<ProgressRegistry>,
        metrics: Arc<MetricsCollector>,
        timeout: Duration,
        max_completed: usize,
    ) -> Self {
        Self {
            engine,
            progress,
            metrics,
            timeout,
            max_completed,
            jobs: Arc::new(Mutex::new(JobTable::default())),
        }
    }

    /// Start `request` in the background and return its id immediately.
    pub fn submit(&self, request: ComputeRequest) -> Uuid {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let info = JobInfo {
            id,
            state: JobState::Running,
            request: request.clone(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            error: None,
        };
        self.jobs.lock().active.insert(
            id,
            ActiveJob {
                info,
                cancel: cancel.clone(),
            },
        );

        info!(job = %id, output_dir = %request.output_dir, "Compute job submitted");

        let task = JobTask {
            id,
            request,
            cancel,
            engine: self.engine.clone(),
            progress: self.progress.clone(),
            metrics: self.metrics.clone(),
            jobs: self.jobs.clone(),
            timeout: self.timeout,
            max_completed: self.max_completed,
        };
        tokio::spawn(task.run());
        id
    }

    /// Request cancellation of a running job.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.jobs.lock().active.get(&id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn status(&self, id: Uuid) -> Option<JobInfo> {
        let jobs = self.jobs.lock();
        jobs.active
            .get(&id)
            .map(|j| j.info.clone())
            .or_else(|| jobs.completed.iter().find(|j| j.id == id).cloned())
    }

    pub fn list(&self) -> JobList {
        let jobs = self.jobs.lock();
        let mut active: Vec<_> = jobs.active.values().map(|j| j.info.clone()).collect();
        active.sort_by_key(|j| j.started_at);
        JobList {
            active,
            recent: jobs.completed.iter().cloned().collect(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.jobs.lock().active.len()
    }

    /// Cancel every running job.
    pub fn shutdown(&self) {
        for job in self.jobs.lock().active.values() {
            job.cancel.cancel();
        }
    }
}

struct JobTask {
    id: Uuid,
    request: ComputeRequest,
    cancel: CancellationToken,
    engine: Arc<dyn AreaCompute>,
    progress: Arc<ProgressRegistry>,
    metrics: Arc<MetricsCollector>,
    jobs: Arc<Mutex<JobTable>>,
    timeout: Duration,
    max_completed: usize,
}

impl JobTask {
    async fn run(self) {
        self.announce(STARTING_MESSAGE);

        let run = async {
            tokio::select! {
                result = self.engine.compute(&self.request, self.cancel.clone()) => result,
                _ = self.cancel.cancelled() => Err(ComputeError::Cancelled),
            }
        };

        let (state, message, error) = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(())) => (
                JobState::Completed,
                format!(
                    "Processing completed. Results saved in {}",
                    self.request.output_dir
                ),
                None,
            ),
            Ok(Err(ComputeError::Cancelled)) => (
                JobState::Cancelled,
                "Processing failed: cancelled".to_string(),
                Some("cancelled".to_string()),
            ),
            Ok(Err(e)) => (
                JobState::Failed,
                format!("Processing failed: {e}"),
                Some(e.to_string()),
            ),
            Err(_) => {
                self.cancel.cancel();
                let reason = format!("timed out after {}s", self.timeout.as_secs());
                (
                    JobState::TimedOut,
                    format!("Processing failed: {reason}"),
                    Some(reason),
                )
            }
        };

        match state {
            JobState::Completed => info!(job = %self.id, "Compute job completed"),
            JobState::Cancelled => warn!(job = %self.id, "Compute job cancelled"),
            _ => error!(job = %self.id, error = ?error, "Compute job failed"),
        }

        self.finish(state, error);
        self.metrics.record_job(state.as_str());
        self.announce(&message);
    }

    fn announce(&self, message: &str) {
        let delivery = self.progress.broadcast(message);
        self.metrics.record_broadcast(delivery.delivered, delivery.dropped);
    }

    fn finish(&self, state: JobState, error: Option<String>) {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.active.remove(&self.id) else {
            return;
        };

        let finished_at = Utc::now();
        let mut info = job.info;
        info.duration_ms = Some((finished_at - info.started_at).num_milliseconds().max(0) as u64);
        info.finished_at = Some(finished_at);
        info.state = state;
        info.error = error;

        jobs.completed.push_front(info);
        while jobs.completed.len() > self.max_completed {
            jobs.completed.pop_back();
        }
    }
}
