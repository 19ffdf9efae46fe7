//! In-memory WRI implementation. A first-class test seam, not a production
//! fallback (spec.md §9) — it tracks jobs in a map and exposes injectable
//! latency/failure so manager tests can exercise timeout and `unavailable`
//! paths without a real cluster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{JobHandle, JobRunState, JobStatus, WorkloadRuntime, WorkloadTemplate};
use crate::error::{Error, Result};
use crate::model::ApplicationId;

struct TrackedJob {
    state: JobRunState,
    exit_code: Option<i32>,
}

#[derive(Default)]
struct State {
    templates: HashMap<ApplicationId, WorkloadTemplate>,
    jobs: HashMap<String, TrackedJob>,
}

/// Deterministic mock WRI. `injected_latency` is applied before every call
/// returns; `fail_next` makes exactly the next call return `Unavailable`.
pub struct MockWri {
    state: Mutex<State>,
    injected_latency: Duration,
    fail_next: AtomicBool,
}

impl Default for MockWri {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWri {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            injected_latency: Duration::ZERO,
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            injected_latency: latency,
            ..Self::new()
        }
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Test hook: mark a tracked job as finished, as if the orchestrator
    /// reaped it between a manager call and a Scheduling Engine sweep.
    pub fn complete_job(&self, job_name: &str, state: JobRunState, exit_code: Option<i32>) {
        if let Some(job) = self.state.lock().unwrap().jobs.get_mut(job_name) {
            job.state = state;
            job.exit_code = exit_code;
        }
    }

    async fn maybe_fail_and_wait(&self) -> Result<()> {
        if !self.injected_latency.is_zero() {
            tokio::time::sleep(self.injected_latency).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Unavailable("mock WRI: injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkloadRuntime for MockWri {
    async fn install_scheduled_template(
        &self,
        template: &WorkloadTemplate,
        _cancellation: &CancellationToken,
    ) -> Result<()> {
        self.maybe_fail_and_wait().await?;
        self.state
            .lock()
            .unwrap()
            .templates
            .insert(template.application_id, template.clone());
        Ok(())
    }

    async fn remove_scheduled_template(
        &self,
        application_id: ApplicationId,
        _cancellation: &CancellationToken,
    ) -> Result<()> {
        self.maybe_fail_and_wait().await?;
        self.state.lock().unwrap().templates.remove(&application_id);
        Ok(())
    }

    async fn trigger_on_demand_job(
        &self,
        _template: &WorkloadTemplate,
        job_name: &str,
        _cancellation: &CancellationToken,
    ) -> Result<JobHandle> {
        self.maybe_fail_and_wait().await?;
        self.state.lock().unwrap().jobs.insert(
            job_name.to_string(),
            TrackedJob {
                state: JobRunState::Running,
                exit_code: None,
            },
        );
        Ok(JobHandle {
            job_name: job_name.to_string(),
        })
    }

    async fn job_status(
        &self,
        job_name: &str,
        _cancellation: &CancellationToken,
    ) -> Result<Option<JobStatus>> {
        self.maybe_fail_and_wait().await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .jobs
            .get(job_name)
            .map(|j| JobStatus {
                state: j.state,
                exit_code: j.exit_code,
            }))
    }

    async fn fetch_logs(&self, job_name: &str, _cancellation: &CancellationToken) -> Result<String> {
        self.maybe_fail_and_wait().await?;
        Ok(format!("mock logs for {job_name}"))
    }
}
