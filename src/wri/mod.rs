//! Workload Runtime Interface (WRI): the boundary to the cluster orchestrator
//! (spec.md §2, §11). The core never talks to the orchestrator directly —
//! every create/update/delete of a deployment-like, job-like, or service-like
//! primitive, and every on-demand job trigger, goes through this trait, the
//! way the teacher treats `kube::Client` as its only cluster boundary.

pub mod mock;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::model::ApplicationId;
use crate::error::Result;

/// The container/command spec a CronJob's scheduled and on-demand jobs run
/// from. Carries only what WRI needs to instantiate a job; the rest of the
/// Application row stays out of the runtime boundary.
#[derive(Clone, Debug)]
pub struct WorkloadTemplate {
    pub application_id: ApplicationId,
    pub image: String,
    pub command: Option<String>,
    pub args: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobRunState {
    Running,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug)]
pub struct JobStatus {
    pub state: JobRunState,
    pub exit_code: Option<i32>,
}

#[derive(Clone, Debug)]
pub struct JobHandle {
    pub job_name: String,
}

#[async_trait]
pub trait WorkloadRuntime: Send + Sync + 'static {
    /// Install (or update) the recurring scheduled template for a CronJob
    /// Application. Called from `createCronJob`/`updateCronSchedule`.
    async fn install_scheduled_template(
        &self,
        template: &WorkloadTemplate,
        cancellation: &CancellationToken,
    ) -> Result<()>;

    async fn remove_scheduled_template(
        &self,
        application_id: ApplicationId,
        cancellation: &CancellationToken,
    ) -> Result<()>;

    /// Instantiate a one-off job from `template`, named `job_name`. Used by
    /// both manual triggers and the Scheduling Engine's fired-schedule path.
    async fn trigger_on_demand_job(
        &self,
        template: &WorkloadTemplate,
        job_name: &str,
        cancellation: &CancellationToken,
    ) -> Result<JobHandle>;

    /// `None` when the runtime has no record of the job (already reaped).
    async fn job_status(
        &self,
        job_name: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<JobStatus>>;

    async fn fetch_logs(&self, job_name: &str, cancellation: &CancellationToken) -> Result<String>;
}
