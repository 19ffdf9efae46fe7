//! CronJob Manager (spec.md §4.2): schedule validation, template linkage,
//! manual trigger, execution history, status reconciliation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::AppConfig;
use crate::cron_expr;
use crate::error::{Error, Result};
use crate::metrics::prometheus::MetricsState;
use crate::model::*;
use crate::store::ExecutionStore;
use crate::wri::{WorkloadRuntime, WorkloadTemplate};

/// Implemented by the Backup Manager so the CronJob Manager can trigger a
/// coupled manual backup without depending on its concrete type (spec.md
/// §4.2). Failure here is logged, never propagated, per the same section:
/// "the cron job and the backup are independent operational units".
#[async_trait]
pub trait BackupCoupling: Send + Sync {
    async fn trigger_manual_backup_for_cronjob(
        &self,
        application_id: ApplicationId,
        triggering_execution_id: CronJobExecutionId,
        cancellation: &CancellationToken,
    ) -> Result<()>;
}

pub struct CronJobManager<S: ExecutionStore> {
    store: Arc<S>,
    wri: Arc<dyn WorkloadRuntime>,
    config: AppConfig,
    backup_coupling: Option<Arc<dyn BackupCoupling>>,
    metrics: Option<Arc<MetricsState>>,
}

impl<S: ExecutionStore> CronJobManager<S> {
    pub fn new(store: Arc<S>, wri: Arc<dyn WorkloadRuntime>, config: AppConfig) -> Self {
        Self {
            store,
            wri,
            config,
            backup_coupling: None,
            metrics: None,
        }
    }

    pub fn with_backup_coupling(mut self, coupling: Arc<dyn BackupCoupling>) -> Self {
        self.backup_coupling = Some(coupling);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsState>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn require_cronjob<'a>(app: &'a Application) -> Result<&'a CronJobExtension> {
        app.cronjob_ext()
            .ok_or_else(|| Error::InvalidInput(format!("application {} is not a cronjob", app.id)))
    }

    fn template_of(app: &Application, ext: &CronJobExtension) -> WorkloadTemplate {
        let image = match &app.source {
            Source::Image { image_ref } => image_ref.clone(),
            Source::Git { url, .. } => url.clone(),
            Source::Buildpack { repository_url, .. } => repository_url.clone(),
        };
        WorkloadTemplate {
            application_id: app.id,
            image,
            command: ext.command.clone(),
            args: ext.args.clone(),
        }
    }

    /// Validates the schedule, optionally inherits a template application's
    /// source/config, installs the runtime template, and persists the
    /// Application (spec.md §4.1 `createApplication`, §4.2 `createCronJob`).
    pub async fn create_cron_job(
        &self,
        mut app: Application,
        cancellation: &CancellationToken,
    ) -> Result<Application> {
        if app.kind != ApplicationKind::Cronjob {
            return Err(Error::InvalidInput("application kind must be cronjob".to_string()));
        }
        let ext = Self::require_cronjob(&app)?.clone();
        cron_expr::validate(&ext.schedule)?;

        if let Some(template_id) = ext.template_app_id {
            let template_app = self
                .store
                .get_application(template_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("template application {template_id}")))?;
            app.source = template_app.source;
            app.config = template_app.config;
        }

        let template = Self::template_of(&app, &ext);
        self.wri.install_scheduled_template(&template, cancellation).await?;

        app.status = ApplicationStatus::Running;
        self.store.create_application(app).await
    }

    /// Updates are only permitted on cronjob applications (spec.md §4.2).
    /// Clears `next_execution_at` to force recomputation and reinstalls the
    /// runtime template with the new schedule.
    pub async fn update_cron_schedule(
        &self,
        id: ApplicationId,
        new_schedule: String,
        cancellation: &CancellationToken,
    ) -> Result<Application> {
        cron_expr::validate(&new_schedule)?;

        let mut app = self
            .store
            .get_application(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("application {id}")))?;
        let mut ext = Self::require_cronjob(&app)?.clone();
        ext.schedule = new_schedule;
        ext.next_execution_at = None;
        app.cronjob = Some(ext.clone());

        let template = Self::template_of(&app, &ext);
        self.wri.install_scheduled_template(&template, cancellation).await?;

        app.updated_at = now();
        self.store.update_application(app).await
    }

    /// At-most-one-active-manual-trigger is enforced by refusing the call
    /// unless the application is `running`, plus the configured concurrency
    /// cap on already-running executions (spec.md §4.2, §6).
    pub async fn trigger_cron_job(
        &self,
        id: ApplicationId,
        cancellation: &CancellationToken,
    ) -> Result<CronJobExecution> {
        let store = Arc::clone(&self.store);
        let wri = Arc::clone(&self.wri);
        let config = self.config.clone();
        let backup_coupling = self.backup_coupling.clone();
        let cancellation = cancellation.clone();

        self.store
            .with_application_lock(id, move || {
                Box::pin(async move {
                    let app = store
                        .get_application(id)
                        .await?
                        .ok_or_else(|| Error::NotFound(format!("application {id}")))?;
                    let ext = Self::require_cronjob(&app)?;

                    if app.status != ApplicationStatus::Running {
                        return Err(Error::PreconditionFailed(format!(
                            "application {id} is not running (status={:?})",
                            app.status
                        )));
                    }
                    if config.max_concurrent_manual_triggers_per_application > 0
                        && store.has_running_cronjob_execution(id).await?
                    {
                        return Err(Error::PreconditionFailed(format!(
                            "application {id} already has a running execution"
                        )));
                    }

                    let started_at = now();
                    let job_name = format!(
                        "{}-manual-{}",
                        app.name,
                        started_at.format("%Y%m%d%H%M%S")
                    );
                    let template = Self::template_of(&app, ext);
                    wri.trigger_on_demand_job(&template, &job_name, &cancellation).await?;

                    let execution =
                        CronJobExecution::new_running(id, job_name, started_at);
                    let execution = store.create_cronjob_execution(execution).await?;

                    if app.backup_enabled() {
                        if let Some(coupling) = &backup_coupling {
                            if let Err(err) = coupling
                                .trigger_manual_backup_for_cronjob(id, execution.id, &cancellation)
                                .await
                            {
                                warn!(application_id = %id, error = %err, "coupled manual backup failed");
                            }
                        }
                    }

                    Ok(execution)
                })
            })
            .await
    }

    pub async fn list_executions(
        &self,
        id: ApplicationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CronJobExecution>> {
        self.store.list_cronjob_executions(id, limit, offset).await
    }

    /// Only legal transitions from `running`; sets `completed_at` when a
    /// terminal state is assigned (spec.md §4.2).
    pub async fn update_execution_status(
        &self,
        execution_id: CronJobExecutionId,
        status: CronJobExecutionStatus,
        exit_code: Option<i32>,
    ) -> Result<CronJobExecution> {
        let mut execution = self
            .store
            .get_cronjob_execution(execution_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("cronjob execution {execution_id}")))?;

        if !execution.transition(status, exit_code, now()) {
            return Err(Error::PreconditionFailed(format!(
                "illegal transition for execution {execution_id}: {:?} -> {:?}",
                execution.status, status
            )));
        }

        if let Some(metrics) = &self.metrics {
            let duration = (execution.completed_at.unwrap_or_else(now) - execution.started_at)
                .to_std()
                .unwrap_or_default()
                .as_secs_f64();
            metrics.record_cronjob_execution(
                &execution.application_id.to_string(),
                status_label(status),
                duration,
            );
        }

        self.store.update_cronjob_execution(execution).await
    }
}

pub(crate) fn status_label(status: CronJobExecutionStatus) -> &'static str {
    match status {
        CronJobExecutionStatus::Running => "running",
        CronJobExecutionStatus::Succeeded => "succeeded",
        CronJobExecutionStatus::Failed => "failed",
    }
}
