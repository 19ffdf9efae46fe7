//! Scheduling Engine (spec.md §4.5): the single-owner periodic driver for
//! housekeeping the user did not explicitly request.

pub mod job;
pub mod lease;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cron::Schedule as CronFireSchedule;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::AppConfig;
use crate::managers::backup::BackupManager;
use crate::managers::function::FunctionManager;
use crate::model::*;
use crate::store::ExecutionStore;
use crate::wri::{JobRunState, WorkloadRuntime};
use job::Job;
use crate::metrics::prometheus::MetricsState;

pub struct SchedulingEngine<S: ExecutionStore> {
    store: Arc<S>,
    wri: Arc<dyn WorkloadRuntime>,
    backup_manager: Arc<BackupManager<S>>,
    function_manager: Arc<FunctionManager<S>>,
    config: AppConfig,
    metrics: Arc<MetricsState>,
    owner: String,
    handles: Vec<AbortHandle>,
}

impl<S: ExecutionStore> SchedulingEngine<S> {
    pub fn new(
        store: Arc<S>,
        wri: Arc<dyn WorkloadRuntime>,
        backup_manager: Arc<BackupManager<S>>,
        function_manager: Arc<FunctionManager<S>>,
        config: AppConfig,
        metrics: Arc<MetricsState>,
        owner: String,
    ) -> Self {
        Self {
            store,
            wri,
            backup_manager,
            function_manager,
            config,
            metrics,
            owner,
            handles: Vec::new(),
        }
    }

    /// Start all four periodic tasks (spec.md §4.5). Returns abort handles
    /// for graceful shutdown; dropping the engine does not stop the tasks,
    /// only `shutdown()` or the returned handles do.
    pub fn start(&mut self) {
        self.handles.push(self.spawn_reconcile_executions());
        self.handles.push(self.spawn_cleanup_backups());
        self.handles.push(self.spawn_advance_next_execution());
        self.handles.push(self.spawn_retry_function_events());
    }

    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }

    fn spawn_reconcile_executions(&self) -> AbortHandle {
        let store = Arc::clone(&self.store);
        let wri = Arc::clone(&self.wri);
        let metrics = Arc::clone(&self.metrics);
        let owner = self.owner.clone();
        let max_job_runtime = self.config.max_job_runtime;

        Job::new("reconcile_cronjob_executions", Duration::from_secs(30), Duration::from_secs(60)).spawn(
            store.clone(),
            Arc::clone(&metrics),
            owner,
            move || {
                let store = Arc::clone(&store);
                let wri = Arc::clone(&wri);
                let metrics = Arc::clone(&metrics);
                Box::pin(async move { reconcile_executions(&store, &wri, &metrics, max_job_runtime).await })
            },
        )
    }

    fn spawn_cleanup_backups(&self) -> AbortHandle {
        let store = Arc::clone(&self.store);
        let backup_manager = Arc::clone(&self.backup_manager);
        let metrics = Arc::clone(&self.metrics);
        let owner = self.owner.clone();
        let interval = self.config.backup_cleanup_interval;

        Job::new("cleanup_old_backups", interval, interval * 2).spawn(store, metrics, owner, move || {
            let backup_manager = Arc::clone(&backup_manager);
            Box::pin(async move {
                let policies = backup_manager.list_enabled_policies().await?;
                for policy in policies {
                    if let Err(err) = backup_manager.cleanup_old_backups(policy.id).await {
                        warn!(policy_id = %policy.id, error = %err, "backup cleanup failed");
                    }
                }
                Ok(())
            })
        })
    }

    fn spawn_advance_next_execution(&self) -> AbortHandle {
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        let owner = self.owner.clone();

        Job::new("advance_next_execution", Duration::from_secs(60), Duration::from_secs(120)).spawn(
            store.clone(),
            metrics,
            owner,
            move || {
                let store = Arc::clone(&store);
                Box::pin(async move { advance_next_execution(&store).await })
            },
        )
    }

    fn spawn_retry_function_events(&self) -> AbortHandle {
        let store = Arc::clone(&self.store);
        let function_manager = Arc::clone(&self.function_manager);
        let metrics = Arc::clone(&self.metrics);
        let owner = self.owner.clone();
        let max_retries = self.config.function_event_max_retries;

        Job::new("retry_function_events", Duration::from_secs(15), Duration::from_secs(30)).spawn(
            store.clone(),
            metrics,
            owner,
            move || {
                let store = Arc::clone(&store);
                let function_manager = Arc::clone(&function_manager);
                Box::pin(async move {
                    let events = store.list_retryable_events().await?;
                    let cancellation = CancellationToken::new();
                    for event in events {
                        if let Err(err) = function_manager
                            .process_event(event.id, max_retries, &cancellation)
                            .await
                        {
                            warn!(event_id = %event.id, error = %err, "event retry failed");
                        }
                    }
                    Ok(())
                })
            },
        )
    }
}

async fn reconcile_executions<S: ExecutionStore>(
    store: &Arc<S>,
    wri: &Arc<dyn WorkloadRuntime>,
    metrics: &MetricsState,
    max_job_runtime: Duration,
) -> crate::error::Result<()> {
    let cancellation = CancellationToken::new();
    let running = store.list_running_cronjob_executions().await?;
    for mut execution in running {
        let age = now() - execution.started_at;
        if age.to_std().unwrap_or(Duration::ZERO) > max_job_runtime {
            execution.transition(CronJobExecutionStatus::Failed, None, now());
            record_execution_outcome(metrics, &execution);
            store.update_cronjob_execution(execution).await?;
            continue;
        }

        if let Some(status) = wri.job_status(&execution.job_name, &cancellation).await? {
            let terminal = match status.state {
                JobRunState::Succeeded => Some(CronJobExecutionStatus::Succeeded),
                JobRunState::Failed => Some(CronJobExecutionStatus::Failed),
                JobRunState::Running => None,
            };
            if let Some(terminal) = terminal {
                execution.transition(terminal, status.exit_code, now());
                record_execution_outcome(metrics, &execution);
                store.update_cronjob_execution(execution).await?;
            }
        }
    }
    Ok(())
}

fn record_execution_outcome(metrics: &MetricsState, execution: &CronJobExecution) {
    let duration = (execution.completed_at.unwrap_or_else(now) - execution.started_at)
        .to_std()
        .unwrap_or_default()
        .as_secs_f64();
    metrics.record_cronjob_execution(
        &execution.application_id.to_string(),
        crate::managers::cronjob::status_label(execution.status),
        duration,
    );
}

async fn advance_next_execution<S: ExecutionStore>(store: &Arc<S>) -> crate::error::Result<()> {
    let applications = store.list_cronjob_applications().await?;
    for mut app in applications {
        let Some(mut ext) = app.cronjob.clone() else { continue };
        let fired = ext.next_execution_at.is_none_or(|next| next <= now());
        if !fired {
            continue;
        }
        if let Some(next) = next_fire_after(&ext.schedule, now()) {
            ext.last_execution_at = Some(now());
            ext.next_execution_at = Some(next);
            app.cronjob = Some(ext);
            app.updated_at = now();
            store.update_application(app).await?;
        }
    }
    Ok(())
}

/// Compute the next fire time strictly after `after`, accepting the wider
/// `cron` crate syntax (it is more permissive than `cron_expr::validate`,
/// which only needs to bound what callers may submit).
pub fn next_fire_after(expr: &str, after: Timestamp) -> Option<Timestamp> {
    let schedule = CronFireSchedule::from_str(&format!("0 {expr}")).ok()?;
    schedule.after(&after).next()
}
