//! Execution Core (spec.md §4.1): the tenant-scoped entry point that
//! validates plan eligibility, dispatches to the appropriate manager, and
//! owns the cross-manager atomic flows.

pub mod compensate;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};
use crate::managers::backup::{BackupManager, CreateBackupPolicyRequest};
use crate::managers::cronjob::CronJobManager;
use crate::managers::function::FunctionManager;
use crate::model::*;
use crate::store::ExecutionStore;
use compensate::{run_pair, Stage};

/// Carried through every Execution Core call (spec.md §4.1): the tenant
/// scope, the caller performing the action, and a deadline/cancellation pair
/// mirroring the teacher's `Arc<Context>` passed alongside the reconciled
/// object, but as a plain argument instead of a controller callback since
/// there is no watch stream driving these calls.
#[derive(Clone)]
pub struct RequestContext {
    pub tenant_workspace_id: WorkspaceId,
    pub caller_identity: CallerIdentity,
    pub deadline: Option<Duration>,
    pub cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(tenant_workspace_id: WorkspaceId, caller_identity: CallerIdentity) -> Self {
        Self {
            tenant_workspace_id,
            caller_identity,
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }
}

pub struct ExecutionCore<S: ExecutionStore> {
    store: Arc<S>,
    cronjob: CronJobManager<S>,
    function: Arc<FunctionManager<S>>,
    backup: Arc<BackupManager<S>>,
}

impl<S: ExecutionStore> ExecutionCore<S> {
    pub fn new(
        store: Arc<S>,
        cronjob: CronJobManager<S>,
        function: Arc<FunctionManager<S>>,
        backup: Arc<BackupManager<S>>,
    ) -> Self {
        Self {
            store,
            cronjob,
            function,
            backup,
        }
    }

    async fn check_name_unique(&self, app: &Application) -> Result<()> {
        if self
            .store
            .find_application_by_name(app.workspace_id, app.project_id, &app.name)
            .await?
            .is_some()
        {
            return Err(Error::AlreadyExists(format!(
                "application '{}' in project {}",
                app.name, app.project_id
            )));
        }
        Ok(())
    }

    /// `createApplication(kind, spec)` (spec.md §4.1). Validates name
    /// uniqueness, dispatches by kind, and returns the Application `running`
    /// once subordinate creation succeeds.
    pub async fn create_application(
        &self,
        ctx: &RequestContext,
        mut app: Application,
    ) -> Result<Application> {
        app.workspace_id = ctx.tenant_workspace_id;
        self.check_name_unique(&app).await?;

        match app.kind {
            ApplicationKind::Cronjob => self.cronjob.create_cron_job(app, &ctx.cancellation).await,
            ApplicationKind::Function => {
                let ext = app
                    .function_ext()
                    .ok_or_else(|| Error::InvalidInput("function application requires function extension".to_string()))?
                    .clone();
                let trigger_type = ext
                    .trigger_type
                    .as_deref()
                    .map(TriggerType::from_str)
                    .transpose()
                    .map_err(Error::InvalidInput)?;
                self.function
                    .check_capabilities(ctx.tenant_workspace_id, &ext.runtime, trigger_type)
                    .await?;

                app.status = ApplicationStatus::Pending;
                let mut app = self.store.create_application(app).await?;
                app.status = ApplicationStatus::Running;
                app.updated_at = now();
                self.store.update_application(app).await
            }
            ApplicationKind::Stateless | ApplicationKind::Stateful => {
                app.status = ApplicationStatus::Pending;
                let mut app = self.store.create_application(app).await?;
                app.status = ApplicationStatus::Running;
                app.updated_at = now();
                self.store.update_application(app).await
            }
        }
    }

    /// `createApplicationWithBackupPolicy(spec, policySpec)` (spec.md §4.1):
    /// create the cronjob Application, then the backup policy; on policy
    /// failure the Application is deleted. Implemented as the two-stage
    /// compensating pipeline in `core::compensate`.
    pub async fn create_application_with_backup_policy(
        &self,
        ctx: &RequestContext,
        app: Application,
        policy_req: CreateBackupPolicyRequest,
    ) -> Result<(Application, BackupPolicy)> {
        if app.kind != ApplicationKind::Cronjob {
            return Err(Error::InvalidInput(
                "createApplicationWithBackupPolicy requires a cronjob application".to_string(),
            ));
        }
        self.check_name_unique(&app).await?;

        let application_slot: Arc<std::sync::Mutex<Option<Application>>> =
            Arc::new(std::sync::Mutex::new(None));

        let create_app = CreateAppStage {
            core: self,
            ctx: ctx.clone(),
            app: Some(app),
            slot: Arc::clone(&application_slot),
        };
        let create_policy = CreatePolicyStage {
            core: self,
            req: Some(policy_req),
            slot: application_slot,
        };

        run_pair(create_app, create_policy).await
    }

    /// `deleteApplication(id)` (spec.md §4.1): refuses while executions are
    /// `running`; else cascades the subordinate records.
    pub async fn delete_application(&self, id: ApplicationId) -> Result<()> {
        let app = self
            .store
            .get_application(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("application {id}")))?;

        if app.kind == ApplicationKind::Cronjob && self.store.has_running_cronjob_execution(id).await? {
            return Err(Error::PreconditionFailed(format!(
                "application {id} has running executions"
            )));
        }

        if let Some(policy) = self.store.find_backup_policy_by_application(id).await? {
            if let Err(err) = self.backup.cleanup_old_backups(policy.id).await {
                warn!(application_id = %id, error = %err, "backup cleanup during delete failed");
            }
        }

        self.store.delete_application(id).await
    }
}

/// First stage: create the cronjob Application. Its undo deletes the
/// Application it created; its output is also stashed in `slot` so the
/// second stage can read the new application id without `run_pair` needing
/// to thread stage outputs together.
struct CreateAppStage<'a, S: ExecutionStore> {
    core: &'a ExecutionCore<S>,
    ctx: RequestContext,
    app: Option<Application>,
    slot: Arc<std::sync::Mutex<Option<Application>>>,
}

#[async_trait::async_trait]
impl<'a, S: ExecutionStore> Stage for CreateAppStage<'a, S> {
    type Output = Application;

    async fn run(&mut self) -> Result<Application> {
        let app = self
            .app
            .take()
            .ok_or_else(|| Error::internal("CreateAppStage run called twice"))?;
        let created = self.core.create_application(&self.ctx, app).await?;
        *self.slot.lock().unwrap() = Some(created.clone());
        Ok(created)
    }

    async fn undo(&mut self) -> Result<()> {
        if let Some(app) = self.slot.lock().unwrap().take() {
            self.core.store.delete_application(app.id).await?;
        }
        Ok(())
    }
}

/// Second stage: create the backup policy against whatever application id
/// the first stage stashed in `slot`.
struct CreatePolicyStage<'a, S: ExecutionStore> {
    core: &'a ExecutionCore<S>,
    req: Option<CreateBackupPolicyRequest>,
    slot: Arc<std::sync::Mutex<Option<Application>>>,
}

#[async_trait::async_trait]
impl<'a, S: ExecutionStore> Stage for CreatePolicyStage<'a, S> {
    type Output = BackupPolicy;

    async fn run(&mut self) -> Result<BackupPolicy> {
        let application_id = self
            .slot
            .lock()
            .unwrap()
            .as_ref()
            .map(|app| app.id)
            .ok_or_else(|| Error::internal("CreatePolicyStage run before CreateAppStage"))?;
        let req = self
            .req
            .take()
            .ok_or_else(|| Error::internal("CreatePolicyStage run called twice"))?;
        self.core
            .backup
            .create_backup_policy(application_id, req)
            .await
    }

    async fn undo(&mut self) -> Result<()> {
        Ok(())
    }
}
