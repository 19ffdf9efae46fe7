//! Backup Manager (spec.md §4.4): storage provisioning, policies,
//! executions, restores, retention enforcement, CronJob coupling.

use std::sync::Arc;

use async_trait::async_trait;
use object_store::{path::Path as ObjectPath, ObjectStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cron_expr;
use crate::error::{Error, Result};
use crate::managers::cronjob::BackupCoupling;
use crate::metrics::prometheus::MetricsState;
use crate::model::*;
use crate::retention;
use crate::store::ExecutionStore;

/// Request payload for provisioning a `BackupStorage`. The concrete
/// `object_store` backend is resolved from `storage_type`/`config`, the way
/// this core treats the provider as an external collaborator it only
/// drives through the `ObjectStore` trait.
pub struct CreateStorageRequest {
    pub name: String,
    pub storage_type: StorageType,
    pub config: StorageConfig,
    pub capacity_gb: i64,
}

pub struct CreateBackupPolicyRequest {
    pub storage_id: BackupStorageId,
    pub schedule: String,
    pub retention_days: i32,
    pub backup_type: BackupType,
    pub include_volumes: bool,
    pub include_database: bool,
    pub include_config: bool,
    pub compression: bool,
    pub encryption: bool,
}

pub struct BackupManager<S: ExecutionStore> {
    store: Arc<S>,
    object_store: Arc<dyn ObjectStore>,
    metrics: Option<Arc<MetricsState>>,
}

impl<S: ExecutionStore> BackupManager<S> {
    pub fn new(store: Arc<S>, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            object_store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsState>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record_storage_used_gb(&self, storage_id: BackupStorageId, used_gb: i64) {
        if let Some(metrics) = &self.metrics {
            metrics.set_backup_storage_used_gb(&storage_id.to_string(), used_gb as f64);
        }
    }

    /// Refuses unless the workspace is `dedicated`; transitions
    /// `pending -> creating -> active` (or `-> degraded`) as provisioning
    /// against the external storage provider proceeds (spec.md §4.4).
    pub async fn create_backup_storage(
        &self,
        workspace_id: WorkspaceId,
        plan: Plan,
        req: CreateStorageRequest,
    ) -> Result<BackupStorage> {
        if plan != Plan::Dedicated {
            return Err(Error::PreconditionFailed(
                "backup storage requires the dedicated plan".to_string(),
            ));
        }
        if self
            .store
            .find_backup_storage_by_name(workspace_id, &req.name)
            .await?
            .is_some()
        {
            return Err(Error::AlreadyExists(format!(
                "backup storage '{}' in workspace {workspace_id}",
                req.name
            )));
        }

        let at = now();
        let mut storage = BackupStorage {
            id: BackupStorageId::new(),
            workspace_id,
            name: req.name,
            storage_type: req.storage_type,
            config: req.config,
            capacity_gb: req.capacity_gb,
            used_gb: 0,
            status: BackupStorageStatus::Pending,
            created_at: at,
            updated_at: at,
        };
        storage = self.store.create_backup_storage(storage.clone()).await.map(|_| storage)?;

        storage.status = BackupStorageStatus::Creating;
        storage = self.store.update_backup_storage(storage).await?;

        match self
            .object_store
            .put(&ObjectPath::from(format!("{}/.provision", storage.id)), Vec::new().into())
            .await
        {
            Ok(_) => {
                storage.status = BackupStorageStatus::Active;
                info!(storage_id = %storage.id, "backup storage provisioned");
            }
            Err(err) => {
                storage.status = BackupStorageStatus::Degraded;
                error!(storage_id = %storage.id, error = %err, "backup storage provisioning failed");
            }
        }
        storage.updated_at = now();
        let storage = self.store.update_backup_storage(storage).await?;
        self.record_storage_used_gb(storage.id, storage.used_gb);
        Ok(storage)
    }

    /// Validates: app is cronjob, no existing policy, storage is `active`,
    /// schedule differs from and fires after the cronjob schedule
    /// (spec.md §4.4, §4.2).
    pub async fn create_backup_policy(
        &self,
        application_id: ApplicationId,
        req: CreateBackupPolicyRequest,
    ) -> Result<BackupPolicy> {
        let app = self
            .store
            .get_application(application_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("application {application_id}")))?;
        let cronjob = app
            .cronjob_ext()
            .ok_or_else(|| Error::InvalidInput(format!("application {application_id} is not a cronjob")))?;

        if self
            .store
            .find_backup_policy_by_application(application_id)
            .await?
            .is_some()
        {
            return Err(Error::AlreadyExists(format!(
                "backup policy for application {application_id}"
            )));
        }

        let storage = self
            .store
            .get_backup_storage(req.storage_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("backup storage {}", req.storage_id)))?;
        if !storage.is_active() {
            return Err(Error::PreconditionFailed(format!(
                "backup storage {} is not active",
                req.storage_id
            )));
        }

        cron_expr::validate(&req.schedule)?;
        cron_expr::validate_backup_schedule_after_cronjob(&cronjob.schedule, &req.schedule)?;

        let at = now();
        let policy = BackupPolicy {
            id: BackupPolicyId::new(),
            application_id,
            storage_id: req.storage_id,
            enabled: true,
            schedule: req.schedule,
            retention_days: req.retention_days,
            backup_type: req.backup_type,
            include_volumes: req.include_volumes,
            include_database: req.include_database,
            include_config: req.include_config,
            compression: req.compression,
            encryption: req.encryption,
            created_at: at,
            updated_at: at,
        };
        let policy = self.store.create_backup_policy(policy).await?;

        // Written only after the policy itself succeeds, so the relationship
        // never observes a half-created coupling (spec.md §9).
        let mut app = app;
        let mut ext = app.cronjob.unwrap_or_default();
        ext.backup_policy_id = Some(policy.id);
        app.cronjob = Some(ext);
        app.updated_at = now();
        self.store.update_application(app).await?;

        Ok(policy)
    }

    /// Requires an existing policy; creates a BackupExecution in `running`
    /// and performs the snapshot asynchronously (spec.md §4.4).
    pub async fn trigger_manual_backup(
        &self,
        application_id: ApplicationId,
        metadata: std::collections::HashMap<String, String>,
        cancellation: &CancellationToken,
    ) -> Result<BackupExecution> {
        let policy = self
            .store
            .find_backup_policy_by_application(application_id)
            .await?
            .ok_or_else(|| Error::PreconditionFailed(format!(
                "application {application_id} has no backup policy"
            )))?;

        let execution = BackupExecution {
            id: BackupExecutionId::new(),
            policy_id: policy.id,
            started_at: now(),
            completed_at: None,
            status: BackupExecutionStatus::Running,
            size_bytes: 0,
            volume_id: None,
            metadata,
        };
        let mut execution = self.store.create_backup_execution(execution).await?;

        let key = ObjectPath::from(format!("{}/{}", policy.id, execution.id));
        if cancellation.is_cancelled() {
            execution.status = BackupExecutionStatus::Failed;
        } else {
            match self.object_store.put(&key, Vec::new().into()).await {
                Ok(_) => {
                    execution.status = BackupExecutionStatus::Succeeded;
                    execution.volume_id = Some(key.to_string());
                    execution.size_bytes = 0;
                    execution.completed_at = Some(now());
                    if let Ok(storage) = self.store.adjust_storage_used_gb(policy.storage_id, 0).await {
                        self.record_storage_used_gb(storage.id, storage.used_gb);
                    }
                }
                Err(err) => {
                    error!(policy_id = %policy.id, error = %err, "manual backup failed");
                    execution.status = BackupExecutionStatus::Failed;
                    execution.completed_at = Some(now());
                }
            }
        }

        let execution = self.store.update_backup_execution(execution).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_backup_execution(&policy.id.to_string(), backup_status_label(execution.status));
        }
        Ok(execution)
    }

    /// Refuses unless `execution` is `succeeded` (spec.md §4.4).
    pub async fn restore_backup(
        &self,
        backup_execution_id: BackupExecutionId,
        application_id: ApplicationId,
        restore_type: RestoreType,
        options: serde_json::Value,
    ) -> Result<BackupRestore> {
        let execution = self
            .store
            .get_backup_execution(backup_execution_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("backup execution {backup_execution_id}")))?;
        if execution.status != BackupExecutionStatus::Succeeded {
            return Err(Error::PreconditionFailed(format!(
                "backup execution {backup_execution_id} is not succeeded"
            )));
        }

        let restore = BackupRestore {
            id: BackupRestoreId::new(),
            backup_execution_id,
            application_id,
            restore_type,
            status: RestoreStatus::Pending,
            started_at: now(),
            completed_at: None,
            options,
        };
        self.store.create_backup_restore(restore).await
    }

    /// Deletes BackupExecutions older than `policy.retention_days`, releases
    /// storage volumes, decrements `used_gb`. Idempotent: a second call on a
    /// steady state has no effect (spec.md §4.4, §8). A BackupExecution
    /// referenced by a non-terminal BackupRestore is never deleted.
    pub async fn cleanup_old_backups(&self, policy_id: BackupPolicyId) -> Result<u64> {
        let policy = self
            .store
            .get_backup_policy(policy_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("backup policy {policy_id}")))?;
        let executions = self.store.list_backup_executions(policy_id).await?;

        let to_prune = retention::select_for_pruning(&executions, policy.retention_days);
        let mut pruned = 0u64;
        for execution in to_prune {
            if self
                .store
                .has_non_terminal_restore_for_execution(execution.id)
                .await?
            {
                continue;
            }
            let storage = self
                .store
                .adjust_storage_used_gb(policy.storage_id, -(execution.size_bytes / (1024 * 1024 * 1024)).max(0))
                .await?;
            self.record_storage_used_gb(storage.id, storage.used_gb);
            self.store.delete_backup_execution(execution.id).await?;
            pruned += 1;
        }
        Ok(pruned)
    }

    pub async fn list_enabled_policies(&self) -> Result<Vec<BackupPolicy>> {
        self.store.list_enabled_backup_policies().await
    }
}

fn backup_status_label(status: BackupExecutionStatus) -> &'static str {
    match status {
        BackupExecutionStatus::Pending => "pending",
        BackupExecutionStatus::Running => "running",
        BackupExecutionStatus::Succeeded => "succeeded",
        BackupExecutionStatus::Failed => "failed",
    }
}

#[async_trait]
impl<S: ExecutionStore> BackupCoupling for BackupManager<S> {
    async fn trigger_manual_backup_for_cronjob(
        &self,
        application_id: ApplicationId,
        triggering_execution_id: CronJobExecutionId,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let mut metadata = std::collections::HashMap::new();
        metadata.insert(
            "triggering_cronjob_execution_id".to_string(),
            triggering_execution_id.to_string(),
        );
        self.trigger_manual_backup(application_id, metadata, cancellation)
            .await
            .map(|_| ())
    }
}
