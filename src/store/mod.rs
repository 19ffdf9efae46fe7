pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::*;

/// Durable records for the Application Execution Core (spec.md §3, §6).
/// All mutations are transactional; the in-memory implementation
/// (`memory::MemoryStore`) exists for tests, the Postgres implementation
/// (`postgres::PostgresStore`) is the production backend, mirroring the
/// retrieval pack's `sqlx`-pool-per-entity-module storage pattern.
#[async_trait]
pub trait ExecutionStore: Send + Sync + 'static {
    // -- Applications --

    async fn create_application(&self, app: Application) -> Result<Application>;
    async fn get_application(&self, id: ApplicationId) -> Result<Option<Application>>;
    async fn find_application_by_name(
        &self,
        workspace_id: WorkspaceId,
        project_id: ProjectId,
        name: &str,
    ) -> Result<Option<Application>>;
    async fn update_application(&self, app: Application) -> Result<Application>;
    async fn delete_application(&self, id: ApplicationId) -> Result<()>;
    /// All cronjob-kind applications, for the Scheduling Engine's
    /// `next_execution_at` advancement sweep (spec.md §4.5).
    async fn list_cronjob_applications(&self) -> Result<Vec<Application>>;

    /// Acquire a per-application advisory lock for the duration of `f`,
    /// serializing status transitions and execution appends across
    /// concurrent callers (spec.md §5). The in-memory store implements this
    /// with a per-id `tokio::sync::Mutex`; the Postgres store uses
    /// `pg_advisory_xact_lock`.
    async fn with_application_lock<F, T>(&self, id: ApplicationId, f: F) -> Result<T>
    where
        F: FnOnce() -> futures::future::BoxFuture<'static, Result<T>> + Send,
        T: Send + 'static;

    // -- CronJob executions --

    async fn create_cronjob_execution(
        &self,
        execution: CronJobExecution,
    ) -> Result<CronJobExecution>;
    async fn get_cronjob_execution(
        &self,
        id: CronJobExecutionId,
    ) -> Result<Option<CronJobExecution>>;
    async fn update_cronjob_execution(
        &self,
        execution: CronJobExecution,
    ) -> Result<CronJobExecution>;
    async fn list_cronjob_executions(
        &self,
        application_id: ApplicationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CronJobExecution>>;
    async fn list_running_cronjob_executions(&self) -> Result<Vec<CronJobExecution>>;
    async fn has_running_cronjob_execution(&self, application_id: ApplicationId) -> Result<bool>;

    // -- Function versions --

    async fn create_function_version(&self, version: FunctionVersion) -> Result<FunctionVersion>;
    async fn get_function_version(&self, id: FunctionVersionId) -> Result<Option<FunctionVersion>>;
    async fn update_function_version(&self, version: FunctionVersion) -> Result<FunctionVersion>;
    async fn list_function_versions(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<FunctionVersion>>;
    async fn get_active_function_version(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<FunctionVersion>>;
    /// Clear `is_active` on the current active version and set it on
    /// `new_active` inside one store transaction (spec.md §4.3, §5).
    async fn swap_active_function_version(
        &self,
        application_id: ApplicationId,
        new_active: FunctionVersionId,
    ) -> Result<Option<FunctionVersionId>>;

    // -- Function triggers --

    async fn create_trigger(&self, application_id: ApplicationId, trigger: Trigger) -> Result<Trigger>;
    async fn list_triggers(&self, application_id: ApplicationId) -> Result<Vec<Trigger>>;
    async fn delete_trigger(&self, application_id: ApplicationId, name: &str) -> Result<()>;

    // -- Function invocations --

    async fn create_invocation(&self, invocation: FunctionInvocation) -> Result<FunctionInvocation>;
    async fn get_invocation(&self, id: FunctionInvocationId) -> Result<Option<FunctionInvocation>>;
    async fn update_invocation(&self, invocation: FunctionInvocation) -> Result<FunctionInvocation>;
    async fn list_invocations(
        &self,
        application_id: ApplicationId,
        limit: u32,
    ) -> Result<Vec<FunctionInvocation>>;

    // -- Function events --

    async fn create_event(&self, event: FunctionEvent) -> Result<FunctionEvent>;
    async fn get_event(&self, id: FunctionEventId) -> Result<Option<FunctionEvent>>;
    async fn update_event(&self, event: FunctionEvent) -> Result<FunctionEvent>;
    async fn list_retryable_events(&self) -> Result<Vec<FunctionEvent>>;

    // -- Backup storages --

    async fn create_backup_storage(&self, storage: BackupStorage) -> Result<BackupStorage>;
    async fn get_backup_storage(&self, id: BackupStorageId) -> Result<Option<BackupStorage>>;
    async fn find_backup_storage_by_name(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
    ) -> Result<Option<BackupStorage>>;
    async fn update_backup_storage(&self, storage: BackupStorage) -> Result<BackupStorage>;
    /// Adjust `used_gb` under a per-storage lock, rejecting drift below
    /// zero or above `capacity_gb` (spec.md §5, §8).
    async fn adjust_storage_used_gb(&self, id: BackupStorageId, delta_gb: i64) -> Result<BackupStorage>;
    async fn count_policies_for_storage(&self, id: BackupStorageId) -> Result<u64>;

    // -- Backup policies --

    async fn create_backup_policy(&self, policy: BackupPolicy) -> Result<BackupPolicy>;
    async fn get_backup_policy(&self, id: BackupPolicyId) -> Result<Option<BackupPolicy>>;
    async fn find_backup_policy_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<BackupPolicy>>;
    async fn update_backup_policy(&self, policy: BackupPolicy) -> Result<BackupPolicy>;
    async fn list_enabled_backup_policies(&self) -> Result<Vec<BackupPolicy>>;

    // -- Backup executions --

    async fn create_backup_execution(&self, execution: BackupExecution) -> Result<BackupExecution>;
    async fn get_backup_execution(&self, id: BackupExecutionId) -> Result<Option<BackupExecution>>;
    async fn update_backup_execution(&self, execution: BackupExecution) -> Result<BackupExecution>;
    async fn list_backup_executions(&self, policy_id: BackupPolicyId) -> Result<Vec<BackupExecution>>;
    async fn delete_backup_execution(&self, id: BackupExecutionId) -> Result<()>;

    // -- Backup restores --

    async fn create_backup_restore(&self, restore: BackupRestore) -> Result<BackupRestore>;
    async fn update_backup_restore(&self, restore: BackupRestore) -> Result<BackupRestore>;
    async fn has_non_terminal_restore_for_execution(
        &self,
        backup_execution_id: BackupExecutionId,
    ) -> Result<bool>;

    // -- Scheduling lease --

    /// Acquire (or renew) a cooperative lease for a named periodic task,
    /// returning `true` if this process now owns it. Leases expire on
    /// crash after `ttl` (spec.md §4.5).
    async fn acquire_lease(&self, task_name: &str, owner: &str, ttl: std::time::Duration) -> Result<bool>;
}
