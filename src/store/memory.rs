//! In-memory `ExecutionStore`, the store-backed equivalent of the teacher's
//! intentional first-class mock providers: a test seam, never a production
//! fallback. Guarded by a single `tokio::sync::Mutex<State>` rather than a
//! graph of interior-mutable domain objects, so manager code exercises the
//! same "store owns the truth" discipline it would against Postgres.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::*;
use crate::store::ExecutionStore;

#[derive(Default)]
struct State {
    applications: HashMap<ApplicationId, Application>,
    cronjob_executions: HashMap<CronJobExecutionId, CronJobExecution>,
    function_versions: HashMap<FunctionVersionId, FunctionVersion>,
    triggers: HashMap<ApplicationId, Vec<Trigger>>,
    invocations: HashMap<FunctionInvocationId, FunctionInvocation>,
    events: HashMap<FunctionEventId, FunctionEvent>,
    backup_storages: HashMap<BackupStorageId, BackupStorage>,
    backup_policies: HashMap<BackupPolicyId, BackupPolicy>,
    backup_executions: HashMap<BackupExecutionId, BackupExecution>,
    backup_restores: HashMap<BackupRestoreId, BackupRestore>,
    leases: HashMap<String, (String, Instant)>,
}

pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    /// Serializes `with_application_lock` critical sections. Kept separate
    /// from `state` because `f()` itself calls back into other
    /// `ExecutionStore` methods that lock `state`; holding `state` across
    /// `f()` would deadlock against a non-reentrant `tokio::sync::Mutex`.
    request_lock: Arc<Mutex<()>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            request_lock: Arc::new(Mutex::new(())),
        }
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> Error {
    Error::NotFound(format!("{what} {id}"))
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create_application(&self, app: Application) -> Result<Application> {
        let mut state = self.state.lock().await;
        if state
            .applications
            .values()
            .any(|a| a.workspace_id == app.workspace_id && a.project_id == app.project_id && a.name == app.name)
        {
            return Err(Error::AlreadyExists(format!(
                "application '{}' in project {}",
                app.name, app.project_id
            )));
        }
        state.applications.insert(app.id, app.clone());
        Ok(app)
    }

    async fn get_application(&self, id: ApplicationId) -> Result<Option<Application>> {
        Ok(self.state.lock().await.applications.get(&id).cloned())
    }

    async fn find_application_by_name(
        &self,
        workspace_id: WorkspaceId,
        project_id: ProjectId,
        name: &str,
    ) -> Result<Option<Application>> {
        Ok(self
            .state
            .lock()
            .await
            .applications
            .values()
            .find(|a| a.workspace_id == workspace_id && a.project_id == project_id && a.name == name)
            .cloned())
    }

    async fn update_application(&self, app: Application) -> Result<Application> {
        let mut state = self.state.lock().await;
        if !state.applications.contains_key(&app.id) {
            return Err(not_found("application", app.id));
        }
        state.applications.insert(app.id, app.clone());
        Ok(app)
    }

    async fn delete_application(&self, id: ApplicationId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.applications.remove(&id);
        state.cronjob_executions.retain(|_, e| e.application_id != id);
        state.function_versions.retain(|_, v| v.application_id != id);
        state.triggers.remove(&id);
        state.invocations.retain(|_, i| i.application_id != id);
        state.events.retain(|_, e| e.application_id != id);

        let policy_ids: Vec<BackupPolicyId> = state
            .backup_policies
            .values()
            .filter(|p| p.application_id == id)
            .map(|p| p.id)
            .collect();
        state.backup_policies.retain(|_, p| p.application_id != id);
        state
            .backup_executions
            .retain(|_, e| !policy_ids.contains(&e.policy_id));

        Ok(())
    }

    async fn list_cronjob_applications(&self) -> Result<Vec<Application>> {
        let state = self.state.lock().await;
        Ok(state
            .applications
            .values()
            .filter(|a| a.kind == ApplicationKind::Cronjob)
            .cloned()
            .collect())
    }

    async fn with_application_lock<F, T>(&self, _id: ApplicationId, f: F) -> Result<T>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>> + Send,
        T: Send + 'static,
    {
        // A single global request lock is coarser than a per-application
        // lock but preserves the serialization guarantee the in-memory
        // store needs to provide for tests; production serialization is
        // the Postgres store's `pg_advisory_xact_lock`.
        let _guard = self.request_lock.lock().await;
        f().await
    }

    async fn create_cronjob_execution(
        &self,
        execution: CronJobExecution,
    ) -> Result<CronJobExecution> {
        let mut state = self.state.lock().await;
        state
            .cronjob_executions
            .insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn get_cronjob_execution(
        &self,
        id: CronJobExecutionId,
    ) -> Result<Option<CronJobExecution>> {
        Ok(self.state.lock().await.cronjob_executions.get(&id).cloned())
    }

    async fn update_cronjob_execution(
        &self,
        execution: CronJobExecution,
    ) -> Result<CronJobExecution> {
        let mut state = self.state.lock().await;
        if !state.cronjob_executions.contains_key(&execution.id) {
            return Err(not_found("cronjob execution", execution.id));
        }
        state
            .cronjob_executions
            .insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn list_cronjob_executions(
        &self,
        application_id: ApplicationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CronJobExecution>> {
        let state = self.state.lock().await;
        let mut executions: Vec<CronJobExecution> = state
            .cronjob_executions
            .values()
            .filter(|e| e.application_id == application_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(executions
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_running_cronjob_executions(&self) -> Result<Vec<CronJobExecution>> {
        let state = self.state.lock().await;
        Ok(state
            .cronjob_executions
            .values()
            .filter(|e| e.status == CronJobExecutionStatus::Running)
            .cloned()
            .collect())
    }

    async fn has_running_cronjob_execution(&self, application_id: ApplicationId) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.cronjob_executions.values().any(|e| {
            e.application_id == application_id && e.status == CronJobExecutionStatus::Running
        }))
    }

    async fn create_function_version(&self, version: FunctionVersion) -> Result<FunctionVersion> {
        let mut state = self.state.lock().await;
        if state
            .function_versions
            .values()
            .any(|v| v.application_id == version.application_id && v.version_number == version.version_number)
        {
            return Err(Error::AlreadyExists(format!(
                "function version {} for application {}",
                version.version_number, version.application_id
            )));
        }
        state
            .function_versions
            .insert(version.id, version.clone());
        Ok(version)
    }

    async fn get_function_version(&self, id: FunctionVersionId) -> Result<Option<FunctionVersion>> {
        Ok(self.state.lock().await.function_versions.get(&id).cloned())
    }

    async fn update_function_version(&self, version: FunctionVersion) -> Result<FunctionVersion> {
        let mut state = self.state.lock().await;
        if !state.function_versions.contains_key(&version.id) {
            return Err(not_found("function version", version.id));
        }
        state
            .function_versions
            .insert(version.id, version.clone());
        Ok(version)
    }

    async fn list_function_versions(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<FunctionVersion>> {
        let state = self.state.lock().await;
        let mut versions: Vec<FunctionVersion> = state
            .function_versions
            .values()
            .filter(|v| v.application_id == application_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn get_active_function_version(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<FunctionVersion>> {
        let state = self.state.lock().await;
        Ok(state
            .function_versions
            .values()
            .find(|v| v.application_id == application_id && v.is_active)
            .cloned())
    }

    async fn swap_active_function_version(
        &self,
        application_id: ApplicationId,
        new_active: FunctionVersionId,
    ) -> Result<Option<FunctionVersionId>> {
        let mut state = self.state.lock().await;
        if !state
            .function_versions
            .get(&new_active)
            .is_some_and(|v| v.application_id == application_id)
        {
            return Err(not_found("function version", new_active));
        }

        let mut previous = None;
        for version in state.function_versions.values_mut() {
            if version.application_id == application_id && version.is_active {
                version.is_active = false;
                previous = Some(version.id);
            }
        }
        if let Some(version) = state.function_versions.get_mut(&new_active) {
            version.is_active = true;
        }
        Ok(previous)
    }

    async fn create_trigger(&self, application_id: ApplicationId, trigger: Trigger) -> Result<Trigger> {
        let mut state = self.state.lock().await;
        let triggers = state.triggers.entry(application_id).or_default();
        if triggers.iter().any(|t| t.name == trigger.name) {
            return Err(Error::AlreadyExists(format!(
                "trigger '{}' for application {}",
                trigger.name, application_id
            )));
        }
        triggers.push(trigger.clone());
        Ok(trigger)
    }

    async fn list_triggers(&self, application_id: ApplicationId) -> Result<Vec<Trigger>> {
        Ok(self
            .state
            .lock()
            .await
            .triggers
            .get(&application_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_trigger(&self, application_id: ApplicationId, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(triggers) = state.triggers.get_mut(&application_id) {
            triggers.retain(|t| t.name != name);
        }
        Ok(())
    }

    async fn create_invocation(&self, invocation: FunctionInvocation) -> Result<FunctionInvocation> {
        let mut state = self.state.lock().await;
        state.invocations.insert(invocation.id, invocation.clone());
        Ok(invocation)
    }

    async fn get_invocation(&self, id: FunctionInvocationId) -> Result<Option<FunctionInvocation>> {
        Ok(self.state.lock().await.invocations.get(&id).cloned())
    }

    async fn update_invocation(&self, invocation: FunctionInvocation) -> Result<FunctionInvocation> {
        let mut state = self.state.lock().await;
        if !state.invocations.contains_key(&invocation.id) {
            return Err(not_found("invocation", invocation.id));
        }
        state.invocations.insert(invocation.id, invocation.clone());
        Ok(invocation)
    }

    async fn list_invocations(
        &self,
        application_id: ApplicationId,
        limit: u32,
    ) -> Result<Vec<FunctionInvocation>> {
        let state = self.state.lock().await;
        let mut invocations: Vec<FunctionInvocation> = state
            .invocations
            .values()
            .filter(|i| i.application_id == application_id)
            .cloned()
            .collect();
        invocations.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        invocations.truncate(limit as usize);
        Ok(invocations)
    }

    async fn create_event(&self, event: FunctionEvent) -> Result<FunctionEvent> {
        let mut state = self.state.lock().await;
        state.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: FunctionEventId) -> Result<Option<FunctionEvent>> {
        Ok(self.state.lock().await.events.get(&id).cloned())
    }

    async fn update_event(&self, event: FunctionEvent) -> Result<FunctionEvent> {
        let mut state = self.state.lock().await;
        if !state.events.contains_key(&event.id) {
            return Err(not_found("function event", event.id));
        }
        state.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn list_retryable_events(&self) -> Result<Vec<FunctionEvent>> {
        let state = self.state.lock().await;
        let now = crate::model::now();
        Ok(state
            .events
            .values()
            .filter(|e| {
                e.processing_status == EventProcessingStatus::Retry
                    && e.next_attempt_at.is_none_or(|t| t <= now)
            })
            .cloned()
            .collect())
    }

    async fn create_backup_storage(&self, storage: BackupStorage) -> Result<BackupStorage> {
        let mut state = self.state.lock().await;
        if state
            .backup_storages
            .values()
            .any(|s| s.workspace_id == storage.workspace_id && s.name == storage.name)
        {
            return Err(Error::AlreadyExists(format!(
                "backup storage '{}' in workspace {}",
                storage.name, storage.workspace_id
            )));
        }
        state.backup_storages.insert(storage.id, storage.clone());
        Ok(storage)
    }

    async fn get_backup_storage(&self, id: BackupStorageId) -> Result<Option<BackupStorage>> {
        Ok(self.state.lock().await.backup_storages.get(&id).cloned())
    }

    async fn find_backup_storage_by_name(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
    ) -> Result<Option<BackupStorage>> {
        Ok(self
            .state
            .lock()
            .await
            .backup_storages
            .values()
            .find(|s| s.workspace_id == workspace_id && s.name == name)
            .cloned())
    }

    async fn update_backup_storage(&self, storage: BackupStorage) -> Result<BackupStorage> {
        let mut state = self.state.lock().await;
        if !state.backup_storages.contains_key(&storage.id) {
            return Err(not_found("backup storage", storage.id));
        }
        state.backup_storages.insert(storage.id, storage.clone());
        Ok(storage)
    }

    async fn adjust_storage_used_gb(&self, id: BackupStorageId, delta_gb: i64) -> Result<BackupStorage> {
        let mut state = self.state.lock().await;
        let storage = state
            .backup_storages
            .get_mut(&id)
            .ok_or_else(|| not_found("backup storage", id))?;
        let new_used = storage.used_gb + delta_gb;
        if new_used < 0 {
            return Err(Error::Conflict(format!(
                "storage {id} used_gb would go negative ({new_used})"
            )));
        }
        if new_used > storage.capacity_gb {
            return Err(Error::PreconditionFailed(format!(
                "storage {id} used_gb {new_used} would exceed capacity {}",
                storage.capacity_gb
            )));
        }
        storage.used_gb = new_used;
        Ok(storage.clone())
    }

    async fn count_policies_for_storage(&self, id: BackupStorageId) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state
            .backup_policies
            .values()
            .filter(|p| p.storage_id == id)
            .count() as u64)
    }

    async fn create_backup_policy(&self, policy: BackupPolicy) -> Result<BackupPolicy> {
        let mut state = self.state.lock().await;
        if state
            .backup_policies
            .values()
            .any(|p| p.application_id == policy.application_id)
        {
            return Err(Error::AlreadyExists(format!(
                "backup policy for application {}",
                policy.application_id
            )));
        }
        state.backup_policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn get_backup_policy(&self, id: BackupPolicyId) -> Result<Option<BackupPolicy>> {
        Ok(self.state.lock().await.backup_policies.get(&id).cloned())
    }

    async fn find_backup_policy_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<BackupPolicy>> {
        Ok(self
            .state
            .lock()
            .await
            .backup_policies
            .values()
            .find(|p| p.application_id == application_id)
            .cloned())
    }

    async fn update_backup_policy(&self, policy: BackupPolicy) -> Result<BackupPolicy> {
        let mut state = self.state.lock().await;
        if !state.backup_policies.contains_key(&policy.id) {
            return Err(not_found("backup policy", policy.id));
        }
        state.backup_policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn list_enabled_backup_policies(&self) -> Result<Vec<BackupPolicy>> {
        let state = self.state.lock().await;
        Ok(state
            .backup_policies
            .values()
            .filter(|p| p.enabled)
            .cloned()
            .collect())
    }

    async fn create_backup_execution(&self, execution: BackupExecution) -> Result<BackupExecution> {
        let mut state = self.state.lock().await;
        state
            .backup_executions
            .insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn get_backup_execution(&self, id: BackupExecutionId) -> Result<Option<BackupExecution>> {
        Ok(self.state.lock().await.backup_executions.get(&id).cloned())
    }

    async fn update_backup_execution(&self, execution: BackupExecution) -> Result<BackupExecution> {
        let mut state = self.state.lock().await;
        if !state.backup_executions.contains_key(&execution.id) {
            return Err(not_found("backup execution", execution.id));
        }
        state
            .backup_executions
            .insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn list_backup_executions(&self, policy_id: BackupPolicyId) -> Result<Vec<BackupExecution>> {
        let state = self.state.lock().await;
        let mut executions: Vec<BackupExecution> = state
            .backup_executions
            .values()
            .filter(|e| e.policy_id == policy_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(executions)
    }

    async fn delete_backup_execution(&self, id: BackupExecutionId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.backup_executions.remove(&id);
        Ok(())
    }

    async fn create_backup_restore(&self, restore: BackupRestore) -> Result<BackupRestore> {
        let mut state = self.state.lock().await;
        state.backup_restores.insert(restore.id, restore.clone());
        Ok(restore)
    }

    async fn update_backup_restore(&self, restore: BackupRestore) -> Result<BackupRestore> {
        let mut state = self.state.lock().await;
        if !state.backup_restores.contains_key(&restore.id) {
            return Err(not_found("backup restore", restore.id));
        }
        state.backup_restores.insert(restore.id, restore.clone());
        Ok(restore)
    }

    async fn has_non_terminal_restore_for_execution(
        &self,
        backup_execution_id: BackupExecutionId,
    ) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.backup_restores.values().any(|r| {
            r.backup_execution_id == backup_execution_id
                && matches!(r.status, RestoreStatus::Pending | RestoreStatus::Running)
        }))
    }

    async fn acquire_lease(&self, task_name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let acquired = match state.leases.get(task_name) {
            Some((current_owner, expires_at)) if *expires_at > now && current_owner != owner => false,
            _ => true,
        };
        if acquired {
            state
                .leases
                .insert(task_name.to_string(), (owner.to_string(), now + ttl));
        }
        Ok(acquired)
    }
}
