//! Postgres-backed `ExecutionStore`. Entities are persisted as a handful of
//! indexed columns plus a JSONB payload (see `migrations/0001_init.sql`),
//! the way several of the retrieval pack's storage modules keep a typed
//! pool wrapper (`krust::storage::Storage`) around `sqlx::PgPool` rather
//! than hand-written column-per-field tables for every entity.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use crate::error::{Error, Result};
use crate::model::*;
use crate::store::ExecutionStore;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(Error::from)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(Error::from)
}

#[async_trait]
impl ExecutionStore for PostgresStore {
    async fn create_application(&self, app: Application) -> Result<Application> {
        let payload = encode(&app)?;
        let result = sqlx::query(
            r#"INSERT INTO applications (id, workspace_id, project_id, name, kind, status, payload, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               ON CONFLICT (workspace_id, project_id, name) DO NOTHING"#,
        )
        .bind(app.id.0)
        .bind(app.workspace_id.0)
        .bind(app.project_id.0)
        .bind(&app.name)
        .bind(format!("{:?}", app.kind))
        .bind(format!("{:?}", app.status))
        .bind(&payload)
        .bind(app.created_at)
        .bind(app.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::AlreadyExists(format!(
                "application '{}' in project {}",
                app.name, app.project_id
            )));
        }
        Ok(app)
    }

    async fn get_application(&self, id: ApplicationId) -> Result<Option<Application>> {
        let row = sqlx::query("SELECT payload FROM applications WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn find_application_by_name(
        &self,
        workspace_id: WorkspaceId,
        project_id: ProjectId,
        name: &str,
    ) -> Result<Option<Application>> {
        let row = sqlx::query(
            "SELECT payload FROM applications WHERE workspace_id = $1 AND project_id = $2 AND name = $3",
        )
        .bind(workspace_id.0)
        .bind(project_id.0)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn update_application(&self, app: Application) -> Result<Application> {
        let payload = encode(&app)?;
        let result = sqlx::query(
            r#"UPDATE applications SET status = $2, payload = $3, updated_at = $4 WHERE id = $1"#,
        )
        .bind(app.id.0)
        .bind(format!("{:?}", app.status))
        .bind(&payload)
        .bind(app.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("application {}", app.id)));
        }
        Ok(app)
    }

    async fn delete_application(&self, id: ApplicationId) -> Result<()> {
        sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_cronjob_applications(&self) -> Result<Vec<Application>> {
        let rows = sqlx::query("SELECT payload FROM applications WHERE kind = 'Cronjob'")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| decode(r.get("payload"))).collect()
    }

    async fn with_application_lock<F, T>(&self, id: ApplicationId, f: F) -> Result<T>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>> + Send,
        T: Send + 'static,
    {
        let mut tx = self.pool.begin().await?;
        // `hashtext` folds the uuid into the bigint key pg_advisory_xact_lock
        // expects; the lock is released automatically at transaction end.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text)::bigint)")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        let result = f().await;
        tx.commit().await?;
        result
    }

    async fn create_cronjob_execution(
        &self,
        execution: CronJobExecution,
    ) -> Result<CronJobExecution> {
        let payload = encode(&execution)?;
        sqlx::query(
            r#"INSERT INTO cronjob_executions (id, application_id, job_name, started_at, status, payload)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(execution.id.0)
        .bind(execution.application_id.0)
        .bind(&execution.job_name)
        .bind(execution.started_at)
        .bind(format!("{:?}", execution.status))
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(execution)
    }

    async fn get_cronjob_execution(
        &self,
        id: CronJobExecutionId,
    ) -> Result<Option<CronJobExecution>> {
        let row = sqlx::query("SELECT payload FROM cronjob_executions WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn update_cronjob_execution(
        &self,
        execution: CronJobExecution,
    ) -> Result<CronJobExecution> {
        let payload = encode(&execution)?;
        let result = sqlx::query(
            "UPDATE cronjob_executions SET status = $2, payload = $3 WHERE id = $1",
        )
        .bind(execution.id.0)
        .bind(format!("{:?}", execution.status))
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("cronjob execution {}", execution.id)));
        }
        Ok(execution)
    }

    async fn list_cronjob_executions(
        &self,
        application_id: ApplicationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CronJobExecution>> {
        let rows = sqlx::query(
            r#"SELECT payload FROM cronjob_executions WHERE application_id = $1
               ORDER BY started_at DESC LIMIT $2 OFFSET $3"#,
        )
        .bind(application_id.0)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| decode(r.get("payload"))).collect()
    }

    async fn list_running_cronjob_executions(&self) -> Result<Vec<CronJobExecution>> {
        let rows = sqlx::query("SELECT payload FROM cronjob_executions WHERE status = 'Running'")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| decode(r.get("payload"))).collect()
    }

    async fn has_running_cronjob_execution(&self, application_id: ApplicationId) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM cronjob_executions WHERE application_id = $1 AND status = 'Running') AS exists",
        )
        .bind(application_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("exists"))
    }

    async fn create_function_version(&self, version: FunctionVersion) -> Result<FunctionVersion> {
        let payload = encode(&version)?;
        let result = sqlx::query(
            r#"INSERT INTO function_versions (id, application_id, version_number, is_active, payload)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (application_id, version_number) DO NOTHING"#,
        )
        .bind(version.id.0)
        .bind(version.application_id.0)
        .bind(version.version_number)
        .bind(version.is_active)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::AlreadyExists(format!(
                "function version {} for application {}",
                version.version_number, version.application_id
            )));
        }
        Ok(version)
    }

    async fn get_function_version(&self, id: FunctionVersionId) -> Result<Option<FunctionVersion>> {
        let row = sqlx::query("SELECT payload FROM function_versions WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn update_function_version(&self, version: FunctionVersion) -> Result<FunctionVersion> {
        let payload = encode(&version)?;
        let result = sqlx::query(
            "UPDATE function_versions SET is_active = $2, payload = $3 WHERE id = $1",
        )
        .bind(version.id.0)
        .bind(version.is_active)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("function version {}", version.id)));
        }
        Ok(version)
    }

    async fn list_function_versions(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<FunctionVersion>> {
        let rows = sqlx::query(
            "SELECT payload FROM function_versions WHERE application_id = $1 ORDER BY version_number",
        )
        .bind(application_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| decode(r.get("payload"))).collect()
    }

    async fn get_active_function_version(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<FunctionVersion>> {
        let row = sqlx::query(
            "SELECT payload FROM function_versions WHERE application_id = $1 AND is_active",
        )
        .bind(application_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn swap_active_function_version(
        &self,
        application_id: ApplicationId,
        new_active: FunctionVersionId,
    ) -> Result<Option<FunctionVersionId>> {
        let mut tx = self.pool.begin().await?;

        let previous_row = sqlx::query(
            "SELECT id FROM function_versions WHERE application_id = $1 AND is_active",
        )
        .bind(application_id.0)
        .fetch_optional(&mut *tx)
        .await?;
        let previous: Option<uuid::Uuid> = previous_row.map(|r| r.get("id"));

        sqlx::query("UPDATE function_versions SET is_active = FALSE WHERE application_id = $1")
            .bind(application_id.0)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "UPDATE function_versions SET is_active = TRUE WHERE id = $1 AND application_id = $2",
        )
        .bind(new_active.0)
        .bind(application_id.0)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("function version {new_active}")));
        }

        tx.commit().await?;
        Ok(previous.map(FunctionVersionId))
    }

    async fn create_trigger(&self, application_id: ApplicationId, trigger: Trigger) -> Result<Trigger> {
        let payload = encode(&trigger)?;
        let result = sqlx::query(
            r#"INSERT INTO function_triggers (application_id, name, payload) VALUES ($1, $2, $3)
               ON CONFLICT (application_id, name) DO NOTHING"#,
        )
        .bind(application_id.0)
        .bind(&trigger.name)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::AlreadyExists(format!(
                "trigger '{}' for application {application_id}",
                trigger.name
            )));
        }
        Ok(trigger)
    }

    async fn list_triggers(&self, application_id: ApplicationId) -> Result<Vec<Trigger>> {
        let rows = sqlx::query("SELECT payload FROM function_triggers WHERE application_id = $1")
            .bind(application_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| decode(r.get("payload"))).collect()
    }

    async fn delete_trigger(&self, application_id: ApplicationId, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM function_triggers WHERE application_id = $1 AND name = $2")
            .bind(application_id.0)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_invocation(&self, invocation: FunctionInvocation) -> Result<FunctionInvocation> {
        let payload = encode(&invocation)?;
        sqlx::query(
            "INSERT INTO function_invocations (id, application_id, started_at, payload) VALUES ($1, $2, $3, $4)",
        )
        .bind(invocation.id.0)
        .bind(invocation.application_id.0)
        .bind(invocation.started_at)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(invocation)
    }

    async fn get_invocation(&self, id: FunctionInvocationId) -> Result<Option<FunctionInvocation>> {
        let row = sqlx::query("SELECT payload FROM function_invocations WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn update_invocation(&self, invocation: FunctionInvocation) -> Result<FunctionInvocation> {
        let payload = encode(&invocation)?;
        let result = sqlx::query("UPDATE function_invocations SET payload = $2 WHERE id = $1")
            .bind(invocation.id.0)
            .bind(&payload)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("invocation {}", invocation.id)));
        }
        Ok(invocation)
    }

    async fn list_invocations(
        &self,
        application_id: ApplicationId,
        limit: u32,
    ) -> Result<Vec<FunctionInvocation>> {
        let rows = sqlx::query(
            "SELECT payload FROM function_invocations WHERE application_id = $1 ORDER BY started_at DESC LIMIT $2",
        )
        .bind(application_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| decode(r.get("payload"))).collect()
    }

    async fn create_event(&self, event: FunctionEvent) -> Result<FunctionEvent> {
        let payload = encode(&event)?;
        sqlx::query(
            r#"INSERT INTO function_events (id, application_id, processing_status, next_attempt_at, payload)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(event.id.0)
        .bind(event.application_id.0)
        .bind(format!("{:?}", event.processing_status))
        .bind(event.next_attempt_at)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(event)
    }

    async fn get_event(&self, id: FunctionEventId) -> Result<Option<FunctionEvent>> {
        let row = sqlx::query("SELECT payload FROM function_events WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn update_event(&self, event: FunctionEvent) -> Result<FunctionEvent> {
        let payload = encode(&event)?;
        let result = sqlx::query(
            "UPDATE function_events SET processing_status = $2, next_attempt_at = $3, payload = $4 WHERE id = $1",
        )
        .bind(event.id.0)
        .bind(format!("{:?}", event.processing_status))
        .bind(event.next_attempt_at)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("function event {}", event.id)));
        }
        Ok(event)
    }

    async fn list_retryable_events(&self) -> Result<Vec<FunctionEvent>> {
        let rows = sqlx::query(
            r#"SELECT payload FROM function_events
               WHERE processing_status = 'Retry' AND (next_attempt_at IS NULL OR next_attempt_at <= now())"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| decode(r.get("payload"))).collect()
    }

    async fn create_backup_storage(&self, storage: BackupStorage) -> Result<BackupStorage> {
        let payload = encode(&storage)?;
        let result = sqlx::query(
            r#"INSERT INTO backup_storages (id, workspace_id, name, used_gb, capacity_gb, payload)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (workspace_id, name) DO NOTHING"#,
        )
        .bind(storage.id.0)
        .bind(storage.workspace_id.0)
        .bind(&storage.name)
        .bind(storage.used_gb)
        .bind(storage.capacity_gb)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::AlreadyExists(format!(
                "backup storage '{}' in workspace {}",
                storage.name, storage.workspace_id
            )));
        }
        Ok(storage)
    }

    async fn get_backup_storage(&self, id: BackupStorageId) -> Result<Option<BackupStorage>> {
        let row = sqlx::query("SELECT payload FROM backup_storages WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn find_backup_storage_by_name(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
    ) -> Result<Option<BackupStorage>> {
        let row = sqlx::query("SELECT payload FROM backup_storages WHERE workspace_id = $1 AND name = $2")
            .bind(workspace_id.0)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn update_backup_storage(&self, storage: BackupStorage) -> Result<BackupStorage> {
        let payload = encode(&storage)?;
        let result = sqlx::query(
            "UPDATE backup_storages SET used_gb = $2, payload = $3 WHERE id = $1",
        )
        .bind(storage.id.0)
        .bind(storage.used_gb)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("backup storage {}", storage.id)));
        }
        Ok(storage)
    }

    async fn adjust_storage_used_gb(&self, id: BackupStorageId, delta_gb: i64) -> Result<BackupStorage> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text)::bigint)")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT payload, used_gb, capacity_gb FROM backup_storages WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("backup storage {id}")))?;

        let used_gb: i64 = row.get("used_gb");
        let capacity_gb: i64 = row.get("capacity_gb");
        let new_used = used_gb + delta_gb;
        if new_used < 0 {
            return Err(Error::Conflict(format!(
                "storage {id} used_gb would go negative ({new_used})"
            )));
        }
        if new_used > capacity_gb {
            return Err(Error::PreconditionFailed(format!(
                "storage {id} used_gb {new_used} would exceed capacity {capacity_gb}"
            )));
        }

        let mut storage: BackupStorage = decode(row.get("payload"))?;
        storage.used_gb = new_used;
        let payload = encode(&storage)?;

        sqlx::query("UPDATE backup_storages SET used_gb = $2, payload = $3 WHERE id = $1")
            .bind(id.0)
            .bind(new_used)
            .bind(&payload)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(storage)
    }

    async fn count_policies_for_storage(&self, id: BackupStorageId) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM backup_policies WHERE storage_id = $1")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn create_backup_policy(&self, policy: BackupPolicy) -> Result<BackupPolicy> {
        let payload = encode(&policy)?;
        let result = sqlx::query(
            r#"INSERT INTO backup_policies (id, application_id, storage_id, enabled, payload)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (application_id) DO NOTHING"#,
        )
        .bind(policy.id.0)
        .bind(policy.application_id.0)
        .bind(policy.storage_id.0)
        .bind(policy.enabled)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::AlreadyExists(format!(
                "backup policy for application {}",
                policy.application_id
            )));
        }
        Ok(policy)
    }

    async fn get_backup_policy(&self, id: BackupPolicyId) -> Result<Option<BackupPolicy>> {
        let row = sqlx::query("SELECT payload FROM backup_policies WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn find_backup_policy_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<BackupPolicy>> {
        let row = sqlx::query("SELECT payload FROM backup_policies WHERE application_id = $1")
            .bind(application_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn update_backup_policy(&self, policy: BackupPolicy) -> Result<BackupPolicy> {
        let payload = encode(&policy)?;
        let result = sqlx::query("UPDATE backup_policies SET enabled = $2, payload = $3 WHERE id = $1")
            .bind(policy.id.0)
            .bind(policy.enabled)
            .bind(&payload)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("backup policy {}", policy.id)));
        }
        Ok(policy)
    }

    async fn list_enabled_backup_policies(&self) -> Result<Vec<BackupPolicy>> {
        let rows = sqlx::query("SELECT payload FROM backup_policies WHERE enabled")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| decode(r.get("payload"))).collect()
    }

    async fn create_backup_execution(&self, execution: BackupExecution) -> Result<BackupExecution> {
        let payload = encode(&execution)?;
        sqlx::query(
            r#"INSERT INTO backup_executions (id, policy_id, started_at, status, payload)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(execution.id.0)
        .bind(execution.policy_id.0)
        .bind(execution.started_at)
        .bind(format!("{:?}", execution.status))
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(execution)
    }

    async fn get_backup_execution(&self, id: BackupExecutionId) -> Result<Option<BackupExecution>> {
        let row = sqlx::query("SELECT payload FROM backup_executions WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(r.get("payload"))).transpose()
    }

    async fn update_backup_execution(&self, execution: BackupExecution) -> Result<BackupExecution> {
        let payload = encode(&execution)?;
        let result = sqlx::query("UPDATE backup_executions SET status = $2, payload = $3 WHERE id = $1")
            .bind(execution.id.0)
            .bind(format!("{:?}", execution.status))
            .bind(&payload)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("backup execution {}", execution.id)));
        }
        Ok(execution)
    }

    async fn list_backup_executions(&self, policy_id: BackupPolicyId) -> Result<Vec<BackupExecution>> {
        let rows = sqlx::query(
            "SELECT payload FROM backup_executions WHERE policy_id = $1 ORDER BY started_at DESC",
        )
        .bind(policy_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| decode(r.get("payload"))).collect()
    }

    async fn delete_backup_execution(&self, id: BackupExecutionId) -> Result<()> {
        sqlx::query("DELETE FROM backup_executions WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_backup_restore(&self, restore: BackupRestore) -> Result<BackupRestore> {
        let payload = encode(&restore)?;
        sqlx::query(
            "INSERT INTO backup_restores (id, backup_execution_id, status, payload) VALUES ($1, $2, $3, $4)",
        )
        .bind(restore.id.0)
        .bind(restore.backup_execution_id.0)
        .bind(format!("{:?}", restore.status))
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(restore)
    }

    async fn update_backup_restore(&self, restore: BackupRestore) -> Result<BackupRestore> {
        let payload = encode(&restore)?;
        let result = sqlx::query("UPDATE backup_restores SET status = $2, payload = $3 WHERE id = $1")
            .bind(restore.id.0)
            .bind(format!("{:?}", restore.status))
            .bind(&payload)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("backup restore {}", restore.id)));
        }
        Ok(restore)
    }

    async fn has_non_terminal_restore_for_execution(
        &self,
        backup_execution_id: BackupExecutionId,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"SELECT EXISTS(
                   SELECT 1 FROM backup_restores
                   WHERE backup_execution_id = $1 AND status IN ('Pending', 'Running')
               ) AS exists"#,
        )
        .bind(backup_execution_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("exists"))
    }

    async fn acquire_lease(&self, task_name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let ttl_secs = ttl.as_secs() as f64;
        let row = sqlx::query(
            r#"INSERT INTO scheduling_leases (task_name, owner, expires_at)
               VALUES ($1, $2, now() + make_interval(secs => $3))
               ON CONFLICT (task_name) DO UPDATE
                   SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at
                   WHERE scheduling_leases.expires_at <= now() OR scheduling_leases.owner = EXCLUDED.owner
               RETURNING owner"#,
        )
        .bind(task_name)
        .bind(owner)
        .bind(ttl_secs)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}
