use serde::{Deserialize, Serialize};

use super::common::{
    ApplicationId, BackupExecutionId, BackupPolicyId, BackupRestoreId, BackupStorageId,
    Timestamp, WorkspaceId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Nfs,
    Ceph,
    Dir,
    S3,
    Azure,
    Gcs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStorageStatus {
    Pending,
    Creating,
    Active,
    Degraded,
    Deleting,
}

/// Provider-specific configuration, kept opaque the way the teacher keeps
/// its `S3StorageSpec`/`AzureStorageSpec`/`GcsStorageSpec` shapes distinct
/// per `StorageType` but, here, serialized as one bag since this core does
/// not render the config into pod volumes itself — it hands it to an
/// `object_store`-backed provisioning adapter (§4.4).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig(pub serde_json::Value);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupStorage {
    pub id: BackupStorageId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub storage_type: StorageType,
    pub config: StorageConfig,
    pub capacity_gb: i64,
    pub used_gb: i64,
    pub status: BackupStorageStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BackupStorage {
    pub fn is_active(&self) -> bool {
        self.status == BackupStorageStatus::Active
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    Full,
    Incremental,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupPolicy {
    pub id: BackupPolicyId,
    pub application_id: ApplicationId,
    pub storage_id: BackupStorageId,
    pub enabled: bool,
    pub schedule: String,
    pub retention_days: i32,
    pub backup_type: BackupType,
    pub include_volumes: bool,
    pub include_database: bool,
    pub include_config: bool,
    pub compression: bool,
    pub encryption: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupExecution {
    pub id: BackupExecutionId,
    pub policy_id: BackupPolicyId,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub status: BackupExecutionStatus,
    pub size_bytes: i64,
    pub volume_id: Option<String>,
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreType {
    Full,
    Partial,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupRestore {
    pub id: BackupRestoreId,
    pub backup_execution_id: BackupExecutionId,
    pub application_id: ApplicationId,
    pub restore_type: RestoreType,
    pub status: RestoreStatus,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub options: serde_json::Value,
}
