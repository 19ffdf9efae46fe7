use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::common::{ApplicationId, Plan, ProjectId, Timestamp, WorkspaceId};

/// Application kind discriminator (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationKind {
    Stateless,
    Stateful,
    Cronjob,
    Function,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Creating,
    Running,
    Suspended,
    Terminating,
    Error,
}

/// Tagged source of a workload's container image.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    Image {
        #[serde(rename = "ref")]
        image_ref: String,
    },
    Git {
        url: String,
        #[serde(rename = "ref")]
        git_ref: String,
    },
    Buildpack {
        repository_url: String,
        builder: String,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_millicores: Option<i32>,
    pub memory_mb: Option<i32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfigSpec {
    pub replicas: i32,
    pub resources: ResourceLimits,
    /// The core does not interpret network policy; it passes this through
    /// the way the teacher passes through pod affinity/toleration overrides
    /// it never reads itself.
    pub network: serde_json::Value,
}

impl Default for ApplicationStatus {
    fn default() -> Self {
        ApplicationStatus::Pending
    }
}

/// CronJob-only extension fields, populated when `kind == Cronjob`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CronJobExtension {
    pub schedule: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub template_app_id: Option<ApplicationId>,
    pub last_execution_at: Option<Timestamp>,
    pub next_execution_at: Option<Timestamp>,
    /// Typed relationship to a backup policy, replacing the metadata
    /// string-flag coupling the teacher's design notes call out
    /// (spec.md §9). `None` means no policy is attached.
    pub backup_policy_id: Option<super::common::BackupPolicyId>,
}

/// Function-only extension fields, populated when `kind == Function`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FunctionExtension {
    pub runtime: String,
    pub handler: String,
    pub timeout_seconds: i32,
    pub memory_mb: i32,
    pub trigger_type: Option<String>,
    pub trigger_config: HashMap<String, String>,
    pub env_vars: HashMap<String, String>,
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub workspace_id: WorkspaceId,
    pub project_id: ProjectId,
    pub name: String,
    pub kind: ApplicationKind,
    pub status: ApplicationStatus,
    pub plan: Plan,
    pub source: Source,
    pub config: AppConfigSpec,
    pub metadata: HashMap<String, String>,
    pub cronjob: Option<CronJobExtension>,
    pub function: Option<FunctionExtension>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Application {
    pub fn backup_enabled(&self) -> bool {
        self.cronjob
            .as_ref()
            .is_some_and(|ext| ext.backup_policy_id.is_some())
    }

    pub fn cronjob_ext(&self) -> Option<&CronJobExtension> {
        self.cronjob.as_ref()
    }

    pub fn function_ext(&self) -> Option<&FunctionExtension> {
        self.function.as_ref()
    }
}
