use serde::{Deserialize, Serialize};

use super::common::{ApplicationId, CronJobExecutionId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronJobExecutionStatus {
    Running,
    Succeeded,
    Failed,
}

/// A single run of a CronJob's scheduled or manually-triggered instance.
///
/// Invariants (spec.md §3): `completed_at` is set iff `status != Running`;
/// `exit_code` is set iff `status` is terminal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CronJobExecution {
    pub id: CronJobExecutionId,
    pub application_id: ApplicationId,
    pub job_name: String,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub status: CronJobExecutionStatus,
    pub exit_code: Option<i32>,
    pub logs: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CronJobExecution {
    pub fn new_running(
        application_id: ApplicationId,
        job_name: String,
        started_at: Timestamp,
    ) -> Self {
        Self {
            id: CronJobExecutionId::new(),
            application_id,
            job_name,
            started_at,
            completed_at: None,
            status: CronJobExecutionStatus::Running,
            exit_code: None,
            logs: String::new(),
            created_at: started_at,
            updated_at: started_at,
        }
    }

    /// Monotone transition `Running -> {Succeeded, Failed}`. Returns `false`
    /// (a no-op) when the execution is already terminal, since
    /// spec.md §3 forbids anything but `running -> terminal`.
    pub fn transition(&mut self, status: CronJobExecutionStatus, exit_code: Option<i32>, at: Timestamp) -> bool {
        if self.status != CronJobExecutionStatus::Running {
            return false;
        }
        if status == CronJobExecutionStatus::Running {
            return false;
        }
        self.status = status;
        self.exit_code = exit_code;
        self.completed_at = Some(at);
        self.updated_at = at;
        true
    }
}
