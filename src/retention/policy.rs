//! Backup retention (spec.md §4.4): a pure age-window prune decision over a
//! policy's executions, kept separate from the store/storage-adjustment
//! side effects in `managers::backup::BackupManager::cleanup_old_backups`.
//! Generalizes the teacher's `evaluate_retention`/`RetentionSpec` (which
//! supported `max_backups` and a free-form `max_age` string) down to
//! spec.md §3's single `retention_days` field, reusing its day-cutoff math.

use chrono::Utc;

use crate::model::{BackupExecution, BackupExecutionStatus};

/// Executions whose `completed_at` is older than `retention_days`, and
/// which are in a terminal state (cleanup does not touch in-flight runs).
pub fn select_for_pruning(executions: &[BackupExecution], retention_days: i32) -> Vec<BackupExecution> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days.max(0) as i64);
    executions
        .iter()
        .filter(|e| {
            matches!(
                e.status,
                BackupExecutionStatus::Succeeded | BackupExecutionStatus::Failed
            )
        })
        .filter(|e| e.completed_at.is_some_and(|completed| completed < cutoff))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackupExecutionId, BackupPolicyId};
    use chrono::Duration;
    use std::collections::HashMap;

    fn make_execution(days_ago: i64) -> BackupExecution {
        let completed = Utc::now() - Duration::days(days_ago);
        BackupExecution {
            id: BackupExecutionId::new(),
            policy_id: BackupPolicyId::new(),
            started_at: completed,
            completed_at: Some(completed),
            status: BackupExecutionStatus::Succeeded,
            size_bytes: 1024,
            volume_id: Some("vol".to_string()),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn prunes_only_past_the_cutoff() {
        let executions = vec![
            make_execution(1),
            make_execution(5),
            make_execution(10),
            make_execution(20),
        ];
        let pruned = select_for_pruning(&executions, 7);
        assert_eq!(pruned.len(), 2);
        assert!(pruned.iter().all(|e| e.completed_at.unwrap() < Utc::now() - Duration::days(7)));
    }

    #[test]
    fn running_executions_are_never_pruned() {
        let mut execution = make_execution(30);
        execution.status = BackupExecutionStatus::Running;
        execution.completed_at = None;
        let pruned = select_for_pruning(&[execution], 7);
        assert!(pruned.is_empty());
    }

    #[test]
    fn empty_history_prunes_nothing() {
        assert!(select_for_pruning(&[], 7).is_empty());
    }
}
