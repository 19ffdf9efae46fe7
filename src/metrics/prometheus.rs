use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Prometheus metrics state for the core, following the same
/// register-at-construction pattern the teacher uses for its backup/restore
/// counters, generalized across CronJob, Function, Backup and Scheduling
/// Engine activity.
pub struct MetricsState {
    registry: Registry,
    pub cronjob_executions_total: IntCounterVec,
    pub cronjob_execution_duration_seconds: HistogramVec,
    pub function_invocations_total: IntCounterVec,
    pub function_invocation_duration_seconds: HistogramVec,
    pub function_events_total: IntCounterVec,
    pub backup_executions_total: IntCounterVec,
    pub backup_storage_used_gb: GaugeVec,
    pub scheduling_task_runs_total: IntCounterVec,
    pub scheduling_task_duration_seconds: HistogramVec,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    pub fn new() -> Self {
        let registry = Registry::new();

        let cronjob_executions_total = IntCounterVec::new(
            Opts::new(
                "appcore_cronjob_executions_total",
                "Total number of cronjob executions by terminal status",
            ),
            &["application_id", "status"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(cronjob_executions_total.clone()))
            .expect("metric registration");

        let cronjob_execution_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "appcore_cronjob_execution_duration_seconds",
                "Duration of cronjob executions in seconds",
            )
            .buckets(vec![1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0, 21600.0]),
            &["application_id"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(cronjob_execution_duration_seconds.clone()))
            .expect("metric registration");

        let function_invocations_total = IntCounterVec::new(
            Opts::new(
                "appcore_function_invocations_total",
                "Total number of function invocations by terminal status",
            ),
            &["application_id", "status"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(function_invocations_total.clone()))
            .expect("metric registration");

        let function_invocation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "appcore_function_invocation_duration_seconds",
                "Duration of function invocations in seconds",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["application_id"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(function_invocation_duration_seconds.clone()))
            .expect("metric registration");

        let function_events_total = IntCounterVec::new(
            Opts::new(
                "appcore_function_events_total",
                "Total number of function events by terminal processing status",
            ),
            &["application_id", "status"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(function_events_total.clone()))
            .expect("metric registration");

        let backup_executions_total = IntCounterVec::new(
            Opts::new(
                "appcore_backup_executions_total",
                "Total number of backup executions by terminal status",
            ),
            &["policy_id", "status"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(backup_executions_total.clone()))
            .expect("metric registration");

        let backup_storage_used_gb = GaugeVec::new(
            Opts::new(
                "appcore_backup_storage_used_gb",
                "Current used_gb on a backup storage",
            ),
            &["storage_id"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(backup_storage_used_gb.clone()))
            .expect("metric registration");

        let scheduling_task_runs_total = IntCounterVec::new(
            Opts::new(
                "appcore_scheduling_task_runs_total",
                "Total number of Scheduling Engine task runs by outcome",
            ),
            &["task", "outcome"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(scheduling_task_runs_total.clone()))
            .expect("metric registration");

        let scheduling_task_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "appcore_scheduling_task_duration_seconds",
                "Duration of Scheduling Engine task runs in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
            &["task"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(scheduling_task_duration_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            cronjob_executions_total,
            cronjob_execution_duration_seconds,
            function_invocations_total,
            function_invocation_duration_seconds,
            function_events_total,
            backup_executions_total,
            backup_storage_used_gb,
            scheduling_task_runs_total,
            scheduling_task_duration_seconds,
        }
    }

    /// Gather all metrics and encode as Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    pub fn record_cronjob_execution(&self, application_id: &str, status: &str, duration_secs: f64) {
        self.cronjob_executions_total
            .with_label_values(&[application_id, status])
            .inc();
        self.cronjob_execution_duration_seconds
            .with_label_values(&[application_id])
            .observe(duration_secs);
    }

    pub fn record_function_invocation(&self, application_id: &str, status: &str, duration_secs: f64) {
        self.function_invocations_total
            .with_label_values(&[application_id, status])
            .inc();
        self.function_invocation_duration_seconds
            .with_label_values(&[application_id])
            .observe(duration_secs);
    }

    pub fn record_function_event(&self, application_id: &str, status: &str) {
        self.function_events_total
            .with_label_values(&[application_id, status])
            .inc();
    }

    pub fn record_backup_execution(&self, policy_id: &str, status: &str) {
        self.backup_executions_total
            .with_label_values(&[policy_id, status])
            .inc();
    }

    pub fn set_backup_storage_used_gb(&self, storage_id: &str, used_gb: f64) {
        self.backup_storage_used_gb
            .with_label_values(&[storage_id])
            .set(used_gb);
    }

    pub fn record_scheduling_task(&self, task: &str, outcome: &str, duration_secs: f64) {
        self.scheduling_task_runs_total
            .with_label_values(&[task, outcome])
            .inc();
        self.scheduling_task_duration_seconds
            .with_label_values(&[task])
            .observe(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_includes_registered_families() {
        let state = MetricsState::new();
        state.record_cronjob_execution("app-1", "succeeded", 12.5);
        state.record_function_invocation("app-2", "completed", 0.042);
        let output = state.gather();
        assert!(output.contains("appcore_cronjob_executions_total"));
        assert!(output.contains("appcore_function_invocation_duration_seconds"));
    }
}
