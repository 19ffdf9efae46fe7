use std::time::Duration;

/// Environment-visible configuration for the core (spec.md §6). The
/// surrounding repository's full configuration system is out of scope; the
/// core only reads the handful of entries it consumes itself, the way the
/// teacher reads `RUST_LOG` directly rather than owning a config crate.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store_connection_string: String,
    pub max_concurrent_manual_triggers_per_application: u32,
    pub max_job_runtime: Duration,
    pub backup_cleanup_interval: Duration,
    pub function_event_max_retries: u32,
    pub function_invocation_timeout_default: Duration,
    pub storage_provisioning_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_connection_string: "postgres://localhost/appcore".to_string(),
            max_concurrent_manual_triggers_per_application: 1,
            max_job_runtime: Duration::from_secs(24 * 3600),
            backup_cleanup_interval: Duration::from_secs(3600),
            function_event_max_retries: 5,
            function_invocation_timeout_default: Duration::from_secs(300),
            storage_provisioning_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl AppConfig {
    /// Load configuration from `APPCORE_*` environment variables, falling
    /// back to the defaults documented in spec.md §6 for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_connection_string: std::env::var("APPCORE_STORE_CONNECTION_STRING")
                .unwrap_or(defaults.store_connection_string),
            max_concurrent_manual_triggers_per_application: env_u32(
                "APPCORE_MAX_CONCURRENT_MANUAL_TRIGGERS_PER_APPLICATION",
                defaults.max_concurrent_manual_triggers_per_application,
            ),
            max_job_runtime: env_secs("APPCORE_MAX_JOB_RUNTIME_SECONDS", defaults.max_job_runtime),
            backup_cleanup_interval: env_secs(
                "APPCORE_BACKUP_CLEANUP_INTERVAL_SECONDS",
                defaults.backup_cleanup_interval,
            ),
            function_event_max_retries: env_u32(
                "APPCORE_FUNCTION_EVENT_MAX_RETRIES",
                defaults.function_event_max_retries,
            ),
            function_invocation_timeout_default: env_secs(
                "APPCORE_FUNCTION_INVOCATION_TIMEOUT_DEFAULT_SECONDS",
                defaults.function_invocation_timeout_default,
            ),
            storage_provisioning_timeout: env_secs(
                "APPCORE_STORAGE_PROVISIONING_TIMEOUT_SECONDS",
                defaults.storage_provisioning_timeout,
            ),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.max_concurrent_manual_triggers_per_application, 1);
        assert_eq!(cfg.max_job_runtime, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.function_event_max_retries, 5);
        assert_eq!(
            cfg.function_invocation_timeout_default,
            Duration::from_secs(300)
        );
    }
}
