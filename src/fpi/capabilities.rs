//! Capabilities descriptor (spec.md §6): the value every FPI backend
//! returns, and the only thing the Function Manager consults before routing
//! a call — "value-checked dispatch" replacing the teacher's
//! runtime-assertion-per-adapter pattern (spec.md §9).

use serde::{Deserialize, Serialize};

use crate::model::TriggerType;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Limits {
    pub max_memory_mb: i32,
    pub max_timeout_s: i32,
    pub max_payload_mb: i32,
    pub max_concurrency: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Capabilities {
    pub versioning: bool,
    pub async_invocation: bool,
    pub logs: bool,
    pub metrics: bool,
    pub tracing: bool,
    pub secrets: bool,
    pub env_vars: bool,
    pub custom_domains: bool,
    pub private_registry: bool,
    pub build_from_source: bool,
    pub custom_images: bool,
    pub auto_scaling: bool,
    pub scale_to_zero: bool,
    pub https: bool,
    pub websockets: bool,
    pub grpc: bool,
    pub warm_pool: bool,
    pub limits: Limits,
    pub supported_runtimes: Vec<String>,
    pub supported_trigger_types: Vec<TriggerType>,
    pub typical_cold_start_ms: u32,
}

impl Capabilities {
    pub fn supports_runtime(&self, runtime: &str) -> bool {
        self.supported_runtimes.iter().any(|r| r == runtime)
    }

    pub fn supports_trigger(&self, trigger_type: TriggerType) -> bool {
        self.supported_trigger_types.contains(&trigger_type)
    }
}
