//! Warm-pool FPI backend: a pre-warmed pool of runtimes, fast cold start,
//! source-package model (no custom images).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::capabilities::{Capabilities, Limits};
use super::{BuildOutcome, FunctionProvider, InvokeRequest, InvokeResponse};
use crate::error::Result;
use crate::model::{ApplicationId, BuildStatus, FunctionVersionId, TriggerType, VersionSource};

pub struct WarmpoolFpi {
    pub endpoint: String,
}

impl WarmpoolFpi {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl FunctionProvider for WarmpoolFpi {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            versioning: true,
            async_invocation: false,
            logs: true,
            metrics: true,
            tracing: false,
            secrets: true,
            env_vars: true,
            custom_domains: false,
            private_registry: false,
            build_from_source: true,
            custom_images: false,
            auto_scaling: false,
            scale_to_zero: false,
            https: true,
            websockets: false,
            grpc: false,
            warm_pool: true,
            limits: Limits {
                max_memory_mb: 512,
                max_timeout_s: 60,
                max_payload_mb: 1,
                max_concurrency: 50,
            },
            supported_runtimes: vec!["python".into(), "node".into()],
            supported_trigger_types: vec![TriggerType::Http, TriggerType::Schedule],
            typical_cold_start_ms: 5,
        }
    }

    async fn build(
        &self,
        _application_id: ApplicationId,
        source: &VersionSource,
        _cancellation: &CancellationToken,
    ) -> Result<BuildOutcome> {
        match source {
            VersionSource::SourceCode { .. } => Ok(BuildOutcome {
                status: BuildStatus::Success,
                logs: "packaged into warm pool".to_string(),
            }),
            VersionSource::Image { .. } => Ok(BuildOutcome {
                status: BuildStatus::Failed,
                logs: "warm pool does not support custom images".to_string(),
            }),
        }
    }

    async fn shift_traffic(
        &self,
        _application_id: ApplicationId,
        _version_id: FunctionVersionId,
        _cancellation: &CancellationToken,
    ) -> Result<()> {
        Ok(())
    }

    async fn invoke(
        &self,
        _application_id: ApplicationId,
        _version_id: FunctionVersionId,
        request: InvokeRequest,
        _cancellation: &CancellationToken,
    ) -> Result<InvokeResponse> {
        Ok(InvokeResponse {
            status_code: 200,
            headers: Default::default(),
            body: request.body,
            cold_start: false,
        })
    }
}
