//! Deterministic mock FPI backend: a first-class test seam (spec.md §9),
//! not a production fallback. Builds always succeed, invocations echo the
//! request, and both latency and failure are injectable for exercising
//! timeout and `unavailable` paths in manager tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::capabilities::{Capabilities, Limits};
use super::{BuildOutcome, FunctionProvider, InvokeRequest, InvokeResponse};
use crate::error::{Error, Result};
use crate::model::{ApplicationId, BuildStatus, FunctionVersionId, TriggerType, VersionSource};

pub struct MockFpi {
    injected_latency: Duration,
    fail_next: AtomicBool,
}

impl Default for MockFpi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFpi {
    pub fn new() -> Self {
        Self {
            injected_latency: Duration::ZERO,
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            injected_latency: latency,
            ..Self::new()
        }
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    async fn maybe_fail_and_wait(&self) -> Result<()> {
        if !self.injected_latency.is_zero() {
            tokio::time::sleep(self.injected_latency).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Unavailable("mock FPI: injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FunctionProvider for MockFpi {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            versioning: true,
            async_invocation: true,
            logs: true,
            metrics: true,
            tracing: true,
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
            warm_pool: false,
            limits: Limits {
                max_memory_mb: 1024,
                max_timeout_s: 900,
                max_payload_mb: 6,
                max_concurrency: 10,
            },
            supported_runtimes: vec!["python".into(), "node".into(), "go".into()],
            supported_trigger_types: vec![
                TriggerType::Http,
                TriggerType::Schedule,
                TriggerType::Event,
                TriggerType::MessageQueue,
            ],
            typical_cold_start_ms: 50,
        }
    }

    async fn build(
        &self,
        _application_id: ApplicationId,
        _source: &VersionSource,
        _cancellation: &CancellationToken,
    ) -> Result<BuildOutcome> {
        self.maybe_fail_and_wait().await?;
        Ok(BuildOutcome {
            status: BuildStatus::Success,
            logs: "mock build succeeded".to_string(),
        })
    }

    async fn shift_traffic(
        &self,
        _application_id: ApplicationId,
        _version_id: FunctionVersionId,
        _cancellation: &CancellationToken,
    ) -> Result<()> {
        self.maybe_fail_and_wait().await
    }

    async fn invoke(
        &self,
        _application_id: ApplicationId,
        _version_id: FunctionVersionId,
        request: InvokeRequest,
        _cancellation: &CancellationToken,
    ) -> Result<InvokeResponse> {
        self.maybe_fail_and_wait().await?;
        Ok(InvokeResponse {
            status_code: 200,
            headers: Default::default(),
            body: format!("echo: {}", request.body),
            cold_start: false,
        })
    }
}
