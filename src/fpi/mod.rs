//! Function Provider Interface (FPI): pluggable backend for function builds,
//! traffic shifting, and invocation (spec.md §2, §4.3). Backends are a tagged
//! variant (`FpiBackend`) rather than trait objects behind a registry of
//! adapters, per the teacher's design note on "interface-based polymorphism
//! with many adapters" needing a tagged-variant-plus-capabilities
//! re-architecture (spec.md §9).

pub mod capabilities;
pub mod mock;
pub mod serving;
pub mod warmpool;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::model::{ApplicationId, BuildStatus, FunctionVersionId, VersionSource};
use capabilities::Capabilities;

#[derive(Clone, Debug)]
pub struct BuildOutcome {
    pub status: BuildStatus,
    pub logs: String,
}

#[derive(Clone, Debug)]
pub struct InvokeRequest {
    pub trigger_source: String,
    pub method: String,
    pub path: String,
    pub body: String,
}

#[derive(Clone, Debug)]
pub struct InvokeResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub cold_start: bool,
}

#[async_trait]
pub trait FunctionProvider: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    async fn build(
        &self,
        application_id: ApplicationId,
        source: &VersionSource,
        cancellation: &CancellationToken,
    ) -> Result<BuildOutcome>;

    /// Shift 100% of traffic to `version_id`. Called by `setActiveVersion`
    /// after the store-side swap; a failure here rolls the swap back.
    async fn shift_traffic(
        &self,
        application_id: ApplicationId,
        version_id: FunctionVersionId,
        cancellation: &CancellationToken,
    ) -> Result<()>;

    async fn invoke(
        &self,
        application_id: ApplicationId,
        version_id: FunctionVersionId,
        request: InvokeRequest,
        cancellation: &CancellationToken,
    ) -> Result<InvokeResponse>;
}

/// Per-workspace provider selection, resolved once and cached until
/// invalidated (spec.md §4.3). Each variant owns its own capabilities and
/// dispatch; the mock variant is a test seam, never the production default.
pub enum FpiBackend {
    Mock(mock::MockFpi),
    Serving(serving::ServingFpi),
    Warmpool(warmpool::WarmpoolFpi),
}

#[async_trait]
impl FunctionProvider for FpiBackend {
    fn capabilities(&self) -> Capabilities {
        match self {
            FpiBackend::Mock(p) => p.capabilities(),
            FpiBackend::Serving(p) => p.capabilities(),
            FpiBackend::Warmpool(p) => p.capabilities(),
        }
    }

    async fn build(
        &self,
        application_id: ApplicationId,
        source: &VersionSource,
        cancellation: &CancellationToken,
    ) -> Result<BuildOutcome> {
        match self {
            FpiBackend::Mock(p) => p.build(application_id, source, cancellation).await,
            FpiBackend::Serving(p) => p.build(application_id, source, cancellation).await,
            FpiBackend::Warmpool(p) => p.build(application_id, source, cancellation).await,
        }
    }

    async fn shift_traffic(
        &self,
        application_id: ApplicationId,
        version_id: FunctionVersionId,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        match self {
            FpiBackend::Mock(p) => p.shift_traffic(application_id, version_id, cancellation).await,
            FpiBackend::Serving(p) => p.shift_traffic(application_id, version_id, cancellation).await,
            FpiBackend::Warmpool(p) => p.shift_traffic(application_id, version_id, cancellation).await,
        }
    }

    async fn invoke(
        &self,
        application_id: ApplicationId,
        version_id: FunctionVersionId,
        request: InvokeRequest,
        cancellation: &CancellationToken,
    ) -> Result<InvokeResponse> {
        match self {
            FpiBackend::Mock(p) => p.invoke(application_id, version_id, request, cancellation).await,
            FpiBackend::Serving(p) => p.invoke(application_id, version_id, request, cancellation).await,
            FpiBackend::Warmpool(p) => p.invoke(application_id, version_id, request, cancellation).await,
        }
    }
}
