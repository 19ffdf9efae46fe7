//! Function Manager (spec.md §4.3): version create/build/activate, trigger
//! CRUD, sync + async invocation, version rollback, provider routing.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::fpi::{FpiBackend, FunctionProvider, InvokeRequest};
use crate::metrics::prometheus::MetricsState;
use crate::model::*;
use crate::store::ExecutionStore;

/// Per-workspace provider selection, resolved at manager initialization and
/// cached until invalidated by a configuration change (spec.md §4.3).
pub struct FunctionManager<S: ExecutionStore> {
    store: Arc<S>,
    providers: RwLock<HashMap<WorkspaceId, Arc<FpiBackend>>>,
    default_provider: Arc<FpiBackend>,
    metrics: Option<Arc<MetricsState>>,
}

impl<S: ExecutionStore> FunctionManager<S> {
    pub fn new(store: Arc<S>, default_provider: Arc<FpiBackend>) -> Self {
        Self {
            store,
            providers: RwLock::new(HashMap::new()),
            default_provider,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsState>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Invalidate (or set) the cached provider for a workspace.
    pub async fn set_provider(&self, workspace_id: WorkspaceId, provider: Arc<FpiBackend>) {
        self.providers.write().await.insert(workspace_id, provider);
    }

    async fn provider_for(&self, workspace_id: WorkspaceId) -> Arc<FpiBackend> {
        self.providers
            .read()
            .await
            .get(&workspace_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_provider))
    }

    /// Capability check performed at Application create time (spec.md
    /// §4.1, §4.3): the workspace provider must advertise the requested
    /// runtime and trigger type.
    pub async fn check_capabilities(
        &self,
        workspace_id: WorkspaceId,
        runtime: &str,
        trigger_type: Option<TriggerType>,
    ) -> Result<()> {
        let capabilities = self.provider_for(workspace_id).await.capabilities();
        if !capabilities.supports_runtime(runtime) {
            return Err(Error::NotSupported(format!("runtime '{runtime}' is not supported")));
        }
        if let Some(trigger_type) = trigger_type {
            if !capabilities.supports_trigger(trigger_type) {
                return Err(Error::NotSupported(format!(
                    "trigger type {trigger_type:?} is not supported"
                )));
            }
        }
        Ok(())
    }

    async fn require_application(&self, application_id: ApplicationId) -> Result<Application> {
        self.store
            .get_application(application_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("application {application_id}")))
    }

    /// Creates a new version with `version_number = max + 1`, hands the
    /// source to FPI, and records the build outcome. Never auto-activates
    /// (spec.md §4.3).
    pub async fn deploy_version(
        &self,
        application_id: ApplicationId,
        source: VersionSource,
        cancellation: &CancellationToken,
    ) -> Result<FunctionVersion> {
        let app = self.require_application(application_id).await?;
        let provider = self.provider_for(app.workspace_id).await;

        let existing = self.store.list_function_versions(application_id).await?;
        let version_number = existing.iter().map(|v| v.version_number).max().unwrap_or(0) + 1;

        let version = FunctionVersion {
            id: FunctionVersionId::new(),
            application_id,
            version_number,
            source: source.clone(),
            build_status: BuildStatus::Pending,
            build_logs: String::new(),
            is_active: false,
            created_at: now(),
        };
        let mut version = self.store.create_function_version(version).await?;

        let outcome = provider.build(application_id, &source, cancellation).await?;
        version.build_status = outcome.status;
        version.build_logs = outcome.logs;
        self.store.update_function_version(version).await
    }

    /// Inside a single store transaction, clears `is_active` on the current
    /// version and sets it on `new_version`, then shifts FPI traffic. If the
    /// traffic shift fails, the previous active version is restored
    /// (spec.md §4.3).
    pub async fn set_active_version(
        &self,
        application_id: ApplicationId,
        new_version_id: FunctionVersionId,
        cancellation: &CancellationToken,
    ) -> Result<FunctionVersion> {
        let new_version = self
            .store
            .get_function_version(new_version_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("function version {new_version_id}")))?;
        if new_version.build_status != BuildStatus::Success {
            return Err(Error::PreconditionFailed(format!(
                "version {new_version_id} has not built successfully"
            )));
        }

        let app = self.require_application(application_id).await?;
        let provider = self.provider_for(app.workspace_id).await;

        let previous = self
            .store
            .swap_active_function_version(application_id, new_version_id)
            .await?;

        if let Err(err) = provider
            .shift_traffic(application_id, new_version_id, cancellation)
            .await
        {
            if let Some(previous_id) = previous {
                if self
                    .store
                    .swap_active_function_version(application_id, previous_id)
                    .await
                    .is_err()
                {
                    return Err(Error::PartialRollbackFailed(format!(
                        "failed to restore previous active version {previous_id} for application {application_id}"
                    )));
                }
            }
            return Err(err);
        }

        self.store
            .get_function_version(new_version_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("function version {new_version_id}")))
    }

    /// Activates the immediately previous successful version, or errors
    /// `no_predecessor` (spec.md §4.3).
    pub async fn rollback_version(
        &self,
        application_id: ApplicationId,
        cancellation: &CancellationToken,
    ) -> Result<FunctionVersion> {
        let current = self.store.get_active_function_version(application_id).await?;
        let mut versions = self.store.list_function_versions(application_id).await?;
        versions.retain(|v| v.build_status == BuildStatus::Success);
        versions.sort_by_key(|v| v.version_number);

        let current_number = current.as_ref().map(|v| v.version_number).unwrap_or(i64::MAX);
        let predecessor = versions
            .into_iter()
            .filter(|v| v.version_number < current_number)
            .next_back()
            .ok_or_else(|| Error::PreconditionFailed("no_predecessor".to_string()))?;

        self.set_active_version(application_id, predecessor.id, cancellation).await
    }

    /// Rejected unless the workspace provider's Capabilities lists the
    /// trigger type; names are unique per application (spec.md §4.3).
    pub async fn create_trigger(
        &self,
        application_id: ApplicationId,
        trigger: Trigger,
    ) -> Result<Trigger> {
        let app = self.require_application(application_id).await?;
        let provider = self.provider_for(app.workspace_id).await;
        if !provider.capabilities().supports_trigger(trigger.trigger_type) {
            return Err(Error::NotSupported(format!(
                "provider does not support trigger type {:?}",
                trigger.trigger_type
            )));
        }
        self.store.create_trigger(application_id, trigger).await
    }

    pub async fn list_triggers(&self, application_id: ApplicationId) -> Result<Vec<Trigger>> {
        self.store.list_triggers(application_id).await
    }

    pub async fn delete_trigger(&self, application_id: ApplicationId, name: &str) -> Result<()> {
        self.store.delete_trigger(application_id, name).await
    }

    /// Synchronous invocation path. On FPI timeout, returns the invocation
    /// id with `status = timeout` rather than propagating (spec.md §4.3).
    pub async fn invoke_function(
        &self,
        application_id: ApplicationId,
        request: InvokeRequest,
        cancellation: &CancellationToken,
    ) -> Result<FunctionInvocation> {
        let app = self.require_application(application_id).await?;
        let provider = self.provider_for(app.workspace_id).await;
        let version = self
            .store
            .get_active_function_version(application_id)
            .await?
            .ok_or_else(|| Error::PreconditionFailed(format!(
                "application {application_id} has no active version"
            )))?;

        let started_at = now();
        let invocation = FunctionInvocation {
            id: FunctionInvocationId::new(),
            application_id,
            version_id: version.id,
            trigger_source: request.trigger_source.clone(),
            request_method: request.method.clone(),
            request_path: request.path.clone(),
            started_at,
            completed_at: None,
            status: InvocationStatus::Running,
            response_status: None,
            response_headers: HashMap::new(),
            response_body: String::new(),
            cold_start: false,
            duration_ms: 0,
        };
        let mut invocation = self.store.create_invocation(invocation).await?;

        match provider.invoke(application_id, version.id, request, cancellation).await {
            Ok(response) => {
                invocation.complete(
                    InvocationStatus::Completed,
                    response.status_code,
                    response.headers,
                    response.body,
                    response.cold_start,
                    now(),
                );
            }
            Err(Error::Timeout(_)) | Err(Error::DeadlineExceeded) => {
                invocation.complete(InvocationStatus::Timeout, 0, HashMap::new(), String::new(), false, now());
            }
            Err(err) => {
                invocation.complete(InvocationStatus::Failed, 0, HashMap::new(), err.to_string(), false, now());
            }
        }

        self.record_invocation(&invocation);
        self.store.update_invocation(invocation).await
    }

    fn record_invocation(&self, invocation: &FunctionInvocation) {
        if let Some(metrics) = &self.metrics {
            metrics.record_function_invocation(
                &invocation.application_id.to_string(),
                invocation_status_label(invocation.status),
                invocation.duration_ms as f64 / 1000.0,
            );
        }
    }

    /// Returns an invocation id immediately; actual execution proceeds in
    /// the background and is observed through `getInvocationStatus`
    /// (spec.md §4.3).
    pub fn invoke_function_async(
        self: &Arc<Self>,
        application_id: ApplicationId,
        request: InvokeRequest,
    ) -> FunctionInvocationId
    where
        S: 'static,
    {
        let invocation_id = FunctionInvocationId::new();
        let manager = Arc::clone(self);
        let request = request.clone();
        tokio::spawn(async move {
            let cancellation = CancellationToken::new();
            if let Err(err) = manager
                .run_async_invocation(invocation_id, application_id, request, &cancellation)
                .await
            {
                tracing::warn!(%invocation_id, error = %err, "async invocation failed to start");
            }
        });
        invocation_id
    }

    async fn run_async_invocation(
        &self,
        invocation_id: FunctionInvocationId,
        application_id: ApplicationId,
        request: InvokeRequest,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let app = self.require_application(application_id).await?;
        let provider = self.provider_for(app.workspace_id).await;
        let version = self
            .store
            .get_active_function_version(application_id)
            .await?
            .ok_or_else(|| Error::PreconditionFailed(format!(
                "application {application_id} has no active version"
            )))?;

        let started_at = now();
        let invocation = FunctionInvocation {
            id: invocation_id,
            application_id,
            version_id: version.id,
            trigger_source: request.trigger_source.clone(),
            request_method: request.method.clone(),
            request_path: request.path.clone(),
            started_at,
            completed_at: None,
            status: InvocationStatus::Running,
            response_status: None,
            response_headers: HashMap::new(),
            response_body: String::new(),
            cold_start: false,
            duration_ms: 0,
        };
        let mut invocation = self.store.create_invocation(invocation).await?;

        match provider.invoke(application_id, version.id, request, cancellation).await {
            Ok(response) => {
                invocation.complete(
                    InvocationStatus::Completed,
                    response.status_code,
                    response.headers,
                    response.body,
                    response.cold_start,
                    now(),
                );
            }
            Err(err) => {
                invocation.complete(InvocationStatus::Failed, 0, HashMap::new(), err.to_string(), false, now());
            }
        }
        self.record_invocation(&invocation);
        self.store.update_invocation(invocation).await?;
        Ok(())
    }

    pub async fn get_invocation_status(
        &self,
        invocation_id: FunctionInvocationId,
    ) -> Result<FunctionInvocation> {
        self.store
            .get_invocation(invocation_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("invocation {invocation_id}")))
    }

    pub async fn list_invocations(
        &self,
        application_id: ApplicationId,
        limit: u32,
    ) -> Result<Vec<FunctionInvocation>> {
        self.store.list_invocations(application_id, limit).await
    }

    pub async fn list_versions(&self, application_id: ApplicationId) -> Result<Vec<FunctionVersion>> {
        self.store.list_function_versions(application_id).await
    }

    /// Executes a pending/retryable FunctionEvent; on failure increments
    /// `retry_count` and transitions to `retry`, moving to `dead_letter`
    /// once `retry_count >= max_retries` (spec.md §4.3, §7).
    pub async fn process_event(
        &self,
        event_id: FunctionEventId,
        max_retries: u32,
        cancellation: &CancellationToken,
    ) -> Result<FunctionEvent> {
        let mut event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("function event {event_id}")))?;

        let app = self.require_application(event.application_id).await?;
        let provider = self.provider_for(app.workspace_id).await;
        let version = self.store.get_active_function_version(event.application_id).await?;

        let outcome = match version {
            Some(version) => {
                let request = InvokeRequest {
                    trigger_source: event.event_source.clone(),
                    method: "EVENT".to_string(),
                    path: event.event_type.clone(),
                    body: event.event_data.to_string(),
                };
                provider
                    .invoke(event.application_id, version.id, request, cancellation)
                    .await
                    .map(|_| ())
            }
            None => Err(Error::PreconditionFailed(format!(
                "application {} has no active version",
                event.application_id
            ))),
        };

        match outcome {
            Ok(()) => {
                event.processing_status = EventProcessingStatus::Success;
                event.last_error = None;
            }
            Err(err) => {
                event.retry_count += 1;
                event.last_error = Some(err.to_string());
                if event.retry_count as u32 >= max_retries {
                    event.processing_status = EventProcessingStatus::DeadLetter;
                    event.next_attempt_at = None;
                } else {
                    event.processing_status = EventProcessingStatus::Retry;
                    event.next_attempt_at = Some(now() + chrono::Duration::seconds(30 * event.retry_count as i64));
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_function_event(
                &event.application_id.to_string(),
                event_status_label(event.processing_status),
            );
        }

        self.store.update_event(event).await
    }
}

fn invocation_status_label(status: InvocationStatus) -> &'static str {
    match status {
        InvocationStatus::Running => "running",
        InvocationStatus::Completed => "completed",
        InvocationStatus::Failed => "failed",
        InvocationStatus::Timeout => "timeout",
    }
}

fn event_status_label(status: EventProcessingStatus) -> &'static str {
    match status {
        EventProcessingStatus::Pending => "pending",
        EventProcessingStatus::Retry => "retry",
        EventProcessingStatus::Success => "success",
        EventProcessingStatus::Failed => "failed",
        EventProcessingStatus::DeadLetter => "dead_letter",
    }
}
