//! A single periodic Scheduling Engine task: a named interval-driven loop
//! with its own lease, started with `tokio::spawn` and an `AbortHandle`
//! kept for graceful shutdown. Grounded in `trailbase-core`'s
//! `scheduler::Job`, generalized from one watch-stream-driven reconcile
//! loop (the teacher's `Controller::run`) to N independent periodic jobs
//! (spec.md §4.5).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::error::Result;
use crate::metrics::prometheus::MetricsState;
use crate::scheduling::lease;
use crate::store::ExecutionStore;

type TaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A periodic unit of work. At most one instance runs concurrently across
/// the process (the `tokio::time::interval` loop is strictly sequential);
/// across processes, the named lease enforces single ownership.
pub struct Job {
    pub name: &'static str,
    pub period: Duration,
    pub lease_ttl: Duration,
}

impl Job {
    pub fn new(name: &'static str, period: Duration, lease_ttl: Duration) -> Self {
        Self { name, period, lease_ttl }
    }

    /// Spawn the job loop. `owner` identifies this process for the
    /// cooperative lease; `work` is invoked once per tick this process
    /// holds the lease for.
    pub fn spawn<S, F>(
        self,
        store: Arc<S>,
        metrics: Arc<MetricsState>,
        owner: String,
        work: F,
    ) -> AbortHandle
    where
        S: ExecutionStore,
        F: Fn() -> TaskFuture + Send + Sync + 'static,
    {
        let Job { name, period, lease_ttl } = self;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match lease::try_acquire(&store, name, &owner, lease_ttl).await {
                    Ok(guard) if guard.held => {
                        let start = std::time::Instant::now();
                        match work().await {
                            Ok(()) => {
                                metrics.record_scheduling_task(name, "success", start.elapsed().as_secs_f64());
                            }
                            Err(err) => {
                                warn!(task = name, error = %err, "scheduling task failed");
                                metrics.record_scheduling_task(name, "failure", start.elapsed().as_secs_f64());
                            }
                        }
                    }
                    Ok(_) => {
                        info!(task = name, "lease held by another process, skipping tick");
                    }
                    Err(err) => {
                        warn!(task = name, error = %err, "failed to acquire scheduling lease");
                    }
                }
            }
        });
        handle.abort_handle()
    }
}
