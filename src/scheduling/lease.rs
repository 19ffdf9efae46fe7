//! Cooperative cross-process lease (spec.md §4.5): before a Scheduling
//! Engine task does its work, it must hold the named lease. Leases expire
//! on crash, so a dead owner's task is picked up by the next live process
//! without manual intervention.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::store::ExecutionStore;

pub struct LeaseGuard {
    pub held: bool,
}

/// Attempt to acquire (or renew) the lease for `task_name`. `owner` should
/// be stable for the lifetime of the process (e.g. a hostname+pid tag).
pub async fn try_acquire<S: ExecutionStore>(
    store: &Arc<S>,
    task_name: &str,
    owner: &str,
    ttl: Duration,
) -> Result<LeaseGuard> {
    let held = store.acquire_lease(task_name, owner, ttl).await?;
    Ok(LeaseGuard { held })
}
