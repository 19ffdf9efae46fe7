use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a newtype wrapper around `Uuid` so ids from different entities
/// cannot be mixed up at the call site.
macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(WorkspaceId);
entity_id!(ProjectId);
entity_id!(ApplicationId);
entity_id!(CronJobExecutionId);
entity_id!(FunctionVersionId);
entity_id!(FunctionInvocationId);
entity_id!(FunctionEventId);
entity_id!(BackupStorageId);
entity_id!(BackupPolicyId);
entity_id!(BackupExecutionId);
entity_id!(BackupRestoreId);

/// Workspace billing plan. Only `Dedicated` workspaces may own a
/// `BackupStorage` (spec.md §3, BackupStorage invariant).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Shared,
    Dedicated,
}

/// Identity of the caller making a request, propagated through every
/// Execution Core operation for audit purposes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub subject: String,
    pub display_name: Option<String>,
}

pub type Timestamp = DateTime<Utc>;

pub fn now() -> Timestamp {
    Utc::now()
}
