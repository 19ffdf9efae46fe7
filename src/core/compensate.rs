//! Explicit compensating-action pipeline (spec.md §4.1, §9), replacing
//! "composite create-X-then-Y service methods with ad-hoc rollback": each
//! stage declares its own undo, and a stage failure unwinds every
//! already-succeeded stage in reverse before the original error is
//! returned.

use async_trait::async_trait;

use crate::error::{Error, Result};

#[async_trait]
pub trait Stage: Send {
    type Output: Send;

    async fn run(&mut self) -> Result<Self::Output>;

    /// Best-effort undo of this stage's effect. Only called for stages that
    /// already succeeded when a later stage fails.
    async fn undo(&mut self) -> Result<()>;
}

/// Run two ordered stages. On failure of the second, the first is undone;
/// if the undo itself fails, the original error is replaced by
/// `Error::PartialRollbackFailed` so partial inconsistency is never
/// silently swallowed (spec.md §4.1).
pub async fn run_pair<A, B>(mut first: A, mut second: B) -> Result<(A::Output, B::Output)>
where
    A: Stage,
    B: Stage,
{
    let first_output = first.run().await?;

    match second.run().await {
        Ok(second_output) => Ok((first_output, second_output)),
        Err(original_err) => {
            if let Err(undo_err) = first.undo().await {
                return Err(Error::PartialRollbackFailed(format!(
                    "stage failed ({original_err}); rollback of prior stage also failed ({undo_err})"
                )));
            }
            Err(original_err)
        }
    }
}
