//! Teardown handler.
//!
//! Invoked once when the instance is removed. Deletes the stack together with
//! the resources it manages. Deletion is attempted exactly once; a failure is
//! reported to the host instead of retried.

use tracing::{info, instrument};

use crate::controller::{Context, Instance, SyncOutcome};
use crate::store::InstanceState;
use crate::Result;

/// Delete the instance's stack, if one was ever created.
#[instrument(skip_all, fields(instance = %instance.id))]
pub async fn handle_teardown(instance: &Instance, ctx: &Context) -> Result<SyncOutcome> {
    let state = InstanceState::new(ctx.store.clone(), &instance.id);
    let persisted = state.load().await?;

    let Some(stack_id) = persisted.stack_id else {
        info!("no stack recorded, nothing to delete");
        return Ok(SyncOutcome::drained());
    };

    let deleted = ctx.api.delete_stack(&stack_id, true).await?;
    info!(stack_id = %deleted.id, "deleted stack and its resources");

    Ok(SyncOutcome::drained())
}
