//! Idle phase handler.
//!
//! The desired configuration matches what was last pushed and no run is
//! outstanding. Normally this makes no remote calls. The one exception is an
//! instance whose stack id is missing: the stack is provisioned and its id is
//! published right away, independent of configuration state.

use tracing::{debug, info};

use super::provision::ensure_stack;
use super::STACK_ID_SIGNAL;
use crate::controller::{Context, Instance, SyncOutcome};
use crate::store::{InstanceState, ReconcileState};
use crate::Result;

/// Handle a pass with nothing to apply.
pub async fn handle_idle(
    instance: &Instance,
    persisted: &ReconcileState,
    state: &InstanceState,
    ctx: &Context,
) -> Result<SyncOutcome> {
    if persisted.stack_id.is_some() {
        debug!("configuration unchanged, staying idle");
        return Ok(SyncOutcome::ready());
    }

    let stack = ensure_stack(instance, None, ctx).await?;
    state.record_stack_id(&stack.id).await?;
    info!(stack_id = %stack.id, "provisioned missing stack for unchanged configuration");

    Ok(SyncOutcome::ready().with_signal(STACK_ID_SIGNAL, stack.id))
}
