//! Apply phase handler.
//!
//! Runs when the desired configuration's fingerprint differs from the one last
//! pushed. Order within the pass is fixed:
//! 1. Ensure the stack exists (persisting a newly created id right away)
//! 2. Push the tfvars file mount
//! 3. Trigger a run
//! 4. Persist the new fingerprint and `state_polling` together
//!
//! Nothing in step 4 is written unless steps 2 and 3 both succeed, so a failed
//! pass is retried from the same comparison next time. If the trigger reached
//! Spacelift but its response was lost, the retry starts a second run; there
//! is no idempotency key to prevent that.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{info, instrument};

use super::provision::ensure_stack;
use super::STACK_ID_SIGNAL;
use crate::controller::{Context, Instance, SyncOutcome};
use crate::fingerprint::Fingerprint;
use crate::spacelift::{ConfigElement, ConfigInput, ConfigType, Run};
use crate::store::{InstanceState, ReconcileState};
use crate::{Result, APPLY_REQUEUE_DELAY, TFVARS_MOUNT_PATH};

/// Mount the canonical tfvars document on the stack.
///
/// Re-pushing identical content is harmless.
pub async fn push_config(ctx: &Context, stack_id: &str, document: &str) -> Result<ConfigElement> {
    let config = ConfigInput {
        id: TFVARS_MOUNT_PATH.to_string(),
        value: STANDARD.encode(document.as_bytes()),
        write_only: false,
        type_: ConfigType::FileMount,
    };
    let element = ctx.api.add_stack_config(stack_id, &config).await?;
    info!(stack_id = %stack_id, path = TFVARS_MOUNT_PATH, "mounted tfvars file");
    Ok(element)
}

/// Start a run on the stack. Every call starts a new run.
pub async fn trigger_run(ctx: &Context, stack_id: &str) -> Result<Run> {
    let run = ctx.api.trigger_run(stack_id).await?;
    info!(stack_id = %stack_id, run_id = %run.id, run_state = %run.state, "triggered stack run");
    Ok(run)
}

/// Handle a pass whose desired configuration changed.
#[instrument(skip_all, fields(fingerprint = %fingerprint))]
pub async fn handle_apply(
    instance: &Instance,
    persisted: &ReconcileState,
    state: &InstanceState,
    ctx: &Context,
    document: &str,
    fingerprint: &Fingerprint,
) -> Result<SyncOutcome> {
    info!("configuration changed, applying");

    let stack = ensure_stack(instance, persisted.stack_id.as_deref(), ctx).await?;
    if stack.created {
        state.record_stack_id(&stack.id).await?;
    }

    push_config(ctx, &stack.id, document).await?;
    trigger_run(ctx, &stack.id).await?;

    state.enter_polling(fingerprint).await?;
    info!(stack_id = %stack.id, "entering state polling");

    Ok(SyncOutcome::in_progress(APPLY_REQUEUE_DELAY)
        .with_description("Deploying")
        .with_signal(STACK_ID_SIGNAL, stack.id))
}
