//! Polling phase handler.
//!
//! Entered on every pass while `state_polling` is persisted. Issues exactly one
//! `GetStack` query and never pushes configuration or triggers runs.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::controller::{Context, SyncOutcome};
use crate::spacelift::{StackOutput, StackState};
use crate::store::{InstanceState, ReconcileState};
use crate::{Result, POLL_REQUEUE_DELAY};

/// Translation of one stack status query
#[derive(Clone, Debug, PartialEq)]
pub enum PollResult {
    /// Run applied; non-sensitive outputs collected
    Finished {
        /// Outputs keyed by output id, quotes stripped
        outputs: BTreeMap<String, Value>,
    },
    /// Run failed
    Failed,
    /// Any other state
    Pending {
        /// State as reported
        state: StackState,
    },
}

/// Strip one level of surrounding double quotes.
///
/// Spacelift returns JSON string outputs still encoded, e.g. `"\"hello\""`.
/// This is a best-effort unwrap, not a JSON decode: escapes inside the value
/// are left as they are.
pub fn unquote_output(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Collect publishable outputs.
///
/// Sensitive outputs and outputs without a value are skipped.
pub fn collect_outputs(outputs: &[StackOutput]) -> BTreeMap<String, Value> {
    let mut collected = BTreeMap::new();
    for output in outputs {
        if output.sensitive {
            debug!(output = %output.id, "skipping sensitive output");
            continue;
        }
        match output.value.as_deref() {
            Some(value) if !value.is_empty() => {
                collected.insert(
                    output.id.clone(),
                    Value::String(unquote_output(value).to_string()),
                );
            }
            _ => debug!(output = %output.id, "skipping output without value"),
        }
    }
    collected
}

/// Query the stack once and classify its state.
pub async fn poll_once(ctx: &Context, stack_id: &str) -> Result<PollResult> {
    let stack = ctx.api.get_stack(stack_id).await?;
    debug!(stack_id = %stack_id, state = %stack.state, "stack state");

    Ok(match stack.state {
        StackState::Finished => PollResult::Finished {
            outputs: collect_outputs(&stack.outputs),
        },
        StackState::Failed => PollResult::Failed,
        state => PollResult::Pending { state },
    })
}

/// Handle a pass while a run is outstanding.
pub async fn handle_polling(
    persisted: &ReconcileState,
    state: &InstanceState,
    ctx: &Context,
) -> Result<SyncOutcome> {
    let Some(stack_id) = persisted.stack_id.as_deref() else {
        // Polling without a stack cannot resolve; drop the mode so the next
        // pass re-evaluates the configuration from scratch.
        warn!("state polling persisted without a stack id, clearing mode");
        state.clear_polling().await?;
        return Ok(SyncOutcome::failed().with_description("No stack to poll"));
    };

    match poll_once(ctx, stack_id).await? {
        PollResult::Finished { outputs } => {
            info!(stack_id = %stack_id, outputs = outputs.len(), "stack run finished");
            state.clear_polling().await?;
            Ok(SyncOutcome::ready().with_signals(outputs))
        }
        PollResult::Failed => {
            error!(stack_id = %stack_id, "stack run failed");
            state.clear_polling().await?;
            Ok(SyncOutcome::failed().with_description("Stack run failed"))
        }
        PollResult::Pending { state: remote } => {
            info!(
                stack_id = %stack_id,
                state = %remote,
                delay_ms = POLL_REQUEUE_DELAY.as_millis() as u64,
                "stack still processing"
            );
            Ok(SyncOutcome::in_progress(POLL_REQUEUE_DELAY)
                .with_description(format!("Stack {}", remote)))
        }
    }
}
