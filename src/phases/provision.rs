//! Stack provisioning.
//!
//! Creates the remote stack the first time an instance needs one. Persisting
//! the returned id is left to the calling phase so every state write of a pass
//! happens in one place.

use tracing::{debug, info};

use crate::controller::{Context, Instance};
use crate::spacelift::StackInput;
use crate::{Result, STACK_NAME_ID_SUFFIX_LEN};

/// Stack id plus whether this pass created it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnsuredStack {
    /// Remote stack id
    pub id: String,
    /// True if the stack was created during this call
    pub created: bool,
}

/// Display name for an instance's stack: `[<id suffix>] <instance name>`.
pub fn stack_display_name(instance: &Instance) -> String {
    let chars: Vec<char> = instance.id.chars().collect();
    let start = chars.len().saturating_sub(STACK_NAME_ID_SUFFIX_LEN);
    let suffix: String = chars[start..].iter().collect();
    format!("[{}] {}", suffix, instance.name)
}

/// Return the recorded stack id, or create the stack.
///
/// No remote call is made when `recorded` is set.
pub async fn ensure_stack(
    instance: &Instance,
    recorded: Option<&str>,
    ctx: &Context,
) -> Result<EnsuredStack> {
    if let Some(id) = recorded {
        debug!(stack_id = %id, "using existing stack");
        return Ok(EnsuredStack {
            id: id.to_string(),
            created: false,
        });
    }

    let input =
        StackInput::from_template(stack_display_name(instance), &ctx.space_id, &ctx.template);
    info!(name = %input.name, space = %input.space, "creating stack");

    let created = ctx
        .api
        .create_stack(&input, ctx.template.manage_state)
        .await?;

    info!(stack_id = %created.id, "created stack");
    Ok(EnsuredStack {
        id: created.id,
        created: true,
    })
}
