//! Phase handlers for the block reconciler.
//!
//! A pass lands in exactly one handler, chosen from persisted state:
//! - `state_polling` persisted: [`handle_polling`]
//! - fingerprint unchanged: [`handle_idle`]
//! - fingerprint changed: [`handle_apply`]
//!
//! [`handle_teardown`] runs once when the instance is removed.

mod apply;
mod idle;
mod polling;
mod provision;
mod teardown;

pub use apply::{handle_apply, push_config, trigger_run};
pub use idle::handle_idle;
pub use polling::{collect_outputs, handle_polling, poll_once, unquote_output, PollResult};
pub use provision::{ensure_stack, stack_display_name, EnsuredStack};
pub use teardown::handle_teardown;

/// Signal carrying the remote stack id
pub const STACK_ID_SIGNAL: &str = "stackId";
