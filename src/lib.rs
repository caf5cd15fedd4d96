//! Spacelift block - reconciles one Spacelift stack per block instance
//!
//! A block instance owns at most one remote stack. The host invokes a
//! synchronization pass repeatedly and a drain once on removal; each pass reads
//! persisted state, performs at most one class of remote action, persists the
//! result and returns a declarative [`SyncOutcome`] carrying the next status,
//! signal updates and an optional re-invocation delay.
//!
//! # Modules
//!
//! - [`block`] - Block definition: inputs, defaults and signals
//! - [`config`] - Spacelift credentials and stack provisioning template
//! - [`controller`] - Pass entry points (`reconcile`, `drain`) and context
//! - [`error`] - Error types
//! - [`fingerprint`] - Canonical serialization and content hash of desired config
//! - [`phases`] - Provisioning, apply, polling and teardown handlers
//! - [`retry`] - Exponential backoff for idempotent calls
//! - [`spacelift`] - Spacelift GraphQL API abstraction and client
//! - [`store`] - Per-instance key-value state

#![deny(missing_docs)]

pub mod block;
pub mod config;
pub mod controller;
pub mod error;
pub mod fingerprint;
pub mod phases;
pub mod retry;
pub mod spacelift;
pub mod store;

pub use controller::{drain, reconcile, BlockStatus, Context, ContextBuilder, Instance, SyncOutcome};
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Reconciliation Constants
// =============================================================================

/// Delay before the first poll after a run has been triggered
pub const APPLY_REQUEUE_DELAY: std::time::Duration = std::time::Duration::from_secs(30);

/// Delay between polls while the remote run has not reached a terminal state
pub const POLL_REQUEUE_DELAY: std::time::Duration = std::time::Duration::from_secs(15);

/// Stack workspace path the desired configuration is mounted at
pub const TFVARS_MOUNT_PATH: &str = "source/supermodule/terraform.tfvars.json";

/// Number of trailing instance id characters used in the stack display name
pub const STACK_NAME_ID_SUFFIX_LEN: usize = 8;
