//! Pass entry points for block instances.
//!
//! The host calls [`reconcile`] repeatedly for each live instance and [`drain`]
//! once when the instance is removed. Both always return a [`SyncOutcome`]:
//! errors raised inside a pass are logged and converted at this boundary, and
//! persisted state is left as it was before the failing step.

mod outcome;

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument};

use crate::block::BlockDefinition;
use crate::config::{SpaceliftConfig, StackTemplate};
use crate::fingerprint::{canonical_json, fingerprint_document};
use crate::phases::{handle_apply, handle_idle, handle_polling, handle_teardown};
use crate::spacelift::{SpaceliftApi, SpaceliftClient};
use crate::store::{BlockStore, InstanceState, MemoryStore, Mode};
use crate::{Error, Result};

pub use outcome::{BlockStatus, SyncOutcome};

/// A block instance as handed over by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    /// Opaque instance id; also scopes the persisted state
    pub id: String,
    /// Human display name
    pub name: String,
    /// Inputs as supplied by the user, before defaults
    pub inputs: Map<String, Value>,
}

impl Instance {
    /// Instance with no supplied inputs
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            inputs: Map::new(),
        }
    }

    /// Replace the supplied inputs
    pub fn with_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }
}

/// Shared context for passes.
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(config)
///     .store(Arc::new(JsonFileStore::new("/var/lib/block")))
///     .build()?;
/// ```
pub struct Context {
    /// Spacelift API (trait object for testability)
    pub api: Arc<dyn SpaceliftApi>,
    /// Per-instance key-value state
    pub store: Arc<dyn BlockStore>,
    /// Block inputs and signals
    pub block: BlockDefinition,
    /// Space new stacks are created in
    pub space_id: String,
    /// Provisioning parameters for new stacks
    pub template: StackTemplate,
}

impl Context {
    /// Start building a context for the given account
    pub fn builder(config: SpaceliftConfig) -> ContextBuilder {
        ContextBuilder::new(config)
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    config: SpaceliftConfig,
    api: Option<Arc<dyn SpaceliftApi>>,
    store: Option<Arc<dyn BlockStore>>,
    block: BlockDefinition,
    template: StackTemplate,
}

impl ContextBuilder {
    fn new(config: SpaceliftConfig) -> Self {
        Self {
            config,
            api: None,
            store: None,
            block: BlockDefinition::storage_bucket(),
            template: StackTemplate::default(),
        }
    }

    /// Override the Spacelift API implementation
    pub fn api(mut self, api: Arc<dyn SpaceliftApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Override the state store (defaults to [`MemoryStore`])
    pub fn store(mut self, store: Arc<dyn BlockStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the block definition
    pub fn block(mut self, block: BlockDefinition) -> Self {
        self.block = block;
        self
    }

    /// Override the stack provisioning template
    pub fn template(mut self, template: StackTemplate) -> Self {
        self.template = template;
        self
    }

    /// Validate the config and build the context
    pub fn build(self) -> Result<Context> {
        self.config.validate()?;

        let api: Arc<dyn SpaceliftApi> = match self.api {
            Some(api) => api,
            None => Arc::new(SpaceliftClient::new(&self.config)?),
        };
        let store: Arc<dyn BlockStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };

        Ok(Context {
            api,
            store,
            block: self.block,
            space_id: self.config.space_id,
            template: self.template,
        })
    }
}

/// Run one synchronization pass.
#[instrument(skip(ctx), fields(instance = %instance.id))]
pub async fn reconcile(instance: &Instance, ctx: &Context) -> SyncOutcome {
    match sync_pass(instance, ctx).await {
        Ok(outcome) => {
            info!(
                status = %outcome.status,
                sync_after_ms = ?outcome.sync_after_ms(),
                "pass complete"
            );
            outcome
        }
        Err(e) => error_policy(instance, &e),
    }
}

async fn sync_pass(instance: &Instance, ctx: &Context) -> Result<SyncOutcome> {
    let state = InstanceState::new(ctx.store.clone(), &instance.id);
    let persisted = state.load().await?;

    // A run is outstanding: only its result matters until it terminates
    if persisted.mode == Mode::StatePolling {
        return handle_polling(&persisted, &state, ctx).await;
    }

    let desired = ctx.block.resolve(&instance.id, &instance.inputs)?;
    let document = canonical_json(&desired)?;
    let fingerprint = fingerprint_document(&document);

    if persisted.tfvars_hash.as_ref() == Some(&fingerprint) {
        debug!(fingerprint = %fingerprint, "fingerprint unchanged");
        handle_idle(instance, &persisted, &state, ctx).await
    } else {
        handle_apply(instance, &persisted, &state, ctx, &document, &fingerprint).await
    }
}

/// Run teardown for a removed instance.
#[instrument(skip(ctx), fields(instance = %instance.id))]
pub async fn drain(instance: &Instance, ctx: &Context) -> SyncOutcome {
    match handle_teardown(instance, ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(
                error = %e,
                operation = e.operation().unwrap_or("teardown"),
                "teardown failed"
            );
            SyncOutcome::draining_failed()
        }
    }
}

/// Convert a pass error into the outcome reported to the host.
///
/// No requeue is requested; the host's next regular pass retries from the
/// unchanged persisted state.
pub fn error_policy(instance: &Instance, error: &Error) -> SyncOutcome {
    error!(
        ?error,
        instance = %instance.id,
        retryable = error.is_retryable(),
        "synchronization pass failed"
    );
    SyncOutcome::failed()
}
