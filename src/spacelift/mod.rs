//! Spacelift GraphQL API abstraction
//!
//! The reconciler only talks to Spacelift through [`SpaceliftApi`], which
//! covers the five operations a block needs. [`SpaceliftClient`] is the
//! production implementation over HTTPS; tests substitute a mock.

mod client;
pub mod queries;

pub use client::SpaceliftClient;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::config::StackTemplate;
use crate::Error;

/// Trait abstracting the Spacelift stack operations
///
/// This trait allows mocking the remote API in tests while using the real
/// GraphQL client in production. Implementations issue exactly one remote
/// call per method and never retry mutations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpaceliftApi: Send + Sync {
    /// Create a stack (`stackCreate`)
    async fn create_stack(
        &self,
        input: &StackInput,
        manage_state: bool,
    ) -> Result<CreatedStack, Error>;

    /// Add or replace a config element on a stack (`stackConfigAdd`)
    async fn add_stack_config(
        &self,
        stack_id: &str,
        config: &ConfigInput,
    ) -> Result<ConfigElement, Error>;

    /// Trigger a tracked run on a stack (`runTrigger`)
    ///
    /// Not idempotent: every call starts a new run.
    async fn trigger_run(&self, stack_id: &str) -> Result<Run, Error>;

    /// Read a stack's state and outputs (`stack`)
    ///
    /// A stack the API does not know is reported as an error.
    async fn get_stack(&self, stack_id: &str) -> Result<Stack, Error>;

    /// Delete a stack (`stackDelete`)
    ///
    /// With `destroy_resources` Spacelift runs a destroy before removing it.
    async fn delete_stack(
        &self,
        stack_id: &str,
        destroy_resources: bool,
    ) -> Result<DeletedStack, Error>;
}

/// `StackInput` for `stackCreate`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackInput {
    /// Display name
    pub name: String,
    /// Source repository
    pub repository: String,
    /// Tracked branch
    pub branch: String,
    /// Project root inside the repository
    pub project_root: String,
    /// Space the stack lives in
    pub space: String,
    /// IaC tool
    pub workflow_tool: String,
    /// Administrative flag
    pub administrative: bool,
    /// Autodeploy flag
    pub autodeploy: bool,
}

impl StackInput {
    /// Build the input for a named stack from the provisioning template
    pub fn from_template(
        name: impl Into<String>,
        space: impl Into<String>,
        template: &StackTemplate,
    ) -> Self {
        Self {
            name: name.into(),
            repository: template.repository.clone(),
            branch: template.branch.clone(),
            project_root: template.project_root.clone(),
            space: space.into(),
            workflow_tool: template.workflow_tool.clone(),
            administrative: template.administrative,
            autodeploy: template.autodeploy,
        }
    }
}

/// Kind of stack config element
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigType {
    /// File mounted into the run workspace
    FileMount,
    /// Environment variable
    EnvironmentVariable,
}

/// `ConfigInput` for `stackConfigAdd`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInput {
    /// Element id; for file mounts, the path inside the workspace
    pub id: String,
    /// Base64 payload for file mounts, plain value otherwise
    pub value: String,
    /// Hide the value from API reads
    pub write_only: bool,
    /// Element kind
    #[serde(rename = "type")]
    pub type_: ConfigType,
}

/// Result of `stackCreate`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CreatedStack {
    /// Stack id
    pub id: String,
    /// Display name
    pub name: String,
}

/// Result of `stackConfigAdd`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigElement {
    /// Element id
    pub id: String,
    /// Value (absent for write-only elements)
    #[serde(default)]
    pub value: Option<String>,
    /// Write-only flag
    pub write_only: bool,
    /// Element kind
    #[serde(rename = "type")]
    pub type_: ConfigType,
}

/// Result of `runTrigger`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Run {
    /// Run id
    pub id: String,
    /// Run state at creation (usually `QUEUED`)
    pub state: String,
}

/// Result of `stackDelete`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DeletedStack {
    /// Stack id
    pub id: String,
}

/// A stack as returned by the `stack` query
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Stack {
    /// Stack id
    pub id: String,
    /// Current stack state
    pub state: StackState,
    /// Module outputs from the last applied run
    #[serde(default, deserialize_with = "null_as_empty")]
    pub outputs: Vec<StackOutput>,
}

/// One stack output
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct StackOutput {
    /// Output name
    pub id: String,
    /// Raw output value; JSON strings arrive still quoted
    #[serde(default)]
    pub value: Option<String>,
    /// Whether the output is marked sensitive
    #[serde(default)]
    pub sensitive: bool,
}

/// Stack state.
///
/// Only `FINISHED` and `FAILED` are terminal for the reconciler; every other
/// state is kept verbatim and treated as still in progress.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum StackState {
    /// Last run applied successfully
    Finished,
    /// Last run failed
    Failed,
    /// Any non-terminal state (`NONE`, `PREPARING`, `PLANNING`, `APPLYING`, ...)
    Other(String),
}

impl From<String> for StackState {
    fn from(state: String) -> Self {
        match state.as_str() {
            "FINISHED" => StackState::Finished,
            "FAILED" => StackState::Failed,
            _ => StackState::Other(state),
        }
    }
}

impl From<&str> for StackState {
    fn from(state: &str) -> Self {
        StackState::from(state.to_string())
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackState::Finished => f.write_str("FINISHED"),
            StackState::Failed => f.write_str("FAILED"),
            StackState::Other(state) => f.write_str(state),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<StackOutput>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<StackOutput>>::deserialize(deserializer)?.unwrap_or_default())
}
