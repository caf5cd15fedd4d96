//! Declarative pass results handed back to the host.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// Lifecycle status reported for an instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    /// Converged; nothing outstanding
    Ready,
    /// A remote run is outstanding
    InProgress,
    /// The pass or the remote run failed
    Failed,
    /// Teardown finished
    Drained,
    /// Teardown could not delete the stack
    DrainingFailed,
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockStatus::Ready => "ready",
            BlockStatus::InProgress => "in_progress",
            BlockStatus::Failed => "failed",
            BlockStatus::Drained => "drained",
            BlockStatus::DrainingFailed => "draining_failed",
        };
        f.write_str(s)
    }
}

/// Result of one sync or drain pass.
///
/// The host applies the status and signal updates and, when `sync_after` is
/// set, schedules the next pass roughly that far in the future.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    /// New lifecycle status
    #[serde(rename = "newStatus")]
    pub status: BlockStatus,
    /// Short human-readable status text
    #[serde(rename = "customStatusDescription", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Signals to publish
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub signal_updates: BTreeMap<String, Value>,
    /// Requested delay before the next pass
    #[serde(
        rename = "syncAfterMs",
        serialize_with = "serialize_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub sync_after: Option<Duration>,
}

impl SyncOutcome {
    fn new(status: BlockStatus) -> Self {
        Self {
            status,
            description: None,
            signal_updates: BTreeMap::new(),
            sync_after: None,
        }
    }

    /// Converged, no re-invocation requested
    pub fn ready() -> Self {
        Self::new(BlockStatus::Ready)
    }

    /// Work outstanding; re-invoke after `delay`
    pub fn in_progress(delay: Duration) -> Self {
        Self {
            sync_after: Some(delay),
            ..Self::new(BlockStatus::InProgress)
        }
    }

    /// Terminal failure for this pass
    pub fn failed() -> Self {
        Self::new(BlockStatus::Failed)
    }

    /// Teardown complete
    pub fn drained() -> Self {
        Self::new(BlockStatus::Drained)
    }

    /// Teardown failed
    pub fn draining_failed() -> Self {
        Self::new(BlockStatus::DrainingFailed)
    }

    /// Attach a status description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add one string signal
    pub fn with_signal(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.signal_updates
            .insert(key.into(), Value::String(value.into()));
        self
    }

    /// Add several signals
    pub fn with_signals(mut self, signals: BTreeMap<String, Value>) -> Self {
        self.signal_updates.extend(signals);
        self
    }

    /// Requested delay in milliseconds
    pub fn sync_after_ms(&self) -> Option<u64> {
        self.sync_after
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    /// Whether the host should invoke another pass without external change
    pub fn wants_requeue(&self) -> bool {
        self.sync_after.is_some()
    }
}

fn serialize_millis<S: Serializer>(
    delay: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match delay {
        Some(d) => serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_progress_serializes_delay_in_millis() {
        let outcome = SyncOutcome::in_progress(Duration::from_secs(30))
            .with_description("Deploying")
            .with_signal("stackId", "s1");
        assert_eq!(outcome.sync_after_ms(), Some(30_000));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "newStatus": "in_progress",
                "customStatusDescription": "Deploying",
                "signalUpdates": { "stackId": "s1" },
                "syncAfterMs": 30000
            })
        );
    }

    #[test]
    fn test_terminal_outcomes_omit_empty_fields() {
        assert_eq!(
            serde_json::to_value(SyncOutcome::draining_failed()).unwrap(),
            json!({ "newStatus": "draining_failed" })
        );
        assert!(!SyncOutcome::ready().wants_requeue());
        assert_eq!(BlockStatus::InProgress.to_string(), "in_progress");
    }
}
