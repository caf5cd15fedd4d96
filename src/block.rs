//! Block definition: declared inputs, their defaults, and exposed signals.
//!
//! The host hands each pass the raw input map supplied by the user. Before it
//! is fingerprinted it is resolved against the block definition so omitted
//! inputs take their defaults and mistyped ones are rejected up front.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::{Error, Result};

/// Scalar type of a block input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// UTF-8 string
    String,
    /// JSON number
    Number,
    /// true / false
    Boolean,
}

impl InputKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            InputKind::String => value.is_string(),
            InputKind::Number => value.is_number(),
            InputKind::Boolean => value.is_boolean(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            InputKind::String => "string",
            InputKind::Number => "number",
            InputKind::Boolean => "boolean",
        }
    }
}

/// Declaration of one block input
#[derive(Clone, Debug, PartialEq)]
pub struct InputSpec {
    /// Display name
    pub name: String,
    /// Help text
    pub description: String,
    /// Expected scalar type
    pub kind: InputKind,
    /// Whether the user must supply a value
    pub required: bool,
    /// Value used when the user supplies none
    pub default: Option<Value>,
}

impl InputSpec {
    /// Optional input with a default value
    pub fn optional(
        name: impl Into<String>,
        kind: InputKind,
        default: Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: false,
            default: Some(default),
        }
    }

    /// Required input without a default
    pub fn required(
        name: impl Into<String>,
        kind: InputKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: true,
            default: None,
        }
    }
}

/// Declaration of one signal the block may publish
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalSpec {
    /// Display name
    pub name: String,
    /// Help text
    pub description: String,
}

/// A block's full declaration
#[derive(Clone, Debug)]
pub struct BlockDefinition {
    /// Display name, also used as the stack label
    pub name: String,
    /// Help text
    pub description: String,
    /// Inputs keyed by their tfvars variable name
    pub inputs: BTreeMap<String, InputSpec>,
    /// Signals keyed by their signal id
    pub signals: BTreeMap<String, SignalSpec>,
}

impl BlockDefinition {
    /// The storage bucket block: a demo module generating random resources
    pub fn storage_bucket() -> Self {
        let inputs = [
            (
                "random_length",
                InputSpec::optional(
                    "Random Length",
                    InputKind::Number,
                    json!(8),
                    "Byte length for the random ID",
                ),
            ),
            (
                "prefix",
                InputSpec::optional(
                    "Prefix",
                    InputKind::String,
                    json!("demo"),
                    "Prefix to use for generated resources",
                ),
            ),
            (
                "pet_name_length",
                InputSpec::optional(
                    "Pet Name Length",
                    InputKind::Number,
                    json!(2),
                    "Number of words in the pet name",
                ),
            ),
            (
                "password_length",
                InputSpec::optional(
                    "Password Length",
                    InputKind::Number,
                    json!(16),
                    "Length of the generated password",
                ),
            ),
            (
                "include_special_chars",
                InputSpec::optional(
                    "Include Special Chars",
                    InputKind::Boolean,
                    json!(true),
                    "Include special characters in the password",
                ),
            ),
        ];

        let signals = [
            ("stackId", "Stack ID", "The ID of the created Spacelift stack"),
            (
                "resource_summary",
                "Resource Summary",
                "Summary of all generated resources",
            ),
            (
                "random_id_base64",
                "Random ID Base64",
                "Generated random ID in base64 URL-safe format",
            ),
            (
                "random_id",
                "Random ID",
                "Generated random ID in hexadecimal format",
            ),
            ("pet_name", "Pet Name", "Generated pet name with prefix"),
            ("password", "Password", "Generated random password"),
        ];

        Self {
            name: "Storage Bucket".to_string(),
            description: "Provisions a storage bucket module through a Spacelift stack".to_string(),
            inputs: inputs
                .into_iter()
                .map(|(key, spec)| (key.to_string(), spec))
                .collect(),
            signals: signals
                .into_iter()
                .map(|(key, name, description)| {
                    (
                        key.to_string(),
                        SignalSpec {
                            name: name.to_string(),
                            description: description.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Resolve user-supplied input into the desired configuration.
    ///
    /// Declared inputs fall back to their default and are type-checked.
    /// Undeclared scalar inputs pass through unchanged.
    pub fn resolve(
        &self,
        instance_id: &str,
        supplied: &Map<String, Value>,
    ) -> Result<DesiredConfig> {
        let mut values = BTreeMap::new();

        for (key, value) in supplied {
            if !is_scalar(value) {
                return Err(Error::validation_for_field(
                    instance_id,
                    key,
                    "input values must be strings, numbers or booleans",
                ));
            }
            if !self.inputs.contains_key(key) {
                debug!(input = %key, "passing through undeclared input");
            }
            values.insert(key.clone(), value.clone());
        }

        for (key, spec) in &self.inputs {
            match values.get(key) {
                Some(value) if !spec.kind.matches(value) => {
                    return Err(Error::validation_for_field(
                        instance_id,
                        key,
                        format!("expected a {}", spec.kind.as_str()),
                    ));
                }
                Some(_) => {}
                None => match &spec.default {
                    Some(default) => {
                        values.insert(key.clone(), default.clone());
                    }
                    None if spec.required => {
                        return Err(Error::validation_for_field(
                            instance_id,
                            key,
                            "required input is missing",
                        ));
                    }
                    None => {}
                },
            }
        }

        Ok(DesiredConfig(values))
    }

    /// Inputs rendered as a JSON object schema
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .inputs
            .iter()
            .map(|(key, spec)| {
                (
                    key.clone(),
                    json!({ "type": spec.kind.as_str(), "description": spec.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .inputs
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(key, _)| key.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Desired configuration: scalar tfvars keyed by variable name.
///
/// Backed by a `BTreeMap` so iteration (and therefore serialization) order
/// never depends on how the input was assembled.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DesiredConfig(BTreeMap<String, Value>);

impl DesiredConfig {
    /// Build from key/value pairs, rejecting non-scalar values
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (key, value) in pairs {
            if !is_scalar(&value) {
                return Err(Error::validation_for_field(
                    crate::error::UNKNOWN_CONTEXT,
                    key,
                    "input values must be strings, numbers or booleans",
                ));
            }
            values.insert(key, value);
        }
        Ok(Self(values))
    }

    /// Values in canonical order
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    /// Look up one value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no variables are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn is_scalar(value: &Value) -> bool {
    value.is_string() || value.is_number() || value.is_boolean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn supplied(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn test_defaults_fill_missing_inputs() {
        let block = BlockDefinition::storage_bucket();
        let config = block
            .resolve("blk-1", &supplied(json!({ "prefix": "prod" })))
            .unwrap();

        assert_eq!(config.get("prefix"), Some(&json!("prod")));
        assert_eq!(config.get("random_length"), Some(&json!(8)));
        assert_eq!(config.get("pet_name_length"), Some(&json!(2)));
        assert_eq!(config.get("password_length"), Some(&json!(16)));
        assert_eq!(config.get("include_special_chars"), Some(&json!(true)));
        assert_eq!(config.len(), 5);
    }

    #[rstest]
    #[case::number_as_string(json!({ "random_length": "8" }), "random_length")]
    #[case::string_as_number(json!({ "prefix": 7 }), "prefix")]
    #[case::bool_as_string(json!({ "include_special_chars": "yes" }), "include_special_chars")]
    #[case::nested_object(json!({ "extra": { "a": 1 } }), "extra")]
    #[case::array(json!({ "prefix": ["a"] }), "prefix")]
    #[case::null(json!({ "prefix": null }), "prefix")]
    fn test_invalid_inputs_are_rejected(#[case] input: Value, #[case] expected_field: &str) {
        let block = BlockDefinition::storage_bucket();
        let err = block.resolve("blk-1", &supplied(input)).unwrap_err();
        match err {
            Error::Validation { field, instance, .. } => {
                assert_eq!(field.as_deref(), Some(expected_field));
                assert_eq!(instance, "blk-1");
            }
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_scalars_pass_through() {
        let block = BlockDefinition::storage_bucket();
        let config = block
            .resolve("blk-1", &supplied(json!({ "region": "eu-west-1" })))
            .unwrap();
        assert_eq!(config.get("region"), Some(&json!("eu-west-1")));
    }

    #[test]
    fn test_required_input_without_default_must_be_supplied() {
        let mut block = BlockDefinition::storage_bucket();
        block.inputs.insert(
            "bucket_name".to_string(),
            InputSpec::required("Bucket Name", InputKind::String, "Name of the bucket"),
        );

        let err = block.resolve("blk-1", &Map::new()).unwrap_err();
        assert!(err.to_string().contains("required input is missing"));

        let ok = block
            .resolve("blk-1", &supplied(json!({ "bucket_name": "logs" })))
            .unwrap();
        assert_eq!(ok.get("bucket_name"), Some(&json!("logs")));
    }

    #[test]
    fn test_json_schema_lists_inputs_and_required_keys() {
        let mut block = BlockDefinition::storage_bucket();
        block.inputs.insert(
            "bucket_name".to_string(),
            InputSpec::required("Bucket Name", InputKind::String, "Name of the bucket"),
        );

        let schema = block.json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["random_length"]["type"], "number");
        assert_eq!(
            schema["properties"]["prefix"]["description"],
            "Prefix to use for generated resources"
        );
        assert_eq!(schema["required"], json!(["bucket_name"]));
    }

    #[test]
    fn test_storage_bucket_declares_stack_id_signal() {
        let block = BlockDefinition::storage_bucket();
        assert!(block.signals.contains_key("stackId"));
        assert_eq!(block.signals.len(), 6);
    }

    #[test]
    fn test_from_pairs_rejects_non_scalars() {
        assert!(DesiredConfig::from_pairs([("a".to_string(), json!([1]))]).is_err());
        let config = DesiredConfig::from_pairs([("a".to_string(), json!(1))]).unwrap();
        assert!(!config.is_empty());
    }
}
