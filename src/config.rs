//! Spacelift connection settings and the stack provisioning template.

use std::fmt;

use serde::Serialize;

use crate::{Error, Result};

/// Connection settings for a Spacelift account.
///
/// `Debug` never prints the API key secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SpaceliftConfig {
    /// API key id
    pub api_key_id: String,
    /// API key secret
    pub api_key_secret: String,
    /// Account endpoint, e.g. `your-account.app.spacelift.io`
    pub endpoint: String,
    /// Space new stacks are created in
    pub space_id: String,
}

impl fmt::Debug for SpaceliftConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceliftConfig")
            .field("api_key_id", &self.api_key_id)
            .field("api_key_secret", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("space_id", &self.space_id)
            .finish()
    }
}

impl SpaceliftConfig {
    /// Build and validate a config
    pub fn new(
        api_key_id: impl Into<String>,
        api_key_secret: impl Into<String>,
        endpoint: impl Into<String>,
        space_id: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
            endpoint: endpoint.into(),
            space_id: space_id.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field is set and the endpoint has a host
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("apiKeyId", &self.api_key_id),
            ("apiKeySecret", &self.api_key_secret),
            ("endpoint", &self.endpoint),
            ("spaceId", &self.space_id),
        ] {
            if value.trim().is_empty() {
                return Err(Error::validation_for_field(
                    "app",
                    field,
                    format!("{field} must not be empty"),
                ));
            }
        }
        if endpoint_host(&self.endpoint).is_empty() {
            return Err(Error::validation_for_field(
                "app",
                "endpoint",
                "endpoint has no host",
            ));
        }
        Ok(())
    }

    /// GraphQL URL for the endpoint.
    ///
    /// Accepts a bare host or a URL; any scheme, path or trailing slash is
    /// dropped and the result is always `https://<host>/graphql`.
    pub fn graphql_url(&self) -> String {
        format!("https://{}/graphql", endpoint_host(&self.endpoint))
    }

    /// API key credentials used for token exchange
    pub fn credentials(&self) -> ApiCredentials {
        ApiCredentials {
            key_id: self.api_key_id.clone(),
            key_secret: self.api_key_secret.clone(),
        }
    }
}

fn endpoint_host(endpoint: &str) -> &str {
    let trimmed = endpoint.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
}

/// API key pair exchanged for a session token.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    /// API key id
    pub key_id: String,
    /// API key secret
    pub key_secret: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

/// Fixed parameters every provisioned stack is created with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTemplate {
    /// Source repository
    pub repository: String,
    /// Tracked branch
    pub branch: String,
    /// Project root inside the repository
    pub project_root: String,
    /// IaC tool (`OPEN_TOFU`, `TERRAFORM_FOSS`, ...)
    pub workflow_tool: String,
    /// Administrative stacks can manage other Spacelift resources
    pub administrative: bool,
    /// Apply automatically after a successful plan
    pub autodeploy: bool,
    /// Let Spacelift manage the state backend
    #[serde(skip)]
    pub manage_state: bool,
}

impl Default for StackTemplate {
    fn default() -> Self {
        Self {
            repository: "demo".to_string(),
            branch: "main".to_string(),
            project_root: "supermodule".to_string(),
            workflow_tool: "OPEN_TOFU".to_string(),
            administrative: false,
            autodeploy: true,
            manage_state: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("acme.app.spacelift.io")]
    #[case("https://acme.app.spacelift.io")]
    #[case("https://acme.app.spacelift.io/")]
    #[case("http://acme.app.spacelift.io/graphql")]
    #[case("  acme.app.spacelift.io  ")]
    fn test_graphql_url_normalization(#[case] endpoint: &str) {
        let config = SpaceliftConfig::new("id", "secret", endpoint, "space").unwrap();
        assert_eq!(config.graphql_url(), "https://acme.app.spacelift.io/graphql");
    }

    #[rstest]
    #[case("", "secret", "acme.app.spacelift.io", "space", "apiKeyId")]
    #[case("id", " ", "acme.app.spacelift.io", "space", "apiKeySecret")]
    #[case("id", "secret", "", "space", "endpoint")]
    #[case("id", "secret", "https://", "space", "endpoint")]
    #[case("id", "secret", "acme.app.spacelift.io", "", "spaceId")]
    fn test_missing_fields_are_rejected(
        #[case] id: &str,
        #[case] secret: &str,
        #[case] endpoint: &str,
        #[case] space: &str,
        #[case] expected_field: &str,
    ) {
        match SpaceliftConfig::new(id, secret, endpoint, space) {
            Err(Error::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some(expected_field))
            }
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config =
            SpaceliftConfig::new("key-id", "super-secret", "acme.app.spacelift.io", "space")
                .unwrap();
        let rendered = format!("{config:?} {:?}", config.credentials());
        assert!(rendered.contains("key-id"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_stack_template_defaults() {
        let template = StackTemplate::default();
        assert_eq!(template.repository, "demo");
        assert_eq!(template.branch, "main");
        assert_eq!(template.project_root, "supermodule");
        assert_eq!(template.workflow_tool, "OPEN_TOFU");
        assert!(!template.administrative);
        assert!(template.autodeploy);
        assert!(template.manage_state);
    }
}
