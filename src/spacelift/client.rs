//! HTTPS GraphQL client for the Spacelift API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::queries;
use super::{
    ConfigElement, ConfigInput, CreatedStack, DeletedStack, Run, SpaceliftApi, Stack, StackInput,
};
use crate::config::{ApiCredentials, SpaceliftConfig};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Error, Result};

/// Production [`SpaceliftApi`] implementation.
///
/// The API key pair is exchanged for a JWT on first use and the token is
/// cached for the lifetime of the client. A 401 drops the cached token so the
/// next call re-authenticates.
pub struct SpaceliftClient {
    http: reqwest::Client,
    url: String,
    credentials: ApiCredentials,
    token: RwLock<Option<String>>,
    auth_retry: RetryConfig,
}

impl SpaceliftClient {
    /// Create a client for the configured account
    pub fn new(config: &SpaceliftConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("spacelift-block/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::http("ClientBuild", e))?;
        Ok(Self::with_http_client(config, http))
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_http_client(config: &SpaceliftConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            url: config.graphql_url(),
            credentials: config.credentials(),
            token: RwLock::new(None),
            auth_retry: RetryConfig::with_max_attempts(3),
        }
    }

    /// GraphQL URL this client posts to
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }

        let token = retry_with_backoff(&self.auth_retry, "ApiKeyUser", || {
            self.exchange_api_key()
        })
        .await?;
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn exchange_api_key(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct ApiKeyUser {
            jwt: Option<String>,
        }

        let user: ApiKeyUser = self
            .post(
                "ApiKeyUser",
                queries::API_KEY_USER,
                json!({ "id": self.credentials.key_id, "secret": self.credentials.key_secret }),
                "apiKeyUser",
                None,
            )
            .await
            .map_err(|e| match e {
                Error::Api { message, .. } => Error::auth(message),
                other => other,
            })?;

        user.jwt
            .filter(|jwt| !jwt.is_empty())
            .ok_or_else(|| Error::auth("API key exchange returned no token"))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
        field: &str,
    ) -> Result<T> {
        let token = self.token().await?;
        let result = self
            .post(operation, query, variables, field, Some(&token))
            .await;
        if matches!(result, Err(Error::Auth { .. })) {
            *self.token.write().await = None;
        }
        result
    }

    async fn post<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
        field: &str,
        bearer: Option<&str>,
    ) -> Result<T> {
        let mut request = self.http.post(&self.url).json(&json!({
            "operationName": operation,
            "query": query,
            "variables": variables,
        }));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(operation, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::auth(format!("{operation} rejected with 401")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(operation, format!("HTTP {status}: {body}")));
        }

        let envelope: GraphqlResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization_for_kind(operation, e.to_string()))?;
        debug!(operation, "graphql response received");

        decode_response(operation, field, envelope)
    }
}

#[derive(Debug, Default, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

fn decode_response<T: DeserializeOwned>(
    operation: &str,
    field: &str,
    envelope: GraphqlResponse,
) -> Result<T> {
    if !envelope.errors.is_empty() {
        let message = envelope
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::api(operation, message));
    }

    let value = envelope
        .data
        .and_then(|mut data| data.get_mut(field).map(Value::take))
        .filter(|value| !value.is_null())
        .ok_or_else(|| Error::api(operation, format!("response has no {field}")))?;

    serde_json::from_value(value)
        .map_err(|e| Error::serialization_for_kind(operation, e.to_string()))
}

#[async_trait]
impl SpaceliftApi for SpaceliftClient {
    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn create_stack(&self, input: &StackInput, manage_state: bool) -> Result<CreatedStack> {
        self.execute(
            "CreateStack",
            queries::CREATE_STACK,
            json!({ "input": input, "manageState": manage_state }),
            "stackCreate",
        )
        .await
    }

    #[instrument(skip(self, config), fields(config_id = %config.id))]
    async fn add_stack_config(
        &self,
        stack_id: &str,
        config: &ConfigInput,
    ) -> Result<ConfigElement> {
        self.execute(
            "AddStackConfig",
            queries::ADD_STACK_CONFIG,
            json!({ "stack": stack_id, "config": config }),
            "stackConfigAdd",
        )
        .await
    }

    #[instrument(skip(self))]
    async fn trigger_run(&self, stack_id: &str) -> Result<Run> {
        self.execute(
            "TriggerRun",
            queries::TRIGGER_RUN,
            json!({ "stack": stack_id }),
            "runTrigger",
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_stack(&self, stack_id: &str) -> Result<Stack> {
        self.execute("GetStack", queries::GET_STACK, json!({ "id": stack_id }), "stack")
            .await
    }

    #[instrument(skip(self))]
    async fn delete_stack(&self, stack_id: &str, destroy_resources: bool) -> Result<DeletedStack> {
        self.execute(
            "DeleteStack",
            queries::DELETE_STACK,
            json!({ "id": stack_id, "destroyResources": destroy_resources }),
            "stackDelete",
        )
        .await
    }
}
