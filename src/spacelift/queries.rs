//! GraphQL documents sent to the Spacelift API.

/// Exchange an API key for a session JWT
pub const API_KEY_USER: &str = r#"
mutation ApiKeyUser($id: ID!, $secret: String!) {
  apiKeyUser(id: $id, secret: $secret) {
    jwt
  }
}
"#;

/// Create a stack
pub const CREATE_STACK: &str = r#"
mutation CreateStack($input: StackInput!, $manageState: Boolean!) {
  stackCreate(input: $input, manageState: $manageState) {
    id
    name
  }
}
"#;

/// Add a config element to a stack
pub const ADD_STACK_CONFIG: &str = r#"
mutation AddStackConfig($stack: ID!, $config: ConfigInput!) {
  stackConfigAdd(stack: $stack, config: $config) {
    id
    value
    writeOnly
    type
  }
}
"#;

/// Trigger a tracked run
pub const TRIGGER_RUN: &str = r#"
mutation TriggerRun($stack: ID!) {
  runTrigger(stack: $stack) {
    id
    state
  }
}
"#;

/// Read stack state and outputs
pub const GET_STACK: &str = r#"
query GetStack($id: ID!) {
  stack(id: $id) {
    id
    state
    outputs {
      id
      value
      sensitive
    }
  }
}
"#;

/// Delete a stack, optionally destroying its resources first
pub const DELETE_STACK: &str = r#"
mutation DeleteStack($id: ID!, $destroyResources: Boolean!) {
  stackDelete(id: $id, destroyResources: $destroyResources) {
    id
  }
}
"#;
