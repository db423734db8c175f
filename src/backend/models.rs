//! Request and response shapes of the backend REST API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Label marking an entity's preferred account for an app
pub const PRIMARY_LABEL: &str = "primary";

/// Status of a usable connected account
pub const STATUS_ACTIVE: &str = "ACTIVE";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_object_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// An operation exposed by a third-party app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_name: Option<String>,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Action>,
}

/// Query for the action catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListActionsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apps: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usecase_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_by_available_apps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

/// Body of an action execution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteActionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_account_id: Option<String>,
    pub input: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthScheme {
    #[serde(default, alias = "scheme_name", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auth_mode: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnector {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auth_scheme: Option<String>,
}

/// A third-party app known to the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, rename = "no_auth")]
    pub no_auth: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub test_connectors: Vec<TestConnector>,
    #[serde(default, rename = "auth_schemes", deserialize_with = "null_as_default")]
    pub auth_schemes: Vec<AuthScheme>,
    #[serde(default)]
    pub yaml: Option<Value>,
}

impl App {
    /// True when actions of this app run without a connected account.
    ///
    /// The flag is honored both at the top level and inside the app's yaml
    /// document.
    pub fn requires_no_auth(&self) -> bool {
        if self.no_auth == Some(true) {
            return true;
        }
        self.yaml
            .as_ref()
            .and_then(|yaml| yaml.get("no_auth"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn has_test_connectors(&self) -> bool {
        !self.test_connectors.is_empty()
    }
}

/// Reusable auth/connector configuration for an app
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auth_scheme: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expected_input_fields: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Integration>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_pages: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListIntegrationsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_disabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntegrationRequest {
    pub name: String,
    pub app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_scheme: Option<String>,
    pub auth_config: Map<String, Value>,
    pub use_composio_auth: bool,
    pub force_new_integration: bool,
}

/// Stored credential linking an entity to an app
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAccount {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub integration_id: Option<String>,
}

impl ConnectedAccount {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    pub fn is_primary(&self) -> bool {
        self.labels.iter().any(|label| label == PRIMARY_LABEL)
    }

    pub fn matches_app(&self, app: &str) -> bool {
        self.app_name.to_lowercase() == app.to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAccountList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<ConnectedAccount>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_pages: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListConnectedAccountsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_uuid: Option<String>,
    #[serde(rename = "appNames", skip_serializing_if = "Option::is_none")]
    pub app_names: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateConnectionRequest {
    pub integration_id: String,
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

/// Handle returned when a connection handshake starts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub connection_status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub connected_account_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSetup {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trigger_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTrigger {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trigger_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub trigger_config: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActiveTriggerList {
    #[serde(default, alias = "items", deserialize_with = "null_as_default")]
    pub triggers: Vec<ActiveTrigger>,
}

/// Result of disabling a trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableTriggerResult {
    pub status: String,
}

impl DisableTriggerResult {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_app_no_auth_flags() {
        let app: App = serde_json::from_value(json!({"key": "weather", "no_auth": true})).unwrap();
        assert!(app.requires_no_auth());

        let app: App =
            serde_json::from_value(json!({"key": "calc", "yaml": {"no_auth": true}})).unwrap();
        assert!(app.requires_no_auth());

        let app: App = serde_json::from_value(json!({"key": "github", "no_auth": null})).unwrap();
        assert!(!app.requires_no_auth());
    }

    #[test]
    fn test_connected_account_tolerates_nulls() {
        let account: ConnectedAccount = serde_json::from_value(json!({
            "id": "ca_1",
            "appName": "GitHub",
            "status": "ACTIVE",
            "labels": null,
            "createdAt": "2024-05-01T10:00:00.000Z"
        }))
        .unwrap();

        assert!(account.is_active());
        assert!(!account.is_primary());
        assert!(account.matches_app("github"));
        assert!(account.created_at.is_some());
    }

    #[test]
    fn test_execute_request_skips_missing_fields() {
        let body = serde_json::to_value(ExecuteActionRequest {
            input: Map::new(),
            app_name: Some("weather".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(body, json!({"input": {}, "appName": "weather"}));
    }

    #[test]
    fn test_action_defaults_parameters() {
        let action: Action =
            serde_json::from_value(json!({"name": "GITHUB_STAR_REPO", "appKey": "github"}))
                .unwrap();
        assert_eq!(action.parameters["type"], "object");
        assert!(action.description.is_empty());
    }
}
