//! Entity connection resolution
//!
//! An [`Entity`] is the end user on whose behalf actions run. It decides which
//! connected account an action should use, starts new connection handshakes,
//! and manages the triggers attached to its accounts.

use crate::backend::{
    ActiveTrigger, App, BackendApi, ConnectedAccount, ConnectionRequest, DisableTriggerResult,
    ExecuteActionRequest, InitiateConnectionRequest, ListConnectedAccountsQuery, TriggerSetup,
};
use crate::core::{ErrorCode, Result, SdkError, ValidationError};
use crate::integrations::{Integrations, NewIntegration};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Input of [`Entity::execute`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteActionParams {
    pub action_name: String,
    /// Must be a JSON object when present
    pub params: Option<Value>,
    /// Natural-language instruction forwarded with the execution
    pub text: Option<String>,
    pub connected_account_id: Option<String>,
}

impl ExecuteActionParams {
    pub fn new(action_name: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
            ..Default::default()
        }
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn connected_account_id(mut self, id: impl Into<String>) -> Self {
        self.connected_account_id = Some(id.into());
        self
    }

    /// Check every field and return the action input as an object
    pub fn validate(&self) -> Result<Map<String, Value>, ValidationError> {
        let mut violations = ValidationError::new();
        if self.action_name.trim().is_empty() {
            violations.push("action_name", "must not be empty");
        }
        let input = match &self.params {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                violations.push(
                    "params",
                    format!("must be a JSON object, got {}", json_type(other)),
                );
                Map::new()
            }
        };
        if let Some(id) = &self.connected_account_id {
            if id.trim().is_empty() {
                violations.push("connected_account_id", "must not be blank when given");
            }
        }
        violations.into_result()?;
        Ok(input)
    }
}

/// Optional connection settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionConfig {
    pub labels: Option<Vec<String>>,
    pub redirect_url: Option<String>,
}

/// Input of [`Entity::initiate_connection`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitiateConnectionParams {
    pub app_name: String,
    pub auth_config: Option<Map<String, Value>>,
    pub integration_id: Option<String>,
    pub auth_mode: Option<String>,
    pub connection_data: Option<Map<String, Value>>,
    pub config: Option<ConnectionConfig>,
}

impl InitiateConnectionParams {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = ValidationError::new();
        if self.app_name.trim().is_empty() {
            violations.push("app_name", "must not be empty");
        }
        if matches!(&self.integration_id, Some(id) if id.trim().is_empty()) {
            violations.push("integration_id", "must not be blank when given");
        }
        if matches!(&self.auth_mode, Some(mode) if mode.trim().is_empty()) {
            violations.push("auth_mode", "must not be blank when given");
        }
        if let Some(config) = &self.config {
            if let Some(url) = &config.redirect_url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    violations.push("config.redirect_url", "must be an http(s) URL");
                }
            }
            if let Some(labels) = &config.labels {
                if labels.iter().any(|label| label.trim().is_empty()) {
                    violations.push("config.labels", "labels must not be blank");
                }
            }
        }
        violations.into_result()
    }
}

/// Pick the account an action should run with.
///
/// The first `primary`-labeled account wins whatever its app; otherwise the
/// newest `ACTIVE` account for the app. App names compare case-insensitively.
/// Without an app only a primary account can be chosen.
pub fn select_account<'a>(
    accounts: &'a [ConnectedAccount],
    app: Option<&str>,
) -> Option<&'a ConnectedAccount> {
    if let Some(primary) = accounts.iter().find(|account| account.is_primary()) {
        return Some(primary);
    }

    let app = app?;
    let mut latest: Option<&ConnectedAccount> = None;
    for account in accounts {
        if !account.matches_app(app) || !account.is_active() {
            continue;
        }
        match latest {
            Some(current) if account.created_at <= current.created_at => {}
            _ => latest = Some(account),
        }
    }
    latest
}

/// Name for integrations created on the fly, e.g. `integration_20261018T184800123Z`
fn integration_name() -> String {
    format!("integration_{}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// An end user against which actions execute
#[derive(Clone)]
pub struct Entity {
    id: String,
    backend: Arc<dyn BackendApi>,
    integrations: Integrations,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity").field("id", &self.id).finish()
    }
}

impl Entity {
    pub fn new(backend: Arc<dyn BackendApi>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            integrations: Integrations::new(Arc::clone(&backend)),
            backend,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Execute an action, resolving the connected account when the app needs one
    pub async fn execute(&self, params: ExecuteActionParams) -> Result<Value> {
        let input = params.validate()?;
        let action = self.backend.get_action(&params.action_name).await?;
        let app = self.backend.get_app(&action.app_key).await?;

        if app.requires_no_auth() {
            debug!(
                "executing {} for entity '{}' without authentication",
                action.name, self.id
            );
            let request = ExecuteActionRequest {
                input,
                app_name: Some(action.app_key.clone()),
                ..Default::default()
            };
            return self.backend.execute_action(&params.action_name, &request).await;
        }

        let account = self
            .get_connection(Some(&action.app_key), params.connected_account_id.as_deref())
            .await?
            .ok_or_else(|| SdkError::no_connected_account(&action.app_key, &self.id))?;

        debug!(
            "executing {} for entity '{}' with connected account {}",
            action.name, self.id, account.id
        );
        let request = ExecuteActionRequest {
            connected_account_id: Some(account.id),
            input,
            app_name: Some(action.app_key),
            text: params.text,
        };
        self.backend.execute_action(&params.action_name, &request).await
    }

    /// Resolve the connected account for `app`.
    ///
    /// An explicit id short-circuits the lookup. `Ok(None)` means nothing
    /// matched; callers decide whether that is fatal.
    pub async fn get_connection(
        &self,
        app: Option<&str>,
        connected_account_id: Option<&str>,
    ) -> Result<Option<ConnectedAccount>> {
        if let Some(id) = connected_account_id {
            return self.backend.get_connected_account(id).await.map(Some);
        }

        let accounts = self.get_connections().await?;
        if accounts.is_empty() {
            return Ok(None);
        }

        let Some(selected) = select_account(&accounts, app) else {
            debug!(
                "no connected account for app {:?} among {} account(s) of entity '{}'",
                app,
                accounts.len(),
                self.id
            );
            return Ok(None);
        };

        self.backend
            .get_connected_account(&selected.id)
            .await
            .map(Some)
    }

    /// Enable a trigger on the entity's connection for `app`
    pub async fn setup_trigger(
        &self,
        app: &str,
        trigger_name: &str,
        config: Value,
    ) -> Result<TriggerSetup> {
        let mut violations = ValidationError::new();
        if app.trim().is_empty() {
            violations.push("app", "must not be empty");
        }
        if trigger_name.trim().is_empty() {
            violations.push("trigger_name", "must not be empty");
        }
        violations.into_result()?;

        let account = self
            .get_connection(Some(app), None)
            .await?
            .ok_or_else(|| SdkError::no_connected_account(app, &self.id))?;
        self.backend
            .setup_trigger(&account.id, trigger_name, &config)
            .await
    }

    pub async fn disable_trigger(&self, trigger_id: &str) -> Result<DisableTriggerResult> {
        if trigger_id.trim().is_empty() {
            return Err(ValidationError::single("trigger_id", "must not be empty").into());
        }
        self.backend.disable_trigger(trigger_id).await?;
        Ok(DisableTriggerResult::success())
    }

    /// All connected accounts of this entity
    pub async fn get_connections(&self) -> Result<Vec<ConnectedAccount>> {
        let query = ListConnectedAccountsQuery {
            user_uuid: Some(self.id.clone()),
            ..Default::default()
        };
        Ok(self.backend.list_connected_accounts(&query).await?.items)
    }

    /// Active triggers across all of this entity's connected accounts
    pub async fn get_active_triggers(&self) -> Result<Vec<ActiveTrigger>> {
        let ids: Vec<String> = self
            .get_connections()
            .await?
            .into_iter()
            .map(|account| account.id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.backend.list_active_triggers(&ids).await
    }

    /// Start a connection handshake for `app_name`.
    ///
    /// Reuses `integration_id` when given; otherwise creates an integration,
    /// with the caller's auth mode/config or with platform-managed auth.
    pub async fn initiate_connection(
        &self,
        params: InitiateConnectionParams,
    ) -> Result<ConnectionRequest> {
        params.validate()?;
        let InitiateConnectionParams {
            app_name,
            auth_config,
            integration_id,
            auth_mode,
            connection_data,
            config,
        } = params;
        let ConnectionConfig {
            labels,
            redirect_url,
        } = config.unwrap_or_default();

        let app = self.backend.get_app(&app_name).await?;
        if !app.has_test_connectors() && !app.requires_no_auth() && auth_mode.is_none() {
            log_auth_schemes(&app);
            return Err(SdkError::policy(
                ErrorCode::AuthModeRequired,
                "Please pass authMode and authConfig.",
                format!(
                    "App '{}' has no managed test connector; an auth mode is required (available: {})",
                    app_name,
                    app.auth_schemes
                        .iter()
                        .map(|scheme| scheme.auth_mode.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        }

        let integration = match (integration_id, auth_mode) {
            (Some(id), _) => self.integrations.get(&id).await?,
            (None, Some(mode)) => {
                self.integrations
                    .create(NewIntegration {
                        name: integration_name(),
                        app_id: app.app_id.clone(),
                        auth_scheme: Some(mode),
                        auth_config,
                        use_composio_auth: false,
                    })
                    .await?
            }
            (None, None) => {
                self.integrations
                    .create(NewIntegration {
                        name: integration_name(),
                        app_id: app.app_id.clone(),
                        auth_scheme: None,
                        auth_config: None,
                        use_composio_auth: true,
                    })
                    .await?
            }
        };

        info!(
            "initiating connection for entity '{}' to {} via integration {}",
            self.id, app_name, integration.id
        );
        self.backend
            .initiate_connection(&InitiateConnectionRequest {
                integration_id: integration.id,
                entity_id: self.id.clone(),
                data: connection_data,
                redirect_uri: redirect_url,
                labels,
            })
            .await
    }
}

fn log_auth_schemes(app: &App) {
    debug!("Auth schemes not provided, available auth schemes and authConfig");
    for scheme in &app.auth_schemes {
        let fields = Value::Array(scheme.fields.clone());
        debug!(
            "authScheme: {} ({}), fields: {}",
            scheme.name, scheme.auth_mode, fields
        );
    }
}
