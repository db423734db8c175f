//! In-memory stand-ins for the backend and assistants APIs
//!
//! Both stubs record what they were asked to do so tests can assert on the
//! exact calls made.

use crate::backend::*;
use crate::core::{ErrorCode, Result, SdkError};
use crate::llm::{AssistantsApi, RequiredAction, Run, RunStatus, ToolCall, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct BackendState {
    actions: Vec<Action>,
    apps: HashMap<String, App>,
    integrations: Vec<Integration>,
    accounts: Vec<(String, ConnectedAccount)>,
    triggers: Vec<ActiveTrigger>,
    results: HashMap<String, Value>,

    calls: Vec<String>,
    action_queries: Vec<ListActionsQuery>,
    executions: Vec<(String, ExecuteActionRequest)>,
    created_integrations: Vec<CreateIntegrationRequest>,
    initiated: Vec<InitiateConnectionRequest>,
    trigger_setups: Vec<(String, String, Value)>,
    disabled_triggers: Vec<String>,
    active_trigger_queries: Vec<Vec<String>>,
}

/// Backend answering from fixtures
#[derive(Default)]
pub struct StubBackend {
    state: Mutex<BackendState>,
}

fn not_found(what: &str, id: &str) -> SdkError {
    SdkError::not_found(ErrorCode::BackendNotFound, format!("{} '{}' not found", what, id))
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: impl Into<String>) -> MutexGuard<'_, BackendState> {
        let mut state = self.state();
        state.calls.push(call.into());
        state
    }

    pub fn with_action(self, action: Action) -> Self {
        self.state().actions.push(action);
        self
    }

    /// Apps are keyed by lowercase key
    pub fn with_app(self, app: App) -> Self {
        self.state().apps.insert(app.key.to_lowercase(), app);
        self
    }

    pub fn with_integration(self, integration: Integration) -> Self {
        self.state().integrations.push(integration);
        self
    }

    pub fn with_account(self, entity_id: &str, account: ConnectedAccount) -> Self {
        self.state().accounts.push((entity_id.to_string(), account));
        self
    }

    pub fn with_trigger(self, trigger: ActiveTrigger) -> Self {
        self.state().triggers.push(trigger);
        self
    }

    /// Response body returned when `action` executes
    pub fn with_execution_result(self, action: &str, result: Value) -> Self {
        self.state().results.insert(action.to_string(), result);
        self
    }

    /// Names of every backend operation called, in order
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn action_queries(&self) -> Vec<ListActionsQuery> {
        self.state().action_queries.clone()
    }

    pub fn executions(&self) -> Vec<(String, ExecuteActionRequest)> {
        self.state().executions.clone()
    }

    pub fn created_integrations(&self) -> Vec<CreateIntegrationRequest> {
        self.state().created_integrations.clone()
    }

    pub fn initiated_connections(&self) -> Vec<InitiateConnectionRequest> {
        self.state().initiated.clone()
    }

    pub fn trigger_setups(&self) -> Vec<(String, String, Value)> {
        self.state().trigger_setups.clone()
    }

    pub fn disabled_triggers(&self) -> Vec<String> {
        self.state().disabled_triggers.clone()
    }

    pub fn active_trigger_queries(&self) -> Vec<Vec<String>> {
        self.state().active_trigger_queries.clone()
    }
}

fn csv(value: &Option<String>) -> Option<Vec<String>> {
    value.as_ref().map(|v| {
        v.split(',')
            .map(|item| item.trim().to_lowercase())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

#[async_trait]
impl BackendApi for StubBackend {
    async fn list_actions(&self, query: &ListActionsQuery) -> Result<Vec<Action>> {
        let mut state = self.record("list_actions");
        state.action_queries.push(query.clone());
        let apps = csv(&query.apps);
        let names = csv(&query.actions);
        let tags = csv(&query.tags);
        Ok(state
            .actions
            .iter()
            .filter(|a| apps.as_ref().map_or(true, |apps| apps.contains(&a.app_key.to_lowercase())))
            .filter(|a| names.as_ref().map_or(true, |names| names.contains(&a.name.to_lowercase())))
            .filter(|a| {
                tags.as_ref().map_or(true, |tags| {
                    a.tags.iter().any(|tag| tags.contains(&tag.to_lowercase()))
                })
            })
            .cloned()
            .collect())
    }

    async fn get_action(&self, action_name: &str) -> Result<Action> {
        let state = self.record("get_action");
        state
            .actions
            .iter()
            .find(|a| a.name == action_name)
            .cloned()
            .ok_or_else(|| not_found("action", action_name))
    }

    async fn execute_action(
        &self,
        action_name: &str,
        request: &ExecuteActionRequest,
    ) -> Result<Value> {
        let mut state = self.record("execute_action");
        state
            .executions
            .push((action_name.to_string(), request.clone()));
        Ok(state
            .results
            .get(action_name)
            .cloned()
            .unwrap_or_else(|| json!({"successfull": true, "data": {}})))
    }

    async fn get_app(&self, app_key: &str) -> Result<App> {
        let state = self.record("get_app");
        state
            .apps
            .get(&app_key.to_lowercase())
            .cloned()
            .ok_or_else(|| not_found("app", app_key))
    }

    async fn list_integrations(&self, query: &ListIntegrationsQuery) -> Result<IntegrationList> {
        let state = self.record("list_integrations");
        let items = state
            .integrations
            .iter()
            .filter(|i| match &query.app_name {
                Some(app) => i.app_name.as_deref() == Some(app.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        Ok(IntegrationList {
            items,
            total_pages: Some(1),
            page: Some(1),
        })
    }

    async fn get_integration(&self, integration_id: &str) -> Result<Integration> {
        let state = self.record("get_integration");
        state
            .integrations
            .iter()
            .find(|i| i.id == integration_id)
            .cloned()
            .ok_or_else(|| not_found("integration", integration_id))
    }

    async fn create_integration(&self, request: &CreateIntegrationRequest) -> Result<Integration> {
        let mut state = self.record("create_integration");
        state.created_integrations.push(request.clone());
        let integration = Integration {
            id: format!("int_{}", state.integrations.len() + 1),
            name: request.name.clone(),
            auth_scheme: request.auth_scheme.clone(),
            app_id: Some(request.app_id.clone()),
            enabled: Some(true),
            ..Default::default()
        };
        state.integrations.push(integration.clone());
        Ok(integration)
    }

    async fn delete_integration(&self, integration_id: &str) -> Result<()> {
        let mut state = self.record("delete_integration");
        let before = state.integrations.len();
        state.integrations.retain(|i| i.id != integration_id);
        if state.integrations.len() == before {
            return Err(not_found("integration", integration_id));
        }
        Ok(())
    }

    async fn list_connected_accounts(
        &self,
        query: &ListConnectedAccountsQuery,
    ) -> Result<ConnectedAccountList> {
        let state = self.record("list_connected_accounts");
        let apps = csv(&query.app_names);
        let items = state
            .accounts
            .iter()
            .filter(|(entity, _)| query.user_uuid.as_deref().map_or(true, |id| id == entity.as_str()))
            .filter(|(_, account)| {
                apps.as_ref()
                    .map_or(true, |apps| apps.contains(&account.app_name.to_lowercase()))
            })
            .map(|(_, account)| account.clone())
            .collect();
        Ok(ConnectedAccountList {
            items,
            total_pages: Some(1),
            page: Some(1),
        })
    }

    async fn get_connected_account(&self, connected_account_id: &str) -> Result<ConnectedAccount> {
        let state = self.record("get_connected_account");
        state
            .accounts
            .iter()
            .map(|(_, account)| account)
            .find(|account| account.id == connected_account_id)
            .cloned()
            .ok_or_else(|| not_found("connected account", connected_account_id))
    }

    async fn initiate_connection(
        &self,
        request: &InitiateConnectionRequest,
    ) -> Result<ConnectionRequest> {
        let mut state = self.record("initiate_connection");
        state.initiated.push(request.clone());
        Ok(ConnectionRequest {
            connection_status: "INITIATED".to_string(),
            connected_account_id: format!("ca_{}", state.initiated.len()),
            redirect_url: Some("https://auth.example.test/authorize".to_string()),
        })
    }

    async fn setup_trigger(
        &self,
        connected_account_id: &str,
        trigger_name: &str,
        config: &Value,
    ) -> Result<TriggerSetup> {
        let mut state = self.record("setup_trigger");
        state.trigger_setups.push((
            connected_account_id.to_string(),
            trigger_name.to_string(),
            config.clone(),
        ));
        Ok(TriggerSetup {
            status: "success".to_string(),
            trigger_id: Some(format!("ti_{}", state.trigger_setups.len())),
        })
    }

    async fn disable_trigger(&self, trigger_id: &str) -> Result<()> {
        let mut state = self.record("disable_trigger");
        state.disabled_triggers.push(trigger_id.to_string());
        Ok(())
    }

    async fn list_active_triggers(
        &self,
        connected_account_ids: &[String],
    ) -> Result<Vec<ActiveTrigger>> {
        let mut state = self.record("list_active_triggers");
        state
            .active_trigger_queries
            .push(connected_account_ids.to_vec());
        Ok(state
            .triggers
            .iter()
            .filter(|t| {
                t.connection_id
                    .as_ref()
                    .map_or(false, |id| connected_account_ids.contains(id))
            })
            .cloned()
            .collect())
    }
}

/// A no-auth `weather` app with `WEATHER_NOW` (`{"temp":21}`) and
/// `WEATHER_TOMORROW` (`{"temp":17}`)
pub fn weather_backend() -> Arc<StubBackend> {
    let action = |name: &str| Action {
        name: name.to_string(),
        display_name: None,
        description: format!("{} forecast", name.to_lowercase()),
        app_key: "weather".to_string(),
        app_name: Some("weather".to_string()),
        parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        tags: vec!["forecast".to_string()],
    };
    Arc::new(
        StubBackend::new()
            .with_app(App {
                app_id: "app-weather".to_string(),
                key: "weather".to_string(),
                name: "Weather".to_string(),
                no_auth: Some(true),
                ..Default::default()
            })
            .with_action(action("WEATHER_NOW"))
            .with_action(action("WEATHER_TOMORROW"))
            .with_execution_result("WEATHER_NOW", json!({"temp": 21}))
            .with_execution_result("WEATHER_TOMORROW", json!({"temp": 17})),
    )
}

pub fn run_with_status(id: &str, status: RunStatus) -> Run {
    Run {
        id: id.to_string(),
        thread_id: "thread_1".to_string(),
        status,
        required_action: None,
    }
}

/// A run waiting on `(call id, action, arguments)` tool calls
pub fn requires_action_run(id: &str, calls: &[(&str, &str, &str)]) -> Run {
    let mut run = run_with_status(id, RunStatus::RequiresAction);
    let mut action = RequiredAction {
        kind: "submit_tool_outputs".to_string(),
        ..Default::default()
    };
    action.submit_tool_outputs.tool_calls = calls
        .iter()
        .map(|(call_id, name, arguments)| ToolCall::new(*call_id, *name, *arguments))
        .collect();
    run.required_action = Some(action);
    run
}

#[derive(Default)]
struct AssistantsState {
    retrieve_queue: VecDeque<Run>,
    retrieve_fallback: Option<RunStatus>,
    submit_queue: VecDeque<Run>,
    retrievals: usize,
    submissions: Vec<(String, String, Vec<ToolOutput>)>,
}

/// Assistants API replaying scripted runs
///
/// Retrievals pop the retrieve queue, then fall back to a fixed status.
/// Submissions pop the submit queue, then report the run completed.
#[derive(Default)]
pub struct StubAssistants {
    state: Mutex<AssistantsState>,
}

impl StubAssistants {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, AssistantsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn then_retrieve(self, run: Run) -> Self {
        self.state().retrieve_queue.push_back(run);
        self
    }

    pub fn always_retrieve(self, status: RunStatus) -> Self {
        self.state().retrieve_fallback = Some(status);
        self
    }

    pub fn after_submit(self, run: Run) -> Self {
        self.state().submit_queue.push_back(run);
        self
    }

    pub fn retrievals(&self) -> usize {
        self.state().retrievals
    }

    /// `(thread id, run id, outputs)` per submission
    pub fn submissions(&self) -> Vec<(String, String, Vec<ToolOutput>)> {
        self.state().submissions.clone()
    }
}

#[async_trait]
impl AssistantsApi for StubAssistants {
    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<Run> {
        let mut state = self.state();
        state.retrievals += 1;
        if let Some(run) = state.retrieve_queue.pop_front() {
            return Ok(run);
        }
        match state.retrieve_fallback {
            Some(status) => Ok(run_with_status(run_id, status)),
            None => Err(not_found("run", run_id)),
        }
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        tool_outputs: &[ToolOutput],
    ) -> Result<Run> {
        let mut state = self.state();
        state.submissions.push((
            thread_id.to_string(),
            run_id.to_string(),
            tool_outputs.to_vec(),
        ));
        Ok(state
            .submit_queue
            .pop_front()
            .unwrap_or_else(|| run_with_status(run_id, RunStatus::Completed)))
    }
}
