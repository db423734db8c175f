//! OpenAI tool set
//!
//! [`OpenAiToolSet`] is the entry point for applications: it lists actions as
//! function tools, executes the tool calls a model produces, and drives
//! assistant runs (polling or streaming) until they no longer need input.
//!
//! ```rust,no_run
//! use actlink::{ClientConfig, OpenAiToolSet, ToolFilters};
//!
//! # async fn demo() -> actlink::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let toolset = OpenAiToolSet::from_config(&config)?;
//! let tools = toolset
//!     .get_tools(&ToolFilters::default().apps(["github"]), None)
//!     .await?;
//! println!("{} tools", tools.len());
//! # Ok(())
//! # }
//! ```

use crate::backend::{BackendApi, HttpBackend, ListActionsQuery};
use crate::config::{ClientConfig, PollPolicy, DEFAULT_ENTITY_ID};
use crate::core::{Result, ValidationError};
use crate::entity::{Entity, ExecuteActionParams};
use crate::integrations::Integrations;
use crate::llm::stream::StreamDriver;
use crate::llm::{
    actions_to_tools, executor, wait_for_run, AssistantEventStream, AssistantsApi,
    ChatCompletion, ChatCompletionTool, EventStream, Run, ToolCall, ToolOutput,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Which actions [`OpenAiToolSet::get_tools`] should return
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolFilters {
    pub actions: Vec<String>,
    pub apps: Vec<String>,
    pub tags: Vec<String>,
    /// Natural-language description of the task
    pub use_case: Option<String>,
    pub use_case_limit: Option<u32>,
    pub filter_by_available_apps: Option<bool>,
}

impl ToolFilters {
    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn apps<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apps = apps.into_iter().map(Into::into).collect();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn use_case(mut self, use_case: impl Into<String>, limit: Option<u32>) -> Self {
        self.use_case = Some(use_case.into());
        self.use_case_limit = limit;
        self
    }

    pub fn filter_by_available_apps(mut self, enabled: bool) -> Self {
        self.filter_by_available_apps = Some(enabled);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = ValidationError::new();
        if self.use_case_limit == Some(0) {
            violations.push("use_case_limit", "must be positive");
        }
        if self.use_case_limit.is_some() && self.use_case.is_none() {
            violations.push("use_case_limit", "requires use_case");
        }
        if self.use_case.is_some() && self.apps.is_empty() {
            violations.push("apps", "at least one app is required with use_case");
        }
        if matches!(&self.use_case, Some(use_case) if use_case.trim().is_empty()) {
            violations.push("use_case", "must not be blank");
        }
        for (field, values) in [("actions", &self.actions), ("apps", &self.apps), ("tags", &self.tags)] {
            if values.iter().any(|v| v.trim().is_empty()) {
                violations.push(field, "entries must not be blank");
            }
        }
        violations.into_result()
    }

    fn to_query(&self, entity_id: &str) -> ListActionsQuery {
        let joined = |values: &[String]| (!values.is_empty()).then(|| values.join(","));
        ListActionsQuery {
            apps: joined(&self.apps),
            actions: joined(&self.actions),
            tags: joined(&self.tags),
            use_case: self.use_case.clone(),
            usecase_limit: self.use_case_limit,
            filter_by_available_apps: self.filter_by_available_apps,
            entity_id: Some(entity_id.to_string()),
        }
    }
}

/// Actions as OpenAI tools, executed on behalf of entities
#[derive(Clone)]
pub struct OpenAiToolSet {
    backend: Arc<dyn BackendApi>,
    entity_id: String,
    poll: PollPolicy,
}

impl std::fmt::Debug for OpenAiToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiToolSet")
            .field("entity_id", &self.entity_id)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl OpenAiToolSet {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self {
            backend,
            entity_id: DEFAULT_ENTITY_ID.to_string(),
            poll: PollPolicy::default(),
        }
    }

    /// Tool set talking to the backend described by `config`
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let backend = HttpBackend::new(config)?;
        Ok(Self::new(Arc::new(backend))
            .with_entity_id(config.entity_id.clone())
            .with_poll_policy(config.poll))
    }

    /// Entity used when a call does not name one
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = entity_id.into();
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    pub fn entity(&self, entity_id: Option<&str>) -> Entity {
        Entity::new(
            Arc::clone(&self.backend),
            entity_id.unwrap_or(&self.entity_id),
        )
    }

    pub fn integrations(&self) -> Integrations {
        Integrations::new(Arc::clone(&self.backend))
    }

    /// Actions matching `filters`, as function tools
    pub async fn get_tools(
        &self,
        filters: &ToolFilters,
        entity_id: Option<&str>,
    ) -> Result<Vec<ChatCompletionTool>> {
        filters.validate()?;
        let query = filters.to_query(entity_id.unwrap_or(&self.entity_id));
        let actions = self.backend.list_actions(&query).await?;
        debug!("{} action(s) matched tool filters", actions.len());
        Ok(actions_to_tools(&actions))
    }

    pub async fn execute_action(
        &self,
        action: &str,
        params: Value,
        entity_id: Option<&str>,
    ) -> Result<Value> {
        self.entity(entity_id)
            .execute(ExecuteActionParams::new(action).params(params))
            .await
    }

    /// Execute one tool call; returns the JSON-encoded result
    pub async fn execute_tool_call(
        &self,
        tool_call: &ToolCall,
        entity_id: Option<&str>,
    ) -> Result<String> {
        executor::execute_tool_call(&self.entity(entity_id), tool_call).await
    }

    /// Execute the tool calls of every choice of a chat completion
    pub async fn handle_tool_call(
        &self,
        completion: &ChatCompletion,
        entity_id: Option<&str>,
    ) -> Result<Vec<String>> {
        executor::handle_tool_call(&self.entity(entity_id), completion).await
    }

    /// Outputs for every tool call the run is waiting on
    pub async fn handle_assistant_message(
        &self,
        run: &Run,
        entity_id: Option<&str>,
    ) -> Result<Vec<ToolOutput>> {
        executor::execute_tool_calls(&self.entity(entity_id), run.pending_tool_calls()).await
    }

    /// Answer tool calls and poll until the run leaves the polling set
    pub async fn wait_and_handle_assistant_tool_calls(
        &self,
        client: &dyn AssistantsApi,
        run: Run,
        thread_id: &str,
        entity_id: Option<&str>,
    ) -> Result<Run> {
        wait_for_run(client, &self.entity(entity_id), run, thread_id, &self.poll).await
    }

    /// Re-emit a streamed run's events while answering its tool calls.
    ///
    /// Must be called within a tokio runtime; the driver runs as a task.
    pub fn wait_and_handle_assistant_stream_tool_calls(
        &self,
        client: Arc<dyn AssistantsApi>,
        stream: EventStream,
        thread_id: &str,
        entity_id: Option<&str>,
    ) -> AssistantEventStream {
        AssistantEventStream::spawn(StreamDriver {
            api: client,
            entity: self.entity(entity_id),
            upstream: stream,
            thread_id: thread_id.to_string(),
            policy: self.poll,
        })
    }
}
