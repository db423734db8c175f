//! Backend REST API access
//!
//! [`BackendApi`] is the seam between the entity/toolset logic and the remote
//! backend. [`HttpBackend`] talks to the real service; the `testing` module
//! provides an in-memory stand-in.

pub mod http;
pub mod models;

use crate::core::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use http::HttpBackend;
pub use models::{
    Action, ActiveTrigger, App, AuthScheme, ConnectedAccount, ConnectedAccountList,
    ConnectionRequest, CreateIntegrationRequest, DisableTriggerResult, ExecuteActionRequest,
    InitiateConnectionRequest, Integration, IntegrationList, ListActionsQuery,
    ListConnectedAccountsQuery, ListIntegrationsQuery, TestConnector, TriggerSetup,
    PRIMARY_LABEL, STATUS_ACTIVE,
};

/// Operations the SDK needs from the backend.
///
/// Missing resources surface as `SdkError::NotFound`.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn list_actions(&self, query: &ListActionsQuery) -> Result<Vec<Action>>;

    async fn get_action(&self, action_name: &str) -> Result<Action>;

    /// Execute an action; the raw response body is returned
    async fn execute_action(&self, action_name: &str, request: &ExecuteActionRequest)
        -> Result<Value>;

    async fn get_app(&self, app_key: &str) -> Result<App>;

    async fn list_integrations(&self, query: &ListIntegrationsQuery) -> Result<IntegrationList>;

    async fn get_integration(&self, integration_id: &str) -> Result<Integration>;

    async fn create_integration(&self, request: &CreateIntegrationRequest) -> Result<Integration>;

    async fn delete_integration(&self, integration_id: &str) -> Result<()>;

    async fn list_connected_accounts(
        &self,
        query: &ListConnectedAccountsQuery,
    ) -> Result<ConnectedAccountList>;

    async fn get_connected_account(&self, connected_account_id: &str) -> Result<ConnectedAccount>;

    async fn initiate_connection(
        &self,
        request: &InitiateConnectionRequest,
    ) -> Result<ConnectionRequest>;

    async fn setup_trigger(
        &self,
        connected_account_id: &str,
        trigger_name: &str,
        config: &Value,
    ) -> Result<TriggerSetup>;

    async fn disable_trigger(&self, trigger_id: &str) -> Result<()>;

    async fn list_active_triggers(&self, connected_account_ids: &[String])
        -> Result<Vec<ActiveTrigger>>;
}
