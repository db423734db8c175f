//! `reqwest` implementation of [`BackendApi`]

use super::models::*;
use super::BackendApi;
use crate::config::ClientConfig;
use crate::core::{ErrorCode, Result, SdkError};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

const API_KEY_HEADER: &str = "x-api-key";

/// Backend client speaking JSON over HTTP
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(SdkError::from)?;
        Self::with_client(client, &config.base_url, config.api_key.clone())
    }

    pub fn with_client(client: Client, base_url: &str, api_key: SecretString) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            crate::core::ValidationError::single("base_url", format!("{}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(
                crate::core::ValidationError::single("base_url", "cannot be used as a base URL")
                    .into(),
            );
        }
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SdkError::unknown("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("backend request: {} {}", method, url);
        self.client
            .request(method, url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::from_status(status.as_u16(), &body));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return serde_json::from_value(Value::Null).map_err(|e| {
                SdkError::upstream(
                    ErrorCode::BackendBadRequest,
                    Some(status.as_u16()),
                    format!("Empty response body: {}", e),
                )
            });
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            SdkError::upstream(
                ErrorCode::BackendBadRequest,
                Some(status.as_u16()),
                format!("Failed to decode response: {}", e),
            )
        })
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn get_with_query<T, Q>(&self, segments: &[&str], query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.url(segments)?;
        self.send(self.request(Method::GET, url).query(query)).await
    }

    async fn post<T, B>(&self, segments: &[&str], body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(segments)?;
        self.send(self.request(Method::POST, url).json(body)).await
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn list_actions(&self, query: &ListActionsQuery) -> Result<Vec<Action>> {
        let list: ActionList = self
            .get_with_query(&["api", "v2", "actions", "list", "all"], query)
            .await?;
        Ok(list.items)
    }

    async fn get_action(&self, action_name: &str) -> Result<Action> {
        self.get(&["api", "v2", "actions", action_name]).await
    }

    async fn execute_action(
        &self,
        action_name: &str,
        request: &ExecuteActionRequest,
    ) -> Result<Value> {
        self.post(&["api", "v2", "actions", action_name, "execute"], request)
            .await
    }

    async fn get_app(&self, app_key: &str) -> Result<App> {
        self.get(&["api", "v1", "apps", app_key]).await
    }

    async fn list_integrations(&self, query: &ListIntegrationsQuery) -> Result<IntegrationList> {
        self.get_with_query(&["api", "v1", "integrations"], query)
            .await
    }

    async fn get_integration(&self, integration_id: &str) -> Result<Integration> {
        self.get(&["api", "v1", "integrations", integration_id]).await
    }

    async fn create_integration(&self, request: &CreateIntegrationRequest) -> Result<Integration> {
        self.post(&["api", "v1", "integrations"], request).await
    }

    async fn delete_integration(&self, integration_id: &str) -> Result<()> {
        let url = self.url(&["api", "v1", "integrations", integration_id])?;
        let _: Value = self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn list_connected_accounts(
        &self,
        query: &ListConnectedAccountsQuery,
    ) -> Result<ConnectedAccountList> {
        self.get_with_query(&["api", "v1", "connectedAccounts"], query)
            .await
    }

    async fn get_connected_account(&self, connected_account_id: &str) -> Result<ConnectedAccount> {
        self.get(&["api", "v1", "connectedAccounts", connected_account_id])
            .await
    }

    async fn initiate_connection(
        &self,
        request: &InitiateConnectionRequest,
    ) -> Result<ConnectionRequest> {
        self.post(&["api", "v1", "connectedAccounts"], request).await
    }

    async fn setup_trigger(
        &self,
        connected_account_id: &str,
        trigger_name: &str,
        config: &Value,
    ) -> Result<TriggerSetup> {
        self.post(
            &["api", "v1", "triggers", "enable", connected_account_id, trigger_name],
            &json!({ "triggerConfig": config }),
        )
        .await
    }

    async fn disable_trigger(&self, trigger_id: &str) -> Result<()> {
        let _: Value = self
            .post(&["api", "v1", "triggers", "disable", trigger_id], &json!({}))
            .await?;
        Ok(())
    }

    async fn list_active_triggers(
        &self,
        connected_account_ids: &[String],
    ) -> Result<Vec<ActiveTrigger>> {
        let list: ActiveTriggerList = self
            .get_with_query(
                &["api", "v1", "triggers", "active_triggers"],
                &[("connectedAccountIds", connected_account_ids.join(","))],
            )
            .await?;
        Ok(list.triggers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::with_client(Client::new(), base, SecretString::from("k".to_string())).unwrap()
    }

    #[test]
    fn test_url_joins_and_encodes_segments() {
        let backend = backend("https://example.test/");
        let url = backend.url(&["api", "v1", "apps", "my app"]).unwrap();
        assert_eq!(url.as_str(), "https://example.test/api/v1/apps/my%20app");
    }

    #[test]
    fn test_url_keeps_base_path() {
        let backend = backend("https://example.test/proxy");
        let url = backend.url(&["api", "v2", "actions"]).unwrap();
        assert_eq!(url.as_str(), "https://example.test/proxy/api/v2/actions");
    }

    #[test]
    fn test_rejects_non_url_base() {
        let result =
            HttpBackend::with_client(Client::new(), "not a url", SecretString::from("k".to_string()));
        assert!(result.is_err());
    }
}
