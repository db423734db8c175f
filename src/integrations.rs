//! Integration resource: reusable auth/connector configurations for an app

use crate::backend::{
    BackendApi, CreateIntegrationRequest, Integration, IntegrationList, ListIntegrationsQuery,
};
use crate::core::{Result, ValidationError};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Parameters for creating an integration
#[derive(Debug, Clone, Default)]
pub struct NewIntegration {
    pub name: String,
    pub app_id: String,
    /// e.g. `OAUTH2`, `API_KEY`
    pub auth_scheme: Option<String>,
    pub auth_config: Option<Map<String, Value>>,
    /// Use platform-managed credentials instead of the caller's own
    pub use_composio_auth: bool,
}

impl NewIntegration {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = ValidationError::new();
        if self.name.trim().is_empty() {
            violations.push("name", "must not be empty");
        }
        if self.app_id.trim().is_empty() {
            violations.push("app_id", "must not be empty");
        }
        if let Some(scheme) = &self.auth_scheme {
            if scheme.trim().is_empty() {
                violations.push("auth_scheme", "must not be blank when given");
            }
        }
        violations.into_result()
    }
}

/// Access to the integrations endpoints
#[derive(Clone)]
pub struct Integrations {
    backend: Arc<dyn BackendApi>,
}

impl Integrations {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self { backend }
    }

    pub async fn list(&self, query: &ListIntegrationsQuery) -> Result<IntegrationList> {
        self.backend.list_integrations(query).await
    }

    pub async fn get(&self, integration_id: &str) -> Result<Integration> {
        require_id(integration_id)?;
        self.backend.get_integration(integration_id).await
    }

    /// Input fields a connection through this integration expects
    pub async fn get_required_params(&self, integration_id: &str) -> Result<Vec<Value>> {
        Ok(self.get(integration_id).await?.expected_input_fields)
    }

    /// Create an integration. The backend is always asked for a fresh one,
    /// never a reused match.
    pub async fn create(&self, params: NewIntegration) -> Result<Integration> {
        params.validate()?;
        debug!(
            "creating integration '{}' for app {} (scheme: {:?}, managed auth: {})",
            params.name, params.app_id, params.auth_scheme, params.use_composio_auth
        );
        let request = CreateIntegrationRequest {
            name: params.name,
            app_id: params.app_id,
            auth_scheme: params.auth_scheme,
            auth_config: params.auth_config.unwrap_or_default(),
            use_composio_auth: params.use_composio_auth,
            force_new_integration: true,
        };
        self.backend.create_integration(&request).await
    }

    pub async fn delete(&self, integration_id: &str) -> Result<()> {
        require_id(integration_id)?;
        self.backend.delete_integration(integration_id).await
    }
}

fn require_id(integration_id: &str) -> Result<(), ValidationError> {
    if integration_id.trim().is_empty() {
        return Err(ValidationError::single("integration_id", "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::testing::StubBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_defaults_auth_config_and_forces_new() {
        let backend = Arc::new(StubBackend::new());
        let integrations = Integrations::new(backend.clone());

        let created = integrations
            .create(NewIntegration {
                name: "integration_x".to_string(),
                app_id: "app-github".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.name, "integration_x");
        let requests = backend.created_integrations();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].auth_config.is_empty());
        assert!(requests[0].force_new_integration);
        assert!(requests[0].auth_scheme.is_none());
    }

    #[tokio::test]
    async fn test_create_reports_all_missing_fields() {
        let integrations = Integrations::new(Arc::new(StubBackend::new()));
        let err = integrations
            .create(NewIntegration {
                auth_scheme: Some(" ".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        match err {
            crate::core::SdkError::Validation(v) => {
                assert_eq!(v.fields(), vec!["name", "app_id", "auth_scheme"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_required_params_come_from_integration() {
        let backend = StubBackend::new().with_integration(Integration {
            id: "int_1".to_string(),
            name: "gh".to_string(),
            expected_input_fields: vec![json!({"name": "api_key", "required": true})],
            ..Default::default()
        });
        let integrations = Integrations::new(Arc::new(backend));

        let fields = integrations.get_required_params("int_1").await.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0]["name"], "api_key");
    }

    #[tokio::test]
    async fn test_missing_integration_is_not_found() {
        let integrations = Integrations::new(Arc::new(StubBackend::new()));
        let err = integrations.get("int_missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_filters_by_app_name() {
        let backend = StubBackend::new()
            .with_integration(Integration {
                id: "int_1".to_string(),
                app_name: Some("github".to_string()),
                ..Default::default()
            })
            .with_integration(Integration {
                id: "int_2".to_string(),
                app_name: Some("slack".to_string()),
                ..Default::default()
            });
        let integrations = Integrations::new(Arc::new(backend));

        let list = integrations
            .list(&ListIntegrationsQuery {
                app_name: Some("slack".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].id, "int_2");
    }

    #[tokio::test]
    async fn test_delete_removes_integration() {
        let backend = Arc::new(StubBackend::new().with_integration(Integration {
            id: "int_1".to_string(),
            ..Default::default()
        }));
        let integrations = Integrations::new(backend.clone());

        integrations.delete("int_1").await.unwrap();
        assert!(integrations.get("int_1").await.is_err());
    }
}
