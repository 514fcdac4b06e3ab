//! # CiviCRM REST adapter
//!
//! HTTP client for the CRM's API v3 REST endpoint. Each call is a form POST
//! carrying `entity`, `action`, the JSON-encoded parameters and the
//! api/site keys. Calls are awaited one at a time; the migration never
//! issues concurrent writes.

use super::{RecordStore, StoreError, StoreResult};
use crate::config::CrmConfig;
use crate::error::{MigrationError, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, info};

pub struct CiviRestStore {
    client: Client,
    endpoint: Url,
    api_key: String,
    site_key: String,
}

impl std::fmt::Debug for CiviRestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiviRestStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"[MASKED]")
            .finish()
    }
}

impl CiviRestStore {
    pub fn new(config: &CrmConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            MigrationError::configuration(format!("Invalid CRM base URL '{}': {e}", config.base_url))
        })?;
        let endpoint = base.join(&config.rest_path).map_err(|e| {
            MigrationError::configuration(format!("Invalid CRM REST path '{}': {e}", config.rest_path))
        })?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("velt-migration/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MigrationError::configuration(format!("Failed to create HTTP client: {e}")))?;

        info!(endpoint = %endpoint, "Created CiviCRM REST store");

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            site_key: config.site_key.clone(),
        })
    }
}

#[async_trait]
impl RecordStore for CiviRestStore {
    async fn call(&self, entity: &str, action: &str, params: Value) -> StoreResult<Value> {
        let json_params = serde_json::to_string(&params)
            .map_err(|e| StoreError::Transport(format!("Failed to encode parameters: {e}")))?;

        debug!(entity, action, params = %json_params, "CRM API call");

        let form = [
            ("entity", entity),
            ("action", action),
            ("json", json_params.as_str()),
            ("api_key", self.api_key.as_str()),
            ("key", self.site_key.as_str()),
        ];

        let response = self
            .client
            .post(self.endpoint.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::Transport(format!("HTTP {status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::invalid_response(entity, action, e.to_string()))?;

        check_api_error(entity, action, body)
    }
}

/// Turn an `is_error: 1` envelope into [`StoreError::Rejected`]
fn check_api_error(entity: &str, action: &str, body: Value) -> StoreResult<Value> {
    let is_error = body
        .get("is_error")
        .and_then(super::as_i64)
        .unwrap_or(0);
    if is_error != 0 {
        let message = body
            .get("error_message")
            .and_then(Value::as_str)
            .unwrap_or("unknown API error")
            .to_string();
        return Err(StoreError::rejected(entity, action, message));
    }
    Ok(body)
}
