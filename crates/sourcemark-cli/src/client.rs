//! HTTP client for the query execution backend.

use crate::CliError;
use sourcemark_core::{BackendConfig, ExecuteRequest, ExecuteResponse};

const LOG_TARGET: &str = "sourcemark::client";

/// Blocking client posting execution requests.
pub struct BackendClient {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl BackendClient {
    /// Create a client for `config`, optionally overriding its endpoint.
    pub fn new(config: &BackendConfig, endpoint: Option<String>) -> Result<Self, CliError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| config.endpoint.clone()),
        })
    }

    /// URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute a query and decode the result table.
    pub fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, CliError> {
        log::debug!(
            target: LOG_TARGET,
            "POST {} ({} sources, {} arguments)",
            self.endpoint,
            request.sources.len(),
            request.arguments.len()
        );

        let resp = self.client.post(&self.endpoint).json(request).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(CliError::Backend {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json()?)
    }
}
