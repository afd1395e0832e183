use std::pin::Pin;

use anyhow::{anyhow, Context, Result};
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use trialtower_schema::{AgentEvent, Message};

use crate::sse;

/// Which remote agent to address, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    pub database: String,
    pub schema: String,
    pub agent: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Optional compute warehouse override, forwarded as a request header.
    #[serde(default)]
    pub warehouse: Option<String>,
    /// Optional role override, forwarded as a request header.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

fn default_model() -> String {
    "claude-4-sonnet".to_string()
}

fn default_verify_ssl() -> bool {
    true
}

impl AgentSettings {
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(anyhow!("agent.database must not be empty"));
        }
        if self.schema.trim().is_empty() {
            return Err(anyhow!("agent.schema must not be empty"));
        }
        if self.agent.trim().is_empty() {
            return Err(anyhow!("agent.agent must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(anyhow!("agent.model must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

/// Streaming client for the warehouse-hosted agent run endpoint.
#[derive(Debug)]
pub struct AgentClient {
    client: reqwest::Client,
    run_url: String,
    token: String,
    settings: AgentSettings,
}

impl AgentClient {
    /// Agent responses can legitimately stream for minutes, so unlike the
    /// SQL client this one sets no request timeout.
    pub fn new(host: &str, token: &str, settings: AgentSettings) -> Result<Self> {
        let base = format!("https://{host}");
        Self::with_base_url(&base, token, settings)
    }

    pub fn with_base_url(base_url: &str, token: &str, settings: AgentSettings) -> Result<Self> {
        settings.validate()?;
        if token.trim().is_empty() {
            return Err(anyhow!("agent token must not be empty"));
        }

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()
            .context("failed to build agent HTTP client")?;

        let run_url = format!(
            "{}/api/v2/databases/{}/schemas/{}/agents/{}:run",
            base_url.trim_end_matches('/'),
            settings.database,
            settings.schema,
            settings.agent,
        );

        Ok(Self {
            client,
            run_url,
            token: token.to_string(),
            settings,
        })
    }

    pub fn agent_name(&self) -> &str {
        &self.settings.agent
    }

    /// Send a conversation and stream back the agent's typed events.
    ///
    /// The caller owns transcript bookkeeping; this only moves bytes and
    /// decodes frames.
    pub async fn run(
        &self,
        messages: &[Message],
    ) -> Result<Pin<Box<dyn Stream<Item = Result<AgentEvent>> + Send>>> {
        let body = RunRequest {
            model: &self.settings.model,
            messages,
        };

        let mut request = self
            .client
            .post(&self.run_url)
            .bearer_auth(&self.token)
            .header("Accept", "text/event-stream")
            .json(&body);
        if let Some(warehouse) = &self.settings.warehouse {
            request = request.header("X-Warehouse", warehouse);
        }
        if let Some(role) = &self.settings.role {
            request = request.header("X-Role", role);
        }

        tracing::debug!(url = %self.run_url, messages = messages.len(), "starting agent run");
        let response = request
            .send()
            .await
            .context("agent run request failed to send")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("agent request failed ({status}): {body}"));
        }

        Ok(Box::pin(sse::event_stream(response.bytes_stream())))
    }
}
