use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use trialtower_agent::AgentClient;
use trialtower_core::{MainConfig, SessionRegistry};
use trialtower_warehouse::{Loaders, WarehouseClient};

use crate::routes::ApiError;

/// Shared application state accessible from all route handlers.
///
/// Backend handles are optional: a misconfigured warehouse or agent keeps
/// its construction error here and the routes that need it answer 503,
/// while the rest of the server stays up.
#[derive(Clone)]
pub struct AppState {
    pub loaders: Option<Arc<Loaders>>,
    pub warehouse_error: Option<String>,
    pub agent: Option<Arc<AgentClient>>,
    pub agent_name: Option<String>,
    pub agent_error: Option<String>,
    pub sessions: Arc<SessionRegistry>,
    pub playbook_path: Option<PathBuf>,
}

impl AppState {
    pub fn from_config(config: &MainConfig) -> Self {
        let (loaders, warehouse_error) = match &config.warehouse {
            Some(settings) => match WarehouseClient::new(settings.clone()) {
                Ok(client) => (Some(Arc::new(Loaders::new(client))), None),
                Err(e) => {
                    tracing::error!(error = %e, "warehouse unavailable, starting degraded");
                    (None, Some(e.to_string()))
                }
            },
            None => (None, Some("warehouse is not configured".to_string())),
        };

        let (agent, agent_name, agent_error) = match &config.agent {
            Some(section) => {
                match AgentClient::new(&section.host, &section.token, section.settings.clone()) {
                    Ok(client) => (
                        Some(Arc::new(client)),
                        Some(section.settings.agent.clone()),
                        None,
                    ),
                    Err(e) => {
                        tracing::error!(error = %e, "agent unavailable, starting degraded");
                        (None, None, Some(e.to_string()))
                    }
                }
            }
            None => (None, None, Some("agent is not configured".to_string())),
        };

        Self {
            loaders,
            warehouse_error,
            agent,
            agent_name,
            agent_error,
            sessions: Arc::new(SessionRegistry::new(Duration::from_secs(
                config.server.session_ttl_seconds,
            ))),
            playbook_path: config.docs.playbook_path.clone(),
        }
    }

    pub fn loaders(&self) -> Result<&Arc<Loaders>, ApiError> {
        self.loaders.as_ref().ok_or_else(|| {
            ApiError::unavailable(
                self.warehouse_error
                    .as_deref()
                    .unwrap_or("warehouse is not configured"),
            )
        })
    }

    pub fn agent(&self) -> Result<&Arc<AgentClient>, ApiError> {
        self.agent.as_ref().ok_or_else(|| {
            ApiError::unavailable(
                self.agent_error
                    .as_deref()
                    .unwrap_or("agent is not configured"),
            )
        })
    }
}
