use std::{fs, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use trialtower_agent::AgentSettings;
use trialtower_warehouse::WarehouseSettings;

/// Agent connection block: where the agent lives and how to authenticate,
/// plus the addressing settings forwarded to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    pub host: String,
    /// Bearer token, usually supplied as `${ENV_VAR}`.
    pub token: String,
    #[serde(flatten)]
    pub settings: AgentSettings,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_session_ttl_seconds() -> u64 {
    1800
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Sessions idle longer than this are evicted.
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_ttl_seconds: default_session_ttl_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocsConfig {
    #[serde(default)]
    pub playbook_path: Option<PathBuf>,
}

/// Top-level config. The warehouse and agent blocks are each optional so the
/// server can come up degraded when one backend is not provisioned; the
/// `validate` command insists on both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainConfig {
    #[serde(default)]
    pub warehouse: Option<WarehouseSettings>,
    #[serde(default)]
    pub agent: Option<AgentSection>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub docs: DocsConfig,
}

impl MainConfig {
    /// Strict validation for the `validate` command: every block present and
    /// internally consistent.
    pub fn validate(&self) -> Result<()> {
        let warehouse = self
            .warehouse
            .as_ref()
            .ok_or_else(|| anyhow!("missing config section: warehouse"))?;
        warehouse.validate()?;

        let agent = self
            .agent
            .as_ref()
            .ok_or_else(|| anyhow!("missing config section: agent"))?;
        if agent.host.trim().is_empty() {
            return Err(anyhow!("agent.host must not be empty"));
        }
        if agent.token.trim().is_empty() {
            return Err(anyhow!("agent.token must not be empty"));
        }
        agent.settings.validate()?;

        if self.server.bind.trim().is_empty() {
            return Err(anyhow!("server.bind must not be empty"));
        }
        Ok(())
    }
}

/// Expand `${NAME}` placeholders from the process environment. An unset
/// variable expands to the empty string; an unclosed placeholder is kept
/// verbatim.
pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

pub fn load_config(path: &Path) -> Result<MainConfig> {
    let mut config: MainConfig = read_yaml_file(path)?;
    resolve_config_env(&mut config);
    Ok(config)
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn resolve_config_env(config: &mut MainConfig) {
    if let Some(warehouse) = &mut config.warehouse {
        warehouse.account = resolve_env_var(&warehouse.account);
        warehouse.user = resolve_env_var(&warehouse.user);
        warehouse.password = resolve_env_var(&warehouse.password);
        warehouse.role = resolve_env_var(&warehouse.role);
        warehouse.warehouse = resolve_env_var(&warehouse.warehouse);
        warehouse.database = resolve_env_var(&warehouse.database);
        warehouse.schema = resolve_env_var(&warehouse.schema);
    }

    if let Some(agent) = &mut config.agent {
        agent.host = resolve_env_var(&agent.host);
        agent.token = resolve_env_var(&agent.token);
        agent.settings.database = resolve_env_var(&agent.settings.database);
        agent.settings.schema = resolve_env_var(&agent.settings.schema);
        agent.settings.agent = resolve_env_var(&agent.settings.agent);
        agent.settings.model = resolve_env_var(&agent.settings.model);
        if let Some(warehouse) = &mut agent.settings.warehouse {
            *warehouse = resolve_env_var(warehouse);
        }
        if let Some(role) = &mut agent.settings.role {
            *role = resolve_env_var(role);
        }
    }
}
