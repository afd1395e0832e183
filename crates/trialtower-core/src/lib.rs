pub mod config;
pub mod docs;
pub mod session;

pub use config::{load_config, resolve_env_var, AgentSection, DocsConfig, MainConfig, ServerConfig};
pub use docs::{load_playbook, split_chapters, Chapter};
pub use session::{ChatContext, SessionRegistry};
