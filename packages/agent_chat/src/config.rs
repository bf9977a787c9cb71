use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ChatError;
use crate::protocol;

// =============================================================================
// Tunables (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [server]
//                    url = "https://agents.example.com"
//
//   env var:         AGENT_CHAT_SERVER__URL=https://agents.example.com
//                    (double underscore = nesting)

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Lives under `[server]` in config.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_server_url")]
    pub url: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

/// Lives under `[chat]` in config.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatFileConfig {
    /// Oldest messages are evicted past this many. Unset = unbounded.
    #[serde(default)]
    pub max_log_entries: Option<usize>,
    /// Open a session to the default agent at start-up instead of waiting
    /// for the user to pick one.
    #[serde(default = "default_connect_on_start")]
    pub connect_on_start: bool,
}

impl Default for ChatFileConfig {
    fn default() -> Self {
        Self {
            max_log_entries: None,
            connect_on_start: default_connect_on_start(),
        }
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_connect_on_start() -> bool {
    true
}

/// Layers: struct defaults → `{data_dir}/config.toml` → `AGENT_CHAT_*` env vars.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("AGENT_CHAT_").split("__"))
}

/// Resolved runtime configuration, built once at start-up and passed down.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub server_url: Url,
    pub max_log_entries: Option<usize>,
    pub connect_on_start: bool,
}

impl ChatConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self, ChatError> {
        Ok(Self {
            server_url: protocol::parse_base_url(&fc.server.url)?,
            max_log_entries: fc.chat.max_log_entries,
            connect_on_start: fc.chat.connect_on_start,
        })
    }
}

// =============================================================================
// Directory layout (not tunable via figment, derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct AppDirs {
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl AppDirs {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".agent_chat"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        Ok(Self { data_dir, logs_dir })
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir.join("agent-chat.log")
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
