//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.haven/config.json`) and environment.
//! Every field has a default, so an empty `{}` file is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::history::HistoryMerge;
use crate::rag::ChunkingStrategy;

/// Backend URL used when neither config nor HAVEN_API_URL set one.
pub const DEFAULT_API_URL: &str = "http://localhost:8001";

/// Agent type sent with every session and chat request.
pub const DEFAULT_AGENT_TYPE: &str = "mental_health";

/// Title given to sessions created without an explicit one.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend location and agent type.
    #[serde(default)]
    pub api: ApiConfig,

    /// Chat view behavior (streaming, history merge, titles).
    #[serde(default)]
    pub chat: ChatConfig,

    /// Document console defaults.
    #[serde(default)]
    pub rag: RagConfig,

    /// Where the login record is kept.
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Backend root, without the `/api/v1` prefix. Overridden by HAVEN_API_URL env.
    pub base_url: Option<String>,

    /// Agent type for session and chat calls (default "mental_health").
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
}

fn default_agent_type() -> String {
    DEFAULT_AGENT_TYPE.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            agent_type: default_agent_type(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Use the streamed endpoint (default true). When false, replies come back in one response.
    #[serde(default = "default_streaming")]
    pub streaming: bool,

    /// What to do when history arrives while local messages already exist.
    #[serde(default)]
    pub history_merge: HistoryMerge,

    /// Title for sessions created lazily on first send.
    #[serde(default = "default_title")]
    pub default_title: String,
}

fn default_streaming() -> bool {
    true
}

fn default_title() -> String {
    DEFAULT_SESSION_TITLE.to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            streaming: default_streaming(),
            history_merge: HistoryMerge::default(),
            default_title: default_title(),
        }
    }
}

/// Document console defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagConfig {
    /// Initial chunking strategy; size/overlap/mode come from the strategy's defaults.
    #[serde(default)]
    pub strategy: ChunkingStrategy,

    /// Comma-separated keywords sent with every upload when non-empty.
    #[serde(default)]
    pub custom_keywords: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Override for the auth record file (default ~/.haven/auth.json).
    pub path: Option<PathBuf>,
}

/// Resolve the backend URL: env HAVEN_API_URL overrides config, then the default.
pub fn resolve_api_url(config: &Config) -> String {
    std::env::var("HAVEN_API_URL")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .api
                .base_url
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Root of the per-user data directory (~/.haven).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".haven"))
        .unwrap_or_else(|| PathBuf::from(".haven"))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("HAVEN_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_data_dir().join("config.json"))
}

/// Resolve the auth record path: `auth.path` if set (relative to the config file's parent), else `auth.json` beside the config.
pub fn resolve_auth_path(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.auth.path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                config_parent.join(p)
            }
        }
        _ => config_parent.join("auth.json"),
    }
}

/// Load config from the given path (or HAVEN_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
