//! Client configuration and service factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use proctor_core::traits::{ContentService, SubmissionService};
use proctor_core::SessionConfig;

use crate::content::HttpContentService;
use crate::http::{ApiClient, DEFAULT_TIMEOUT_SECS};
use crate::submission::HttpSubmissionService;

/// Top-level proctor configuration.
///
/// Note: Custom Debug impl masks the API token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProctorConfig {
    /// Base URL of the exam API, e.g. `https://exams.example.com`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Transport timeout per request.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub session: SessionSettings,
}

impl std::fmt::Debug for ProctorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProctorConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("session", &self.session)
            .finish()
    }
}

/// Engine tunables as they appear in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_slow_start")]
    pub slow_start_threshold_secs: u64,
    #[serde(default = "default_debounce")]
    pub autosave_debounce_ms: u64,
    #[serde(default = "default_flush_passes")]
    pub flush_passes: u32,
    #[serde(default = "default_section_seconds")]
    pub default_section_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_slow_start() -> u64 {
    15
}
fn default_debounce() -> u64 {
    2000
}
fn default_flush_passes() -> u32 {
    3
}
fn default_section_seconds() -> u64 {
    proctor_core::config::DEFAULT_SECTION_SECONDS
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            slow_start_threshold_secs: default_slow_start(),
            autosave_debounce_ms: default_debounce(),
            flush_passes: default_flush_passes(),
            default_section_seconds: default_section_seconds(),
        }
    }
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_secs: default_timeout(),
            session: SessionSettings::default(),
        }
    }
}

impl ProctorConfig {
    /// Engine configuration derived from the `[session]` table.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            slow_start_threshold: Duration::from_secs(self.session.slow_start_threshold_secs),
            autosave_debounce: Duration::from_millis(self.session.autosave_debounce_ms),
            flush_passes: self.session.flush_passes.max(1),
            default_section_seconds: self.session.default_section_seconds,
            ..SessionConfig::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are copied as-is and never scanned again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `proctor.toml` in the current directory
/// 2. `~/.config/proctor/config.toml`
///
/// Environment variable overrides: `PROCTOR_BASE_URL`, `PROCTOR_API_TOKEN`.
pub fn load_config() -> Result<ProctorConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ProctorConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("proctor.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ProctorConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ProctorConfig::default(),
    };

    Ok(apply_overrides(config, |name| std::env::var(name).ok()))
}

/// Apply `PROCTOR_*` overrides and resolve `${VAR}` references.
fn apply_overrides(
    mut config: ProctorConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ProctorConfig {
    if let Some(url) = lookup("PROCTOR_BASE_URL") {
        config.base_url = url;
    }
    if let Some(token) = lookup("PROCTOR_API_TOKEN") {
        config.api_token = Some(token);
    }
    config.base_url = resolve_env_vars(&config.base_url);
    config.api_token = config
        .api_token
        .as_deref()
        .map(resolve_env_vars)
        .filter(|t| !t.is_empty());
    config
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("proctor"))
}

/// Create the HTTP submission and content services for a configuration.
pub fn create_services(
    config: &ProctorConfig,
) -> Result<(Arc<dyn SubmissionService>, Arc<dyn ContentService>)> {
    let api = ApiClient::new(
        &config.base_url,
        config.api_token.clone(),
        config.request_timeout(),
    )
    .with_context(|| format!("failed to create client for {}", config.base_url))?;
    Ok((
        Arc::new(HttpSubmissionService::new(api.clone())),
        Arc::new(HttpContentService::new(api)),
    ))
}
