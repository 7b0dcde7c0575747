use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{TapCrewError, TapCrewResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the generateContent-style completion API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Model used by text-only roles unless overridden per role.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Model used for grid-overlay vision calls.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    /// Model used for whole-page screenshot reading.
    #[serde(default = "default_page_model")]
    pub page_model: String,
    /// Shared API key. Env vars take precedence (`TAPCREW_<ROLE>_API_KEY`,
    /// then `TAPCREW_API_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-role overrides keyed by role id (e.g. "coordinate_extractor").
    #[serde(default)]
    pub roles: HashMap<String, RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoleEntry {
    /// Model name sent to the API; falls back to the role's default model.
    #[serde(default)]
    pub model: Option<String>,
    /// API key for this role only.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// WebDriver endpoint of the Appium server.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// "android" or "ios".
    #[serde(default = "default_platform")]
    pub platform: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Iteration ceiling enforced by the session runner, not the cycle.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Seconds to wait between iterations.
    #[serde(default = "default_sleep_between")]
    pub sleep_between_secs: u64,
    /// Edge length of a grid overlay cell in pixels.
    #[serde(default = "default_grid_cell_size")]
    pub grid_cell_size: u32,
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_vision_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_page_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_server_url() -> String {
    "http://127.0.0.1:4723".to_string()
}

fn default_platform() -> String {
    "android".to_string()
}

fn default_max_iterations() -> u32 {
    10
}

fn default_sleep_between() -> u64 {
    2
}

fn default_grid_cell_size() -> u32 {
    75
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            default_model: default_model(),
            vision_model: default_vision_model(),
            page_model: default_page_model(),
            api_key: None,
            roles: HashMap::new(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            platform: default_platform(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            sleep_between_secs: default_sleep_between(),
            grid_cell_size: default_grid_cell_size(),
        }
    }
}

fn resolve_config_path() -> TapCrewResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(TapCrewError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> TapCrewResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        server = %config.device.server_url,
        max_iterations = config.session.max_iterations,
        "config loaded"
    );
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> TapCrewResult<()> {
    let path = resolve_config_path()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.session.max_iterations, 10);
        assert_eq!(cfg.session.grid_cell_size, 75);
        assert_eq!(cfg.device.server_url, "http://127.0.0.1:4723");
        assert_eq!(cfg.llm.default_model, "gemini-2.0-flash");
    }

    #[test]
    fn role_override_parses() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [llm.roles.coordinate_extractor]
            model = "gemini-2.5-pro-exp"
            "#,
        )
        .unwrap();
        let role = cfg.llm.roles.get("coordinate_extractor").unwrap();
        assert_eq!(role.model.as_deref(), Some("gemini-2.5-pro-exp"));
        assert!(role.api_key.is_none());
    }
}
