//! Workspace configuration.
//!
//! Loads, validates, and resolves `edit/config.json`. The LM command can be
//! overridden per invocation; precedence is `--lm`, then `PEDIT_LM_COMMAND`,
//! then the config file.
use super::WorkspacePaths;
use crate::error::WorkflowError;
use crate::util::write_json_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const LM_COMMAND_ENV: &str = "PEDIT_LM_COMMAND";

const DEFAULT_LM_COMMAND: &str = "claude -p";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_CANDIDATE_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum GatewaySettings {
    /// Local command reading the prompt on stdin.
    Command { command: String },
    /// OpenAI-compatible chat-completions endpoint.
    Http {
        endpoint: String,
        api_key_env: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditConfig {
    pub schema_version: u32,
    pub gateway: GatewaySettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_candidate_limit() -> usize {
    DEFAULT_CANDIDATE_LIMIT
}

impl EditConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Gateway settings after applying the per-invocation overrides.
    pub fn resolved_gateway(&self, lm_flag: Option<&str>) -> GatewaySettings {
        let override_command = lm_flag
            .map(str::to_string)
            .or_else(|| env::var(LM_COMMAND_ENV).ok())
            .filter(|command| !command.trim().is_empty());
        match override_command {
            Some(command) => GatewaySettings::Command { command },
            None => self.gateway.clone(),
        }
    }
}

/// Build the default config written by `pedit init`.
pub fn default_config() -> EditConfig {
    EditConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        gateway: GatewaySettings::Command {
            command: DEFAULT_LM_COMMAND.to_string(),
        },
        model: None,
        timeout_secs: DEFAULT_TIMEOUT_SECS,
        max_attempts: DEFAULT_MAX_ATTEMPTS,
        candidate_limit: DEFAULT_CANDIDATE_LIMIT,
    }
}

/// Load `edit/config.json`, falling back to defaults when it is absent.
pub fn load_config(paths: &WorkspacePaths) -> Result<EditConfig> {
    let path = paths.config_path();
    if !path.is_file() {
        return Ok(default_config());
    }
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: EditConfig = serde_json::from_slice(&bytes)
        .map_err(|err| WorkflowError::Configuration(format!("parse {}: {err}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(paths: &WorkspacePaths, config: &EditConfig) -> Result<()> {
    write_json_atomic(&paths.config_path(), config)
}

/// Validate schema version and limits.
pub fn validate_config(config: &EditConfig) -> Result<()> {
    let fail = |message: String| -> Result<()> { Err(WorkflowError::Configuration(message).into()) };
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return fail(format!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.timeout_secs == 0 {
        return fail("timeout_secs must be positive".to_string());
    }
    if config.max_attempts == 0 {
        return fail("max_attempts must be positive".to_string());
    }
    if config.candidate_limit == 0 {
        return fail("candidate_limit must be positive".to_string());
    }
    match &config.gateway {
        GatewaySettings::Command { command } if command.trim().is_empty() => {
            fail("gateway command must be non-empty".to_string())
        }
        GatewaySettings::Http {
            endpoint,
            api_key_env,
        } if endpoint.trim().is_empty() || api_key_env.trim().is_empty() => {
            fail("http gateway needs endpoint and api_key_env".to_string())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new(temp.path().to_path_buf());
        assert_eq!(load_config(&paths).unwrap(), default_config());
    }

    #[test]
    fn write_then_load_preserves_settings() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new(temp.path().to_path_buf());
        let mut config = default_config();
        config.gateway = GatewaySettings::Http {
            endpoint: "https://api.example.com/v1/chat/completions".to_string(),
            api_key_env: "EXAMPLE_KEY".to_string(),
        };
        config.model = Some("small-model".to_string());
        write_config(&paths, &config).unwrap();
        assert_eq!(load_config(&paths).unwrap(), config);
    }

    #[test]
    fn omitted_limits_take_defaults() {
        let config: EditConfig = serde_json::from_str(
            r#"{"schema_version": 1, "gateway": {"kind": "command", "command": "llm"}}"#,
        )
        .unwrap();
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.candidate_limit, 1000);
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let mut config = default_config();
        config.max_attempts = 0;
        assert!(validate_config(&config).is_err());

        let mut config = default_config();
        config.schema_version = 9;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            crate::error::workflow_error(&err),
            Some(WorkflowError::Configuration(_))
        ));

        let mut config = default_config();
        config.gateway = GatewaySettings::Command {
            command: "  ".to_string(),
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn lm_flag_overrides_configured_gateway() {
        let config = default_config();
        let resolved = config.resolved_gateway(Some("llm -m tiny"));
        assert_eq!(
            resolved,
            GatewaySettings::Command {
                command: "llm -m tiny".to_string()
            }
        );
    }
}
