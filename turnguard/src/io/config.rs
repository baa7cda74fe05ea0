//! Turnguard configuration stored in `turnguard.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::Model;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "turnguard.toml";

/// Turnguard configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that
/// work with an Anthropic key in `ANTHROPIC_API_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TurnguardConfig {
    /// Initial value of the user toggle.
    pub enabled: bool,

    pub classifier: ClassifierConfig,

    /// Conversation model reported by the CLI's static host.
    pub active: Option<ActiveModelConfig>,

    pub backend: BackendConfig,

    /// Models the resolver knows about, with the env var holding each key.
    pub models: Vec<ModelEntry>,
}

/// Preferred fast/cheap classification model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Used only when the conversation runs on this same provider.
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveModelConfig {
    pub provider: String,
    pub model: String,
}

impl ActiveModelConfig {
    pub fn to_model(&self) -> Model {
        Model::new(&self.provider, &self.model)
    }
}

/// External command that performs completions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Program and arguments (e.g. `["codex","exec","-"]`). The prompt is piped to stdin.
    pub command: Vec<String>,

    /// Wall-clock budget for one completion in seconds.
    pub timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelEntry {
    pub provider: String,
    pub id: String,
    /// Environment variable holding the API key for this model.
    #[serde(default)]
    pub api_key_env: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-haiku-4-5".to_string(),
            max_tokens: 256,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
                "-".to_string(),
            ],
            timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for TurnguardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            classifier: ClassifierConfig::default(),
            active: Some(ActiveModelConfig {
                provider: "anthropic".to_string(),
                model: "claude-sonnet-4-5".to_string(),
            }),
            backend: BackendConfig::default(),
            models: vec![
                ModelEntry {
                    provider: "anthropic".to_string(),
                    id: "claude-haiku-4-5".to_string(),
                    api_key_env: "ANTHROPIC_API_KEY".to_string(),
                },
                ModelEntry {
                    provider: "anthropic".to_string(),
                    id: "claude-sonnet-4-5".to_string(),
                    api_key_env: "ANTHROPIC_API_KEY".to_string(),
                },
            ],
        }
    }
}

impl TurnguardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.classifier.provider.trim().is_empty() || self.classifier.model.trim().is_empty()
        {
            return Err(anyhow!("classifier.provider and classifier.model must be set"));
        }
        if self.classifier.max_tokens == 0 {
            return Err(anyhow!("classifier.max_tokens must be > 0"));
        }
        if let Some(active) = &self.active
            && (active.provider.trim().is_empty() || active.model.trim().is_empty())
        {
            return Err(anyhow!("active.provider and active.model must be set"));
        }
        if self.backend.command.is_empty() || self.backend.command[0].trim().is_empty() {
            return Err(anyhow!("backend.command must be a non-empty array"));
        }
        if self.backend.timeout_secs == 0 {
            return Err(anyhow!("backend.timeout_secs must be > 0"));
        }
        if self.backend.output_limit_bytes == 0 {
            return Err(anyhow!("backend.output_limit_bytes must be > 0"));
        }
        for (index, entry) in self.models.iter().enumerate() {
            if entry.provider.trim().is_empty() || entry.id.trim().is_empty() {
                return Err(anyhow!("models[{index}] must have a provider and id"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TurnguardConfig::default()`.
pub fn load_config(path: &Path) -> Result<TurnguardConfig> {
    if !path.exists() {
        let cfg = TurnguardConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TurnguardConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TurnguardConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, TurnguardConfig::default());
    }

    #[test]
    fn write_then_load_preserves_custom_backend() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join(DEFAULT_CONFIG_FILE);
        let cfg = TurnguardConfig {
            enabled: false,
            backend: BackendConfig {
                command: vec!["sh".to_string(), "-c".to_string(), "cat".to_string()],
                timeout_secs: 5,
                output_limit_bytes: 1_000,
            },
            ..TurnguardConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[classifier]\nmodel = \"claude-3-5-haiku\"\n").expect("write");

        let cfg = load_config(&path).expect("load");

        assert!(cfg.enabled);
        assert_eq!(cfg.classifier.model, "claude-3-5-haiku");
        assert_eq!(cfg.classifier.provider, "anthropic");
        assert_eq!(cfg.backend, BackendConfig::default());
    }

    #[test]
    fn validate_rejects_empty_command_and_zero_timeout() {
        let mut cfg = TurnguardConfig::default();
        cfg.backend.command = vec![" ".to_string()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("backend.command"));

        let mut cfg = TurnguardConfig::default();
        cfg.backend.timeout_secs = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn load_reports_invalid_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[classifier]\nmax_tokens = 0\n").expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_tokens"));
    }
}
