use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment, File};
use kode::agent::AgentConfig;
use kode::providers::configs::{
    AnthropicProviderConfig, ANTHROPIC_DEFAULT_HOST, ANTHROPIC_DEFAULT_MODEL,
};
use kode::systems::developer::DEFAULT_TIMEOUT_MS;
use kode::truncation::MAX_TOOL_RESULT_CHARS;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Read as the api key when neither the config file nor `KODE_PROVIDER__API_KEY` set one
pub const FALLBACK_API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub workdir: PathBuf,
    pub max_depth: usize,
    pub max_tool_result_chars: usize,
    pub bash_timeout_ms: u64,
    pub provider: ProviderSettings,
}

/// Values given on the command line; they win over every other source
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub workdir: Option<PathBuf>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub host: Option<String>,
    pub max_depth: Option<usize>,
}

impl Settings {
    /// Layer defaults, the config file, `KODE_*` variables and `overrides`, in that order
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("workdir", ".")?
            .set_default("max_depth", 1_i64)?
            .set_default("max_tool_result_chars", MAX_TOOL_RESULT_CHARS as i64)?
            .set_default("bash_timeout_ms", DEFAULT_TIMEOUT_MS as i64)?
            .set_default("provider.host", ANTHROPIC_DEFAULT_HOST)?
            .set_default("provider.model", ANTHROPIC_DEFAULT_MODEL)?;

        if let Ok(api_key) = std::env::var(FALLBACK_API_KEY_VAR) {
            builder = builder.set_default("provider.api_key", api_key)?;
        }

        match config_file {
            Some(path) => builder = builder.add_source(File::from(path).required(true)),
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }

        let config = builder
            .add_source(
                Environment::with_prefix("KODE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option(
                "workdir",
                overrides.workdir.as_ref().map(|p| p.display().to_string()),
            )?
            .set_override_option("max_depth", overrides.max_depth.map(|d| d as i64))?
            .set_override_option("provider.model", overrides.model.clone())?
            .set_override_option("provider.api_key", overrides.api_key.clone())?
            .set_override_option("provider.host", overrides.host.clone())?
            .build()?;

        let settings: Settings = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // "missing field `name`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .split('`')
                        .next()
                        .unwrap_or_default();
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                } else if let config::ConfigError::NotFound(field) = &err {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                }
                return Err(ConfigError::Other(err));
            }
        };

        if settings
            .provider
            .api_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty())
        {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }
        Ok(settings)
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            workdir: self.workdir.clone(),
            max_depth: self.max_depth,
            max_tool_result_chars: self.max_tool_result_chars,
            bash_timeout_ms: self.bash_timeout_ms,
        }
    }

    pub fn provider_config(&self) -> AnthropicProviderConfig {
        AnthropicProviderConfig {
            host: self.provider.host.clone(),
            api_key: self.provider.api_key.clone().unwrap_or_default(),
            model: self.provider.model.clone(),
            temperature: self.provider.temperature,
            max_tokens: self.provider.max_tokens,
        }
    }
}

/// `~/.config/kode/config.toml` or the platform equivalent
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kode").join("config.toml"))
}
