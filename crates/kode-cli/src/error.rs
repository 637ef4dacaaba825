use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting, set {env_var} or add it to the config file")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// `provider.api_key` -> `KODE_PROVIDER__API_KEY`
pub fn to_env_var(field_path: &str) -> String {
    format!("KODE_{}", field_path.replace('.', "__").to_uppercase())
}
