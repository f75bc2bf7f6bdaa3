use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub auth: AuthConfig,

    pub extraction: ExtractionConfig,

    pub storage: StorageConfig,

    pub email: EmailConfig,

    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/factura.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC signing secret for bearer tokens. Falls back to the JWT_SECRET
    /// environment variable when left empty.
    pub jwt_secret: String,

    /// Token lifetime in days (default: 7)
    pub token_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_days: 7,
        }
    }
}

impl AuthConfig {
    /// Effective signing secret, preferring the config value over the
    /// environment.
    #[must_use]
    pub fn secret(&self) -> String {
        if self.jwt_secret.is_empty() {
            std::env::var("JWT_SECRET").unwrap_or_default()
        } else {
            self.jwt_secret.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub api_base_url: String,

    /// API key for the vision service. Falls back to OPENAI_API_KEY when
    /// left empty.
    pub api_key: String,

    pub model: String,

    pub max_tokens: u32,

    /// Request timeout in seconds (default: 120)
    pub request_timeout_seconds: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            max_tokens: 3000,
            request_timeout_seconds: 120,
        }
    }
}

impl ExtractionConfig {
    #[must_use]
    pub fn effective_api_key(&self) -> String {
        if self.api_key.is_empty() {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
        } else {
            self.api_key.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub uploads_path: String,

    pub export_json_path: String,

    pub export_xml_path: String,

    /// Maximum accepted upload size in bytes (default: 10 MiB)
    pub max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_path: "data/uploads".to_string(),
            export_json_path: "data/exports/json".to_string(),
            export_xml_path: "data/exports/xml".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Base URL used when building password-reset links.
    pub reset_base_url: String,

    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            reset_base_url: "http://localhost:3000".to_string(),
            from_address: "noreply@factura.local".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// When true, review verdicts are only accepted for invoices currently in
    /// `review` status. Off by default so reviewers can act on any
    /// non-cancelled invoice.
    pub require_review_status: bool,

    /// When true, non-privileged users may only cancel their own invoices.
    pub cancel_requires_ownership: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            require_review_status: false,
            cancel_requires_ownership: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            extraction: ExtractionConfig::default(),
            storage: StorageConfig::default(),
            email: EmailConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("factura").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".factura").join("config.toml"));
        }

        paths
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.token_ttl_days <= 0 {
            anyhow::bail!("Token TTL must be at least one day");
        }

        if self.storage.max_upload_bytes == 0 {
            anyhow::bail!("Maximum upload size must be > 0");
        }

        if self.general.max_db_connections < self.general.min_db_connections {
            anyhow::bail!("max_db_connections must be >= min_db_connections");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.token_ttl_days, 7);
        assert_eq!(config.extraction.model, "gpt-4o");
        assert_eq!(config.storage.max_upload_bytes, 10 * 1024 * 1024);
        assert!(!config.policy.require_review_status);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[extraction]"));
        assert!(toml_str.contains("[policy]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [server]
            port = 8080
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.server.port, 8080);

        assert_eq!(config.extraction.max_tokens, 3000);
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = Config::default();
        config.auth.token_ttl_days = 0;
        assert!(config.validate().is_err());
    }
}
