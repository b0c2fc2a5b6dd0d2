use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_API_PREFIX: &str = "/api/admin";
pub const DEFAULT_TOKEN_HEADER: &str = "X-Admin-Token";
pub const DEFAULT_MAX_KEYWORD_CHARS: usize = 64;

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Where the admin API lives and how the token is sent
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_prefix: Option<String>,
    #[serde(default)]
    pub token_header: Option<String>,
    /// No client-side timeout when unset
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ServerConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn api_prefix(&self) -> &str {
        self.api_prefix.as_deref().unwrap_or(DEFAULT_API_PREFIX)
    }

    pub fn token_header(&self) -> &str {
        self.token_header.as_deref().unwrap_or(DEFAULT_TOKEN_HEADER)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchConfig {
    #[serde(default)]
    pub discard_stale: Option<bool>,
    #[serde(default)]
    pub max_keyword_chars: Option<usize>,
}

impl SearchConfig {
    pub fn discard_stale(&self) -> bool {
        self.discard_stale.unwrap_or(true)
    }

    pub fn max_keyword_chars(&self) -> usize {
        self.max_keyword_chars.unwrap_or(DEFAULT_MAX_KEYWORD_CHARS)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl AuditConfig {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| Path::new(".adminctl").join("audit"))
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.adminctl/config.local.toml) > project (.adminctl/config.toml) > user (~/.adminctl/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".adminctl").join("config.toml");
            if user_config.exists() {
                config.merge(Self::load_from(&user_config)?);
            }
        }

        config.merge_project(Path::new("."))?;
        Ok(config)
    }

    /// Merge the project and local layers found under `root`
    fn merge_project(&mut self, root: &Path) -> Result<()> {
        let dir = root.join(".adminctl");
        for name in ["config.toml", "config.local.toml"] {
            let path = dir.join(name);
            if path.exists() {
                self.merge(Self::load_from(&path)?);
            }
        }
        Ok(())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes priority for every field it sets)
    pub fn merge(&mut self, other: Config) {
        if other.server.base_url.is_some() {
            self.server.base_url = other.server.base_url;
        }
        if other.server.api_prefix.is_some() {
            self.server.api_prefix = other.server.api_prefix;
        }
        if other.server.token_header.is_some() {
            self.server.token_header = other.server.token_header;
        }
        if other.server.timeout_ms.is_some() {
            self.server.timeout_ms = other.server.timeout_ms;
        }

        if other.search.discard_stale.is_some() {
            self.search.discard_stale = other.search.discard_stale;
        }
        if other.search.max_keyword_chars.is_some() {
            self.search.max_keyword_chars = other.search.max_keyword_chars;
        }

        if other.audit.enabled.is_some() {
            self.audit.enabled = other.audit.enabled;
        }
        if other.audit.dir.is_some() {
            self.audit.dir = other.audit.dir;
        }
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let base_url = self.server.base_url();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "server.base_url".to_string(),
                message: format!("Expected an http:// or https:// URL, got '{}'", base_url),
            });
        }

        let prefix = self.server.api_prefix();
        if !prefix.starts_with('/') || prefix.trim_matches('/').is_empty() {
            errors.push(ValidationError {
                field: "server.api_prefix".to_string(),
                message: format!("Expected a path such as '/api/admin', got '{}'", prefix),
            });
        }

        let header = self.server.token_header();
        if header.is_empty() || header.chars().any(|c| c.is_whitespace() || c == ':') {
            errors.push(ValidationError {
                field: "server.token_header".to_string(),
                message: format!("Invalid header name '{}'", header),
            });
        }

        if self.server.timeout_ms == Some(0) {
            errors.push(ValidationError {
                field: "server.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.search.max_keyword_chars() == 0 {
            errors.push(ValidationError {
                field: "search.max_keyword_chars".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
