// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Service Configuration Types
//
// Defines the configuration schema for a measure service instance:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - HTTP server binding and the public host/port used in image URLs
// - Storage backend selection (in-memory or PostgreSQL)
// - Vision provider used for reading extraction
// - Observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "measure.io/v1";
pub const KIND: &str = "ServiceConfig";
/// Largest accepted `spec.server.body_limit_mb`.
pub const MAX_BODY_LIMIT_MB: usize = 1024;

/// Top-level Kubernetes-style service configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfigManifest {
    /// API version (must be "measure.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ServiceConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ServiceConfigSpec,
}

/// Alias used throughout the service and CLI
pub type ServiceConfig = ServiceConfigManifest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub vision: VisionConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface the HTTP listener binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Host prefix of generated image URLs, used verbatim (e.g. "http://localhost")
    #[serde(default = "default_public_host")]
    pub public_host: String,

    /// Port of generated image URLs; falls back to `port`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_port: Option<u16>,

    /// Maximum JSON body size in megabytes
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

impl ServerConfig {
    pub fn effective_public_port(&self) -> u16 {
        self.public_port.unwrap_or(self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_kind")]
    pub backend: StorageKind,

    /// PostgreSQL connection string (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionProviderKind {
    Gemini,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_provider")]
    pub provider: VisionProviderKind,

    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_vision_model")]
    pub model: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_public_host() -> String {
    "http://localhost".to_string()
}

fn default_body_limit_mb() -> usize {
    50
}

fn default_storage_kind() -> StorageKind {
    StorageKind::InMemory
}

fn default_max_connections() -> u32 {
    5
}

fn default_vision_provider() -> VisionProviderKind {
    VisionProviderKind::Gemini
}

fn default_vision_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_vision_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            public_host: default_public_host(),
            public_port: None,
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_kind(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: default_vision_provider(),
            endpoint: default_vision_endpoint(),
            model: default_vision_model(),
            api_key: Some("env:GEMINI_API_KEY".to_string()),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ServiceConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "measure-service".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ServiceConfigSpec::default(),
        }
    }
}

/// Resolve "env:VAR_NAME" references; literal values pass through.
pub fn resolve_secret(value: &str) -> Option<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).ok().filter(|v| !v.is_empty()),
        None => Some(value.to_string()),
    }
}

impl ServiceConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. MEASURE_CONFIG_PATH environment variable
    /// 2. ./measure-config.yaml (working directory)
    /// 3. ~/.measure/config.yaml (user home)
    /// 4. /etc/measure/config.yaml (Unix) or C:\ProgramData\Measure\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("MEASURE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./measure-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".measure").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/measure/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Measure\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SERVER_HOST") {
            tracing::info!("Environment override: SERVER_HOST={}", host);
            self.spec.server.public_host = host;
        }

        if let Ok(val) = std::env::var("SERVER_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: SERVER_PORT={}", port);
                    self.spec.server.port = port;
                    self.spec.server.public_port = Some(port);
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for SERVER_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            tracing::info!("Environment override: DATABASE_URL (postgres backend)");
            self.spec.storage.backend = StorageKind::Postgres;
            self.spec.storage.database_url = Some(url);
        }

        if std::env::var("GEMINI_API_KEY").is_ok() && self.spec.vision.api_key.is_none() {
            self.spec.vision.api_key = Some("env:GEMINI_API_KEY".to_string());
        }
    }

    /// Storage backend selected by this configuration
    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.spec.storage.backend {
            StorageKind::InMemory => Ok(StorageBackend::InMemory),
            StorageKind::Postgres => {
                let raw = self
                    .spec
                    .storage
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("spec.storage.database_url is required for the postgres backend"))?;
                let connection_string = resolve_secret(raw)
                    .ok_or_else(|| anyhow::anyhow!("database_url reference '{}' is not set", raw))?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string,
                    max_connections: self.spec.storage.max_connections,
                }))
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.server.port == 0 {
            anyhow::bail!("spec.server.port cannot be 0");
        }

        if self.spec.server.body_limit_mb == 0 {
            anyhow::bail!("spec.server.body_limit_mb must be positive");
        }

        if self.spec.server.body_limit_mb > MAX_BODY_LIMIT_MB {
            anyhow::bail!(
                "spec.server.body_limit_mb must be at most {}",
                MAX_BODY_LIMIT_MB
            );
        }

        if self.spec.storage.backend == StorageKind::Postgres
            && self.spec.storage.database_url.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("spec.storage.database_url is required for the postgres backend");
        }

        if self.spec.vision.endpoint.is_empty() {
            anyhow::bail!("spec.vision.endpoint cannot be empty");
        }

        if self.spec.vision.model.is_empty() {
            anyhow::bail!("spec.vision.model cannot be empty");
        }

        Ok(())
    }
}
