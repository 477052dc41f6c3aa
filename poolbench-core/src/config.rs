// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Every section is optional and falls back to the defaults the benchmark
//! setup ships with. Any invalid field results in a HardValidationError
//! before a single command runs.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BenchError, BenchResult, HardValidationError};
use crate::types::{Port, TenantId};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "poolbench.yaml";

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawDatabaseConfig {
    host: String,
    port: u16,
    user: String,
    password: String,
    name: String,
}

impl Default for RawDatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9700,
            user: "postgres".to_string(),
            password: "test".to_string(),
            name: "postgres".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawLoadToolConfig {
    program: String,
    host: String,
    progress_secs: u32,
}

impl Default for RawLoadToolConfig {
    fn default() -> Self {
        Self {
            program: "pgbench".to_string(),
            host: "localhost".to_string(),
            progress_secs: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawShapingConfig {
    interface: String,
    lock_path: String,
}

impl Default for RawShapingConfig {
    fn default() -> Self {
        Self {
            interface: "lo".to_string(),
            lock_path: "/tmp/poolbench-latency.lock".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawControlPlaneConfig {
    url: String,
    api_token: String,
    tenant: String,
    pool_size: u32,
    max_clients: u32,
    timeout_secs: u64,
    dir: String,
    http_port: u16,
    jwt_secret: String,
    secret_key_base: String,
    vault_enc_key: String,
}

impl Default for RawControlPlaneConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4000".to_string(),
            api_token: String::new(),
            tenant: "bench".to_string(),
            pool_size: 100,
            max_clients: 10_000,
            timeout_secs: 10,
            dir: "supavisor".to_string(),
            http_port: 4000,
            jwt_secret: "dev".to_string(),
            secret_key_base: "12345678901234567890121234567890123456789012345678903212345678901234567890123456789032123456789012345678901234567890323456"
                .to_string(),
            vault_enc_key: "12345678901234567890123456789032".to_string(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    database: RawDatabaseConfig,
    load_tool: RawLoadToolConfig,
    shaping: RawShapingConfig,
    control_plane: RawControlPlaneConfig,
}

/// The real database every pooler forwards to.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: Port,
    pub user: String,
    pub password: String,
    pub name: String,
}

/// External load generator invocation settings.
#[derive(Debug, Clone)]
pub struct LoadToolConfig {
    pub program: String,
    pub host: String,
    pub progress_secs: u32,
}

/// Where latency rules are installed and how scopes are serialized.
#[derive(Debug, Clone)]
pub struct ShapingConfig {
    pub interface: String,
    pub lock_path: PathBuf,
}

/// Control plane for the tenant-routed pooler.
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    pub url: String,
    pub api_token: String,
    pub tenant: TenantId,
    pub pool_size: u32,
    pub max_clients: u32,
    pub timeout_secs: u64,
    pub dir: PathBuf,
    pub http_port: Port,
    pub jwt_secret: String,
    pub secret_key_base: String,
    pub vault_enc_key: String,
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub load_tool: LoadToolConfig,
    pub shaping: ShapingConfig,
    pub control_plane: ControlPlaneConfig,
}

impl Default for Config {
    fn default() -> Self {
        // The built-in defaults are known to validate.
        match ConfigLoader::validate(RawConfig::default()) {
            Ok(config) => config,
            Err(e) => unreachable!("built-in configuration is invalid: {}", e),
        }
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> BenchResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BenchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BenchError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load `path` if given, otherwise the default file when present,
    /// otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> BenchResult<Config> {
        match path {
            Some(path) => Self::load_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load_file(DEFAULT_CONFIG_FILE),
            None => {
                tracing::debug!("No configuration file, using built-in defaults");
                Ok(Config::default())
            }
        }
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> BenchResult<Config> {
        // An empty document means "all defaults".
        if content.trim().is_empty() {
            return Self::validate(RawConfig::default());
        }

        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| BenchError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> BenchResult<Config> {
        let database = Self::validate_database(raw.database)?;
        let load_tool = Self::validate_load_tool(raw.load_tool)?;
        let shaping = Self::validate_shaping(raw.shaping)?;
        let control_plane = Self::validate_control_plane(raw.control_plane)?;

        Ok(Config {
            database,
            load_tool,
            shaping,
            control_plane,
        })
    }

    fn validate_database(raw: RawDatabaseConfig) -> BenchResult<DatabaseConfig> {
        let port = Port::new(raw.port)?;
        require_non_empty("database.host", &raw.host)?;
        require_non_empty("database.user", &raw.user)?;
        require_non_empty("database.name", &raw.name)?;

        Ok(DatabaseConfig {
            host: raw.host,
            port,
            user: raw.user,
            password: raw.password,
            name: raw.name,
        })
    }

    fn validate_load_tool(raw: RawLoadToolConfig) -> BenchResult<LoadToolConfig> {
        require_non_empty("load_tool.program", &raw.program)?;
        require_non_empty("load_tool.host", &raw.host)?;

        if raw.progress_secs == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "load_tool.progress_secs",
                value: "0".to_string(),
                reason: "Progress interval must be at least 1 second".to_string(),
            }
            .into());
        }

        Ok(LoadToolConfig {
            program: raw.program,
            host: raw.host,
            progress_secs: raw.progress_secs,
        })
    }

    fn validate_shaping(raw: RawShapingConfig) -> BenchResult<ShapingConfig> {
        require_non_empty("shaping.interface", &raw.interface)?;

        if raw.interface.contains(char::is_whitespace) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "shaping.interface",
                value: raw.interface,
                reason: "Interface name cannot contain whitespace".to_string(),
            }
            .into());
        }

        require_non_empty("shaping.lock_path", &raw.lock_path)?;

        Ok(ShapingConfig {
            interface: raw.interface,
            lock_path: PathBuf::from(raw.lock_path),
        })
    }

    fn validate_control_plane(raw: RawControlPlaneConfig) -> BenchResult<ControlPlaneConfig> {
        require_non_empty("control_plane.url", &raw.url)?;

        if !raw.url.starts_with("http://") && !raw.url.starts_with("https://") {
            return Err(HardValidationError::InvalidFieldValue {
                field: "control_plane.url",
                value: raw.url,
                reason: "URL must start with http:// or https://".to_string(),
            }
            .into());
        }

        let tenant = TenantId::new(raw.tenant)?;
        let http_port = Port::new(raw.http_port)?;

        if raw.pool_size == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "control_plane.pool_size",
                value: "0".to_string(),
                reason: "Pool size must be at least 1".to_string(),
            }
            .into());
        }

        if raw.max_clients < raw.pool_size {
            return Err(HardValidationError::InvalidFieldValue {
                field: "control_plane.max_clients",
                value: raw.max_clients.to_string(),
                reason: format!("Must not be lower than pool_size ({})", raw.pool_size),
            }
            .into());
        }

        if raw.timeout_secs == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "control_plane.timeout_secs",
                value: "0".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(ControlPlaneConfig {
            url: raw.url.trim_end_matches('/').to_string(),
            api_token: raw.api_token,
            tenant,
            pool_size: raw.pool_size,
            max_clients: raw.max_clients,
            timeout_secs: raw.timeout_secs,
            dir: PathBuf::from(raw.dir),
            http_port,
            jwt_secret: raw.jwt_secret,
            secret_key_base: raw.secret_key_base,
            vault_enc_key: raw.vault_enc_key,
        })
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), HardValidationError> {
    if value.trim().is_empty() {
        return Err(HardValidationError::InvalidFieldValue {
            field,
            value: value.to_string(),
            reason: "Value cannot be empty".to_string(),
        });
    }
    Ok(())
}
