use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use census_core::{CensusError, CensusResult, ValidationLimits};

pub const DEFAULT_CONFIG_NAME: &str = "census.json";
pub const DEFAULT_DB_NAME: &str = "census.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_import_citizens: Option<usize>,
    pub max_text_len: Option<usize>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        let defaults = ValidationLimits::default();
        Self {
            max_import_citizens: Some(defaults.max_import_citizens),
            max_text_len: Some(defaults.max_text_len),
        }
    }

    pub fn to_validation_limits(&self) -> ValidationLimits {
        let defaults = ValidationLimits::default();
        ValidationLimits {
            max_import_citizens: self
                .max_import_citizens
                .unwrap_or(defaults.max_import_citizens),
            max_text_len: self.max_text_len.unwrap_or(defaults.max_text_len),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `log` level filter, e.g. `info` or `census_store=debug`.
    pub level: Option<String>,
    pub logs_dir: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CensusConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
    pub logging: Option<LoggingConfig>,
    pub failpoints: Option<Vec<String>>,
}

impl CensusConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            limits: Some(LimitsConfig::with_defaults()),
            logging: Some(LoggingConfig {
                level: Some("info".to_string()),
                logs_dir: None,
            }),
            failpoints: None,
        }
    }

    pub fn config_path(base_dir: &Path) -> PathBuf {
        base_dir.join(DEFAULT_CONFIG_NAME)
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> CensusResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| CensusError::storage(format!("create config dir: {err}")))?;
        let config_path = Self::config_path(base_dir);
        if config_path.exists() {
            return Self::load(&config_path);
        }
        let default = CensusConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| CensusError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| CensusError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn load(config_path: &Path) -> CensusResult<Self> {
        let raw = fs::read_to_string(config_path)
            .map_err(|err| CensusError::storage(format!("read config: {err}")))?;
        serde_json::from_str(&raw)
            .map_err(|err| CensusError::validation(format!("parse config: {err}")))
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> CensusResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            DatabaseConfig::Postgres { .. } => {
                Err(CensusError::validation("config is not sqlite backend"))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
        }
    }

    pub fn connection_url(&self, base_dir: &Path) -> CensusResult<String> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => {
                let path = self.sqlite_path(base_dir)?;
                Ok(format!("sqlite://{}?mode=rwc", path.display()))
            }
            DatabaseConfig::Postgres { url } => Ok(url.clone()),
        }
    }

    pub fn validation_limits(&self) -> ValidationLimits {
        self.limits
            .as_ref()
            .map(LimitsConfig::to_validation_limits)
            .unwrap_or_default()
    }

    /// Configured logs directory, resolved against `base_dir` when relative.
    pub fn logs_dir(&self, base_dir: &Path) -> Option<PathBuf> {
        let dir = self.logging.as_ref()?.logs_dir.as_ref()?;
        let dir = PathBuf::from(dir);
        Some(if dir.is_absolute() {
            dir
        } else {
            base_dir.join(dir)
        })
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|logging| logging.level.as_deref())
            .unwrap_or("info")
    }
}

/// Config under `base`, written with a SQLite default on first use.
pub fn load_or_init_config(base: &Path) -> CensusResult<CensusConfig> {
    CensusConfig::load_or_init(base, &default_sqlite_path(base))
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}
