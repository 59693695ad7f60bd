use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::AppConfig;
use crate::validation::{self, ConfigWarnings};

pub const CONFIG_PATH_ENV: &str = "PRIMEVOTE_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "PRIMEVOTE_CONFIG_JSON";

const DEFAULT_CANDIDATES: &[&str] = &[
    "primevote.toml",
    "primevote.json",
    "config/primevote.toml",
    "config/primevote.json",
];

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    /// Path handed to the loader directly, e.g. via `--config`.
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Snapshot of the environment variables the loader consults.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
}

impl EnvOverrides {
    pub fn gather() -> Self {
        Self {
            config_path: non_blank_var(CONFIG_PATH_ENV).map(PathBuf::from),
            config_json: non_blank_var(CONFIG_JSON_ENV),
        }
    }
}

fn non_blank_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: AppConfig,
    pub warnings: ConfigWarnings,
    pub source: ConfigSource,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid inline configuration: {0}")]
    InlineJson(#[source] anyhow::Error),
}

/// Resolves an [`AppConfig`] from, in order: an explicit path,
/// `$PRIMEVOTE_CONFIG_PATH`, `$PRIMEVOTE_CONFIG_JSON`, the first default
/// candidate file under the search directory, or built-in defaults.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
    env: EnvOverrides,
    search_dir: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            explicit_path: None,
            env: EnvOverrides::gather(),
            search_dir: PathBuf::from("."),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: EnvOverrides) -> Self {
        self.env = env;
        self
    }

    pub fn with_search_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.search_dir = dir.into();
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (mut config, source) = self.resolve()?;
        let mut warnings = ConfigWarnings::default();
        if source == ConfigSource::Default {
            warnings.push_with_hint(
                "No primevote.toml detected; using built-in defaults",
                format!("set {CONFIG_PATH_ENV} or create primevote.toml to customise runs"),
            );
        }
        warnings.extend(validation::apply_guard_rails(&mut config));

        info!(target: "primevote::config", source = ?source, warnings = warnings.len(), "configuration loaded");
        Ok(ConfigLoad {
            config,
            warnings,
            source,
        })
    }

    fn resolve(&self) -> Result<(AppConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.explicit_path {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path: path.clone() });
            }
            let config = load_from_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.clone())));
        }

        if let Some(path) = &self.env.config_path {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path: path.clone() });
            }
            let config = load_from_file(path)?;
            return Ok((config, ConfigSource::EnvPath(path.clone())));
        }

        if let Some(raw) = &self.env.config_json {
            let config = parse_json(raw).map_err(ConfigLoadError::InlineJson)?;
            return Ok((config, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((AppConfig::default(), ConfigSource::Default))
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| self.search_dir.join(candidate))
            .find(|path| path.exists())
    }
}

pub fn load_from_file(path: &Path) -> Result<AppConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(target: "primevote::config", path = %path.display(), "parsing configuration file");

    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents),
        Some("toml") | Some("tml") => {
            toml::from_str(&contents).map_err(|err| anyhow!("invalid toml: {err}"))
        }
        _ => parse_from_str(&contents, &path.display().to_string()),
    };
    parsed.map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses `contents` as TOML, falling back to JSON.
pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<AppConfig> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            anyhow!(
                "failed to parse primevote config {}: toml error: {}; json error: {}",
                origin,
                toml_err,
                json_err
            )
        })
    })
}

pub fn parse_json(raw: &str) -> anyhow::Result<AppConfig> {
    serde_json::from_str(raw).map_err(|err| anyhow!("invalid primevote config json: {err}"))
}
