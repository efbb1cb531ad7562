//! Layered configuration for wsync.
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults.
//! 2. A config file, TOML, YAML or JSON depending on its extension. Without
//!    an explicit path, `config.toml` in the platform config directory is
//!    used if it exists.
//! 3. Environment variables prefixed `WSYNC_`, with `__` separating nested
//!    keys (`WSYNC_SYNC__CONCURRENCY=8`).
//!
//! ```toml
//! database = "/var/lib/wsync/wsync.sqlite"
//! staging = "/var/lib/wsync/staging"
//!
//! [sync]
//! concurrency = 8
//!
//! [environments.dev]
//! type = "local"
//! path = "/srv/dev"
//!
//! [environments.prod]
//! type = "s3"
//! bucket = "assets"
//! region = "eu-west-1"
//! key_id = "..."
//! key_secret = "..."
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "WSYNC_";
const DEFAULT_CONCURRENCY: usize = 4;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "wsync")
}

fn data_dir() -> PathBuf {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_else(|| std::env::temp_dir().join("wsync"))
}

/// Location of the config file used when none is given explicitly.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file of the record store.
    pub database: PathBuf,
    /// Root of the staged file bytes, laid out `<workspace id>/<path>`.
    pub staging: PathBuf,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub environments: Environments,
}
impl Default for Config {
    fn default() -> Self {
        let data = data_dir();
        Self {
            database: data.join("wsync.sqlite"),
            staging: data.join("staging"),
            sync: SyncConfig::default(),
            environments: Environments::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Files uploaded concurrently within one sync.
    pub concurrency: usize,
    /// Record every outcome without writing anything to the targets.
    pub dry_run: bool,
}
impl Default for SyncConfig {
    fn default() -> Self {
        Self { concurrency: DEFAULT_CONCURRENCY, dry_run: false }
    }
}

/// One optional target per deployment environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Environments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev: Option<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prod: Option<Target>,
}
impl Environments {
    /// Configured targets keyed by environment name.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Target)> {
        [("dev", &self.dev), ("test", &self.test), ("prod", &self.prod)]
            .into_iter()
            .filter_map(|(name, target)| target.as_ref().map(|target| (name, target)))
    }
}

/// Where an environment's files end up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Target {
    Local {
        path: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        region: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        key_id: String,
        key_secret: String,
    },
}

impl Config {
    /// The merged configuration sources, before extraction.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::Missing(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|path| path.is_file()),
        };
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "loading config file");
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(&file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(&file)),
                Some("json") => figment.merge(Json::file(&file)),
                _ => exn::bail!(ErrorKind::Format(file.clone())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate the configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sync.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("sync.concurrency must be at least 1".to_string()));
        }
        if self.staging.is_relative() {
            exn::bail!(ErrorKind::Invalid(format!("staging must be an absolute path: {}", self.staging.display())));
        }
        for (name, target) in self.environments.iter() {
            match target {
                Target::Local { path } if path.is_relative() => exn::bail!(ErrorKind::Invalid(format!(
                    "environments.{name}.path must be an absolute path: {}",
                    path.display()
                ))),
                Target::S3 { bucket, .. } if bucket.is_empty() => {
                    exn::bail!(ErrorKind::Invalid(format!("environments.{name}.bucket must not be empty")))
                },
                _ => {},
            }
        }
        Ok(())
    }
}
