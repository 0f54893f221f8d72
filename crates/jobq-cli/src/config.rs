//! Layered settings: built-in defaults, then an optional TOML file, then
//! environment variables, then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jobq_core::app::{DispatchConfig, ReconcileConfig};
use serde::Deserialize;

pub const DATABASE_ENV: &str = "JQ_DATABASE";
pub const PY_VENV_ENV: &str = "JQ_PY_VENV";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite file holding the queue.
    pub database: Option<PathBuf>,
    /// Default Python virtual env for `add`.
    pub py_venv: Option<String>,
    pub log_level: String,
    pub qsub_program: String,
    pub qstat_program: String,
    pub dispatch: DispatchConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: None,
            py_venv: None,
            log_level: "info".to_string(),
            qsub_program: "qsub".to_string(),
            qstat_program: "qstat".to_string(),
            dispatch: DispatchConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct FlagOverrides {
    pub database: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Settings {
    /// Load settings, reading `config_file` if given and environment
    /// variables through `env`.
    pub async fn load(
        config_file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
        flags: FlagOverrides,
    ) -> Result<Self> {
        let mut settings = match config_file {
            Some(path) => Self::from_file(path).await?,
            None => Self::default(),
        };
        settings.apply_env(env);
        settings.apply_flags(flags);
        Ok(settings)
    }

    async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(database) = non_empty(DATABASE_ENV) {
            self.database = Some(PathBuf::from(database));
        }
        if let Some(py_venv) = non_empty(PY_VENV_ENV) {
            self.py_venv = Some(py_venv);
        }
    }

    fn apply_flags(&mut self, flags: FlagOverrides) {
        if let Some(database) = flags.database {
            self.database = Some(database);
        }
        if let Some(level) = flags.log_level {
            self.log_level = level;
        }
    }

    pub fn database(&self) -> Result<&Path> {
        self.database.as_deref().with_context(|| {
            format!("no queue database given: pass --database or set {DATABASE_ENV}")
        })
    }
}
