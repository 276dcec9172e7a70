//! Ledger configuration
//!
//! Layered in increasing priority: built-in defaults, an optional config
//! file, `COUNSEL_*` environment variables, then explicit overrides from the
//! command line.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

pub const DEFAULT_LEDGER_PATH: &str = "audit/ledger.jsonl";
pub const ENV_PREFIX: &str = "COUNSEL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub ledger_path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from defaults, `config_file` (if given) and the
    /// process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Self::load_from(config_file, None)
    }

    /// Same as [`LedgerConfig::load`], reading environment variables from
    /// `env` instead of the process when provided.
    pub fn load_from(
        config_file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder().set_default("ledger_path", DEFAULT_LEDGER_PATH)?;

        if let Some(path) = config_file {
            debug!("Reading ledger configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).source(env));

        let config: LedgerConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn with_ledger_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.ledger_path = path;
        }
        self
    }
}
