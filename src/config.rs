use crate::error::QuamError;
use crate::storage::ContentMapping;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_VERSION: u32 = 3;
pub const STATE_PATH_ENV: &str = "QUAM_STATE_PATH";
pub const DEFAULT_FILENAME: &str = "state.json";
pub const DEFAULT_FOLDERNAME: &str = "quam_state";

/// User configuration file: `{ "quam": { "version": 3, ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuamConfig {
    pub version: Option<u32>,
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    #[serde(default)]
    pub include_defaults_in_save: bool,
}

#[derive(Deserialize)]
struct TopLevelConfig {
    quam: QuamConfig,
}

impl Default for QuamConfig {
    fn default() -> Self {
        Self {
            version: Some(CONFIG_VERSION),
            state_path: None,
            include_defaults_in_save: false,
        }
    }
}

impl QuamConfig {
    pub fn from_json(data: &str) -> Result<Self> {
        let top: TopLevelConfig = serde_json::from_str(data)?;
        top.quam.validate()?;
        Ok(top.quam)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&data).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), QuamError> {
        match self.version {
            None => Err(QuamError::MissingConfigVersion),
            Some(CONFIG_VERSION) => Ok(()),
            Some(other) => Err(QuamError::UnsupportedConfigVersion(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerialiserConfig {
    pub default_filename: String,
    pub default_foldername: String,
    pub include_defaults: bool,
    pub state_path: Option<PathBuf>,
    pub content_mapping: ContentMapping,
    /// Folder that path-less saves and loads are relative to.
    pub working_dir: PathBuf,
}

impl Default for SerialiserConfig {
    fn default() -> Self {
        Self {
            default_filename: DEFAULT_FILENAME.to_string(),
            default_foldername: DEFAULT_FOLDERNAME.to_string(),
            include_defaults: false,
            state_path: None,
            content_mapping: ContentMapping::new(),
            working_dir: PathBuf::from("."),
        }
    }
}

impl SerialiserConfig {
    pub fn from_quam_config(config: &QuamConfig) -> Self {
        Self {
            include_defaults: config.include_defaults_in_save,
            state_path: config.state_path.clone(),
            ..Self::default()
        }
    }

    /// Let `QUAM_STATE_PATH` override the state path.
    pub fn with_env(mut self) -> Self {
        if let Some(path) = std::env::var_os(STATE_PATH_ENV).filter(|p| !p.is_empty()) {
            self.state_path = Some(PathBuf::from(path));
        }
        self
    }

    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_content_mapping(mut self, mapping: ContentMapping) -> Self {
        self.content_mapping = mapping;
        self
    }

    pub fn with_include_defaults(mut self, include_defaults: bool) -> Self {
        self.include_defaults = include_defaults;
        self
    }
}
