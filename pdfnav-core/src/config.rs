use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::outline::UNTITLED_TITLE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub navigation: NavigationConfig,
    pub outline: OutlineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Fraction of the viewport height used for the navigation target line
    /// and the current-page anchor.
    pub anchor_ratio: f64,
    pub smooth_scroll: bool,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            anchor_ratio: 0.2,
            smooth_scroll: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineConfig {
    pub untitled_title: String,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            untitled_title: UNTITLED_TITLE.to_owned(),
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(source) => Self::from_toml_str(&source),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.navigation.anchor_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::Invalid(format!(
                "navigation.anchor_ratio must be within [0, 1], got {ratio}"
            )));
        }
        if self.outline.untitled_title.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "outline.untitled_title must not be empty".into(),
            ));
        }
        Ok(())
    }
}
