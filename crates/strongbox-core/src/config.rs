//! Configuration management for strongbox
//!
//! Settings are resolved once, in order: built-in defaults, the optional
//! JSON config file, then environment variables. The CLI applies its own
//! flags last and hands the result to every component.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::paths::Paths;

/// Store root override
pub const ENV_DIR: &str = "STRONGBOX_DIR";
/// Directory holding `identities` and `recipients`
pub const ENV_KEYS_DIR: &str = "STRONGBOX_KEYS_DIR";
/// Generated password length
pub const ENV_LENGTH: &str = "STRONGBOX_LENGTH";
/// Generated password character class
pub const ENV_PATTERN: &str = "STRONGBOX_PATTERN";
/// External age-compatible binary, used instead of the linked library
pub const ENV_AGE: &str = "STRONGBOX_AGE";
/// Editor used by `edit`
pub const ENV_EDITOR: &str = "EDITOR";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidLength { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Resolved strongbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory holding the entry hierarchy
    pub store_dir: PathBuf,

    /// Private key file
    pub identities: PathBuf,

    /// Public key file
    pub recipients: PathBuf,

    /// Length of generated passwords
    pub length: usize,

    /// Character class of generated passwords (tr-style)
    pub pattern: String,

    /// Editor command for `edit`, may include arguments
    pub editor: String,

    /// External age binary; `None` uses the linked library
    pub age_command: Option<String>,

    /// Where edit sessions may place plaintext, tried in order
    pub scratch_roots: Vec<PathBuf>,

    /// Overwrite existing entries, create missing ones on edit
    #[serde(skip)]
    pub force: bool,

    /// Answer yes to every confirmation
    #[serde(skip)]
    pub yes: bool,
}

fn default_length() -> usize {
    50
}

fn default_pattern() -> String {
    "A-Za-z0-9-_".to_string()
}

fn default_editor() -> String {
    "vi".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self::from_paths(&Paths::new())
    }
}

impl Config {
    /// Defaults rooted at the given paths
    pub fn from_paths(paths: &Paths) -> Self {
        Self {
            store_dir: paths.store(),
            identities: paths.identities(),
            recipients: paths.recipients(),
            length: default_length(),
            pattern: default_pattern(),
            editor: default_editor(),
            age_command: None,
            scratch_roots: paths.scratch_roots(),
            force: false,
            yes: false,
        }
    }

    /// Load config from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse config {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Defaults, config file and process environment, in that order
    pub fn resolve() -> Result<Self> {
        let paths = Paths::new();
        let mut config = Self::load(&paths.config_file())?;
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Override settings from environment variables supplied by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|v| !v.is_empty());

        if let Some(dir) = lookup(ENV_DIR) {
            self.store_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup(ENV_KEYS_DIR) {
            let dir = PathBuf::from(dir);
            self.identities = dir.join("identities");
            self.recipients = dir.join("recipients");
        }

        if let Some(value) = lookup(ENV_LENGTH) {
            self.length = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidLength {
                        var: ENV_LENGTH,
                        value,
                    }
                    .into())
                }
            };
        }

        if let Some(pattern) = lookup(ENV_PATTERN) {
            self.pattern = pattern;
        }

        if let Some(command) = lookup(ENV_AGE) {
            self.age_command = Some(command);
        }

        if let Some(editor) = lookup(ENV_EDITOR) {
            self.editor = editor;
        }

        self.check()
    }

    fn check(&self) -> Result<()> {
        if self.length == 0 {
            return Err(ConfigError::InvalidLength {
                var: "length",
                value: "0".to_string(),
            }
            .into());
        }
        if self.pattern.is_empty() {
            return Err(ConfigError::Empty { var: "pattern" }.into());
        }
        if self.editor.trim().is_empty() {
            return Err(ConfigError::Empty { var: "editor" }.into());
        }
        Ok(())
    }
}
