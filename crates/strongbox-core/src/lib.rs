//! strongbox-core - Shared functionality for the strongbox tools
//!
//! Resolves where things live (paths), how the store is configured
//! (config) and which external programs are available (process).

pub mod config;
pub mod paths;
pub mod process;

pub use config::{Config, ConfigError};
pub use paths::Paths;
