//! Standard paths used by strongbox

use std::path::PathBuf;

/// Memory-backed filesystem preferred for scratch files
const SHM_DIR: &str = "/dev/shm";

/// Standard strongbox paths
#[derive(Debug, Clone)]
pub struct Paths {
    /// Data directory (~/.local/share/strongbox)
    pub data: PathBuf,
    /// Config directory (~/.config/strongbox)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("strongbox");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("strongbox");

        Self { data, config }
    }

    /// Root of the entry hierarchy
    pub fn store(&self) -> PathBuf {
        self.data.join("entries")
    }

    /// Private key material
    pub fn identities(&self) -> PathBuf {
        self.data.join("identities")
    }

    /// Public keys derived from the identities
    pub fn recipients(&self) -> PathBuf {
        self.data.join("recipients")
    }

    /// Optional JSON configuration file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }

    /// Candidate roots for edit scratch directories, most volatile first
    pub fn scratch_roots(&self) -> Vec<PathBuf> {
        vec![PathBuf::from(SHM_DIR), std::env::temp_dir()]
    }
}
