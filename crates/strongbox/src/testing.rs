//! Test fixtures shared by the module tests

use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::path::Path;
use strongbox_core::{Config, Paths};
use tempfile::TempDir;
use zeroize::Zeroizing;

use crate::crypto::AgeNative;
use crate::keys;
use crate::store::EntryStore;
use crate::terminal::TerminalIO;

/// Scripted answers for prompts
#[derive(Default)]
pub struct FakeTerminal {
    bytes: VecDeque<u8>,
    lines: VecDeque<String>,
    pub prompts: Vec<String>,
}

impl FakeTerminal {
    pub fn with_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn with_lines(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }
}

impl TerminalIO for FakeTerminal {
    fn read_confirmation_byte(&mut self, prompt: &str) -> Result<u8> {
        self.prompts.push(prompt.to_string());
        match self.bytes.pop_front() {
            Some(b) => Ok(b),
            None => bail!("unexpected confirmation prompt: {}", prompt),
        }
    }

    fn read_masked_line(&mut self, prompt: &str) -> Result<Zeroizing<String>> {
        self.prompts.push(prompt.to_string());
        match self.lines.pop_front() {
            Some(line) => Ok(Zeroizing::new(line)),
            None => bail!("unexpected secret prompt: {}", prompt),
        }
    }
}

/// Store with fresh keys in a temporary directory
pub struct TestStore {
    _temp: TempDir,
    config: Config,
    pub store: EntryStore,
}

impl TestStore {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let paths = Paths {
            data: temp.path().join("data"),
            config: temp.path().join("config"),
        };

        let mut config = Config::from_paths(&paths);
        config.scratch_roots = vec![temp.path().join("scratch")];
        std::fs::create_dir_all(&config.scratch_roots[0]).unwrap();

        keys::ensure(&config.identities, &config.recipients).unwrap();
        let store = EntryStore::open(config.clone()).unwrap();

        Self {
            _temp: temp,
            config,
            store,
        }
    }

    /// Rebuild the store with a modified configuration
    pub fn configure(&mut self, change: impl FnOnce(&mut Config)) {
        change(&mut self.config);
        self.store = EntryStore::new(self.config.clone(), Box::new(AgeNative));
    }

    pub fn root(&self) -> &Path {
        &self.config.store_dir
    }

    pub fn scratch(&self) -> &Path {
        &self.config.scratch_roots[0]
    }
}
