//! Entry store - encrypted credential storage
//!
//! Each entry is stored as a separate age-encrypted file under the store
//! root. Entries are namespaced using path-like names (e.g. email/gmail,
//! bank/card); every prefix before the last `/` is a category directory.
//!
//! There is no locking between processes. Two invocations writing the same
//! entry race and the last rename wins; the atomic rename only guarantees
//! that nobody ever observes a torn ciphertext file.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use strongbox_core::Config;
use tracing::debug;
use walkdir::WalkDir;
use zeroize::Zeroizing;

use crate::crypto::{self, EncryptionProvider};
use crate::edit::{EditSession, Editor};
use crate::error::StoreError;
use crate::guard::CleanupGuard;
use crate::names;
use crate::random::{self, CharClass};
use crate::terminal::{self, TerminalIO};

/// Where the plaintext for `add` comes from
pub enum SecretSource<'a> {
    /// Read verbatim, without prompting
    Piped(&'a mut dyn Read),
    /// Random string of the configured length and pattern
    Generated,
    /// Typed twice at a masked prompt; both must match
    Interactive,
}

/// The entry store
pub struct EntryStore {
    config: Config,
    crypto: Box<dyn EncryptionProvider>,
}

impl EntryStore {
    /// Create a store over `config.store_dir` using `crypto`
    pub fn new(config: Config, crypto: Box<dyn EncryptionProvider>) -> Self {
        Self { config, crypto }
    }

    /// Create the store root if needed and pick the configured provider
    pub fn open(config: Config) -> Result<Self> {
        names::create_private_dir(&config.store_dir)?;
        let crypto = crypto::provider(&config)?;
        debug!(root = %config.store_dir.display(), provider = crypto.name(), "opened store");
        Ok(Self::new(config, crypto))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.config.store_dir
    }

    /// Path to the ciphertext file of an entry
    pub fn entry_path(&self, name: &str) -> PathBuf {
        names::entry_path(self.root(), name)
    }

    /// Check if an entry exists
    pub fn contains(&self, name: &str) -> bool {
        self.entry_path(name).is_file()
    }

    /// Fail unless `add` may write `name`
    ///
    /// Lets callers reject a name before asking the user anything.
    pub fn ensure_addable(&self, name: &str) -> Result<()> {
        names::validate(self.root(), name)?;

        if self.contains(name) && !self.config.force {
            bail!(StoreError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Store a new entry
    pub fn add(
        &self,
        name: &str,
        source: SecretSource<'_>,
        terminal: &mut dyn TerminalIO,
    ) -> Result<()> {
        self.ensure_addable(name)?;

        match source {
            SecretSource::Piped(reader) => self.write_entry(name, reader)?,
            SecretSource::Generated => {
                let class = CharClass::parse(&self.config.pattern)?;
                let secret = Zeroizing::new(random::generate(self.config.length, &class)?);
                self.write_entry(name, &mut secret.as_bytes())?;
            }
            SecretSource::Interactive => {
                let first = terminal.read_masked_line("enter a password: ")?;
                let second = terminal.read_masked_line("enter a password (again): ")?;
                if *first != *second {
                    bail!(StoreError::Mismatch);
                }
                self.write_entry(name, &mut first.as_bytes())?;
            }
        }

        debug!(entry = name, "added entry");
        Ok(())
    }

    /// Decrypt an entry into `out`
    pub fn show(&self, name: &str, out: &mut dyn Write) -> Result<()> {
        names::validate(self.root(), name)?;

        if !self.contains(name) {
            bail!(StoreError::NotFound(name.to_string()));
        }

        self.read_entry(name, out)
    }

    /// Delete an entry after confirmation, pruning empty categories
    ///
    /// Returns whether a file was removed. A missing entry is not an error.
    pub fn delete(&self, name: &str, terminal: &mut dyn TerminalIO) -> Result<bool> {
        names::validate(self.root(), name)?;

        let path = self.entry_path(name);
        if !path.is_file() {
            debug!(entry = name, "nothing to delete");
            self.prune(&path);
            return Ok(false);
        }

        let prompt = format!("delete '{}'?", name);
        if !terminal::confirm(terminal, &prompt, self.config.yes)? {
            return Ok(false);
        }

        fs::remove_file(&path)
            .map_err(StoreError::Io)
            .with_context(|| format!("failed to remove {}", path.display()))?;
        self.prune(&path);

        debug!(entry = name, "deleted entry");
        Ok(true)
    }

    /// All entry names, lazily
    pub fn list(&self) -> Entries {
        Entries::new(self.root())
    }

    /// Edit an entry in a scratch directory and re-encrypt it
    pub fn edit(&self, name: &str, editor: &dyn Editor) -> Result<()> {
        EditSession::new(self, name).run(editor)
    }

    /// Encrypt `plaintext` into the entry file, replacing it atomically
    ///
    /// The ciphertext goes to a temporary file in the entry's directory
    /// which is then renamed over the entry. The caller must have
    /// validated `name`.
    pub(crate) fn write_entry(&self, name: &str, plaintext: &mut dyn Read) -> Result<()> {
        let path = self.entry_path(name);
        let dir = path.parent().unwrap_or_else(|| self.root());

        let mut tmp = tempfile::Builder::new()
            .prefix(".strongbox-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(StoreError::Io)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;

        // An interrupt exits without unwinding, so the drop of `tmp` never runs
        let pending = {
            let tmp_path = tmp.path().to_path_buf();
            CleanupGuard::register(move || {
                let _ = fs::remove_file(&tmp_path);
            })
        };

        self.crypto
            .encrypt(&self.config.recipients, plaintext, tmp.as_file_mut())?;
        tmp.as_file().sync_all().map_err(StoreError::Io)?;

        let persisted = tmp
            .persist(&path)
            .map_err(|e| StoreError::Io(e.error))
            .with_context(|| format!("failed to write {}", path.display()));
        pending.disarm();
        persisted?;
        Ok(())
    }

    /// Decrypt the entry file into `out`. The caller must have validated `name`.
    pub(crate) fn read_entry(&self, name: &str, out: &mut dyn Write) -> Result<()> {
        let path = self.entry_path(name);
        let mut file = File::open(&path)
            .map_err(StoreError::Io)
            .with_context(|| format!("failed to open {}", path.display()))?;
        self.crypto
            .decrypt(&self.config.identities, &mut file, out)
    }

    /// Remove empty category directories above `path`, up to the root
    ///
    /// Stops at the first directory that cannot be removed; another entry
    /// may still live there.
    fn prune(&self, path: &Path) {
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == self.root() || !dir.starts_with(self.root()) {
                break;
            }
            if let Err(e) = fs::remove_dir(dir) {
                debug!(dir = %dir.display(), error = %e, "stopped pruning");
                break;
            }
            parent = dir.parent();
        }
    }
}

/// Lazy sequence of entry names below a store root
///
/// Names come out in filesystem traversal order, which is neither sorted
/// nor stable across platforms. Call [`EntryStore::list`] again to start
/// over. Files that are not ciphertext entries are skipped.
pub struct Entries {
    root: PathBuf,
    walker: Option<walkdir::IntoIter>,
}

impl Entries {
    fn new(root: &Path) -> Self {
        let walker = root.is_dir().then(|| {
            WalkDir::new(root)
                .min_depth(1)
                .follow_links(false)
                .into_iter()
        });
        Self {
            root: root.to_path_buf(),
            walker,
        }
    }
}

impl Iterator for Entries {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let walker = self.walker.as_mut()?;
        loop {
            let entry = match walker.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(name) = names::name_from_path(&self.root, entry.path()) {
                return Some(Ok(name));
            }
        }
    }
}
