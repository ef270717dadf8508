//! Secure edit sessions
//!
//! An edit decrypts the entry into a private scratch directory, preferably
//! on a memory-backed filesystem, runs the editor on that file and
//! encrypts the result back over the entry. The scratch directory is owned
//! by a [`CleanupGuard`] registered before the directory exists, so it is
//! removed on success, on every error and on interrupt.

use anyhow::{bail, Context, Result};
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::guard::CleanupGuard;
use crate::names;
use crate::random::{self, CharClass};
use crate::store::EntryStore;

/// Length of the random part of a scratch directory name
const SCRATCH_SUFFIX_LEN: usize = 16;

/// Something that lets the user change a file in place
pub trait Editor {
    /// Edit `file`; returns whether the editor reported success
    fn edit(&self, file: &Path) -> Result<bool>;
}

impl<F> Editor for F
where
    F: Fn(&Path) -> Result<bool>,
{
    fn edit(&self, file: &Path) -> Result<bool> {
        self(file)
    }
}

/// External editor program, e.g. `vi` or `code --wait`
#[derive(Debug, Clone)]
pub struct CommandEditor {
    program: String,
    args: Vec<String>,
}

impl CommandEditor {
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut words = command.split_whitespace();
        let Some(program) = words.next() else {
            bail!("no editor configured");
        };
        Ok(Self {
            program: program.to_string(),
            args: words.map(str::to_string).collect(),
        })
    }
}

impl Editor for CommandEditor {
    fn edit(&self, file: &Path) -> Result<bool> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(file)
            .status()
            .with_context(|| format!("failed to start editor '{}'", self.program))?;
        Ok(status.success())
    }
}

/// Progress of an edit session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    Start,
    TempDirCreated,
    Decrypted,
    Edited,
    Reencrypted,
    Cleaned,
    Failed,
}

/// Private directory for plaintext, removed when dropped
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    _guard: CleanupGuard,
}

impl ScratchDir {
    /// Create the directory in the first root that accepts it
    pub fn create(roots: &[PathBuf]) -> Result<Self> {
        let class = CharClass::alphanumeric();
        let mut last_error = None;

        for root in roots {
            let suffix = random::generate(SCRATCH_SUFFIX_LEN, &class)?;
            let path = root.join(format!("strongbox.{}", suffix));

            let target = path.clone();
            let guard = CleanupGuard::register(move || remove_tree(&target));

            match DirBuilder::new().mode(0o700).create(&path) {
                Ok(()) => {
                    debug!(dir = %path.display(), "created scratch directory");
                    return Ok(Self {
                        path,
                        _guard: guard,
                    });
                }
                Err(e) => {
                    // Not ours to remove, whatever is there
                    guard.disarm();
                    debug!(root = %root.display(), error = %e, "scratch root unusable");
                    last_error = Some(e);
                }
            }
        }

        let e = last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no scratch roots"));
        Err(StoreError::Io(e)).context("failed to create a scratch directory")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Plaintext file for `name`, with its category directories created
    pub fn file_for(&self, name: &str) -> Result<PathBuf> {
        let file = self.path.join(format!("{}.txt", name));
        if let Some(parent) = file.parent() {
            names::create_private_dir(parent)?;
        }
        Ok(file)
    }
}

fn remove_tree(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(dir = %path.display(), "removed scratch directory"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %path.display(), error = %e, "failed to remove scratch directory"),
    }
}

/// One edit of one entry
pub struct EditSession<'a> {
    store: &'a EntryStore,
    name: &'a str,
    state: EditState,
}

impl<'a> EditSession<'a> {
    pub fn new(store: &'a EntryStore, name: &'a str) -> Self {
        Self {
            store,
            name,
            state: EditState::Start,
        }
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    /// Run the session to completion
    ///
    /// Ends in `Cleaned` or `Failed`; in both cases the scratch directory
    /// is gone by the time this returns.
    pub fn run(&mut self, editor: &dyn Editor) -> Result<()> {
        let result = self.steps(editor);
        match &result {
            Ok(()) => self.advance(EditState::Cleaned),
            Err(e) => {
                debug!(entry = self.name, from = ?self.state, error = %e, "edit failed");
                self.advance(EditState::Failed);
            }
        }
        result
    }

    fn advance(&mut self, next: EditState) {
        debug!(entry = self.name, from = ?self.state, to = ?next, "edit session");
        self.state = next;
    }

    fn steps(&mut self, editor: &dyn Editor) -> Result<()> {
        let store = self.store;
        let name = self.name;

        names::validate(store.root(), name)?;

        if !store.contains(name) {
            if !store.config().force {
                bail!(StoreError::NotFound(name.to_string()));
            }
            store.write_entry(name, &mut io::empty())?;
            debug!(entry = name, "created empty entry");
        }

        let scratch = ScratchDir::create(&store.config().scratch_roots)?;
        self.advance(EditState::TempDirCreated);

        let plaintext = scratch.file_for(name)?;
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(&plaintext)
                .map_err(StoreError::Io)
                .with_context(|| format!("failed to create {}", plaintext.display()))?;
            store.read_entry(name, &mut file)?;
        }
        self.advance(EditState::Decrypted);

        if !editor.edit(&plaintext)? {
            warn!(entry = name, "editor exited with an error, saving the file as it is");
        }
        self.advance(EditState::Edited);

        {
            let mut file = File::open(&plaintext)
                .map_err(StoreError::Io)
                .with_context(|| format!("failed to read back {}", plaintext.display()))?;
            store.write_entry(name, &mut file)?;
        }
        self.advance(EditState::Reencrypted);

        drop(scratch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error;
    use crate::store::SecretSource;
    use crate::testing::{FakeTerminal, TestStore};
    use std::cell::RefCell;

    fn add(t: &TestStore, name: &str, value: &str) {
        let mut input = value.as_bytes();
        t.store
            .add(name, SecretSource::Piped(&mut input), &mut FakeTerminal::default())
            .unwrap();
    }

    fn shown(t: &TestStore, name: &str) -> String {
        let mut out = Vec::new();
        t.store.show(name, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn scratch_is_empty(t: &TestStore) -> bool {
        fs::read_dir(t.scratch()).unwrap().next().is_none()
    }

    #[test]
    fn test_edit_replaces_content() {
        let t = TestStore::new();
        add(&t, "email/gmail", "old");

        let seen = RefCell::new(None);
        let editor = |file: &Path| -> Result<bool> {
            assert!(file.starts_with(t.scratch()));
            assert!(file.ends_with("email/gmail.txt"));
            *seen.borrow_mut() = Some(fs::read_to_string(file)?);
            fs::write(file, "new")?;
            Ok(true)
        };

        let mut session = EditSession::new(&t.store, "email/gmail");
        session.run(&editor).unwrap();

        assert_eq!(session.state(), EditState::Cleaned);
        assert_eq!(seen.borrow().as_deref(), Some("old"));
        assert_eq!(shown(&t, "email/gmail"), "new");
        assert!(scratch_is_empty(&t));
    }

    #[test]
    fn test_scratch_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let t = TestStore::new();
        add(&t, "x", "v");

        let editor = |file: &Path| -> Result<bool> {
            let dir_mode = fs::metadata(file.parent().unwrap())?.permissions().mode();
            let file_mode = fs::metadata(file)?.permissions().mode();
            assert_eq!(dir_mode & 0o777, 0o700);
            assert_eq!(file_mode & 0o777, 0o600);
            Ok(true)
        };
        t.store.edit("x", &editor).unwrap();
    }

    #[test]
    fn test_edit_missing_without_force() {
        let t = TestStore::new();
        let editor = |_: &Path| -> Result<bool> { panic!("editor must not run") };

        let mut session = EditSession::new(&t.store, "new");
        let err = session.run(&editor).unwrap_err();

        assert!(matches!(error::kind(&err), Some(StoreError::NotFound(_))));
        assert_eq!(session.state(), EditState::Failed);
        assert!(!t.store.contains("new"));
        assert!(scratch_is_empty(&t));
    }

    #[test]
    fn test_edit_missing_with_force_starts_empty() {
        let mut t = TestStore::new();
        t.configure(|c| c.force = true);

        let editor = |file: &Path| -> Result<bool> {
            assert_eq!(fs::read_to_string(file)?, "");
            fs::write(file, "created")?;
            Ok(true)
        };
        t.store.edit("new", &editor).unwrap();

        assert_eq!(shown(&t, "new"), "created");
    }

    #[test]
    fn test_editor_failure_to_start_cleans_up() {
        let t = TestStore::new();
        add(&t, "x", "keep");

        let editor = |_: &Path| -> Result<bool> { anyhow::bail!("no such editor") };
        let mut session = EditSession::new(&t.store, "x");
        assert!(session.run(&editor).is_err());

        assert_eq!(session.state(), EditState::Failed);
        assert!(scratch_is_empty(&t));
        assert_eq!(shown(&t, "x"), "keep");
    }

    #[test]
    fn test_editor_error_status_still_saves() {
        let t = TestStore::new();
        add(&t, "x", "old");

        let editor = |file: &Path| -> Result<bool> {
            fs::write(file, "partial")?;
            Ok(false)
        };
        t.store.edit("x", &editor).unwrap();

        assert_eq!(shown(&t, "x"), "partial");
        assert!(scratch_is_empty(&t));
    }

    #[test]
    fn test_decrypt_failure_cleans_up() {
        let t = TestStore::new();
        fs::write(t.store.entry_path("x"), b"corrupt").unwrap();

        let editor = |_: &Path| -> Result<bool> { panic!("editor must not run") };
        let err = t.store.edit("x", &editor).unwrap_err();

        assert!(matches!(error::kind(&err), Some(StoreError::Decryption(_))));
        assert!(scratch_is_empty(&t));
    }

    #[test]
    fn test_encrypt_failure_cleans_up_and_keeps_entry() {
        let t = TestStore::new();
        add(&t, "x", "old");
        let before = fs::read(t.store.entry_path("x")).unwrap();
        let recipients = t.store.config().recipients.clone();

        let editor = |file: &Path| -> Result<bool> {
            fs::write(file, "new")?;
            fs::remove_file(&recipients)?;
            Ok(true)
        };
        let err = t.store.edit("x", &editor).unwrap_err();

        assert!(matches!(error::kind(&err), Some(StoreError::Encryption(_))));
        assert!(scratch_is_empty(&t));
        assert_eq!(fs::read(t.store.entry_path("x")).unwrap(), before);
        let leftovers: Vec<_> = fs::read_dir(t.root()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_editor_panic_cleans_up() {
        let t = TestStore::new();
        add(&t, "x", "v");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let editor = |_: &Path| -> Result<bool> { panic!("editor crashed") };
            let _ = t.store.edit("x", &editor);
        }));

        assert!(result.is_err());
        assert!(scratch_is_empty(&t));
    }

    #[test]
    fn test_scratch_falls_back_to_next_root() {
        let t = TestStore::new();
        let unusable = t.scratch().join("missing/parent");
        let roots = vec![unusable, t.scratch().to_path_buf()];

        let scratch = ScratchDir::create(&roots).unwrap();
        assert!(scratch.path().starts_with(t.scratch()));
        assert!(scratch
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("strongbox."));

        assert!(format!("{:?}", scratch).contains("strongbox."));

        let path = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_no_usable_root() {
        let t = TestStore::new();
        let roots = vec![t.scratch().join("missing")];
        let err = ScratchDir::create(&roots).unwrap_err();
        assert!(matches!(error::kind(&err), Some(StoreError::Io(_))));
    }

    #[test]
    fn test_command_editor_parsing() {
        let editor = CommandEditor::from_command_line("code --wait").unwrap();
        assert_eq!(editor.program, "code");
        assert_eq!(editor.args, vec!["--wait"]);
        assert!(CommandEditor::from_command_line("   ").is_err());
    }

    #[test]
    fn test_command_editor_runs_program() {
        let t = TestStore::new();
        add(&t, "x", "old");

        let editor = CommandEditor {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "printf edited > \"$0\"".to_string()],
        };
        t.store.edit("x", &editor).unwrap();
        assert_eq!(shown(&t, "x"), "edited");
    }
}
