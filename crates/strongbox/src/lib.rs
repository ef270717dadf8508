//! strongbox - Local credential store
//!
//! "Encrypted at rest. Plaintext only in memory, and only while you look."
//!
//! Every entry is its own age-encrypted file below the store root, so the
//! directory tree is the index: `email/gmail` lives in `email/gmail.age`.
//! Entries are encrypted to a recipients file derived from a private
//! identity that is generated on first run.
//!
//! Editing decrypts into a private scratch directory on a memory-backed
//! filesystem when one is available; the directory is removed on every
//! exit path, including interrupts.

pub mod crypto;
pub mod edit;
pub mod error;
pub mod guard;
pub mod keys;
pub mod names;
pub mod random;
pub mod store;
pub mod terminal;

#[cfg(test)]
mod testing;

pub use crypto::{AgeCommand, AgeNative, EncryptionProvider};
pub use edit::{CommandEditor, EditSession, EditState, Editor};
pub use error::StoreError;
pub use guard::CleanupGuard;
pub use store::{Entries, EntryStore, SecretSource};
pub use terminal::{TerminalIO, Tty};
