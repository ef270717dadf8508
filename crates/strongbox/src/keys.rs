//! Key bootstrap
//!
//! The identity file is generated once and never rotated. The recipients
//! file is derived from it so that `add` and `edit` only ever read public
//! keys.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::info;

use crate::crypto;
use crate::names;

/// What [`ensure`] had to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bootstrap {
    pub created_identity: bool,
    pub created_recipients: bool,
}

/// Create the identity and recipients files if they are missing
pub fn ensure(identities: &Path, recipients: &Path) -> Result<Bootstrap> {
    let mut status = Bootstrap::default();

    if !identities.exists() {
        let identity = age::x25519::Identity::generate();
        let public = identity.to_public().to_string();

        let mut content = zeroize::Zeroizing::new(String::new());
        content.push_str("# created by strongbox\n");
        content.push_str(&format!("# public key: {}\n", public));
        content.push_str(&crypto::identity_to_string(&identity));
        content.push('\n');

        write_new(identities, content.as_bytes())?;
        info!(path = %identities.display(), "generated identity");
        status.created_identity = true;
    }

    if !recipients.exists() {
        let derived: String = crypto::load_identities(identities)?
            .iter()
            .map(|identity| format!("{}\n", identity.to_public()))
            .collect();

        write_new(recipients, derived.as_bytes())?;
        info!(path = %recipients.display(), "derived recipients");
        status.created_recipients = true;
    }

    Ok(status)
}

/// Write a file that must not exist yet, readable only by the owner
fn write_new(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        names::create_private_dir(parent)?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.sync_all()?;
    Ok(())
}
