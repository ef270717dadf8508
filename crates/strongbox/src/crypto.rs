//! Encryption providers
//!
//! Entries are age ciphertext. [`AgeNative`] uses the linked `age` crate
//! (X25519 + ChaCha20-Poly1305); [`AgeCommand`] pipes through an external
//! `age`-compatible binary such as `age` or `rage`. The store only sees the
//! [`EncryptionProvider`] trait, so both produce the same behaviour.

use age::secrecy::ExposeSecret;
use anyhow::{bail, Context, Result};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use strongbox_core::{process, Config};
use zeroize::Zeroizing;

use crate::error::StoreError;

/// Asymmetric cipher used for every entry
pub trait EncryptionProvider {
    /// Encrypt `plaintext` to every key in the `recipients` file
    fn encrypt(
        &self,
        recipients: &Path,
        plaintext: &mut dyn Read,
        ciphertext: &mut dyn Write,
    ) -> Result<()>;

    /// Decrypt `ciphertext` with the keys in the `identities` file
    fn decrypt(
        &self,
        identities: &Path,
        ciphertext: &mut dyn Read,
        plaintext: &mut dyn Write,
    ) -> Result<()>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Provider selected by the configuration
pub fn provider(config: &Config) -> Result<Box<dyn EncryptionProvider>> {
    match &config.age_command {
        None => Ok(Box::new(AgeNative)),
        Some(command) => Ok(Box::new(AgeCommand::from_command_line(command)?)),
    }
}

/// Non-empty, non-comment lines of a key file
fn key_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Parse every identity in an age identity file
pub fn load_identities(path: &Path) -> Result<Vec<age::x25519::Identity>> {
    let content = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
        StoreError::Decryption(format!("cannot read identities {}: {}", path.display(), e))
    })?);

    let identities = key_lines(&content)
        .map(|line| {
            line.parse::<age::x25519::Identity>().map_err(|e| {
                StoreError::Decryption(format!("bad identity in {}: {}", path.display(), e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if identities.is_empty() {
        bail!(StoreError::Decryption(format!(
            "no identities in {}",
            path.display()
        )));
    }
    Ok(identities)
}

/// Parse every recipient in a recipients file
pub fn load_recipients(path: &Path) -> Result<Vec<age::x25519::Recipient>> {
    let content = fs::read_to_string(path).map_err(|e| {
        StoreError::Encryption(format!("cannot read recipients {}: {}", path.display(), e))
    })?;

    let recipients = key_lines(&content)
        .map(|line| {
            line.parse::<age::x25519::Recipient>().map_err(|e| {
                StoreError::Encryption(format!("bad recipient in {}: {}", path.display(), e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if recipients.is_empty() {
        bail!(StoreError::Encryption(format!(
            "no recipients in {}",
            path.display()
        )));
    }
    Ok(recipients)
}

/// Secret key string for an identity, as written to an identity file
pub fn identity_to_string(identity: &age::x25519::Identity) -> Zeroizing<String> {
    Zeroizing::new(identity.to_string().expose_secret().to_string())
}

/// age through the linked library
#[derive(Debug, Default, Clone, Copy)]
pub struct AgeNative;

impl EncryptionProvider for AgeNative {
    fn encrypt(
        &self,
        recipients: &Path,
        plaintext: &mut dyn Read,
        ciphertext: &mut dyn Write,
    ) -> Result<()> {
        let recipients = load_recipients(recipients)?
            .into_iter()
            .map(|r| Box::new(r) as Box<dyn age::Recipient + Send>)
            .collect();

        let encryptor = age::Encryptor::with_recipients(recipients)
            .ok_or_else(|| StoreError::Encryption("no recipients".to_string()))?;

        let mut writer = encryptor
            .wrap_output(ciphertext)
            .map_err(|e| StoreError::Encryption(e.to_string()))?;

        io::copy(plaintext, &mut writer).map_err(|e| StoreError::Encryption(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| StoreError::Encryption(e.to_string()))?;

        Ok(())
    }

    fn decrypt(
        &self,
        identities: &Path,
        ciphertext: &mut dyn Read,
        plaintext: &mut dyn Write,
    ) -> Result<()> {
        let identities = load_identities(identities)?;

        let decryptor = match age::Decryptor::new(ciphertext)
            .map_err(|e| StoreError::Decryption(e.to_string()))?
        {
            age::Decryptor::Recipients(d) => d,
            _ => bail!(StoreError::Decryption(
                "unexpected passphrase encryption".to_string()
            )),
        };

        let mut reader = decryptor
            .decrypt(identities.iter().map(|i| i as &dyn age::Identity))
            .map_err(|e| StoreError::Decryption(e.to_string()))?;

        io::copy(&mut reader, plaintext).map_err(|e| StoreError::Decryption(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "age (library)"
    }
}

/// age through an external binary
#[derive(Debug, Clone)]
pub struct AgeCommand {
    program: String,
    args: Vec<String>,
}

impl AgeCommand {
    /// `program` plus leading `args`; fails if `program` is not installed
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self> {
        let program = program.into();
        if !process::command_exists(&program) {
            bail!(StoreError::DependencyMissing(program));
        }
        Ok(Self { program, args })
    }

    /// Split a configured command such as `rage` or `/opt/bin/age`
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut words = command.split_whitespace();
        let Some(program) = words.next() else {
            bail!(StoreError::DependencyMissing(command.to_string()));
        };
        Self::new(program, words.map(str::to_string).collect())
    }

    /// Feed `input` to the program and copy its stdout to `output`
    fn run(
        &self,
        args: &[&str],
        input: &mut dyn Read,
        output: &mut dyn Write,
        fail: fn(String) -> StoreError,
    ) -> Result<()> {
        let mut data = Zeroizing::new(Vec::new());
        input
            .read_to_end(&mut data)
            .context("failed to read input")?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => StoreError::DependencyMissing(self.program.clone()),
                _ => fail(format!("failed to run {}: {}", self.program, e)),
            })?;

        let mut stdin = child.stdin.take().context("child stdin unavailable")?;
        let mut stdout = child.stdout.take().context("child stdout unavailable")?;
        let data: &[u8] = &data;

        // Writer runs alongside the reader so neither pipe can fill up and stall
        let (written, copied) = thread::scope(|s| {
            let writer = s.spawn(move || stdin.write_all(data));
            let copied = io::copy(&mut stdout, output);
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "writer panicked")));
            (written, copied)
        });

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = child.wait().context("failed to wait for cipher process")?;

        if !status.success() {
            let detail = stderr.trim();
            bail!(fail(if detail.is_empty() {
                format!("{} exited with {}", self.program, status)
            } else {
                format!("{}: {}", self.program, detail)
            }));
        }
        written.map_err(|e| fail(e.to_string()))?;
        copied.map_err(|e| fail(e.to_string()))?;

        Ok(())
    }
}

impl EncryptionProvider for AgeCommand {
    fn encrypt(
        &self,
        recipients: &Path,
        plaintext: &mut dyn Read,
        ciphertext: &mut dyn Write,
    ) -> Result<()> {
        let recipients = recipients.to_string_lossy();
        self.run(
            &["--encrypt", "-R", &recipients],
            plaintext,
            ciphertext,
            StoreError::Encryption,
        )
    }

    fn decrypt(
        &self,
        identities: &Path,
        ciphertext: &mut dyn Read,
        plaintext: &mut dyn Write,
    ) -> Result<()> {
        let identities = identities.to_string_lossy();
        self.run(
            &["--decrypt", "-i", &identities],
            ciphertext,
            plaintext,
            StoreError::Decryption,
        )
    }

    fn name(&self) -> &str {
        &self.program
    }
}
