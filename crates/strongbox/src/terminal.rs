//! Terminal prompts
//!
//! The store only talks to the user through [`TerminalIO`]. The [`Tty`]
//! implementation switches the controlling terminal into raw mode for
//! the duration of a read and always switches it back, including when the
//! process is interrupted.

use anyhow::{Context, Result};
use crossterm::terminal;
use std::io::{self, BufRead, Read, Write};
use zeroize::Zeroizing;

use crate::guard::CleanupGuard;

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const CTRL_U: u8 = 0x15;
const DELETE: u8 = 0x7f;

/// User interaction needed by the store
pub trait TerminalIO {
    /// Show `prompt` and read a single byte without waiting for Enter
    fn read_confirmation_byte(&mut self, prompt: &str) -> Result<u8>;

    /// Show `prompt` and read one line without echoing it
    fn read_masked_line(&mut self, prompt: &str) -> Result<Zeroizing<String>>;
}

/// Ask a yes/no question; only `y` or `Y` count as yes
pub fn confirm(terminal: &mut dyn TerminalIO, prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }

    let answer = terminal.read_confirmation_byte(&format!("{} [y/N]: ", prompt))?;
    Ok(matches!(answer, b'y' | b'Y'))
}

/// Raw mode for as long as the value lives
struct RawMode {
    _guard: CleanupGuard,
}

impl RawMode {
    fn enable() -> Result<Self> {
        let guard = CleanupGuard::register(|| {
            let _ = terminal::disable_raw_mode();
        });
        terminal::enable_raw_mode().context("failed to switch terminal to raw mode")?;
        Ok(Self { _guard: guard })
    }
}

/// Prompts on stderr, answers from stdin
#[derive(Debug, Default)]
pub struct Tty;

impl Tty {
    fn interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    fn show(prompt: &str) -> Result<()> {
        let mut stderr = io::stderr();
        write!(stderr, "{}", prompt)?;
        stderr.flush()?;
        Ok(())
    }
}

fn interrupted() -> anyhow::Error {
    io::Error::new(io::ErrorKind::Interrupted, "input cancelled").into()
}

impl TerminalIO for Tty {
    fn read_confirmation_byte(&mut self, prompt: &str) -> Result<u8> {
        Self::show(prompt)?;

        let mut byte = [0u8; 1];
        let read = {
            let _raw = if Self::interactive() {
                Some(RawMode::enable()?)
            } else {
                None
            };
            io::stdin().lock().read(&mut byte)?
        };

        if read == 1 && byte[0].is_ascii_graphic() {
            eprintln!("{}", byte[0] as char);
        } else {
            eprintln!();
        }

        Ok(if read == 1 { byte[0] } else { 0 })
    }

    fn read_masked_line(&mut self, prompt: &str) -> Result<Zeroizing<String>> {
        Self::show(prompt)?;

        if !Self::interactive() {
            let mut line = Zeroizing::new(String::new());
            io::stdin().lock().read_line(&mut line)?;
            let trimmed = line.trim_end_matches(&['\n', '\r'][..]).len();
            line.truncate(trimmed);
            return Ok(line);
        }

        let mut buf = Zeroizing::new(Vec::new());
        {
            let _raw = RawMode::enable()?;
            let stdin = io::stdin();
            let mut stdin = stdin.lock();
            let mut byte = [0u8; 1];

            loop {
                if stdin.read(&mut byte)? == 0 {
                    break;
                }
                match byte[0] {
                    b'\r' | b'\n' => break,
                    CTRL_C => return Err(interrupted()),
                    CTRL_D if buf.is_empty() => return Err(interrupted()),
                    CTRL_D => break,
                    BACKSPACE | DELETE => pop_char(&mut buf),
                    CTRL_U => buf.clear(),
                    b => buf.push(b),
                }
            }
        }
        eprintln!();

        let line = std::str::from_utf8(&buf).context("input is not valid UTF-8")?;
        Ok(Zeroizing::new(line.to_string()))
    }
}

/// Drop the last UTF-8 character from `buf`
fn pop_char(buf: &mut Vec<u8>) {
    while let Some(b) = buf.pop() {
        if b & 0xC0 != 0x80 {
            break;
        }
    }
}
