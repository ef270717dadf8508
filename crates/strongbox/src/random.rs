//! Random strings from a character class
//!
//! Character classes use `tr` set syntax over printable ASCII, e.g.
//! `A-Za-z0-9-_` or `[:alnum:][:punct:]`.

use anyhow::{bail, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::error::StoreError;

/// Random bytes drawn per refill
const CHUNK: usize = 64;

/// Set of printable ASCII characters a random string may contain
#[derive(Clone, PartialEq, Eq)]
pub struct CharClass {
    allowed: [bool; 128],
}

impl CharClass {
    /// `[A-Za-z0-9]`
    pub fn alphanumeric() -> Self {
        let mut class = Self::empty();
        class.add_where(|c| c.is_ascii_alphanumeric());
        class
    }

    /// Parse a `tr`-style set
    pub fn parse(pattern: &str) -> Result<Self> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut class = Self::empty();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] == '[' && chars.get(i + 1) == Some(&':') {
                let rest: String = chars[i + 2..].iter().collect();
                let Some(end) = rest.find(":]") else {
                    bail!(StoreError::InvalidPattern(format!(
                        "unterminated class in '{}'",
                        pattern
                    )));
                };
                class.add_named(&rest[..end])?;
                i += 2 + rest[..end].chars().count() + 2;
                continue;
            }

            let start = take_char(&chars, &mut i);
            if chars.get(i) == Some(&'-') && i + 1 < chars.len() {
                i += 1;
                let end = take_char(&chars, &mut i);
                if end < start {
                    bail!(StoreError::InvalidPattern(format!(
                        "reversed range '{}-{}'",
                        start, end
                    )));
                }
                for c in start..=end {
                    class.add(c)?;
                }
            } else {
                class.add(start)?;
            }
        }

        if class.is_empty() {
            bail!(StoreError::InvalidPattern(format!(
                "'{}' selects no characters",
                pattern
            )));
        }

        Ok(class)
    }

    pub fn contains(&self, c: char) -> bool {
        c.is_ascii() && self.allowed[c as usize]
    }

    /// Number of distinct characters in the class
    pub fn len(&self) -> usize {
        self.allowed.iter().filter(|&&a| a).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn empty() -> Self {
        Self {
            allowed: [false; 128],
        }
    }

    fn add(&mut self, c: char) -> Result<()> {
        if !(' '..='~').contains(&c) {
            bail!(StoreError::InvalidPattern(format!(
                "'{}' is not printable ASCII",
                c.escape_default()
            )));
        }
        self.allowed[c as usize] = true;
        Ok(())
    }

    fn add_where(&mut self, predicate: impl Fn(char) -> bool) {
        for c in ' '..='~' {
            if predicate(c) {
                self.allowed[c as usize] = true;
            }
        }
    }

    fn add_named(&mut self, name: &str) -> Result<()> {
        match name {
            "alnum" => self.add_where(|c| c.is_ascii_alphanumeric()),
            "alpha" => self.add_where(|c| c.is_ascii_alphabetic()),
            "digit" => self.add_where(|c| c.is_ascii_digit()),
            "lower" => self.add_where(|c| c.is_ascii_lowercase()),
            "upper" => self.add_where(|c| c.is_ascii_uppercase()),
            "punct" => self.add_where(|c| c.is_ascii_punctuation()),
            "graph" => self.add_where(|c| c.is_ascii_graphic()),
            "xdigit" => self.add_where(|c| c.is_ascii_hexdigit()),
            other => bail!(StoreError::InvalidPattern(format!(
                "unknown class '[:{}:]'",
                other
            ))),
        }
        Ok(())
    }
}

/// Next character at `i`, resolving a `\` escape
fn take_char(chars: &[char], i: &mut usize) -> char {
    if chars[*i] == '\\' && *i + 1 < chars.len() {
        *i += 2;
        chars[*i - 1]
    } else {
        *i += 1;
        chars[*i - 1]
    }
}

impl FromStr for CharClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: String = (' '..='~').filter(|&c| self.contains(c)).collect();
        f.debug_tuple("CharClass").field(&members).finish()
    }
}

/// `length` characters drawn uniformly from `class` using the OS CSPRNG
pub fn generate(length: usize, class: &CharClass) -> Result<String> {
    if class.is_empty() {
        bail!(StoreError::InvalidPattern("empty character class".to_string()));
    }

    let mut out = String::with_capacity(length);
    let mut buf = Zeroizing::new([0u8; CHUNK]);

    while out.len() < length {
        OsRng
            .try_fill_bytes(&mut buf[..])
            .map_err(|e| StoreError::Entropy(e.to_string()))?;

        // 7-bit values are uniform; rejecting the ones outside the class
        // keeps the result uniform over the class
        for &byte in buf.iter() {
            let c = char::from(byte & 0x7f);
            if class.contains(c) {
                out.push(c);
                if out.len() == length {
                    break;
                }
            }
        }
    }

    Ok(out)
}
