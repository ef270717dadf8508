//! strongbox - Local credential store
//!
//! One age-encrypted file per entry, organized in category directories.
//!
//! Commands (any unambiguous prefix works, e.g. `strongbox s github`):
//! - add <NAME>: Store a new entry (piped, generated or typed twice)
//! - del <NAME>: Delete an entry and prune empty categories
//! - edit <NAME>: Edit an entry in a volatile scratch directory
//! - list: List entry names
//! - show <NAME>: Print an entry

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::process::ExitCode;
use strongbox::{guard, keys, terminal, CommandEditor, EntryStore, SecretSource, TerminalIO, Tty};
use strongbox_core::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strongbox")]
#[command(about = "Local credential store - one age-encrypted file per entry")]
#[command(version)]
#[command(infer_subcommands = true)]
#[command(after_help = r#"ENTRY NAMING:
    Use categories to group entries:
    - github             top-level entry
    - email/gmail        entry in the "email" category
    - bank/card/visa     categories nest arbitrarily

ADDING:
    echo -n 'hunter2' | strongbox add github    store piped input as-is
    strongbox add email/gmail                   generate, or type it twice

ENVIRONMENT:
    STRONGBOX_DIR        store root (default ~/.local/share/strongbox/entries)
    STRONGBOX_KEYS_DIR   directory holding identities and recipients
    STRONGBOX_LENGTH     generated password length (default 50)
    STRONGBOX_PATTERN    generated password characters (default A-Za-z0-9-_)
    STRONGBOX_AGE        external age binary instead of the built-in library
    EDITOR               editor for `edit` (default vi)

SECURITY:
    - Entries are encrypted with age (X25519 + ChaCha20-Poly1305)
    - `edit` decrypts into /dev/shm when writable and always cleans up
    - There is no locking; concurrent writers to one entry race"#)]
struct Cli {
    /// Overwrite existing entries; create missing entries on edit
    #[arg(short, long, global = true)]
    force: bool,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new entry (reads stdin when piped)
    Add {
        /// Entry name (e.g. email/gmail)
        name: String,
    },

    /// Delete an entry
    #[command(alias = "delete", alias = "rm")]
    Del {
        /// Entry name
        name: String,
    },

    /// Edit an entry with $EDITOR
    Edit {
        /// Entry name
        name: String,
    },

    /// List entry names, one per line (filesystem order)
    #[command(alias = "ls")]
    List,

    /// Print an entry
    Show {
        /// Entry name
        name: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if is_informational(&e) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{:#}", e);
            eprintln!("error: {}.", message.trim_end_matches('.'));
            ExitCode::FAILURE
        }
    }
}

/// `--help` and `--version` are not failures
fn is_informational(e: &clap::Error) -> bool {
    matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
}

fn run(cli: Cli) -> Result<()> {
    guard::install_signal_handler()?;

    let mut config = Config::resolve()?;
    config.force = cli.force;
    config.yes = cli.yes;

    keys::ensure(&config.identities, &config.recipients)?;
    let store = EntryStore::open(config)?;
    let mut tty = Tty;

    match cli.command {
        Commands::Add { name } => cmd_add(&store, &name, &mut tty),
        Commands::Del { name } => cmd_del(&store, &name, &mut tty),
        Commands::Edit { name } => cmd_edit(&store, &name),
        Commands::List => cmd_list(&store),
        Commands::Show { name } => cmd_show(&store, &name),
    }
}

/// Store a new entry
fn cmd_add(store: &EntryStore, name: &str, tty: &mut dyn TerminalIO) -> Result<()> {
    store.ensure_addable(name)?;

    if !atty::is(atty::Stream::Stdin) {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        store.add(name, SecretSource::Piped(&mut input), tty)?;
    } else if terminal::confirm(tty, "generate a password?", store.config().yes)? {
        store.add(name, SecretSource::Generated, tty)?;
    } else {
        store.add(name, SecretSource::Interactive, tty)?;
    }

    println!("saved '{}' to the store.", name);
    Ok(())
}

/// Delete an entry
fn cmd_del(store: &EntryStore, name: &str, tty: &mut dyn TerminalIO) -> Result<()> {
    store.delete(name, tty)?;
    Ok(())
}

/// Edit an entry
fn cmd_edit(store: &EntryStore, name: &str) -> Result<()> {
    let editor = CommandEditor::from_command_line(&store.config().editor)?;
    store.edit(name, &editor)
}

/// List all entries
fn cmd_list(store: &EntryStore) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for name in store.list() {
        writeln!(out, "{}", name?)?;
    }
    out.flush()?;
    Ok(())
}

/// Print an entry
fn cmd_show(store: &EntryStore, name: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    store.show(name, &mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_parse() {
        let cli = parse(&["strongbox", "add", "email/gmail"]);
        assert!(matches!(cli.command, Commands::Add { ref name } if name == "email/gmail"));
        assert!(!cli.force);
        assert!(!cli.yes);

        let cli = parse(&["strongbox", "list"]);
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_cli_prefix_matching() {
        assert!(matches!(parse(&["strongbox", "a", "x"]).command, Commands::Add { .. }));
        assert!(matches!(parse(&["strongbox", "d", "x"]).command, Commands::Del { .. }));
        assert!(matches!(parse(&["strongbox", "ed", "x"]).command, Commands::Edit { .. }));
        assert!(matches!(parse(&["strongbox", "l"]).command, Commands::List));
        assert!(matches!(parse(&["strongbox", "sh", "x"]).command, Commands::Show { .. }));
    }

    #[test]
    fn test_cli_aliases() {
        assert!(matches!(parse(&["strongbox", "rm", "x"]).command, Commands::Del { .. }));
        assert!(matches!(parse(&["strongbox", "delete", "x"]).command, Commands::Del { .. }));
        assert!(matches!(parse(&["strongbox", "ls"]).command, Commands::List));
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = parse(&["strongbox", "-f", "add", "x"]);
        assert!(cli.force);

        let cli = parse(&["strongbox", "del", "x", "--yes"]);
        assert!(cli.yes);

        let cli = parse(&["strongbox", "edit", "-fy", "x"]);
        assert!(cli.force && cli.yes);
    }

    #[test]
    fn test_cli_rejects_unknown_and_missing_name() {
        assert!(Cli::try_parse_from(["strongbox", "rename", "x"]).is_err());
        assert!(Cli::try_parse_from(["strongbox", "show"]).is_err());
        assert!(Cli::try_parse_from(["strongbox"]).is_err());
    }

    #[test]
    fn test_usage_errors_are_failures() {
        for args in [
            &["strongbox", "rename", "x"][..],
            &["strongbox", "show"][..],
            &["strongbox", "list", "--bogus"][..],
        ] {
            let err = Cli::try_parse_from(args).err().unwrap();
            assert!(!is_informational(&err), "{args:?}");
        }

        for args in [&["strongbox", "--help"][..], &["strongbox", "--version"][..]] {
            let err = Cli::try_parse_from(args).err().unwrap();
            assert!(is_informational(&err), "{args:?}");
        }
    }
}
